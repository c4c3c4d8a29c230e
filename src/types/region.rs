//! Region identifiers
//!
//! Bridges and vessels each belong to a fixed region. Bridge regions drive
//! the `bridges:*` sub-channels; boat regions drive `boats:*` and the AIS
//! ingest bounding boxes.

use serde::{Deserialize, Serialize};

/// Bridge regions along the Seaway corridor, Welland Canal first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeRegion {
    /// St. Catharines / Thorold (Welland Canal north)
    Sct,
    /// Port Colborne (Welland Canal south)
    Pc,
    /// Montreal South Shore (St-Lambert / Victoria)
    Mss,
    /// Kahnawake / Sainte-Catherine
    K,
    /// Salaberry / Beauharnois
    Sbs,
}

impl BridgeRegion {
    /// All bridge regions in canonical order.
    pub const ALL: [BridgeRegion; 5] = [
        BridgeRegion::Sct,
        BridgeRegion::Pc,
        BridgeRegion::Mss,
        BridgeRegion::K,
        BridgeRegion::Sbs,
    ];

    /// Lowercase short code used in channel names and the snapshot index.
    pub fn short_code(self) -> &'static str {
        match self {
            BridgeRegion::Sct => "sct",
            BridgeRegion::Pc => "pc",
            BridgeRegion::Mss => "mss",
            BridgeRegion::K => "k",
            BridgeRegion::Sbs => "sbs",
        }
    }

    /// Human-readable region name shown to clients.
    pub fn display_name(self) -> &'static str {
        match self {
            BridgeRegion::Sct => "St. Catharines",
            BridgeRegion::Pc => "Port Colborne",
            BridgeRegion::Mss => "Montreal South Shore",
            BridgeRegion::K => "Kahnawake",
            BridgeRegion::Sbs => "Salaberry / Beauharnois",
        }
    }

    /// The vessel-traffic region this bridge region draws from.
    pub fn boat_region(self) -> BoatRegion {
        match self {
            BridgeRegion::Sct | BridgeRegion::Pc => BoatRegion::Welland,
            BridgeRegion::Mss | BridgeRegion::K | BridgeRegion::Sbs => BoatRegion::Montreal,
        }
    }

    /// Parse a lowercase short code.
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.short_code() == code)
    }
}

/// Vessel-traffic regions covered by the AIS feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BoatRegion {
    Welland,
    Montreal,
}

impl BoatRegion {
    /// All boat regions in canonical order.
    pub const ALL: [BoatRegion; 2] = [BoatRegion::Welland, BoatRegion::Montreal];

    /// Lowercase code used in channel names and vessel records.
    pub fn short_code(self) -> &'static str {
        match self {
            BoatRegion::Welland => "welland",
            BoatRegion::Montreal => "montreal",
        }
    }

    /// Parse a lowercase code.
    pub fn parse(code: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.short_code() == code)
    }
}
