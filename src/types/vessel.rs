//! Vessel model
//!
//! Registry records and the wire payload served at `/boats` and broadcast on
//! the `boats` channel. Registry records carry ingest bookkeeping
//! (`type_code`, `last_moved`) that the wire payload omits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::region::BoatRegion;

/// Ship MMSI range; anything outside is not a vessel we track.
pub const MMSI_MIN: u32 = 200_000_000;
pub const MMSI_MAX: u32 = 799_999_999;

/// Whether `mmsi` falls in the ship range.
pub fn is_ship_mmsi(mmsi: u32) -> bool {
    (MMSI_MIN..=MMSI_MAX).contains(&mmsi)
}

/// Vessel position in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Hull dimensions in metres, from AIS static data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub length: u32,
    pub width: u32,
}

/// Coarse vessel category derived from the AIS ship-type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VesselCategory {
    Commercial,
    Pleasure,
    Tug,
    Fishing,
    Passenger,
    Other,
}

/// Display name and category for an AIS ship-type code.
pub fn ship_type_label(code: Option<u8>) -> (&'static str, VesselCategory) {
    match code {
        Some(30) => ("Fishing", VesselCategory::Fishing),
        Some(31 | 32) => ("Towing", VesselCategory::Tug),
        Some(36) => ("Sailing", VesselCategory::Pleasure),
        Some(37) => ("Pleasure Craft", VesselCategory::Pleasure),
        Some(50) => ("Pilot Vessel", VesselCategory::Other),
        Some(51) => ("Search and Rescue", VesselCategory::Other),
        Some(52) => ("Tug", VesselCategory::Tug),
        Some(55) => ("Law Enforcement", VesselCategory::Other),
        Some(c) if (60..=69).contains(&c) => ("Passenger", VesselCategory::Passenger),
        Some(c) if (70..=79).contains(&c) => ("Cargo", VesselCategory::Commercial),
        Some(c) if (80..=89).contains(&c) => ("Tanker", VesselCategory::Commercial),
        _ => ("Unknown", VesselCategory::Other),
    }
}

/// Last-known record for one vessel, owned by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vessel {
    pub mmsi: u32,
    pub name: Option<String>,
    pub type_code: Option<u8>,
    pub type_name: String,
    pub type_category: VesselCategory,
    pub position: LatLon,
    pub heading: Option<f64>,
    pub course: Option<f64>,
    pub speed_knots: f64,
    pub destination: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub last_seen: DateTime<Utc>,
    /// Advanced only when displacement from the previous position exceeds 10 m.
    pub last_moved: DateTime<Utc>,
    /// Station id for UDP sources, "aishub" for the HTTP poller.
    pub source: String,
    pub region: BoatRegion,
}

/// One vessel as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VesselInfo {
    pub mmsi: u32,
    pub name: Option<String>,
    pub type_name: String,
    pub type_category: VesselCategory,
    pub position: LatLon,
    pub heading: Option<f64>,
    pub course: Option<f64>,
    pub speed_knots: f64,
    pub destination: Option<String>,
    pub dimensions: Option<Dimensions>,
    pub last_seen: DateTime<Utc>,
    pub source: String,
    pub region: BoatRegion,
}

impl From<&Vessel> for VesselInfo {
    fn from(v: &Vessel) -> Self {
        Self {
            mmsi: v.mmsi,
            name: v.name.clone(),
            type_name: v.type_name.clone(),
            type_category: v.type_category,
            position: v.position,
            heading: v.heading,
            course: v.course,
            speed_knots: v.speed_knots,
            destination: v.destination.clone(),
            dimensions: v.dimensions,
            last_seen: v.last_seen,
            source: v.source.clone(),
            region: v.region,
        }
    }
}

/// The `/boats` response and `boats` broadcast payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoatsPayload {
    pub last_updated: DateTime<Utc>,
    pub vessel_count: usize,
    pub vessels: Vec<VesselInfo>,
}

impl BoatsPayload {
    /// Build a payload from registry records, sorted by MMSI so the
    /// canonical form is stable.
    pub fn from_vessels(mut vessels: Vec<Vessel>, at: DateTime<Utc>) -> Self {
        vessels.sort_by_key(|v| v.mmsi);
        Self {
            last_updated: at,
            vessel_count: vessels.len(),
            vessels: vessels.iter().map(VesselInfo::from).collect(),
        }
    }

    /// A copy containing only vessels in `region`, with the count adjusted.
    pub fn filtered(&self, region: BoatRegion) -> BoatsPayload {
        let vessels: Vec<VesselInfo> = self
            .vessels
            .iter()
            .filter(|v| v.region == region)
            .cloned()
            .collect();
        BoatsPayload {
            last_updated: self.last_updated,
            vessel_count: vessels.len(),
            vessels,
        }
    }

    /// A copy containing only vessels whose region is in `regions`.
    pub fn filtered_to(&self, regions: &std::collections::BTreeSet<BoatRegion>) -> BoatsPayload {
        let vessels: Vec<VesselInfo> = self
            .vessels
            .iter()
            .filter(|v| regions.contains(&v.region))
            .cloned()
            .collect();
        BoatsPayload {
            last_updated: self.last_updated,
            vessel_count: vessels.len(),
            vessels,
        }
    }

    /// Canonical bytes of the vessel list with sorted keys, used for
    /// change detection. `last_updated` is stamped at broadcast time and
    /// deliberately excluded, otherwise every probe would look like a change.
    pub fn fingerprint(&self) -> String {
        serde_json::to_value(&self.vessels)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }
}
