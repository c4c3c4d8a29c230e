//! Subscription channels
//!
//! The closed set of channel names a WebSocket client may subscribe to.
//! `bridges` implies every bridge region; `boats` implies every boat region.
//! Unknown names are silently dropped.

use std::collections::BTreeSet;

use super::region::{BoatRegion, BridgeRegion};

/// One subscribable channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Bridges,
    BridgesRegion(BridgeRegion),
    Boats,
    BoatsRegion(BoatRegion),
}

impl Channel {
    /// Parse a channel name; returns `None` for anything outside the set.
    pub fn parse(name: &str) -> Option<Channel> {
        match name {
            "bridges" => Some(Channel::Bridges),
            "boats" => Some(Channel::Boats),
            _ => {
                if let Some(code) = name.strip_prefix("bridges:") {
                    BridgeRegion::parse(code).map(Channel::BridgesRegion)
                } else if let Some(code) = name.strip_prefix("boats:") {
                    BoatRegion::parse(code).map(Channel::BoatsRegion)
                } else {
                    None
                }
            }
        }
    }

    /// Canonical channel name.
    pub fn name(self) -> String {
        match self {
            Channel::Bridges => "bridges".to_string(),
            Channel::BridgesRegion(r) => format!("bridges:{}", r.short_code()),
            Channel::Boats => "boats".to_string(),
            Channel::BoatsRegion(r) => format!("boats:{}", r.short_code()),
        }
    }
}

/// A client's current subscriptions, with the broadcast-time filters cached
/// so each delivery is an O(1) check. Recomputed on every subscribe.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionSet {
    names: Vec<String>,
    all_bridges: bool,
    bridge_regions: BTreeSet<BridgeRegion>,
    all_boats: bool,
    boat_regions: BTreeSet<BoatRegion>,
}

impl SubscriptionSet {
    /// Replace the whole set from a subscribe request. Unknown names are
    /// dropped; recognized names are kept in request order, deduplicated.
    /// Returns the accepted names for the acknowledgement.
    pub fn replace(&mut self, requested: &[String]) -> Vec<String> {
        *self = SubscriptionSet::default();

        for raw in requested {
            let Some(channel) = Channel::parse(raw) else {
                continue;
            };
            let name = channel.name();
            if self.names.contains(&name) {
                continue;
            }
            self.names.push(name);
            match channel {
                Channel::Bridges => self.all_bridges = true,
                Channel::BridgesRegion(r) => {
                    self.bridge_regions.insert(r);
                }
                Channel::Boats => self.all_boats = true,
                Channel::BoatsRegion(r) => {
                    self.boat_regions.insert(r);
                }
            }
        }

        self.names.clone()
    }

    /// Accepted channel names, in subscribe order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Whether any bridge channel is subscribed.
    pub fn wants_bridges(&self) -> bool {
        self.all_bridges || !self.bridge_regions.is_empty()
    }

    /// Whether any boat channel is subscribed.
    pub fn wants_boats(&self) -> bool {
        self.all_boats || !self.boat_regions.is_empty()
    }

    /// Region filter for bridge payloads; `None` means the full snapshot.
    pub fn bridge_filter(&self) -> Option<&BTreeSet<BridgeRegion>> {
        if self.all_bridges {
            None
        } else {
            Some(&self.bridge_regions)
        }
    }

    /// Region filter for boat payloads; `None` means all regions.
    pub fn boat_filter(&self) -> Option<&BTreeSet<BoatRegion>> {
        if self.all_boats {
            None
        } else {
            Some(&self.boat_regions)
        }
    }
}
