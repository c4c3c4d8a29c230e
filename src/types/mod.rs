//! Core data model
//!
//! - `bridge`: normalized status, snapshot, closures, statistics, history
//! - `vessel`: registry records and the boats wire payload
//! - `region`: bridge and boat region identifiers
//! - `channel`: the subscription channel set

pub mod bridge;
pub mod channel;
pub mod region;
pub mod vessel;

pub use bridge::{
    BridgeEntry, BridgeIndexEntry, BridgeLive, BridgeStatic, BridgeStatus, CiBounds, Coordinates,
    ClosureKind, DurationHistogram, HistoryEntry, PredictionWindow, Snapshot, Statistics,
    UpcomingClosure,
};
pub use channel::{Channel, SubscriptionSet};
pub use region::{BoatRegion, BridgeRegion};
pub use vessel::{
    is_ship_mmsi, ship_type_label, BoatsPayload, Dimensions, LatLon, Vessel, VesselCategory,
    VesselInfo,
};
