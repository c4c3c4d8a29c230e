//! bridgewatch: Seaway bridge status with live vessel fusion
//!
//! Tracks the operational state of the movable bridges along the Welland
//! Canal and the Montreal South Shore, fuses it with AIS vessel traffic from
//! UDP stations and the AISHub aggregator, and fans both out to subscribed
//! WebSocket clients and HTTP consumers in near real time.
//!
//! ## Architecture
//!
//! - **Scraper**: polls the upstream bridge JSON per region with backoff,
//!   normalizes and diffs, appends history, derives predictions and closure
//!   attribution
//! - **Vessel Registry**: in-memory AIS state behind one merge path
//! - **Statistics Engine**: daily closure statistics from per-bridge history
//! - **Fanout Gateway**: channel subscriptions with pushed-on-change updates
//! - **Persistence**: atomic-rename JSON snapshot and history files

pub mod ais;
pub mod api;
pub mod app;
pub mod attribution;
pub mod clock;
pub mod config;
pub mod fanout;
pub mod geo;
pub mod predict;
pub mod registry;
pub mod sched;
pub mod scraper;
pub mod stats;
pub mod store;
pub mod types;

// Re-export the values nearly every consumer touches.
pub use app::{AppContext, Event};
pub use config::Config;
pub use types::{
    BoatRegion, BoatsPayload, BridgeRegion, BridgeStatus, Snapshot, Statistics, Vessel,
};
