//! AIS ingest
//!
//! Two feeds into the vessel registry:
//! - `udp`: raw AIVDM sentences from receiver stations, decoded locally
//! - `poller`: the AISHub aggregator HTTP API
//!
//! Both submit through the registry's single merge path; `decoder` is the
//! shared sentence decode boundary where malformed input is dropped.

pub mod decoder;
pub mod poller;
pub mod udp;

pub use decoder::{AisDecoder, AisMessage};
pub use poller::AisHubClient;
