//! Fanout gateway
//!
//! Long-lived WebSocket connections with per-client subscription sets over
//! the `bridges` and `boats` channels and their region sub-channels. Nothing
//! is pushed until a client subscribes; after a subscribe the server
//! acknowledges, sends the current state for the subscribed channels, and
//! from then on pushes only on change.
//!
//! Delivery is best-effort per connection: a send that fails or exceeds the
//! timeout drops the connection. There is no retry queue — the next change
//! resends the full filtered state.

pub mod probe;
pub mod ws;

pub use probe::run_boat_probe;
