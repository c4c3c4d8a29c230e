//! Boat-change broadcast probe
//!
//! Every five seconds, build the current boats payload, compare its
//! canonical bytes against the last pushed payload, and broadcast only on
//! change. A minimum five-second gap between boat broadcasts prevents
//! flooding; a change gated by the interval is retried on the next probe
//! because the stored fingerprint only advances on an actual broadcast.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app::{AppContext, Event};

/// Probe cadence.
const PROBE_INTERVAL_SECS: u64 = 5;
/// Minimum gap between boat broadcasts.
const MIN_BROADCAST_GAP_SECS: i64 = 5;

/// Run the probe until cancelled.
pub async fn run_boat_probe(ctx: AppContext, cancel: CancellationToken) -> Result<()> {
    let mut timer = tokio::time::interval(Duration::from_secs(PROBE_INTERVAL_SECS));
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut last_pushed: Option<String> = None;
    let mut last_broadcast: Option<DateTime<Utc>> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[BoatProbe] shutdown");
                return Ok(());
            }
            _ = timer.tick() => {}
        }

        let payload = ctx.boats_payload();
        let fingerprint = payload.fingerprint();
        if last_pushed.as_deref() == Some(fingerprint.as_str()) {
            continue;
        }

        let now = ctx.clock.now();
        let gate_open = last_broadcast
            .is_none_or(|at| (now - at).num_seconds() >= MIN_BROADCAST_GAP_SECS);
        if !gate_open {
            continue;
        }

        debug!("[BoatProbe] vessels changed, broadcasting {} records", payload.vessel_count);
        ctx.publish(Event::VesselRegistryChanged(Arc::new(payload)));
        last_pushed = Some(fingerprint);
        last_broadcast = Some(now);
    }
}
