//! AIS UDP listener
//!
//! Binds a single UDP socket and feeds decoded sentences into a per-station
//! coalescing buffer keyed by MMSI, last-writer-wins. The buffer flushes to
//! the registry on a fixed 5 s timer, which absorbs bursts and collapses
//! redundant packets with bounded memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::AisConfig;
use crate::registry::{IngestSource, VesselRegistry, VesselUpdate};

use super::decoder::AisDecoder;

/// Coalescing window between registry flushes.
const FLUSH_INTERVAL_SECS: u64 = 5;

/// Run the UDP listener until cancelled.
pub async fn run(
    config: AisConfig,
    registry: Arc<Mutex<VesselRegistry>>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", config.udp_port))
        .await
        .with_context(|| format!("failed to bind AIS UDP port {}", config.udp_port))?;
    info!("[AisUdp] listening on udp/{}", config.udp_port);

    let mut decoders: HashMap<String, AisDecoder> = HashMap::new();
    let mut buffer: HashMap<(String, u32), VesselUpdate> = HashMap::new();
    let mut flush_timer =
        tokio::time::interval(std::time::Duration::from_secs(FLUSH_INTERVAL_SECS));
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let mut datagram = [0u8; 4096];

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                flush(&mut buffer, &registry, clock.as_ref());
                info!("[AisUdp] shutdown");
                return Ok(());
            }
            _ = flush_timer.tick() => {
                flush(&mut buffer, &registry, clock.as_ref());
            }
            received = socket.recv_from(&mut datagram) => {
                let (len, peer) = match received {
                    Ok(ok) => ok,
                    Err(e) => {
                        warn!("[AisUdp] recv error: {}", e);
                        continue;
                    }
                };

                let station = station_for(&config, &peer.ip().to_string());
                let decoder = decoders.entry(station.clone()).or_default();

                let text = String::from_utf8_lossy(&datagram[..len]);
                for line in text.lines() {
                    let Some(message) = decoder.decode_sentence(line) else {
                        continue;
                    };
                    let Some(update) = message.into_update() else {
                        continue; // base station / channel management
                    };
                    buffer.insert((station.clone(), update.mmsi), update);
                }
            }
        }
    }
}

/// Station id for a sender IP: the configured mapping, or a synthetic id.
fn station_for(config: &AisConfig, ip: &str) -> String {
    config
        .udp_station_map
        .get(ip)
        .cloned()
        .unwrap_or_else(|| format!("udp-{ip}"))
}

/// Drain the buffer into the registry under one brief lock.
fn flush(
    buffer: &mut HashMap<(String, u32), VesselUpdate>,
    registry: &Mutex<VesselRegistry>,
    clock: &dyn Clock,
) {
    if buffer.is_empty() {
        return;
    }
    let drained: Vec<((String, u32), VesselUpdate)> = buffer.drain().collect();
    let now = clock.now();

    let Ok(mut registry) = registry.lock() else {
        warn!("[AisUdp] registry lock poisoned, dropping {} updates", drained.len());
        return;
    };
    let mut applied = 0usize;
    for ((station, _), update) in drained {
        let source = IngestSource::Udp { station };
        if registry.apply(update, &source, now) != crate::registry::IngestOutcome::Dropped {
            applied += 1;
        }
    }
    debug!("[AisUdp] flushed {} updates", applied);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_mapping_falls_back_to_synthetic_id() {
        let mut config = AisConfig::default();
        config
            .udp_station_map
            .insert("192.0.2.10".to_string(), "welland-north".to_string());

        assert_eq!(station_for(&config, "192.0.2.10"), "welland-north");
        assert_eq!(station_for(&config, "198.51.100.7"), "udp-198.51.100.7");
    }

    #[test]
    fn buffer_is_last_writer_wins_per_mmsi() {
        let mut buffer: HashMap<(String, u32), VesselUpdate> = HashMap::new();
        let key = ("welland-north".to_string(), 316_001_000);

        let first = VesselUpdate { mmsi: 316_001_000, speed_knots: Some(1.0), ..VesselUpdate::default() };
        let second = VesselUpdate { mmsi: 316_001_000, speed_knots: Some(2.0), ..VesselUpdate::default() };
        buffer.insert(key.clone(), first);
        buffer.insert(key.clone(), second.clone());

        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer[&key], second);
    }
}
