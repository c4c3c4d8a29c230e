//! Application context
//!
//! The one shared-state value handed to every component at construction —
//! there are no globals. The scraper publishes immutable snapshot values
//! through an atomic pointer swap; the fanout gateway and the HTTP handlers
//! read without locking. Cross-component notification is typed events on a
//! broadcast channel, so the scraper never knows about WebSocket details.

use std::sync::atomic::AtomicUsize;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tracing::info;

use crate::clock::Clock;
use crate::config::Config;
use crate::registry::VesselRegistry;
use crate::store::{HistoryStore, SnapshotStore};
use crate::types::{
    BoatsPayload, BridgeEntry, BridgeIndexEntry, BridgeLive, BridgeStatic, Coordinates, Snapshot,
    Statistics,
};

/// Typed events between the producing side (scraper, boat probe) and the
/// fanout gateway.
#[derive(Debug, Clone)]
pub enum Event {
    BridgeSnapshotChanged(Arc<Snapshot>),
    VesselRegistryChanged(Arc<BoatsPayload>),
}

/// Freshness indicators surfaced by `/health`.
#[derive(Debug, Default, Clone)]
pub struct HealthTelemetry {
    pub last_scrape: Option<DateTime<Utc>>,
    pub last_scrape_had_changes: bool,
    /// Last observable bridge change; drives the seasonal activity warning.
    pub last_bridge_change: Option<DateTime<Utc>>,
    pub statistics_last_updated: Option<DateTime<Utc>>,
}

/// Shared application state. Cloning is cheap; every field is a handle.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub clock: Arc<dyn Clock>,
    snapshot: Arc<ArcSwap<Snapshot>>,
    /// Serializes snapshot read-modify-write cycles across writers.
    snapshot_commit: Arc<tokio::sync::Mutex<()>>,
    pub registry: Arc<Mutex<VesselRegistry>>,
    pub snapshot_store: Arc<SnapshotStore>,
    pub history_store: Arc<HistoryStore>,
    pub events: broadcast::Sender<Event>,
    pub health: Arc<Mutex<HealthTelemetry>>,
    pub ws_clients: Arc<AtomicUsize>,
}

impl AppContext {
    /// Build the context: construct stores, recover the snapshot from disk,
    /// and seed live records for every roster bridge.
    pub async fn initialize(config: Config, clock: Arc<dyn Clock>) -> Self {
        let snapshot_store = Arc::new(SnapshotStore::new(config.snapshot_path.clone()));
        let history_store = Arc::new(HistoryStore::new(config.history_dir.clone()));

        let recovered = snapshot_store.load().await;
        match &recovered {
            Some(snapshot) => {
                info!("recovered snapshot with {} bridges", snapshot.bridges.len());
            }
            None => info!("no usable snapshot on disk, starting empty"),
        }
        let snapshot = seed_snapshot(&config, recovered, clock.now());

        let (events, _) = broadcast::channel(64);

        Self {
            config: Arc::new(config),
            clock,
            snapshot: Arc::new(ArcSwap::from_pointee(snapshot)),
            snapshot_commit: Arc::new(tokio::sync::Mutex::new(())),
            registry: Arc::new(Mutex::new(VesselRegistry::new())),
            snapshot_store,
            history_store,
            events,
            health: Arc::new(Mutex::new(HealthTelemetry::default())),
            ws_clients: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The current immutable snapshot.
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.load_full()
    }

    /// Serialized read-modify-write of the in-memory snapshot. Returns the
    /// newly published value; persisting and broadcasting stay with the
    /// caller, which knows whether anything observable changed.
    pub async fn update_snapshot<F>(&self, mutate: F) -> Arc<Snapshot>
    where
        F: FnOnce(&mut Snapshot),
    {
        let _guard = self.snapshot_commit.lock().await;
        let mut next = (*self.snapshot.load_full()).clone();
        mutate(&mut next);
        let next = Arc::new(next);
        self.snapshot.store(Arc::clone(&next));
        next
    }

    /// Publish an event to whoever is listening; no listeners is fine.
    pub fn publish(&self, event: Event) {
        let _ = self.events.send(event);
    }

    /// Current boats payload from a registry snapshot.
    pub fn boats_payload(&self) -> BoatsPayload {
        let vessels = self
            .registry
            .lock()
            .map(|r| r.snapshot())
            .unwrap_or_default();
        BoatsPayload::from_vessels(vessels, self.clock.now())
    }

    /// Run `f` over the health telemetry under its lock.
    pub fn with_health<F: FnOnce(&mut HealthTelemetry)>(&self, f: F) {
        if let Ok(mut health) = self.health.lock() {
            f(&mut health);
        }
    }

    /// Copy of the health telemetry.
    pub fn health_snapshot(&self) -> HealthTelemetry {
        self.health.lock().map(|h| h.clone()).unwrap_or_default()
    }
}

/// Merge the roster with whatever was recovered from disk: statics always
/// come from configuration, live records and statistics carry over when the
/// bridge id still exists.
fn seed_snapshot(config: &Config, recovered: Option<Snapshot>, now: DateTime<Utc>) -> Snapshot {
    let mut snapshot = Snapshot::empty(now);
    if let Some(recovered) = &recovered {
        snapshot.last_updated = recovered.last_updated;
    }

    for bridge in &config.bridges {
        let previous = recovered.as_ref().and_then(|s| s.bridges.get(&bridge.id));

        snapshot.available_bridges.push(BridgeIndexEntry {
            id: bridge.id.clone(),
            name: bridge.name.clone(),
            region_short: bridge.region,
            region: bridge.region.display_name().to_string(),
        });

        snapshot.bridges.insert(
            bridge.id.clone(),
            BridgeEntry {
                static_info: BridgeStatic {
                    name: bridge.name.clone(),
                    region: bridge.region.display_name().to_string(),
                    region_short: bridge.region,
                    coordinates: Coordinates { lat: bridge.lat, lng: bridge.lng },
                    statistics: previous
                        .map(|p| p.static_info.statistics.clone())
                        .unwrap_or_else(Statistics::default),
                },
                live: previous
                    .map(|p| p.live.clone())
                    .unwrap_or_else(|| BridgeLive::unknown(now)),
            },
        );
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::types::BridgeStatus;
    use chrono::TimeZone;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            snapshot_path: dir.join("bridges.json"),
            history_dir: dir.join("history"),
            ..Config::default()
        }
    }

    fn clock_at(secs: i64) -> Arc<ManualClock> {
        Arc::new(ManualClock::new(Utc.timestamp_opt(secs, 0).unwrap()))
    }

    #[tokio::test]
    async fn fresh_start_seeds_roster_with_unknown_status() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::initialize(test_config(dir.path()), clock_at(1_000)).await;

        let snapshot = ctx.current_snapshot();
        assert_eq!(snapshot.bridges.len(), Config::default().bridges.len());
        for entry in snapshot.bridges.values() {
            assert_eq!(entry.live.status, BridgeStatus::Unknown);
        }
        assert_eq!(snapshot.available_bridges.len(), snapshot.bridges.len());
    }

    #[tokio::test]
    async fn recovery_carries_live_records_over() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path());

        // First run: mark one bridge closed and persist.
        let ctx = AppContext::initialize(config.clone(), clock_at(1_000)).await;
        let updated = ctx
            .update_snapshot(|s| {
                if let Some(e) = s.bridges.get_mut("sct-carlton") {
                    e.live.status = BridgeStatus::Closed;
                }
            })
            .await;
        ctx.snapshot_store.write(&updated).await.unwrap();

        // Second run recovers it.
        let ctx = AppContext::initialize(config, clock_at(2_000)).await;
        let snapshot = ctx.current_snapshot();
        assert_eq!(snapshot.bridges["sct-carlton"].live.status, BridgeStatus::Closed);
    }

    #[tokio::test]
    async fn update_snapshot_publishes_new_value() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = AppContext::initialize(test_config(dir.path()), clock_at(1_000)).await;

        let before = ctx.current_snapshot();
        ctx.update_snapshot(|s| {
            s.last_updated = Utc.timestamp_opt(5_000, 0).unwrap();
        })
        .await;
        let after = ctx.current_snapshot();

        assert_ne!(before.last_updated, after.last_updated);
    }
}
