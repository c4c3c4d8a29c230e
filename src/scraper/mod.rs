//! Bridge scraper
//!
//! Each tick processes all configured regions concurrently through a small
//! worker pool. Per region: backoff gate, shape-aware fetch, normalization,
//! observable diff against the stored snapshot, history transitions, derived
//! fields (prediction window, responsible vessel), and an atomic snapshot
//! commit with a `bridges` broadcast when anything observable changed.
//!
//! Failure is local to a region: one upstream falling over never delays the
//! others, and a failing region keeps its previous live records while the
//! backoff schedule retries it forever.

pub mod upstream;

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::app::{AppContext, Event};
use crate::attribution::responsible_vessel;
use crate::predict::predict;
use crate::types::{BridgeLive, BridgeRegion, BridgeStatus};

use upstream::{RawBridge, UpstreamClient, UpstreamError, UpstreamShape};

/// Concurrent region scrapes per tick.
const REGION_POOL: usize = 4;
/// Backoff delay ceiling in seconds.
const BACKOFF_CAP_SECS: i64 = 300;

/// Per-region failure tracking.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionBackoff {
    pub failures: u32,
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl RegionBackoff {
    /// Record a failure at `now`: exponential delay, capped, never giving up.
    fn record_failure(&mut self, now: DateTime<Utc>) {
        self.failures += 1;
        let delay = 2i64
            .checked_pow(self.failures)
            .unwrap_or(BACKOFF_CAP_SECS)
            .min(BACKOFF_CAP_SECS);
        self.next_retry_at = Some(now + chrono::Duration::seconds(delay));
    }
}

/// What one region's scrape did this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegionOutcome {
    SkippedByBackoff,
    Failed,
    Succeeded { changed: bool },
}

pub struct Scraper {
    ctx: AppContext,
    client: UpstreamClient,
    backoff: Mutex<HashMap<BridgeRegion, RegionBackoff>>,
    shapes: Mutex<HashMap<BridgeRegion, UpstreamShape>>,
}

impl Scraper {
    pub fn new(ctx: AppContext) -> Result<Self, reqwest::Error> {
        let client = UpstreamClient::new(ctx.config.upstream.insecure_host.as_deref())?;
        Ok(Self {
            ctx,
            client,
            backoff: Mutex::new(HashMap::new()),
            shapes: Mutex::new(HashMap::new()),
        })
    }

    /// Run one tick over every configured region.
    pub async fn tick(&self) {
        let regions: Vec<BridgeRegion> = self
            .ctx
            .config
            .upstream
            .regions
            .keys()
            .copied()
            .collect();

        let outcomes: Vec<RegionOutcome> = futures::stream::iter(regions)
            .map(|region| self.scrape_region(region))
            .buffer_unordered(REGION_POOL)
            .collect()
            .await;

        let any_success = outcomes
            .iter()
            .any(|o| matches!(o, RegionOutcome::Succeeded { .. }));
        let any_change = outcomes
            .iter()
            .any(|o| matches!(o, RegionOutcome::Succeeded { changed: true }));

        if any_success {
            let now = self.ctx.clock.now();
            self.ctx.with_health(|health| {
                health.last_scrape = Some(now);
                health.last_scrape_had_changes = any_change;
                if any_change {
                    health.last_bridge_change = Some(now);
                }
            });
        }
    }

    /// Scrape one region end to end.
    async fn scrape_region(&self, region: BridgeRegion) -> RegionOutcome {
        let now = self.ctx.clock.now();

        if let Ok(backoff) = self.backoff.lock() {
            if let Some(state) = backoff.get(&region) {
                if state.next_retry_at.is_some_and(|at| now < at) {
                    return RegionOutcome::SkippedByBackoff;
                }
            }
        }

        let Some(url) = self.ctx.config.upstream.regions.get(&region) else {
            return RegionOutcome::SkippedByBackoff;
        };
        let shape = self.current_shape(region);

        let raws = match self.fetch_and_parse(url, shape).await {
            Ok(raws) => raws,
            Err(e) => {
                self.record_failure(region, shape, now, &e);
                return RegionOutcome::Failed;
            }
        };

        self.record_success(region, shape);
        let changed = self.apply_region_payload(region, &raws).await;
        RegionOutcome::Succeeded { changed }
    }

    async fn fetch_and_parse(
        &self,
        url: &str,
        shape: UpstreamShape,
    ) -> Result<Vec<RawBridge>, UpstreamError> {
        let body = self.client.fetch(url).await?;
        upstream::parse(shape, &body, self.ctx.config.tz())
    }

    fn current_shape(&self, region: BridgeRegion) -> UpstreamShape {
        self.shapes
            .lock()
            .ok()
            .and_then(|shapes| shapes.get(&region).copied())
            .unwrap_or(UpstreamShape::Widget)
    }

    fn record_success(&self, region: BridgeRegion, shape: UpstreamShape) {
        if let Ok(mut shapes) = self.shapes.lock() {
            shapes.insert(region, shape);
        }
        if let Ok(mut backoff) = self.backoff.lock() {
            backoff.remove(&region);
        }
    }

    fn record_failure(
        &self,
        region: BridgeRegion,
        tried: UpstreamShape,
        now: DateTime<Utc>,
        error: &UpstreamError,
    ) {
        // Try the other document shape next tick.
        if let Ok(mut shapes) = self.shapes.lock() {
            shapes.insert(region, tried.other());
        }
        if let Ok(mut backoff) = self.backoff.lock() {
            let state = backoff.entry(region).or_default();
            state.record_failure(now);
            warn!(
                "scrape of {} failed ({}); retry #{} after {:?}",
                region.short_code(),
                error,
                state.failures,
                state.next_retry_at
            );
        }
    }

    /// Current backoff state for a region, for the health surface and tests.
    pub fn backoff_state(&self, region: BridgeRegion) -> RegionBackoff {
        self.backoff
            .lock()
            .ok()
            .and_then(|b| b.get(&region).copied())
            .unwrap_or_default()
    }

    /// Merge a parsed payload into the snapshot: diff, history, derived
    /// fields, commit, broadcast. Returns whether anything observable
    /// changed. Public within the crate so the pipeline tests can drive it
    /// without a network.
    pub async fn apply_region_payload(&self, region: BridgeRegion, raws: &[RawBridge]) -> bool {
        let now = self.ctx.clock.now();
        let current = self.ctx.current_snapshot();

        let vessels = self
            .ctx
            .registry
            .lock()
            .map(|r| r.in_region(region.boat_region()))
            .unwrap_or_default();

        let mut updates: Vec<(String, BridgeLive)> = Vec::new();
        let mut transitions: Vec<(String, BridgeStatus)> = Vec::new();
        let mut any_observable_change = false;

        for bridge in self.ctx.config.bridges_in(region) {
            let Some(entry) = current.bridges.get(&bridge.id) else {
                continue;
            };
            let prev = &entry.live;

            // A bridge missing from the payload keeps its previous record.
            let Some(raw) = find_raw(raws, &bridge.name) else {
                debug!("bridge '{}' absent from {} payload", bridge.name, region.short_code());
                continue;
            };

            let status_changed = raw.status != prev.status;
            let last_updated = if status_changed { now } else { prev.last_updated };

            let mut next = BridgeLive {
                status: raw.status,
                last_updated,
                predicted: None,
                upcoming_closures: raw.upcoming_closures.clone(),
                responsible_vessel_mmsi: None,
            };

            if !prev.observably_equal(&next) {
                any_observable_change = true;
            }
            if status_changed {
                transitions.push((bridge.id.clone(), raw.status));
            }

            // Derived fields recompute every tick and are not part of the diff.
            next.predicted = predict(
                next.status,
                next.last_updated,
                &entry.static_info.statistics,
                &next.upcoming_closures,
                now,
            );
            next.responsible_vessel_mmsi =
                responsible_vessel(entry.static_info.coordinates, next.status, &vessels);

            updates.push((bridge.id.clone(), next));
        }

        // History first, so a reader of the new snapshot finds the matching
        // open entry already present.
        for (bridge_id, new_status) in &transitions {
            if let Err(e) = self
                .ctx
                .history_store
                .record_transition(bridge_id, *new_status, now)
                .await
            {
                warn!("failed to append history for {}: {}", bridge_id, e);
            }
        }

        if updates.is_empty() {
            return false;
        }

        let next = self
            .ctx
            .update_snapshot(|snapshot| {
                for (id, live) in &updates {
                    if let Some(entry) = snapshot.bridges.get_mut(id) {
                        entry.live = live.clone();
                    }
                }
                if any_observable_change {
                    snapshot.last_updated = now;
                }
            })
            .await;

        if any_observable_change {
            // Persist before broadcasting: an HTTP reader must be able to see
            // the new snapshot before any push mentions it. A write failure is
            // logged and not retried; the next change overwrites.
            if let Err(e) = self.ctx.snapshot_store.write(&next).await {
                warn!("snapshot write failed: {}", e);
            }
            self.ctx.publish(Event::BridgeSnapshotChanged(next));
            info!("bridges changed in {}", region.short_code());
        }

        any_observable_change
    }
}

/// Match an upstream record to a roster bridge by name, case-insensitively,
/// tolerating the upstream's longer display names.
fn find_raw<'a>(raws: &'a [RawBridge], roster_name: &str) -> Option<&'a RawBridge> {
    let needle = roster_name.to_ascii_lowercase();
    raws.iter().find(|raw| {
        let raw_name = raw.name.to_ascii_lowercase();
        raw_name.contains(&needle) || needle.contains(&raw_name)
    })
}
