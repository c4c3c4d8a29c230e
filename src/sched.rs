//! Scheduled jobs
//!
//! The recurring work the process performs on its own clock: the bridge
//! scrape loop (fast by day, slower by night), the daily statistics
//! recompute at 03:00 local, and the vessel cleanup sweep. Each job is a
//! select loop on the shared cancellation token, and each runs inline in its
//! own loop so at most one instance is ever in flight; an overrunning job
//! simply delays its next tick rather than stacking.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::NaiveTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::AppContext;
use crate::clock;
use crate::scraper::Scraper;
use crate::stats;

/// Vessel cleanup cadence.
const CLEANUP_INTERVAL_SECS: u64 = 300;
/// Local time of the daily statistics recompute.
const STATS_HOUR: u32 = 3;

/// Run the scrape loop until cancelled. The period is re-evaluated every
/// iteration so the day/night cadence follows the configured zone through
/// daylight transitions.
pub async fn run_scrape_loop(
    scraper: Arc<Scraper>,
    ctx: AppContext,
    cancel: CancellationToken,
) -> Result<()> {
    info!("[ScrapeLoop] starting");
    loop {
        scraper.tick().await;

        let period = clock::scrape_period(ctx.clock.now(), ctx.config.tz());
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[ScrapeLoop] shutdown");
                return Ok(());
            }
            _ = tokio::time::sleep(period) => {}
        }
    }
}

/// Run the daily statistics recompute at 03:00 local until cancelled.
pub async fn run_statistics_job(ctx: AppContext, cancel: CancellationToken) -> Result<()> {
    let three_am = NaiveTime::from_hms_opt(STATS_HOUR, 0, 0).unwrap_or_default();

    loop {
        let now = ctx.clock.now();
        let next = clock::next_local_occurrence(now, ctx.config.tz(), three_am);
        let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
        info!("[StatsJob] next recompute at {}", next);

        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[StatsJob] shutdown");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {}
        }

        recompute_statistics(&ctx).await;
    }
}

/// Recompute every bridge's statistics from its history and persist the
/// result into the snapshot. Also the on-demand entry point.
pub async fn recompute_statistics(ctx: &AppContext) {
    let now = ctx.clock.now();
    let bridge_ids: Vec<String> = ctx.current_snapshot().bridges.keys().cloned().collect();

    let mut computed = Vec::with_capacity(bridge_ids.len());
    for bridge_id in bridge_ids {
        let history = ctx.history_store.load(&bridge_id).await;
        // Trim pass: enforce the cap on disk before recomputing.
        if history.len() > crate::store::history::HISTORY_CAP {
            if let Err(e) = ctx.history_store.replace(&bridge_id, &history).await {
                warn!("[StatsJob] failed to trim history for {}: {}", bridge_id, e);
            }
        }
        computed.push((bridge_id, stats::compute(&history)));
    }

    let count = computed.len();
    let next = ctx
        .update_snapshot(|snapshot| {
            for (bridge_id, statistics) in computed {
                if let Some(entry) = snapshot.bridges.get_mut(&bridge_id) {
                    entry.static_info.statistics = statistics;
                }
            }
        })
        .await;

    if let Err(e) = ctx.snapshot_store.write(&next).await {
        warn!("[StatsJob] snapshot write failed: {}", e);
    }

    ctx.with_health(|health| health.statistics_last_updated = Some(now));
    info!("[StatsJob] recomputed statistics for {} bridges", count);
}

/// Run the vessel cleanup sweep every five minutes until cancelled.
pub async fn run_cleanup_job(ctx: AppContext, cancel: CancellationToken) -> Result<()> {
    let mut timer = tokio::time::interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));
    timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[VesselCleanup] shutdown");
                return Ok(());
            }
            _ = timer.tick() => {
                let now = ctx.clock.now();
                if let Ok(mut registry) = ctx.registry.lock() {
                    registry.cleanup(now);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use crate::types::BridgeStatus;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn recompute_writes_statistics_into_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            snapshot_path: dir.path().join("bridges.json"),
            history_dir: dir.path().join("history"),
            ..Config::default()
        };
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_000_000, 0).unwrap()));
        let ctx = AppContext::initialize(config, clock).await;

        // Two completed closures, 10 and 20 minutes.
        let ts = |secs: i64| Utc.timestamp_opt(secs, 0).unwrap();
        ctx.history_store
            .record_transition("sct-carlton", BridgeStatus::Closed, ts(0))
            .await
            .unwrap();
        ctx.history_store
            .record_transition("sct-carlton", BridgeStatus::Open, ts(600))
            .await
            .unwrap();
        ctx.history_store
            .record_transition("sct-carlton", BridgeStatus::Closed, ts(1_000))
            .await
            .unwrap();
        ctx.history_store
            .record_transition("sct-carlton", BridgeStatus::Open, ts(2_200))
            .await
            .unwrap();

        recompute_statistics(&ctx).await;

        let snapshot = ctx.current_snapshot();
        let statistics = &snapshot.bridges["sct-carlton"].static_info.statistics;
        assert_eq!(statistics.average_closure_duration, Some(15));
        assert!(statistics.closure_ci.is_some());
        assert_eq!(statistics.total_entries, 4);

        let health = ctx.health_snapshot();
        assert!(health.statistics_last_updated.is_some());

        // Persisted: a fresh load sees the same statistics.
        let reloaded = ctx.snapshot_store.load().await.unwrap();
        assert_eq!(
            reloaded.bridges["sct-carlton"].static_info.statistics,
            *statistics
        );
    }
}
