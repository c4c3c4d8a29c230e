//! Scrape pipeline regression tests
//!
//! Drives the scraper through the real parse → diff → history → derive →
//! commit path with literal upstream payloads, checking the end-to-end
//! contract: snapshot content, persistence, broadcasts, and the prediction
//! arithmetic clients depend on.

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};

use bridgewatch::app::{AppContext, Event};
use bridgewatch::clock::{Clock, ManualClock};
use bridgewatch::config::Config;
use bridgewatch::scraper::upstream::{self, UpstreamShape};
use bridgewatch::scraper::Scraper;
use bridgewatch::types::{BridgeRegion, BridgeStatus, CiBounds};

const T0: i64 = 1_750_000_000;

#[tokio::test]
async fn widget_payload_flows_to_snapshot_history_and_broadcast() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        snapshot_path: dir.path().join("bridges.json"),
        history_dir: dir.path().join("history"),
        ..Config::default()
    };
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(T0, 0).unwrap()));
    let ctx = AppContext::initialize(config, Arc::clone(&clock) as Arc<dyn Clock>).await;
    let scraper = Scraper::new(ctx.clone()).unwrap();
    let mut events = ctx.events.subscribe();

    let body = br#"[
        {"Name": "Carlton St.", "Status": "Unavailable (Raising)",
         "BridgeLiftList": [
            {"LiftType": "Commercial Vessel",
             "EstimatedTime": "2026-07-10T10:00:00-04:00",
             "LongerThanUsual": false}
         ]},
        {"Name": "Queenston St.", "Status": "Available"}
    ]"#;
    let raws = upstream::parse(UpstreamShape::Widget, body, ctx.config.tz()).unwrap();
    let changed = scraper.apply_region_payload(BridgeRegion::Sct, &raws).await;
    assert!(changed);

    // In-memory snapshot.
    let snapshot = ctx.current_snapshot();
    assert_eq!(snapshot.bridges["sct-carlton"].live.status, BridgeStatus::Closing);
    assert_eq!(snapshot.bridges["sct-queenston"].live.status, BridgeStatus::Open);
    assert_eq!(snapshot.bridges["sct-carlton"].live.upcoming_closures.len(), 1);

    // Broadcast fired with the committed snapshot.
    let Ok(Event::BridgeSnapshotChanged(pushed)) = events.try_recv() else {
        panic!("expected a bridges broadcast");
    };
    assert_eq!(pushed.bridges["sct-carlton"].live.status, BridgeStatus::Closing);

    // Snapshot file observable to HTTP readers.
    let persisted = ctx.snapshot_store.load().await.unwrap();
    assert_eq!(persisted.bridges["sct-carlton"].live.status, BridgeStatus::Closing);

    // History opened an entry for the new status.
    let history = ctx.history_store.load("sct-carlton").await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, BridgeStatus::Closing);
    assert!(history[0].end_time.is_none());
}

#[tokio::test]
async fn prediction_blends_lift_duration_with_history_ci() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        snapshot_path: dir.path().join("bridges.json"),
        history_dir: dir.path().join("history"),
        ..Config::default()
    };
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(T0, 0).unwrap()));
    let ctx = AppContext::initialize(config, Arc::clone(&clock) as Arc<dyn Clock>).await;
    let scraper = Scraper::new(ctx.clone()).unwrap();

    // Bridge history gives a closure CI of {8, 16}.
    ctx.update_snapshot(|snapshot| {
        if let Some(entry) = snapshot.bridges.get_mut("sct-carlton") {
            entry.static_info.statistics.closure_ci = Some(CiBounds { lower: 8, upper: 16 });
        }
    })
    .await;

    // t0: the bridge closes for a commercial vessel (E = 15).
    let lift_time = Utc.timestamp_opt(T0, 0).unwrap();
    let body = format!(
        r#"[{{"Name": "Carlton St.", "Status": "Unavailable",
            "BridgeLiftList": [
               {{"LiftType": "Commercial Vessel",
                 "EstimatedTime": "{}",
                 "LongerThanUsual": false}}
            ]}}]"#,
        lift_time.to_rfc3339()
    );
    let raws = upstream::parse(UpstreamShape::Widget, body.as_bytes(), ctx.config.tz()).unwrap();
    scraper.apply_region_payload(BridgeRegion::Sct, &raws).await;

    // Five minutes later the same payload arrives: no observable change, but
    // the window recomputes against the preserved last_updated.
    clock.advance(Duration::minutes(5));
    let mut events = ctx.events.subscribe();
    let changed = scraper.apply_region_payload(BridgeRegion::Sct, &raws).await;
    assert!(!changed);
    assert!(events.try_recv().is_err(), "unchanged state must not broadcast");

    let snapshot = ctx.current_snapshot();
    let live = &snapshot.bridges["sct-carlton"].live;
    assert_eq!(live.last_updated, lift_time);

    // lower = (15+8)/2 − 5 = 6.5 min, upper = (15+16)/2 − 5 = 10.5 min.
    let now = clock.now();
    let predicted = live.predicted.expect("expected a prediction window");
    assert_eq!(predicted.lower, now + Duration::seconds(390));
    assert_eq!(predicted.upper, now + Duration::seconds(630));
}

#[tokio::test]
async fn exhausted_closure_prediction_goes_null() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        snapshot_path: dir.path().join("bridges.json"),
        history_dir: dir.path().join("history"),
        ..Config::default()
    };
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(T0, 0).unwrap()));
    let ctx = AppContext::initialize(config, Arc::clone(&clock) as Arc<dyn Clock>).await;
    let scraper = Scraper::new(ctx.clone()).unwrap();

    ctx.update_snapshot(|snapshot| {
        if let Some(entry) = snapshot.bridges.get_mut("sct-carlton") {
            entry.static_info.statistics.closure_ci = Some(CiBounds { lower: 8, upper: 16 });
        }
    })
    .await;

    let body = br#"[{"Name": "Carlton St.", "Status": "Unavailable"}]"#;
    let raws = upstream::parse(UpstreamShape::Widget, body, ctx.config.tz()).unwrap();
    scraper.apply_region_payload(BridgeRegion::Sct, &raws).await;

    // Thirty minutes in, both CI bounds are exhausted: longer than usual.
    clock.advance(Duration::minutes(30));
    scraper.apply_region_payload(BridgeRegion::Sct, &raws).await;

    let snapshot = ctx.current_snapshot();
    let live = &snapshot.bridges["sct-carlton"].live;
    assert_eq!(live.status, BridgeStatus::Closed);
    assert!(live.predicted.is_none());
}

#[tokio::test]
async fn other_regions_update_while_one_backs_off() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        snapshot_path: dir.path().join("bridges.json"),
        history_dir: dir.path().join("history"),
        ..Config::default()
    };
    let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(T0, 0).unwrap()));
    let ctx = AppContext::initialize(config, Arc::clone(&clock) as Arc<dyn Clock>).await;
    let scraper = Scraper::new(ctx.clone()).unwrap();

    // SCT keeps failing to parse: three empty payloads in a row.
    for _ in 0..3 {
        let result = upstream::parse(UpstreamShape::Widget, b"[]", ctx.config.tz());
        assert!(result.is_err());
    }

    // Meanwhile PC parses fine and its change broadcasts.
    let mut events = ctx.events.subscribe();
    let body = br#"[{"Name": "Main St", "Status": "Available (Raising Soon)"}]"#;
    let raws = upstream::parse(UpstreamShape::Widget, body, ctx.config.tz()).unwrap();
    let changed = scraper.apply_region_payload(BridgeRegion::Pc, &raws).await;
    assert!(changed);
    assert!(events.try_recv().is_ok());

    // SCT bridges retain their previous (unknown) records.
    let snapshot = ctx.current_snapshot();
    assert_eq!(snapshot.bridges["sct-carlton"].live.status, BridgeStatus::Unknown);
    assert_eq!(snapshot.bridges["pc-main"].live.status, BridgeStatus::ClosingSoon);
}
