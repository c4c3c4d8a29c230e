//! Prediction engine
//!
//! Pure function of (status, last_updated, statistics, upcoming closures,
//! now) producing the expected re-opening window, or null when no prediction
//! applies. Confidence intervals from history blend with the expected lift
//! duration of an active boat closure; when the elapsed time has exhausted
//! both bounds the closure is "longer than usual" and the prediction goes
//! null rather than lie.

use chrono::{DateTime, Duration, Utc};

use crate::types::{
    BridgeStatus, CiBounds, PredictionWindow, Statistics, UpcomingClosure,
};

/// Fallback closure CI in minutes when a bridge has no recorded history.
const DEFAULT_CLOSURE_CI: (f64, f64) = (15.0, 20.0);
/// Fallback raising-soon CI in minutes.
const DEFAULT_RAISING_SOON_CI: (f64, f64) = (3.0, 8.0);

/// Compute the prediction window for one bridge.
pub fn predict(
    status: BridgeStatus,
    last_updated: DateTime<Utc>,
    statistics: &Statistics,
    upcoming_closures: &[UpcomingClosure],
    now: DateTime<Utc>,
) -> Option<PredictionWindow> {
    match status {
        BridgeStatus::Closed | BridgeStatus::Construction => {
            predict_closed(status, last_updated, statistics, upcoming_closures, now)
        }
        BridgeStatus::ClosingSoon => {
            predict_closing_soon(last_updated, statistics, upcoming_closures, now)
        }
        _ => None,
    }
}

fn predict_closed(
    status: BridgeStatus,
    last_updated: DateTime<Utc>,
    statistics: &Statistics,
    upcoming_closures: &[UpcomingClosure],
    now: DateTime<Utc>,
) -> Option<PredictionWindow> {
    // A scheduled closure with a known end is authoritative.
    if let Some(end) = upcoming_closures
        .iter()
        .find(|c| c.time <= now && c.end_time.is_some_and(|e| e > now))
        .and_then(|c| c.end_time)
    {
        return Some(PredictionWindow { lower: end, upper: end });
    }

    // Construction with no known end: nothing sensible to predict.
    if status == BridgeStatus::Construction {
        return None;
    }

    let elapsed = minutes_since(last_updated, now);
    let ci = ci_or_default(statistics.closure_ci, DEFAULT_CLOSURE_CI);

    // Blend with the active boat closure's expected lift duration.
    let active_lift = upcoming_closures
        .iter()
        .find(|c| c.time <= now && c.kind.is_vessel_lift())
        .and_then(|c| c.expected_duration_minutes);

    let (lower, upper) = match active_lift {
        Some(expected) => {
            let expected = expected as f64;
            (
                (expected + ci.0) / 2.0 - elapsed,
                (expected + ci.1) / 2.0 - elapsed,
            )
        }
        None => (ci.0 - elapsed, ci.1 - elapsed),
    };

    window(now, lower, upper)
}

fn predict_closing_soon(
    last_updated: DateTime<Utc>,
    statistics: &Statistics,
    upcoming_closures: &[UpcomingClosure],
    now: DateTime<Utc>,
) -> Option<PredictionWindow> {
    if let Some(next) = upcoming_closures.first() {
        // Already due: "was expected at"; clients show the literal time.
        if next.time <= now {
            return None;
        }
        // Within the hour: clients surface the scheduled time directly.
        if next.time - now <= Duration::hours(1) {
            return None;
        }
    }

    let elapsed = minutes_since(last_updated, now);
    let ci = ci_or_default(statistics.raising_soon_ci, DEFAULT_RAISING_SOON_CI);
    window(now, ci.0 - elapsed, ci.1 - elapsed)
}

fn minutes_since(earlier: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - earlier).num_seconds() as f64 / 60.0
}

fn ci_or_default(ci: Option<CiBounds>, default: (f64, f64)) -> (f64, f64) {
    ci.map_or(default, |c| (c.lower as f64, c.upper as f64))
}

/// Build the window, clamping negative bounds to now. Both bounds exhausted
/// means the closure is running longer than usual: no prediction.
fn window(now: DateTime<Utc>, lower_mins: f64, upper_mins: f64) -> Option<PredictionWindow> {
    if lower_mins <= 0.0 && upper_mins <= 0.0 {
        return None;
    }
    let at = |mins: f64| now + Duration::seconds((mins.max(0.0) * 60.0).round() as i64);
    Some(PredictionWindow { lower: at(lower_mins), upper: at(upper_mins) })
}
