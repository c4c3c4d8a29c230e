//! Statistics engine
//!
//! Consumes one bridge's history (newest-first, capped at 300) and produces
//! the statistics block persisted in the snapshot: average closure duration,
//! average closing-soon lead time, 95% confidence intervals, and the
//! duration histogram. Pure and idempotent; runs daily and on demand.

use statrs::distribution::{ContinuousCDF, Normal};
use statrs::statistics::Statistics as SampleStats;

use crate::store::history::HISTORY_CAP;
use crate::types::{BridgeStatus, CiBounds, DurationHistogram, HistoryEntry, Statistics};

/// Compute the statistics block for one bridge's history.
pub fn compute(history: &[HistoryEntry]) -> Statistics {
    let closure_minutes = closure_durations(history);
    let raising_minutes = raising_soon_durations(history);

    let mut histogram = DurationHistogram::default();
    for minutes in &closure_minutes {
        histogram.record(*minutes);
    }

    Statistics {
        average_closure_duration: average(&closure_minutes),
        closure_ci: confidence_interval(&closure_minutes),
        average_raising_soon: average(&raising_minutes),
        raising_soon_ci: confidence_interval(&raising_minutes),
        closure_durations: histogram,
        total_entries: history.len().min(HISTORY_CAP),
    }
}

/// Completed closure durations in whole minutes, each rounded.
fn closure_durations(history: &[HistoryEntry]) -> Vec<i64> {
    history
        .iter()
        .filter(|e| e.status == BridgeStatus::Closed)
        .filter_map(|e| e.duration)
        .map(seconds_to_minutes)
        .collect()
}

/// "Closing soon" lead times: entries that actually transitioned into a
/// closed state. History is newest-first, so the successor of entry `i` is
/// entry `i - 1`.
fn raising_soon_durations(history: &[HistoryEntry]) -> Vec<i64> {
    history
        .iter()
        .enumerate()
        .filter(|(i, e)| {
            e.status == BridgeStatus::ClosingSoon
                && e.duration.is_some()
                && *i > 0
                && history[i - 1].status.is_closed_like()
        })
        .filter_map(|(_, e)| e.duration)
        .map(seconds_to_minutes)
        .collect()
}

fn seconds_to_minutes(seconds: i64) -> i64 {
    (seconds as f64 / 60.0).round() as i64
}

/// Mean rounded to the nearest minute; null with no samples.
fn average(minutes: &[i64]) -> Option<i64> {
    if minutes.is_empty() {
        return None;
    }
    let values: Vec<f64> = minutes.iter().map(|m| *m as f64).collect();
    Some(values.mean().round() as i64)
}

/// 95% CI under the normal approximation, integer bounds rounded outward.
/// Needs at least two samples for a sample standard deviation.
fn confidence_interval(minutes: &[i64]) -> Option<CiBounds> {
    if minutes.len() < 2 {
        return None;
    }
    let values: Vec<f64> = minutes.iter().map(|m| *m as f64).collect();
    let mean = values.clone().mean();
    let std_dev = values.std_dev();

    let z = Normal::new(0.0, 1.0).map_or(1.96, |n| n.inverse_cdf(0.975));
    let margin = z * std_dev / (minutes.len() as f64).sqrt();

    Some(CiBounds {
        lower: (mean - margin).floor() as i64,
        upper: (mean + margin).ceil() as i64,
    })
}
