//! Bridge state model
//!
//! The snapshot is the canonical union of every bridge's static and live
//! records. Live records are owned by the scraper; everything else reads
//! immutable snapshot values.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::region::BridgeRegion;

/// Normalized bridge status.
///
/// Every raw upstream status string maps into exactly one of these; anything
/// unrecognized becomes `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BridgeStatus {
    Open,
    Closed,
    #[serde(rename = "Closing soon")]
    ClosingSoon,
    Closing,
    Opening,
    Construction,
    Unknown,
}

impl BridgeStatus {
    /// States in which the span is unavailable to road traffic.
    pub fn is_closed_like(self) -> bool {
        matches!(self, BridgeStatus::Closed | BridgeStatus::Closing)
    }
}

/// Closure category carried by `upcoming_closures`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClosureKind {
    Construction,
    #[serde(rename = "Commercial Vessel")]
    CommercialVessel,
    #[serde(rename = "Pleasure Craft")]
    PleasureCraft,
    #[serde(rename = "Next Arrival")]
    NextArrival,
}

impl ClosureKind {
    /// Expected lift duration in minutes for vessel closures.
    ///
    /// Next Arrival shares the Commercial Vessel row; its `longer` flag is
    /// always derived, never authoritative. Construction has no table entry.
    pub fn expected_duration_minutes(self, longer: bool) -> Option<i64> {
        match self {
            ClosureKind::Construction => None,
            ClosureKind::CommercialVessel | ClosureKind::NextArrival => {
                Some(if longer { 30 } else { 15 })
            }
            ClosureKind::PleasureCraft => Some(if longer { 20 } else { 10 }),
        }
    }

    /// Whether this closure is caused by vessel traffic.
    pub fn is_vessel_lift(self) -> bool {
        !matches!(self, ClosureKind::Construction)
    }
}

/// One scheduled or imminent closure of a bridge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpcomingClosure {
    #[serde(rename = "type")]
    pub kind: ClosureKind,
    pub time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longer: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_duration_minutes: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl UpcomingClosure {
    /// Equality on the fields clients can observe, with timestamps truncated
    /// to whole minutes so sub-minute upstream jitter does not register as a
    /// change.
    pub fn observably_equal(&self, other: &Self) -> bool {
        fn minute(t: DateTime<Utc>) -> i64 {
            t.timestamp() / 60
        }

        self.kind == other.kind
            && self.longer == other.longer
            && self.expected_duration_minutes == other.expected_duration_minutes
            && minute(self.time) == minute(other.time)
            && self.end_time.map(minute) == other.end_time.map(minute)
    }
}

/// Predicted re-opening window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictionWindow {
    pub lower: DateTime<Utc>,
    pub upper: DateTime<Utc>,
}

/// Integer confidence-interval bounds in minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiBounds {
    pub lower: i64,
    pub upper: i64,
}

/// Closure-duration histogram. Buckets are right-closed: a 15-minute closure
/// counts in `10_15m`, a 60-minute one in `31_60m`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurationHistogram {
    pub under_9m: u32,
    #[serde(rename = "10_15m")]
    pub from_10_to_15m: u32,
    #[serde(rename = "16_30m")]
    pub from_16_to_30m: u32,
    #[serde(rename = "31_60m")]
    pub from_31_to_60m: u32,
    pub over_60m: u32,
}

impl DurationHistogram {
    /// Add one closure of `minutes` duration to the matching bucket.
    pub fn record(&mut self, minutes: i64) {
        match minutes {
            m if m <= 9 => self.under_9m += 1,
            m if m <= 15 => self.from_10_to_15m += 1,
            m if m <= 30 => self.from_16_to_30m += 1,
            m if m <= 60 => self.from_31_to_60m += 1,
            _ => self.over_60m += 1,
        }
    }
}

/// Per-bridge closure statistics, recomputed daily from history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    /// Average closure duration in minutes, or null with no recorded closures.
    pub average_closure_duration: Option<i64>,
    /// 95% CI around the closure average; null below two samples.
    pub closure_ci: Option<CiBounds>,
    /// Average minutes between the first "Closing soon" signal and the
    /// transition into a closed state.
    pub average_raising_soon: Option<i64>,
    pub raising_soon_ci: Option<CiBounds>,
    pub closure_durations: DurationHistogram,
    /// History entries retained after the cap.
    pub total_entries: usize,
}

/// One entry in a bridge's append-only history, newest-first on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub status: BridgeStatus,
    /// Wall-clock seconds between start and end, filled on transition out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
}

impl HistoryEntry {
    /// Open a new entry for a status first observed at `start_time`.
    pub fn open(status: BridgeStatus, start_time: DateTime<Utc>) -> Self {
        Self {
            id: format!("{}-{}", start_time.timestamp_millis(), status_slug(status)),
            start_time,
            end_time: None,
            status,
            duration: None,
        }
    }

    /// Close this entry at `end_time`, filling `duration`.
    pub fn close(&mut self, end_time: DateTime<Utc>) {
        self.end_time = Some(end_time);
        self.duration = Some((end_time - self.start_time).num_seconds());
    }
}

fn status_slug(status: BridgeStatus) -> &'static str {
    match status {
        BridgeStatus::Open => "open",
        BridgeStatus::Closed => "closed",
        BridgeStatus::ClosingSoon => "closing-soon",
        BridgeStatus::Closing => "closing",
        BridgeStatus::Opening => "opening",
        BridgeStatus::Construction => "construction",
        BridgeStatus::Unknown => "unknown",
    }
}

/// Geographic coordinates as served to clients.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Immutable per-bridge record, loaded from configuration at startup.
/// `statistics` is the one field the statistics engine refreshes daily.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeStatic {
    pub name: String,
    /// Display name of the region, e.g. "St. Catharines".
    pub region: String,
    /// Lowercase region code, e.g. "sct".
    pub region_short: BridgeRegion,
    pub coordinates: Coordinates,
    pub statistics: Statistics,
}

/// Mutable per-bridge state, owned by the scraper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeLive {
    pub status: BridgeStatus,
    /// When the current status was first observed.
    pub last_updated: DateTime<Utc>,
    /// Predicted re-opening window, or null when no prediction applies.
    pub predicted: Option<PredictionWindow>,
    pub upcoming_closures: Vec<UpcomingClosure>,
    pub responsible_vessel_mmsi: Option<u32>,
}

impl BridgeLive {
    /// A bridge that has never been observed.
    pub fn unknown(at: DateTime<Utc>) -> Self {
        Self {
            status: BridgeStatus::Unknown,
            last_updated: at,
            predicted: None,
            upcoming_closures: Vec::new(),
            responsible_vessel_mmsi: None,
        }
    }

    /// Equality on observable fields only: status and upcoming closures.
    /// `predicted` and `responsible_vessel_mmsi` drift every tick and do not
    /// count as a change.
    pub fn observably_equal(&self, other: &Self) -> bool {
        self.status == other.status
            && self.upcoming_closures.len() == other.upcoming_closures.len()
            && self
                .upcoming_closures
                .iter()
                .zip(&other.upcoming_closures)
                .all(|(a, b)| a.observably_equal(b))
    }
}

/// Index entry listing one bridge in `available_bridges`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeIndexEntry {
    pub id: String,
    pub name: String,
    pub region_short: BridgeRegion,
    pub region: String,
}

/// Static + live records for one bridge as served to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEntry {
    #[serde(rename = "static")]
    pub static_info: BridgeStatic,
    pub live: BridgeLive,
}

/// The canonical on-disk and in-memory snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub last_updated: DateTime<Utc>,
    pub available_bridges: Vec<BridgeIndexEntry>,
    pub bridges: BTreeMap<String, BridgeEntry>,
}

impl Snapshot {
    /// An empty snapshot stamped at `at`.
    pub fn empty(at: DateTime<Utc>) -> Self {
        Self {
            last_updated: at,
            available_bridges: Vec::new(),
            bridges: BTreeMap::new(),
        }
    }

    /// A copy containing only bridges in the given regions.
    pub fn filtered(&self, regions: &BTreeSet<BridgeRegion>) -> Snapshot {
        Snapshot {
            last_updated: self.last_updated,
            available_bridges: self
                .available_bridges
                .iter()
                .filter(|b| regions.contains(&b.region_short))
                .cloned()
                .collect(),
            bridges: self
                .bridges
                .iter()
                .filter(|(_, e)| regions.contains(&e.static_info.region_short))
                .map(|(id, e)| (id.clone(), e.clone()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn status_serializes_with_spaces() {
        assert_eq!(
            serde_json::to_string(&BridgeStatus::ClosingSoon).unwrap(),
            "\"Closing soon\""
        );
        assert_eq!(serde_json::to_string(&BridgeStatus::Open).unwrap(), "\"Open\"");
    }

    #[test]
    fn duration_table_matches_product() {
        assert_eq!(ClosureKind::CommercialVessel.expected_duration_minutes(false), Some(15));
        assert_eq!(ClosureKind::CommercialVessel.expected_duration_minutes(true), Some(30));
        assert_eq!(ClosureKind::PleasureCraft.expected_duration_minutes(false), Some(10));
        assert_eq!(ClosureKind::PleasureCraft.expected_duration_minutes(true), Some(20));
        assert_eq!(ClosureKind::NextArrival.expected_duration_minutes(false), Some(15));
        assert_eq!(ClosureKind::NextArrival.expected_duration_minutes(true), Some(30));
        assert_eq!(ClosureKind::Construction.expected_duration_minutes(true), None);
    }

    #[test]
    fn histogram_bucket_edges_are_right_closed() {
        let mut h = DurationHistogram::default();
        for m in [9, 15, 30, 60, 61] {
            h.record(m);
        }
        assert_eq!(h.under_9m, 1);
        assert_eq!(h.from_10_to_15m, 1);
        assert_eq!(h.from_16_to_30m, 1);
        assert_eq!(h.from_31_to_60m, 1);
        assert_eq!(h.over_60m, 1);
    }

    #[test]
    fn history_entry_close_fills_duration() {
        let mut entry = HistoryEntry::open(BridgeStatus::Closed, ts(1_000));
        entry.close(ts(1_900));
        assert_eq!(entry.end_time, Some(ts(1_900)));
        assert_eq!(entry.duration, Some(900));
    }

    #[test]
    fn closure_jitter_below_a_minute_is_not_observable() {
        let a = UpcomingClosure {
            kind: ClosureKind::CommercialVessel,
            time: ts(600),
            longer: Some(false),
            expected_duration_minutes: Some(15),
            end_time: None,
        };
        let mut b = a.clone();
        b.time = ts(630); // same minute
        assert!(a.observably_equal(&b));
        b.time = ts(660); // next minute
        assert!(!a.observably_equal(&b));
    }

    #[test]
    fn live_diff_ignores_prediction_and_attribution() {
        let a = BridgeLive {
            status: BridgeStatus::Closed,
            last_updated: ts(0),
            predicted: None,
            upcoming_closures: Vec::new(),
            responsible_vessel_mmsi: Some(316_001_234),
        };
        let mut b = a.clone();
        b.responsible_vessel_mmsi = None;
        b.predicted = Some(PredictionWindow { lower: ts(60), upper: ts(120) });
        assert!(a.observably_equal(&b));
        b.status = BridgeStatus::Open;
        assert!(!a.observably_equal(&b));
    }

    #[test]
    fn snapshot_filter_keeps_only_requested_regions(){
        let mut snapshot = Snapshot::empty(ts(0));
        for (id, region) in [("sct-1", BridgeRegion::Sct), ("pc-1", BridgeRegion::Pc)] {
            snapshot.available_bridges.push(BridgeIndexEntry {
                id: id.to_string(),
                name: id.to_string(),
                region_short: region,
                region: region.display_name().to_string(),
            });
            snapshot.bridges.insert(
                id.to_string(),
                BridgeEntry {
                    static_info: BridgeStatic {
                        name: id.to_string(),
                        region: region.display_name().to_string(),
                        region_short: region,
                        coordinates: Coordinates { lat: 43.0, lng: -79.2 },
                        statistics: Statistics::default(),
                    },
                    live: BridgeLive::unknown(ts(0)),
                },
            );
        }

        let only_sct: BTreeSet<_> = [BridgeRegion::Sct].into_iter().collect();
        let filtered = snapshot.filtered(&only_sct);
        assert_eq!(filtered.available_bridges.len(), 1);
        assert_eq!(filtered.bridges.len(), 1);
        assert!(filtered.bridges.contains_key("sct-1"));
    }
}
