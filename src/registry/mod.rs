//! Vessel registry
//!
//! In-memory map from MMSI to the last-known vessel record. Updates arrive
//! from the UDP listener and the AISHub poller through one merge path that
//! enforces the registry invariants:
//!
//! - ship MMSI range only
//! - region membership by bounding box; outside all regions is dropped
//! - UDP beats the HTTP poll unless the UDP data is older than 60 s
//! - `last_moved` advances only on >10 m displacement
//!
//! Readers take snapshot copies under the lock, never a live handle.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::geo;
use crate::types::{is_ship_mmsi, ship_type_label, BoatRegion, Dimensions, LatLon, Vessel};

/// UDP data younger than this shadows HTTP poll data for the same vessel.
const UDP_PRECEDENCE_WINDOW_SECS: i64 = 60;

/// Eviction thresholds: not heard from, or not moving (docked/anchored).
const STALE_AFTER_MINS: i64 = 15;
const PARKED_AFTER_MINS: i64 = 120;

/// Displacement below this is jitter, not movement.
const MOVEMENT_THRESHOLD_M: f64 = 10.0;

/// Where an update came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSource {
    /// UDP station feed; carries the station id from the sender-IP map.
    Udp { station: String },
    /// The AISHub HTTP poller.
    Poll,
}

impl IngestSource {
    fn label(&self) -> &str {
        match self {
            IngestSource::Udp { station } => station,
            IngestSource::Poll => "aishub",
        }
    }

    fn is_udp(&self) -> bool {
        matches!(self, IngestSource::Udp { .. })
    }
}

/// A decoded, source-agnostic vessel update. Only non-null fields overwrite
/// on merge.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VesselUpdate {
    pub mmsi: u32,
    pub position: Option<LatLon>,
    pub speed_knots: Option<f64>,
    pub heading: Option<f64>,
    pub course: Option<f64>,
    pub name: Option<String>,
    pub type_code: Option<u8>,
    pub destination: Option<String>,
    pub dimensions: Option<Dimensions>,
}

/// What the registry did with an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted,
    Merged,
    /// Valid update shadowed by fresher UDP data.
    Shadowed,
    /// Failed an invariant and was discarded.
    Dropped,
}

/// The registry proper. Callers hold the surrounding mutex briefly; none of
/// these methods block.
#[derive(Debug, Default)]
pub struct VesselRegistry {
    vessels: HashMap<u32, Vessel>,
}

impl VesselRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.vessels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vessels.is_empty()
    }

    /// Apply one update through the merge path.
    pub fn apply(
        &mut self,
        update: VesselUpdate,
        source: &IngestSource,
        now: DateTime<Utc>,
    ) -> IngestOutcome {
        use std::collections::hash_map::Entry;

        if !is_ship_mmsi(update.mmsi) {
            return IngestOutcome::Dropped;
        }

        // Coordinate sanity gate; an absurd position is treated as absent.
        let position = update
            .position
            .filter(|p| geo::valid_coordinates(p.lat, p.lon));

        // A position outside all regions drops the update; a vessel that
        // sailed out of bounds is removed by the next cleanup sweep.
        let region = match position {
            Some(p) => match geo::region_of(p) {
                Some(region) => Some(region),
                None => return IngestOutcome::Dropped,
            },
            None => None,
        };

        let existing = match self.vessels.entry(update.mmsi) {
            Entry::Vacant(slot) => {
                // No record to merge into: a position is required to insert.
                let (Some(position), Some(region)) = (position, region) else {
                    return IngestOutcome::Dropped;
                };
                let (type_name, type_category) = ship_type_label(update.type_code);
                slot.insert(Vessel {
                    mmsi: update.mmsi,
                    name: update.name,
                    type_code: update.type_code,
                    type_name: type_name.to_string(),
                    type_category,
                    position,
                    heading: update.heading,
                    course: update.course,
                    speed_knots: update.speed_knots.unwrap_or(0.0),
                    destination: update.destination,
                    dimensions: update.dimensions,
                    last_seen: now,
                    last_moved: now,
                    source: source.label().to_string(),
                    region,
                });
                return IngestOutcome::Inserted;
            }
            Entry::Occupied(slot) => slot.into_mut(),
        };

        // Source precedence: fresh UDP data shadows the HTTP poll.
        let existing_is_udp = existing.source != "aishub";
        if !source.is_udp()
            && existing_is_udp
            && (now - existing.last_seen) < Duration::seconds(UDP_PRECEDENCE_WINDOW_SECS)
        {
            return IngestOutcome::Shadowed;
        }

        if let (Some(position), Some(region)) = (position, region) {
            if geo::haversine_m(existing.position, position) > MOVEMENT_THRESHOLD_M {
                existing.last_moved = now;
            }
            existing.position = position;
            existing.region = region;
        }

        if let Some(name) = update.name {
            existing.name = Some(name);
        }
        if let Some(code) = update.type_code {
            existing.type_code = Some(code);
            let (type_name, type_category) = ship_type_label(Some(code));
            existing.type_name = type_name.to_string();
            existing.type_category = type_category;
        }
        if let Some(heading) = update.heading {
            existing.heading = Some(heading);
        }
        if let Some(course) = update.course {
            existing.course = Some(course);
        }
        if let Some(speed) = update.speed_knots {
            existing.speed_knots = speed;
        }
        if let Some(destination) = update.destination {
            existing.destination = Some(destination);
        }
        if let Some(dimensions) = update.dimensions {
            existing.dimensions = Some(dimensions);
        }

        existing.last_seen = now;
        existing.source = source.label().to_string();

        IngestOutcome::Merged
    }

    /// Evict stale, parked, and out-of-bounds vessels. Returns the number
    /// removed.
    pub fn cleanup(&mut self, now: DateTime<Utc>) -> usize {
        let before = self.vessels.len();
        self.vessels.retain(|_, v| {
            (now - v.last_seen) <= Duration::minutes(STALE_AFTER_MINS)
                && (now - v.last_moved) <= Duration::minutes(PARKED_AFTER_MINS)
                && geo::region_of(v.position).is_some()
        });
        let removed = before - self.vessels.len();
        if removed > 0 {
            debug!("vessel cleanup evicted {} records", removed);
        }
        removed
    }

    /// Snapshot copy of every record.
    pub fn snapshot(&self) -> Vec<Vessel> {
        self.vessels.values().cloned().collect()
    }

    /// Snapshot copy of the records in one traffic region.
    pub fn in_region(&self, region: BoatRegion) -> Vec<Vessel> {
        self.vessels
            .values()
            .filter(|v| v.region == region)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const WELLAND_POS: LatLon = LatLon { lat: 43.15, lon: -79.20 };

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn udp() -> IngestSource {
        IngestSource::Udp { station: "welland-north".to_string() }
    }

    fn position_update(mmsi: u32, pos: LatLon) -> VesselUpdate {
        VesselUpdate {
            mmsi,
            position: Some(pos),
            speed_knots: Some(5.0),
            course: Some(180.0),
            ..VesselUpdate::default()
        }
    }

    #[test]
    fn rejects_non_ship_mmsi() {
        let mut reg = VesselRegistry::new();
        let outcome = reg.apply(position_update(2_300_123, WELLAND_POS), &udp(), ts(0));
        assert_eq!(outcome, IngestOutcome::Dropped);

        let outcome = reg.apply(position_update(970_000_001, WELLAND_POS), &udp(), ts(0));
        assert_eq!(outcome, IngestOutcome::Dropped);
        assert!(reg.is_empty());
    }

    #[test]
    fn rejects_positions_outside_all_regions() {
        let mut reg = VesselRegistry::new();
        let atlantic = LatLon { lat: 44.0, lon: -60.0 };
        let outcome = reg.apply(position_update(316_001_000, atlantic), &udp(), ts(0));
        assert_eq!(outcome, IngestOutcome::Dropped);
    }

    #[test]
    fn static_only_update_without_record_is_dropped() {
        let mut reg = VesselRegistry::new();
        let update = VesselUpdate {
            mmsi: 316_001_000,
            name: Some("ALGOMA GUARDIAN".to_string()),
            ..VesselUpdate::default()
        };
        assert_eq!(reg.apply(update, &udp(), ts(0)), IngestOutcome::Dropped);
    }

    #[test]
    fn static_update_merges_into_existing_record() {
        let mut reg = VesselRegistry::new();
        reg.apply(position_update(316_001_000, WELLAND_POS), &udp(), ts(0));

        let update = VesselUpdate {
            mmsi: 316_001_000,
            name: Some("ALGOMA GUARDIAN".to_string()),
            type_code: Some(70),
            ..VesselUpdate::default()
        };
        assert_eq!(reg.apply(update, &udp(), ts(10)), IngestOutcome::Merged);

        let vessels = reg.snapshot();
        assert_eq!(vessels[0].name.as_deref(), Some("ALGOMA GUARDIAN"));
        assert_eq!(vessels[0].type_name, "Cargo");
        // Position survives the partial update.
        assert_eq!(vessels[0].position, WELLAND_POS);
    }

    #[test]
    fn udp_beats_recent_poll_then_yields() {
        let mut reg = VesselRegistry::new();
        reg.apply(position_update(316_001_000, WELLAND_POS), &udp(), ts(0));

        // Poll 10 s later: shadowed by fresh UDP data.
        let moved = LatLon { lat: 43.151, lon: -79.20 };
        let outcome = reg.apply(position_update(316_001_000, moved), &IngestSource::Poll, ts(10));
        assert_eq!(outcome, IngestOutcome::Shadowed);
        assert_eq!(reg.snapshot()[0].position, WELLAND_POS);

        // After 70 s of UDP silence the poll is accepted and last_seen advances.
        let outcome = reg.apply(position_update(316_001_000, moved), &IngestSource::Poll, ts(70));
        assert_eq!(outcome, IngestOutcome::Merged);
        let vessel = &reg.snapshot()[0];
        assert_eq!(vessel.position, moved);
        assert_eq!(vessel.last_seen, ts(70));
        assert_eq!(vessel.source, "aishub");
    }

    #[test]
    fn udp_always_merges_over_poll() {
        let mut reg = VesselRegistry::new();
        reg.apply(position_update(316_001_000, WELLAND_POS), &IngestSource::Poll, ts(0));
        let moved = LatLon { lat: 43.151, lon: -79.20 };
        assert_eq!(
            reg.apply(position_update(316_001_000, moved), &udp(), ts(1)),
            IngestOutcome::Merged
        );
        assert_eq!(reg.snapshot()[0].source, "welland-north");
    }

    #[test]
    fn last_moved_requires_ten_metres() {
        let mut reg = VesselRegistry::new();
        reg.apply(position_update(316_001_000, WELLAND_POS), &udp(), ts(0));

        // ~5 m north: jitter, last_moved stays.
        let jitter = LatLon { lat: WELLAND_POS.lat + 0.000045, lon: WELLAND_POS.lon };
        reg.apply(position_update(316_001_000, jitter), &udp(), ts(60));
        assert_eq!(reg.snapshot()[0].last_moved, ts(0));
        assert_eq!(reg.snapshot()[0].last_seen, ts(60));

        // ~30 m north: movement.
        let moved = LatLon { lat: WELLAND_POS.lat + 0.00027, lon: WELLAND_POS.lon };
        reg.apply(position_update(316_001_000, moved), &udp(), ts(120));
        assert_eq!(reg.snapshot()[0].last_moved, ts(120));
    }

    #[test]
    fn cleanup_evicts_stale_and_parked() {
        let mut reg = VesselRegistry::new();
        reg.apply(position_update(316_001_000, WELLAND_POS), &udp(), ts(0));
        reg.apply(
            position_update(316_002_000, LatLon { lat: 45.40, lon: -73.57 }),
            &udp(),
            ts(0),
        );

        // Keep the second vessel fresh and moving.
        let moved = LatLon { lat: 45.401, lon: -73.57 };
        reg.apply(position_update(316_002_000, moved), &udp(), ts(16 * 60));

        // First vessel was last seen 16 minutes ago.
        let removed = reg.cleanup(ts(16 * 60));
        assert_eq!(removed, 1);
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.snapshot()[0].mmsi, 316_002_000);
    }

    #[test]
    fn cleanup_evicts_parked_vessels() {
        let mut reg = VesselRegistry::new();
        reg.apply(position_update(316_001_000, WELLAND_POS), &udp(), ts(0));

        // Refreshed every 10 minutes but never moves: parked after 120 min.
        for i in 1..=13 {
            let mut update = position_update(316_001_000, WELLAND_POS);
            update.speed_knots = Some(0.0);
            reg.apply(update, &udp(), ts(i * 600));
        }
        let removed = reg.cleanup(ts(121 * 60));
        assert_eq!(removed, 1);
    }

    #[test]
    fn region_snapshot_filters() {
        let mut reg = VesselRegistry::new();
        reg.apply(position_update(316_001_000, WELLAND_POS), &udp(), ts(0));
        reg.apply(
            position_update(316_002_000, LatLon { lat: 45.40, lon: -73.57 }),
            &udp(),
            ts(0),
        );

        assert_eq!(reg.in_region(BoatRegion::Welland).len(), 1);
        assert_eq!(reg.in_region(BoatRegion::Montreal).len(), 1);
    }
}
