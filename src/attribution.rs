//! Responsible-vessel attribution
//!
//! Scores nearby vessels to name the one most likely to have caused the
//! current closure. Two regimes: while a bridge is closing soon the scoring
//! weighs approach geometry heavily; once it is closed or closing only
//! moving vessels close to the span matter.
//!
//! Heading is "toward" the bridge when the angular difference between the
//! vessel's course (bow heading when stationary) and the great-circle
//! bearing from vessel to bridge is at most 60 degrees.

use crate::geo;
use crate::types::{BridgeStatus, Coordinates, LatLon, Vessel};

/// Closing-soon search radius.
const APPROACH_RADIUS_M: f64 = 7_000.0;
/// Closed/closing search radius.
const CLOSED_RADIUS_M: f64 = 4_000.0;
/// A vessel this close to the span counts as "at the bridge".
const AT_BRIDGE_M: f64 = 250.0;
/// Heading cone half-angle.
const TOWARD_CONE_DEG: f64 = 60.0;

/// Minimum qualifying score per regime.
const APPROACH_THRESHOLD: f64 = 0.25;
const CLOSED_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Toward,
    Away,
    Unknown,
}

/// Pick the vessel most likely responsible for the closure, or `None` when
/// no candidate qualifies.
pub fn responsible_vessel(
    bridge: Coordinates,
    status: BridgeStatus,
    vessels: &[Vessel],
) -> Option<u32> {
    let bridge_pos = LatLon { lat: bridge.lat, lon: bridge.lng };

    let scored: Vec<(f64, f64, u32)> = match status {
        BridgeStatus::ClosingSoon => vessels
            .iter()
            .filter_map(|v| score_approach(bridge_pos, v))
            .filter(|(score, _, _)| *score >= APPROACH_THRESHOLD)
            .collect(),
        BridgeStatus::Closed | BridgeStatus::Closing => vessels
            .iter()
            .filter_map(|v| score_closed(bridge_pos, v))
            .filter(|(score, _, _)| *score >= CLOSED_THRESHOLD)
            .collect(),
        _ => return None,
    };

    scored
        .into_iter()
        .max_by(|(sa, da, _), (sb, db, _)| {
            // Highest score wins; ties go to the closer vessel.
            sa.partial_cmp(sb)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| db.partial_cmp(da).unwrap_or(std::cmp::Ordering::Equal))
        })
        .map(|(_, _, mmsi)| mmsi)
}

/// Base proximity score shared by both regimes.
fn base_score(distance_m: f64) -> f64 {
    (1.0 / (distance_m / 1_000.0 + 0.1)).min(3.0)
}

/// Closing-soon regime: base score times an approach multiplier.
fn score_approach(bridge: LatLon, vessel: &Vessel) -> Option<(f64, f64, u32)> {
    let distance_m = geo::haversine_m(vessel.position, bridge);
    if distance_m > APPROACH_RADIUS_M {
        return None;
    }

    let moving = vessel.speed_knots >= 0.1;
    let direction = heading_direction(bridge, vessel, moving);

    let multiplier = if moving {
        match direction {
            Direction::Toward => {
                let mut m = 2.0;
                if vessel.speed_knots > 1.0 {
                    m += 0.2;
                }
                if vessel.speed_knots > 4.0 {
                    m += 0.2;
                }
                m
            }
            Direction::Unknown => 1.0,
            Direction::Away => {
                if vessel.speed_knots >= 1.5 {
                    0.0
                } else {
                    0.1
                }
            }
        }
    } else {
        let at_bridge = distance_m <= AT_BRIDGE_M;
        match (direction, at_bridge) {
            (Direction::Toward, true) => 2.5,
            (Direction::Unknown, true) => 0.1,
            (Direction::Away, true) => 0.05,
            (Direction::Toward, false) => 0.2,
            (Direction::Unknown, false) => 0.05,
            (Direction::Away, false) => 0.02,
        }
    };

    Some((base_score(distance_m) * multiplier, distance_m, vessel.mmsi))
}

/// Closed/closing regime: moving vessels only, base score alone.
fn score_closed(bridge: LatLon, vessel: &Vessel) -> Option<(f64, f64, u32)> {
    let distance_m = geo::haversine_m(vessel.position, bridge);
    if distance_m > CLOSED_RADIUS_M || vessel.speed_knots < 0.5 {
        return None;
    }
    Some((base_score(distance_m), distance_m, vessel.mmsi))
}

/// Course when moving, bow heading when stationary.
fn heading_direction(bridge: LatLon, vessel: &Vessel, moving: bool) -> Direction {
    let reference = if moving { vessel.course } else { vessel.heading };
    let Some(reference) = reference else {
        return Direction::Unknown;
    };

    let bearing = geo::initial_bearing_deg(vessel.position, bridge);
    if geo::angular_diff_deg(reference, bearing) <= TOWARD_CONE_DEG {
        Direction::Toward
    } else {
        Direction::Away
    }
}
