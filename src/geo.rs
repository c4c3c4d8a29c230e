//! Great-circle geometry and region bounds
//!
//! Haversine distance and initial bearing over a spherical Earth, plus the
//! fixed bounding boxes that decide which traffic region a position belongs
//! to. Accuracy over the few-kilometre scales involved is well inside a
//! metre, which is all the 10 m movement rule needs.

use crate::types::{BoatRegion, LatLon};

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two positions in metres.
pub fn haversine_m(a: LatLon, b: LatLon) -> f64 {
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let d_phi = (b.lat - a.lat).to_radians();
    let d_lambda = (b.lon - a.lon).to_radians();

    let h = (d_phi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Initial great-circle bearing from `from` to `to`, degrees in [0, 360).
pub fn initial_bearing_deg(from: LatLon, to: LatLon) -> f64 {
    let phi1 = from.lat.to_radians();
    let phi2 = to.lat.to_radians();
    let d_lambda = (to.lon - from.lon).to_radians();

    let y = d_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * d_lambda.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// Absolute angular difference between two headings, degrees in [0, 180].
pub fn angular_diff_deg(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Coordinate sanity gate for ingested positions: within ±90/±180 and not
/// the (0, 0) null island default some transponders emit.
pub fn valid_coordinates(lat: f64, lon: f64) -> bool {
    lat.is_finite()
        && lon.is_finite()
        && (-90.0..=90.0).contains(&lat)
        && (-180.0..=180.0).contains(&lon)
        && !(lat == 0.0 && lon == 0.0)
}

/// Inclusive latitude/longitude bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    /// Whether `p` lies inside the box.
    pub fn contains(&self, p: LatLon) -> bool {
        (self.lat_min..=self.lat_max).contains(&p.lat)
            && (self.lon_min..=self.lon_max).contains(&p.lon)
    }

    /// Smallest box covering both inputs.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            lat_min: self.lat_min.min(other.lat_min),
            lat_max: self.lat_max.max(other.lat_max),
            lon_min: self.lon_min.min(other.lon_min),
            lon_max: self.lon_max.max(other.lon_max),
        }
    }
}

/// Bounds of one traffic region.
pub fn region_bounds(region: BoatRegion) -> BoundingBox {
    match region {
        // Welland Canal corridor, Port Weller to Port Colborne.
        BoatRegion::Welland => BoundingBox {
            lat_min: 42.83,
            lat_max: 43.28,
            lon_min: -79.32,
            lon_max: -79.17,
        },
        // South Shore channel plus the Beauharnois canal.
        BoatRegion::Montreal => BoundingBox {
            lat_min: 45.15,
            lat_max: 45.60,
            lon_min: -74.25,
            lon_max: -73.40,
        },
    }
}

/// Region membership by bounding box, or `None` outside all regions.
pub fn region_of(p: LatLon) -> Option<BoatRegion> {
    BoatRegion::ALL
        .iter()
        .copied()
        .find(|r| region_bounds(*r).contains(p))
}

/// Union box covering every traffic region, used for the single AISHub query.
pub fn combined_bounds() -> BoundingBox {
    let mut bounds = region_bounds(BoatRegion::ALL[0]);
    for region in &BoatRegion::ALL[1..] {
        bounds = bounds.union(&region_bounds(*region));
    }
    bounds
}

#[cfg(test)]
mod tests {
    use super::*;

    const PORT_WELLER: LatLon = LatLon { lat: 43.2280, lon: -79.2150 };
    const STE_CATHERINE: LatLon = LatLon { lat: 45.4008, lon: -73.5738 };

    #[test]
    fn haversine_known_distance() {
        // Roughly one degree of latitude near Welland: ~111 km.
        let a = LatLon { lat: 43.0, lon: -79.2 };
        let b = LatLon { lat: 44.0, lon: -79.2 };
        let d = haversine_m(a, b);
        assert!((d - 111_195.0).abs() < 200.0, "got {d}");
    }

    #[test]
    fn haversine_ten_metre_scale() {
        // ~0.0001 deg latitude is ~11 m.
        let a = LatLon { lat: 43.20000, lon: -79.2100 };
        let b = LatLon { lat: 43.20010, lon: -79.2100 };
        let d = haversine_m(a, b);
        assert!(d > 10.0 && d < 12.5, "got {d}");
    }

    #[test]
    fn bearing_cardinal_directions() {
        let origin = LatLon { lat: 43.0, lon: -79.2 };
        let north = LatLon { lat: 43.1, lon: -79.2 };
        let east = LatLon { lat: 43.0, lon: -79.1 };
        assert!(initial_bearing_deg(origin, north).abs() < 0.5);
        assert!((initial_bearing_deg(origin, east) - 90.0).abs() < 0.5);
    }

    #[test]
    fn angular_diff_wraps() {
        assert_eq!(angular_diff_deg(350.0, 10.0), 20.0);
        assert_eq!(angular_diff_deg(10.0, 350.0), 20.0);
        assert_eq!(angular_diff_deg(180.0, 0.0), 180.0);
    }

    #[test]
    fn coordinate_validation() {
        assert!(valid_coordinates(43.2, -79.2));
        assert!(!valid_coordinates(0.0, 0.0));
        assert!(!valid_coordinates(91.0, 0.0));
        assert!(!valid_coordinates(45.0, -181.0));
        assert!(!valid_coordinates(f64::NAN, -79.2));
    }

    #[test]
    fn region_membership() {
        assert_eq!(region_of(PORT_WELLER), Some(BoatRegion::Welland));
        assert_eq!(region_of(STE_CATHERINE), Some(BoatRegion::Montreal));
        // Lake Ontario, outside both corridors.
        assert_eq!(region_of(LatLon { lat: 43.6, lon: -78.5 }), None);
    }

    #[test]
    fn combined_bounds_cover_all_regions() {
        let bounds = combined_bounds();
        assert!(bounds.contains(PORT_WELLER));
        assert!(bounds.contains(STE_CATHERINE));
    }
}
