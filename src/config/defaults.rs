//! Built-in configuration defaults
//!
//! The bridge roster and per-region upstream endpoints ship as defaults so a
//! bare binary tracks the full corridor. A config file can override any of it.

use crate::types::BridgeRegion;

use super::BridgeConfig;

/// Default upstream endpoint for each bridge region.
pub fn region_endpoints() -> Vec<(BridgeRegion, String)> {
    vec![
        (
            BridgeRegion::Sct,
            "https://www.greatlakes-seaway.com/bridge-status/api/sct".to_string(),
        ),
        (
            BridgeRegion::Pc,
            "https://www.greatlakes-seaway.com/bridge-status/api/pc".to_string(),
        ),
        (
            BridgeRegion::Mss,
            "https://grandsLacs-voiemaritime.com/etat-des-ponts/api/mss".to_string(),
        ),
        (
            BridgeRegion::K,
            "https://grandsLacs-voiemaritime.com/etat-des-ponts/api/k".to_string(),
        ),
        (
            BridgeRegion::Sbs,
            "https://grandsLacs-voiemaritime.com/etat-des-ponts/api/sbs".to_string(),
        ),
    ]
}

/// The full bridge roster: Welland Canal north to south, then the Montreal
/// corridor west to east.
pub fn bridge_roster() -> Vec<BridgeConfig> {
    let entry = |id: &str, name: &str, region, lat, lng| BridgeConfig {
        id: id.to_string(),
        name: name.to_string(),
        region,
        lat,
        lng,
    };

    vec![
        // St. Catharines / Thorold
        entry("sct-lakeshore", "Lakeshore Rd", BridgeRegion::Sct, 43.2206, -79.2084),
        entry("sct-carlton", "Carlton St", BridgeRegion::Sct, 43.1907, -79.2014),
        entry("sct-queenston", "Queenston St", BridgeRegion::Sct, 43.1659, -79.1967),
        entry("sct-glendale", "Glendale Ave", BridgeRegion::Sct, 43.1465, -79.1938),
        entry("sct-highway20", "Highway 20", BridgeRegion::Sct, 43.0745, -79.2082),
        // Port Colborne
        entry("pc-main", "Main St", BridgeRegion::Pc, 42.9057, -79.2474),
        entry("pc-clarence", "Clarence St", BridgeRegion::Pc, 42.8877, -79.2503),
        // Montreal South Shore
        entry("mss-victoria", "Victoria Bridge", BridgeRegion::Mss, 45.4956, -73.5164),
        entry("mss-stlambert", "St-Lambert", BridgeRegion::Mss, 45.5003, -73.5084),
        // Kahnawake
        entry("k-stecatherine", "Sainte-Catherine", BridgeRegion::K, 45.4008, -73.5738),
        // Salaberry / Beauharnois
        entry("sbs-larocque", "Larocque Bridge", BridgeRegion::Sbs, 45.2446, -74.1120),
        entry("sbs-stlouis", "St-Louis-de-Gonzague", BridgeRegion::Sbs, 45.2380, -73.9846),
        entry("sbs-valleyfield", "Valleyfield Bridge", BridgeRegion::Sbs, 45.2497, -74.1027),
    ]
}
