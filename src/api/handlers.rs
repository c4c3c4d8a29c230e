//! HTTP route handlers
//!
//! Thin over the persistence layer and the registry: the snapshot, one
//! bridge, the boats payload, and the health surface with its freshness
//! indicators. Data responses carry a short Cache-Control so polling clients
//! and the CDN collapse bursts.

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::clock::in_navigation_season;

use super::ApiState;

/// Seaway indicator degrades when no scrape has succeeded for this long.
const SCRAPE_GRACE_SECS: i64 = 120;
/// Bridge-activity warning thresholds, in and out of the navigation season.
const ACTIVITY_THRESHOLD_SEASON_HOURS: i64 = 24;
const ACTIVITY_THRESHOLD_OFFSEASON_HOURS: i64 = 168;

fn cache_header(state: &ApiState) -> [(header::HeaderName, String); 1] {
    [(
        header::CACHE_CONTROL,
        format!("public, max-age={}", state.ctx.config.cache.data_max_age_secs),
    )]
}

/// GET /bridges — the full snapshot.
pub async fn get_bridges(State(state): State<ApiState>) -> Response {
    let snapshot = state.ctx.current_snapshot();
    (cache_header(&state), Json(&*snapshot)).into_response()
}

/// GET /bridges/{id} — one bridge, or 404.
pub async fn get_bridge(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Response {
    let snapshot = state.ctx.current_snapshot();
    match snapshot.bridges.get(&id) {
        Some(entry) => (cache_header(&state), Json(entry)).into_response(),
        None => (StatusCode::NOT_FOUND, "unknown bridge id").into_response(),
    }
}

/// GET /boats — the current vessels payload.
pub async fn get_boats(State(state): State<ApiState>) -> Response {
    let payload = state.ctx.boats_payload();
    (cache_header(&state), Json(payload)).into_response()
}

/// The `/health` document.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub status_message: String,
    pub seaway_status: String,
    pub seaway_message: String,
    pub bridge_activity: String,
    pub bridge_activity_message: String,
    pub last_updated: DateTime<Utc>,
    pub last_scrape: Option<DateTime<Utc>>,
    pub last_scrape_had_changes: bool,
    pub statistics_last_updated: Option<DateTime<Utc>>,
    pub bridges_count: usize,
    pub websocket_clients: usize,
}

/// GET /health — liveness plus freshness indicators.
pub async fn get_health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let ctx = &state.ctx;
    let now = ctx.clock.now();
    let health = ctx.health_snapshot();
    let snapshot = ctx.current_snapshot();

    let (seaway_status, seaway_message) = match health.last_scrape {
        Some(at) if now - at <= Duration::seconds(SCRAPE_GRACE_SECS) => {
            ("ok".to_string(), "upstream data is fresh".to_string())
        }
        Some(at) => (
            "degraded".to_string(),
            format!("last successful scrape at {}", at.to_rfc3339()),
        ),
        None => (
            "degraded".to_string(),
            "no successful scrape since startup".to_string(),
        ),
    };

    // The activity warning is seasonal: bridges lift daily in the
    // navigation season and can sit idle for days outside it.
    let threshold_hours = if in_navigation_season(now, ctx.config.tz()) {
        ACTIVITY_THRESHOLD_SEASON_HOURS
    } else {
        ACTIVITY_THRESHOLD_OFFSEASON_HOURS
    };
    let (bridge_activity, bridge_activity_message) = match health.last_bridge_change {
        Some(at) if now - at <= Duration::hours(threshold_hours) => {
            ("ok".to_string(), "bridge activity is recent".to_string())
        }
        Some(at) => (
            "stale".to_string(),
            format!(
                "no bridge change since {} (threshold {}h)",
                at.to_rfc3339(),
                threshold_hours
            ),
        ),
        None => (
            "stale".to_string(),
            "no bridge change observed since startup".to_string(),
        ),
    };

    let degraded = seaway_status != "ok";
    let (status, status_message) = if degraded {
        ("degraded".to_string(), "upstream scrape is failing".to_string())
    } else {
        ("ok".to_string(), "operating normally".to_string())
    };

    Json(HealthResponse {
        status,
        status_message,
        seaway_status,
        seaway_message,
        bridge_activity,
        bridge_activity_message,
        last_updated: snapshot.last_updated,
        last_scrape: health.last_scrape,
        last_scrape_had_changes: health.last_scrape_had_changes,
        statistics_last_updated: health.statistics_last_updated,
        bridges_count: snapshot.bridges.len(),
        websocket_clients: ctx.ws_clients.load(std::sync::atomic::Ordering::Relaxed),
    })
}
