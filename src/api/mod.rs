//! HTTP gateway using Axum
//!
//! - `/bridges`, `/bridges/{id}`, `/boats` — data endpoints over the
//!   snapshot and registry
//! - `/health` — liveness and freshness indicators
//! - `/ws` — the fanout gateway's WebSocket upgrade
//!
//! All HTTP routes are rate-limited per source IP; data responses carry a
//! short Cache-Control.

pub mod handlers;
pub mod rate_limit;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio_util::sync::CancellationToken;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::app::AppContext;
use crate::fanout::ws::ws_handler;

use rate_limit::RateLimiter;

/// Shared state for the HTTP and WebSocket handlers.
#[derive(Clone)]
pub struct ApiState {
    pub ctx: AppContext,
    pub limiter: Arc<RateLimiter>,
    /// Root cancellation token; connections send a close frame on shutdown.
    pub shutdown: CancellationToken,
}

impl ApiState {
    pub fn new(ctx: AppContext, shutdown: CancellationToken) -> Self {
        let limiter = Arc::new(RateLimiter::new(ctx.config.rate_limit.clone()));
        Self { ctx, limiter, shutdown }
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .route("/bridges", get(handlers::get_bridges))
        .route("/bridges/:id", get(handlers::get_bridge))
        .route("/boats", get(handlers::get_boats))
        .route("/health", get(handlers::get_health))
        .route("/ws", get(ws_handler))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit::rate_limit_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::Config;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use tower::ServiceExt;

    async fn test_state(dir: &std::path::Path) -> ApiState {
        let config = Config {
            snapshot_path: dir.join("bridges.json"),
            history_dir: dir.join("history"),
            ..Config::default()
        };
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_700_000_000, 0).unwrap()));
        let ctx = AppContext::initialize(config, clock).await;
        ApiState::new(ctx, CancellationToken::new())
    }

    #[tokio::test]
    async fn bridges_endpoint_returns_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let app = create_app(test_state(dir.path()).await);

        let response = app
            .oneshot(Request::builder().uri("/bridges").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response
            .headers()
            .get("cache-control")
            .unwrap()
            .to_str()
            .unwrap()
            .contains("max-age=10"));
    }

    #[tokio::test]
    async fn unknown_bridge_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        let app = create_app(state.clone());
        let response = app
            .oneshot(Request::builder().uri("/bridges/sct-carlton").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let app = create_app(state);
        let response = app
            .oneshot(Request::builder().uri("/bridges/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn boats_and_health_respond() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path()).await;

        for uri in ["/boats", "/health"] {
            let app = create_app(state.clone());
            let response = app
                .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK, "{uri}");
        }
    }

    #[tokio::test]
    async fn rate_limit_trips_with_retry_after() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = test_state(dir.path()).await;
        let mut config = (*state.ctx.config).clone();
        config.rate_limit.data_per_minute = 2;
        state.limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));

        let mut last_status = StatusCode::OK;
        let mut retry_after = None;
        for _ in 0..3 {
            let app = create_app(state.clone());
            let response = app
                .oneshot(
                    Request::builder()
                        .uri("/bridges")
                        .header("x-forwarded-for", "203.0.113.7")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();
            last_status = response.status();
            retry_after = response.headers().get("retry-after").cloned();
        }

        assert_eq!(last_status, StatusCode::TOO_MANY_REQUESTS);
        assert!(retry_after.is_some());
    }
}
