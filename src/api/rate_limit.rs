//! Per-source-IP rate limiting
//!
//! Fixed one-minute windows per (bucket, ip) key. Data endpoints and
//! everything else carry separate caps. Behind a reverse proxy the client is
//! identified by the right-most X-Forwarded-For entry; otherwise by the
//! socket peer address.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::config::RateLimitConfig;

use super::ApiState;

const WINDOW: Duration = Duration::from_secs(60);

/// Which cap applies to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    Data,
    Static,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    count: u32,
}

/// Fixed-window request counter per (bucket, ip).
#[derive(Debug)]
pub struct RateLimiter {
    caps: RateLimitConfig,
    windows: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(caps: RateLimitConfig) -> Self {
        Self { caps, windows: Mutex::new(HashMap::new()) }
    }

    /// Admit or reject one request. `Err` carries the Retry-After seconds.
    pub fn check(&self, bucket: Bucket, ip: &str) -> Result<(), u64> {
        let cap = match bucket {
            Bucket::Data => self.caps.data_per_minute,
            Bucket::Static => self.caps.static_per_minute,
        };
        let key = format!("{bucket:?}:{ip}");
        let now = Instant::now();

        let Ok(mut windows) = self.windows.lock() else {
            return Ok(());
        };

        // Opportunistic sweep so the map stays bounded by active clients.
        if windows.len() > 10_000 {
            windows.retain(|_, w| now.duration_since(w.started) < WINDOW);
        }

        let window = windows.entry(key).or_insert(Window { started: now, count: 0 });
        if now.duration_since(window.started) >= WINDOW {
            window.started = now;
            window.count = 0;
        }

        window.count += 1;
        if window.count > cap {
            let elapsed = now.duration_since(window.started);
            Err(WINDOW.saturating_sub(elapsed).as_secs().max(1))
        } else {
            Ok(())
        }
    }
}

/// Client key for a request: right-most X-Forwarded-For entry when a reverse
/// proxy is in front, else the socket peer.
pub fn client_ip(request: &Request) -> String {
    if let Some(forwarded) = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        if let Some(last) = forwarded.split(',').next_back() {
            let last = last.trim();
            if !last.is_empty() {
                return last.to_string();
            }
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Axum middleware applying the limiter to everything except the WebSocket
/// upgrade.
pub async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if path == "/ws" {
        return next.run(request).await;
    }

    let bucket = if path == "/bridges" || path == "/boats" || path == "/health"
        || path.starts_with("/bridges/")
    {
        Bucket::Data
    } else {
        Bucket::Static
    };

    let ip = client_ip(&request);
    match state.limiter.check(bucket, &ip) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            let mut response = (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
    }
}
