//! AISHub HTTP poller
//!
//! One bounding-box query covering the union of all traffic regions, at most
//! once per 61 s (the aggregator's external rate limit). Records flow through
//! the same registry merge path as UDP, where fresh UDP data takes
//! precedence. On failure the poll interval backs off exponentially from the
//! base, capped at 300 s, and resets on success.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::geo;
use crate::registry::{IngestSource, VesselRegistry, VesselUpdate};
use crate::types::{Dimensions, LatLon};

/// External rate limit on the aggregator.
const POLL_BASE_SECS: u64 = 61;
/// Backoff ceiling.
const POLL_MAX_SECS: u64 = 300;
/// Request timeout.
const HTTP_TIMEOUT_SECS: u64 = 30;

/// AISHub client errors.
#[derive(Debug, thiserror::Error)]
pub enum AisHubError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("aggregator error: {0}")]
    Aggregator(String),
    #[error("malformed response: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Response metadata element.
#[derive(Debug, Deserialize)]
struct AisHubMeta {
    #[serde(rename = "ERROR")]
    error: bool,
    #[serde(rename = "ERROR_MESSAGE", default)]
    error_message: Option<String>,
}

/// One vessel record in the aggregator's JSON output.
#[derive(Debug, Deserialize)]
struct AisHubRecord {
    #[serde(rename = "MMSI")]
    mmsi: u32,
    #[serde(rename = "LATITUDE")]
    latitude: f64,
    #[serde(rename = "LONGITUDE")]
    longitude: f64,
    #[serde(rename = "SOG", default)]
    sog: Option<f64>,
    #[serde(rename = "COG", default)]
    cog: Option<f64>,
    #[serde(rename = "HEADING", default)]
    heading: Option<f64>,
    #[serde(rename = "NAME", default)]
    name: Option<String>,
    #[serde(rename = "TYPE", default)]
    ship_type: Option<u8>,
    #[serde(rename = "DEST", default)]
    destination: Option<String>,
    #[serde(rename = "A", default)]
    to_bow: Option<u32>,
    #[serde(rename = "B", default)]
    to_stern: Option<u32>,
    #[serde(rename = "C", default)]
    to_port: Option<u32>,
    #[serde(rename = "D", default)]
    to_starboard: Option<u32>,
}

impl AisHubRecord {
    /// Convert to a registry update, dropping absurd coordinates.
    fn into_update(self) -> Option<VesselUpdate> {
        if !geo::valid_coordinates(self.latitude, self.longitude) {
            return None;
        }
        let dimensions = match (self.to_bow, self.to_stern, self.to_port, self.to_starboard) {
            (Some(a), Some(b), Some(c), Some(d)) if a + b > 0 && c + d > 0 => {
                Some(Dimensions { length: a + b, width: c + d })
            }
            _ => None,
        };
        Some(VesselUpdate {
            mmsi: self.mmsi,
            position: Some(LatLon { lat: self.latitude, lon: self.longitude }),
            speed_knots: self.sog,
            course: self.cog.filter(|c| *c < 360.0),
            heading: self.heading.filter(|h| *h < 360.0),
            name: self.name.filter(|n| !n.is_empty()),
            type_code: self.ship_type,
            destination: self.destination.filter(|d| !d.is_empty()),
            dimensions,
        })
    }
}

/// HTTP client for the aggregator.
pub struct AisHubClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
}

impl AisHubClient {
    pub fn new(url: &str, api_key: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { http, url: url.to_string(), api_key: api_key.to_string() })
    }

    /// Fetch the union bounding box and parse into registry updates.
    pub async fn fetch(&self) -> Result<Vec<VesselUpdate>, AisHubError> {
        let bounds = geo::combined_bounds();
        let response = self
            .http
            .get(&self.url)
            .query(&[
                ("username", self.api_key.as_str()),
                ("format", "1"),
                ("output", "json"),
                ("compress", "0"),
            ])
            .query(&[
                ("latmin", bounds.lat_min),
                ("latmax", bounds.lat_max),
                ("lonmin", bounds.lon_min),
                ("lonmax", bounds.lon_max),
            ])
            .send()
            .await?
            .error_for_status()?;

        let body = response.bytes().await?;
        parse_response(&body)
    }
}

/// Parse the aggregator's `[metadata, [records]]` body.
fn parse_response(body: &[u8]) -> Result<Vec<VesselUpdate>, AisHubError> {
    let (meta, records): (AisHubMeta, Vec<AisHubRecord>) = serde_json::from_slice(body)?;
    if meta.error {
        return Err(AisHubError::Aggregator(
            meta.error_message.unwrap_or_else(|| "unspecified".to_string()),
        ));
    }
    Ok(records.into_iter().filter_map(AisHubRecord::into_update).collect())
}

/// Run the poll loop until cancelled.
pub async fn run(
    client: AisHubClient,
    registry: Arc<Mutex<VesselRegistry>>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> Result<()> {
    info!("[AisPoller] polling {} every {}s", client.url, POLL_BASE_SECS);
    let mut delay = Duration::from_secs(POLL_BASE_SECS);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("[AisPoller] shutdown");
                return Ok(());
            }
            _ = tokio::time::sleep(delay) => {}
        }

        match client.fetch().await {
            Ok(updates) => {
                delay = Duration::from_secs(POLL_BASE_SECS);
                let now = clock.now();
                let count = updates.len();
                if let Ok(mut registry) = registry.lock() {
                    for update in updates {
                        registry.apply(update, &IngestSource::Poll, now);
                    }
                }
                debug!("[AisPoller] applied {} records", count);
            }
            Err(e) => {
                delay = (delay * 2).min(Duration::from_secs(POLL_MAX_SECS));
                warn!("[AisPoller] poll failed, next attempt in {:?}: {}", delay, e);
            }
        }
    }
}
