//! Upstream bridge JSON
//!
//! The two upstream document shapes and the fetch client. This module is the
//! only place that knows upstream field names; everything past `parse`
//! operates on `RawBridge`.
//!
//! Shape `Widget` is the legacy per-region array; shape `Regional` is the
//! newer nested document carrying `bridgeLiftList` / `bridgeLiftListE` /
//! `eventTypeId`. `bridgeLiftListE` is ignored entirely — whether it is ever
//! populated while `bridgeLiftList` is empty has never been observed.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::debug;

use crate::types::{BridgeStatus, ClosureKind, UpcomingClosure};

/// Upstream fetch timeout.
const FETCH_TIMEOUT_SECS: u64 = 10;
/// In-tick retry attempts.
const FETCH_ATTEMPTS: u32 = 3;
/// Fixed pause between in-tick retries.
const RETRY_PAUSE_MS: u64 = 500;

/// The two known upstream document shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamShape {
    Widget,
    Regional,
}

impl UpstreamShape {
    /// The shape to try after this one failed.
    pub fn other(self) -> Self {
        match self {
            UpstreamShape::Widget => UpstreamShape::Regional,
            UpstreamShape::Regional => UpstreamShape::Widget,
        }
    }
}

/// Upstream errors; all transient, all retried with backoff.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),
    #[error("malformed payload: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("payload contained no bridges")]
    Empty,
}

/// One bridge as normalized out of either upstream shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBridge {
    pub name: String,
    pub status: BridgeStatus,
    pub upcoming_closures: Vec<UpcomingClosure>,
}

// ============================================================================
// Status normalization
// ============================================================================

/// Map a raw upstream status string to the normalized set.
pub fn normalize_status(raw: &str) -> BridgeStatus {
    let s = raw.trim().to_ascii_lowercase();
    if s.contains("raising soon") {
        BridgeStatus::ClosingSoon
    } else if s.contains("work in progress") {
        BridgeStatus::Construction
    } else if s.contains("lowering") {
        BridgeStatus::Opening
    } else if s.contains("raising") {
        BridgeStatus::Closing
    } else if s.contains("unavailable") {
        BridgeStatus::Closed
    } else if s.contains("available") {
        BridgeStatus::Open
    } else {
        BridgeStatus::Unknown
    }
}

/// The canonical raw string for each normalized status, as the upstream
/// spells it.
pub fn canonical_raw(status: BridgeStatus) -> &'static str {
    match status {
        BridgeStatus::Open => "Available",
        BridgeStatus::ClosingSoon => "Available (Raising Soon)",
        BridgeStatus::Closed => "Unavailable",
        BridgeStatus::Opening => "Unavailable (Lowering)",
        BridgeStatus::Closing => "Unavailable (Raising)",
        BridgeStatus::Construction => "Unavailable (Work in Progress)",
        BridgeStatus::Unknown => "Unknown",
    }
}

fn lift_kind(raw: &str) -> Option<ClosureKind> {
    let s = raw.trim().to_ascii_lowercase();
    if s.contains("commercial") {
        Some(ClosureKind::CommercialVessel)
    } else if s.contains("pleasure") {
        Some(ClosureKind::PleasureCraft)
    } else if s.contains("arrival") {
        Some(ClosureKind::NextArrival)
    } else {
        None
    }
}

/// Scheduled events with this type are bridge outages; everything else is
/// ignored.
const EVENT_TYPE_BRIDGE_OUTAGE: i64 = 1;

/// Parse an upstream timestamp: RFC 3339 first, then the zone-less local
/// forms the legacy widget emits, interpreted in the configured zone.
fn parse_time(raw: &str, tz: Tz) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            if let Some(local) = tz.from_local_datetime(&naive).earliest() {
                return Some(local.with_timezone(&Utc));
            }
        }
    }
    None
}

// ============================================================================
// Shape Widget: legacy per-region array
// ============================================================================

#[derive(Debug, Deserialize)]
struct WidgetBridge {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Status")]
    status: String,
    #[serde(rename = "BridgeLiftList", default)]
    bridge_lift_list: Vec<WidgetLift>,
    // BridgeLiftListE deliberately not deserialized; see module docs.
    #[serde(rename = "ScheduledEventList", default)]
    scheduled_event_list: Vec<WidgetEvent>,
}

#[derive(Debug, Deserialize)]
struct WidgetLift {
    #[serde(rename = "LiftType")]
    lift_type: String,
    #[serde(rename = "EstimatedTime")]
    estimated_time: String,
    #[serde(rename = "LongerThanUsual", default)]
    longer_than_usual: bool,
}

#[derive(Debug, Deserialize)]
struct WidgetEvent {
    #[serde(rename = "EventTypeId")]
    event_type_id: i64,
    #[serde(rename = "StartDateTime")]
    start_date_time: String,
    #[serde(rename = "EndDateTime", default)]
    end_date_time: Option<String>,
}

// ============================================================================
// Shape Regional: newer nested document
// ============================================================================

#[derive(Debug, Deserialize)]
struct RegionalDocument {
    regions: Vec<RegionalRegion>,
}

#[derive(Debug, Deserialize)]
struct RegionalRegion {
    #[serde(default)]
    bridges: Vec<RegionalBridge>,
}

#[derive(Debug, Deserialize)]
struct RegionalBridge {
    name: String,
    #[serde(rename = "currentStatus")]
    current_status: String,
    #[serde(rename = "bridgeLiftList", default)]
    bridge_lift_list: Vec<RegionalLift>,
    #[serde(rename = "scheduledEvents", default)]
    scheduled_events: Vec<RegionalEvent>,
}

#[derive(Debug, Deserialize)]
struct RegionalLift {
    #[serde(rename = "liftType")]
    lift_type: String,
    #[serde(rename = "estimatedTime")]
    estimated_time: String,
    #[serde(default)]
    longer: bool,
}

#[derive(Debug, Deserialize)]
struct RegionalEvent {
    #[serde(rename = "eventTypeId")]
    event_type_id: i64,
    #[serde(rename = "eventStart")]
    event_start: String,
    #[serde(rename = "eventEnd", default)]
    event_end: Option<String>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse an upstream body with the given shape into normalized records.
/// An empty result is an error, indistinguishable in treatment from a
/// malformed payload.
pub fn parse(shape: UpstreamShape, body: &[u8], tz: Tz) -> Result<Vec<RawBridge>, UpstreamError> {
    let bridges = match shape {
        UpstreamShape::Widget => {
            let raw: Vec<WidgetBridge> = serde_json::from_slice(body)?;
            raw.into_iter().map(|b| widget_bridge(b, tz)).collect::<Vec<_>>()
        }
        UpstreamShape::Regional => {
            let document: RegionalDocument = serde_json::from_slice(body)?;
            document
                .regions
                .into_iter()
                .flat_map(|r| r.bridges)
                .map(|b| regional_bridge(b, tz))
                .collect()
        }
    };

    if bridges.is_empty() {
        return Err(UpstreamError::Empty);
    }
    Ok(bridges)
}

fn widget_bridge(bridge: WidgetBridge, tz: Tz) -> RawBridge {
    let mut closures = Vec::new();

    for event in &bridge.scheduled_event_list {
        if event.event_type_id != EVENT_TYPE_BRIDGE_OUTAGE {
            continue;
        }
        let Some(time) = parse_time(&event.start_date_time, tz) else {
            debug!("unparsable event time '{}' on {}", event.start_date_time, bridge.name);
            continue;
        };
        closures.push(construction_closure(
            time,
            event.end_date_time.as_deref().and_then(|e| parse_time(e, tz)),
        ));
    }

    for lift in &bridge.bridge_lift_list {
        let Some(kind) = lift_kind(&lift.lift_type) else {
            debug!("unknown lift type '{}' on {}", lift.lift_type, bridge.name);
            continue;
        };
        let Some(time) = parse_time(&lift.estimated_time, tz) else {
            continue;
        };
        closures.push(lift_closure(kind, time, lift.longer_than_usual));
    }

    finish_bridge(bridge.name, &bridge.status, closures)
}

fn regional_bridge(bridge: RegionalBridge, tz: Tz) -> RawBridge {
    let mut closures = Vec::new();

    for event in &bridge.scheduled_events {
        if event.event_type_id != EVENT_TYPE_BRIDGE_OUTAGE {
            continue;
        }
        let Some(time) = parse_time(&event.event_start, tz) else {
            continue;
        };
        closures.push(construction_closure(
            time,
            event.event_end.as_deref().and_then(|e| parse_time(e, tz)),
        ));
    }

    for lift in &bridge.bridge_lift_list {
        let Some(kind) = lift_kind(&lift.lift_type) else {
            continue;
        };
        let Some(time) = parse_time(&lift.estimated_time, tz) else {
            continue;
        };
        closures.push(lift_closure(kind, time, lift.longer));
    }

    finish_bridge(bridge.name, &bridge.current_status, closures)
}

fn construction_closure(time: DateTime<Utc>, end_time: Option<DateTime<Utc>>) -> UpcomingClosure {
    UpcomingClosure {
        kind: ClosureKind::Construction,
        time,
        longer: None,
        expected_duration_minutes: None,
        end_time,
    }
}

fn lift_closure(kind: ClosureKind, time: DateTime<Utc>, longer: bool) -> UpcomingClosure {
    UpcomingClosure {
        kind,
        time,
        longer: Some(longer),
        expected_duration_minutes: kind.expected_duration_minutes(longer),
        end_time: None,
    }
}

fn finish_bridge(name: String, raw_status: &str, mut closures: Vec<UpcomingClosure>) -> RawBridge {
    closures.sort_by_key(|c| c.time);
    RawBridge { name, status: normalize_status(raw_status), upcoming_closures: closures }
}

// ============================================================================
// Fetch client
// ============================================================================

/// HTTP client for the upstream endpoints. TLS verification can be disabled
/// for exactly one configured host — the documented workaround for its broken
/// certificate chain — and nothing else.
pub struct UpstreamClient {
    http: reqwest::Client,
    insecure: Option<(String, reqwest::Client)>,
}

impl UpstreamClient {
    pub fn new(insecure_host: Option<&str>) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(FETCH_TIMEOUT_SECS);
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()?;

        let insecure = match insecure_host {
            Some(host) => {
                let client = reqwest::Client::builder()
                    .timeout(timeout)
                    .connect_timeout(timeout)
                    .danger_accept_invalid_certs(true)
                    .build()?;
                Some((host.to_string(), client))
            }
            None => None,
        };

        Ok(Self { http, insecure })
    }

    fn client_for(&self, url: &str) -> &reqwest::Client {
        if let Some((host, client)) = &self.insecure {
            if reqwest::Url::parse(url)
                .ok()
                .and_then(|u| u.host_str().map(|h| h == host))
                .unwrap_or(false)
            {
                return client;
            }
        }
        &self.http
    }

    /// Fetch an endpoint with up to three attempts and a short fixed pause
    /// between them. Per-tick retries only; cross-tick backoff is the
    /// caller's job.
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, UpstreamError> {
        let client = self.client_for(url);
        let mut last_error = None;

        for attempt in 1..=FETCH_ATTEMPTS {
            match client.get(url).send().await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        last_error = Some(UpstreamError::Status(status));
                    } else {
                        match response.bytes().await {
                            Ok(body) => return Ok(body.to_vec()),
                            Err(e) => last_error = Some(UpstreamError::Http(e)),
                        }
                    }
                }
                Err(e) => last_error = Some(UpstreamError::Http(e)),
            }

            if attempt < FETCH_ATTEMPTS {
                tokio::time::sleep(Duration::from_millis(RETRY_PAUSE_MS)).await;
            }
        }

        Err(last_error.unwrap_or(UpstreamError::Empty))
    }
}
