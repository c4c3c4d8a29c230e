//! WebSocket connection handling
//!
//! One task per client. On accept nothing is sent; the client must
//! subscribe. Every inbound text frame is parsed as JSON and the only
//! recognized action is `{"action":"subscribe","channels":[...]}` — anything
//! else is ignored and the connection continues. After a subscribe the
//! server acknowledges, then immediately sends the current state for each
//! subscribed top-level channel, then pushes filtered payloads on change.

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::broadcast;
use tracing::debug;

use crate::api::ApiState;
use crate::app::Event;
use crate::types::SubscriptionSet;

/// A send slower than this marks the connection for removal.
const SEND_TIMEOUT_SECS: u64 = 5;

/// The one message clients may send.
#[derive(Debug, Deserialize)]
struct ClientMessage {
    action: String,
    #[serde(default)]
    channels: Vec<String>,
}

/// GET /ws — upgrade and hand the socket to a client session.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn client_session(socket: WebSocket, state: ApiState) {
    state.ctx.ws_clients.fetch_add(1, Ordering::Relaxed);
    drive_client(socket, &state).await;
    state.ctx.ws_clients.fetch_sub(1, Ordering::Relaxed);
}

/// Sink half of the socket plus the send timeout policy.
struct ClientSink {
    sink: futures::stream::SplitSink<WebSocket, Message>,
}

impl ClientSink {
    /// Send one JSON value; `Err` means the connection is done.
    async fn send(&mut self, value: serde_json::Value) -> Result<(), ()> {
        let frame = Message::Text(value.to_string());
        match tokio::time::timeout(
            Duration::from_secs(SEND_TIMEOUT_SECS),
            self.sink.send(frame),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            _ => Err(()),
        }
    }

    async fn close_for_shutdown(&mut self) {
        let frame = Message::Close(Some(CloseFrame {
            code: axum::extract::ws::close_code::AWAY,
            reason: "server shutting down".into(),
        }));
        let _ = self.sink.send(frame).await;
        let _ = self.sink.flush().await;
    }
}

async fn drive_client(socket: WebSocket, state: &ApiState) {
    let (sink, mut stream) = socket.split();
    let mut sink = ClientSink { sink };
    let mut events = state.ctx.events.subscribe();
    let mut subs = SubscriptionSet::default();

    loop {
        tokio::select! {
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if handle_client_text(&text, &mut subs, &mut sink, state).await.is_err() {
                            return;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => return,
                    Some(Ok(_)) => {} // binary / ping / pong: ignored
                    Some(Err(_)) => return,
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if deliver(event, &subs, &mut sink).await.is_err() {
                            return;
                        }
                    }
                    // Fell behind the broadcast buffer: fine, the next
                    // change carries the full state anyway.
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!("client lagged {} events", skipped);
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
            _ = state.shutdown.cancelled() => {
                sink.close_for_shutdown().await;
                return;
            }
        }
    }
}

/// Parse and act on one inbound frame. Protocol errors are dropped silently;
/// only a send failure ends the connection.
async fn handle_client_text(
    text: &str,
    subs: &mut SubscriptionSet,
    sink: &mut ClientSink,
    state: &ApiState,
) -> Result<(), ()> {
    let Ok(message) = serde_json::from_str::<ClientMessage>(text) else {
        return Ok(());
    };
    if message.action != "subscribe" {
        return Ok(());
    }

    let accepted = subs.replace(&message.channels);

    // Acknowledgement precedes the initial data push.
    sink.send(json!({ "type": "subscribed", "channels": accepted })).await?;

    if subs.wants_bridges() {
        let snapshot = state.ctx.current_snapshot();
        let data = match subs.bridge_filter() {
            None => serde_json::to_value(&*snapshot),
            Some(regions) => serde_json::to_value(snapshot.filtered(regions)),
        }
        .unwrap_or(serde_json::Value::Null);
        sink.send(json!({ "type": "bridges", "data": data })).await?;
    }

    if subs.wants_boats() {
        let payload = state.ctx.boats_payload();
        let data = match subs.boat_filter() {
            None => serde_json::to_value(&payload),
            Some(regions) => serde_json::to_value(payload.filtered_to(regions)),
        }
        .unwrap_or(serde_json::Value::Null);
        sink.send(json!({ "type": "boats", "data": data })).await?;
    }

    Ok(())
}

/// Deliver one event if the client's subscriptions want it.
async fn deliver(event: Event, subs: &SubscriptionSet, sink: &mut ClientSink) -> Result<(), ()> {
    match event {
        Event::BridgeSnapshotChanged(snapshot) => {
            if !subs.wants_bridges() {
                return Ok(());
            }
            let data = match subs.bridge_filter() {
                None => serde_json::to_value(&*snapshot),
                Some(regions) => serde_json::to_value(snapshot.filtered(regions)),
            }
            .unwrap_or(serde_json::Value::Null);
            sink.send(json!({ "type": "bridges", "data": data })).await
        }
        Event::VesselRegistryChanged(payload) => {
            if !subs.wants_boats() {
                return Ok(());
            }
            let data = match subs.boat_filter() {
                None => serde_json::to_value(&*payload),
                Some(regions) => serde_json::to_value(payload.filtered_to(regions)),
            }
            .unwrap_or(serde_json::Value::Null);
            sink.send(json!({ "type": "boats", "data": data })).await
        }
    }
}
