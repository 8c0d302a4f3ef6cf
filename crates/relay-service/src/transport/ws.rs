//! WebSocket transport.
//!
//! Each upgraded socket becomes one relay channel:
//!
//! 1. An [`EndpointId`] is assigned and the channel is attached to its room,
//!    which queues `welcome`.
//! 2. A writer task drains the channel's outbound queue onto the socket and
//!    pings the client every `ping_interval`.
//! 3. The reader loop decodes each text frame exactly once and forwards it to
//!    the room actor. Undecodable frames are logged and skipped.
//! 4. When either side ends, or the client is silent for `idle_timeout`, the
//!    room is told the channel closed and evicts it.

use crate::actors::{RoomActorHandle, RoomControllerActorHandle};
use crate::config::{Config, ConfigError};
use crate::observability::metrics as prom;
use crate::room::ChannelHandle;

use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::{header, HeaderValue, Method};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use room_protocol::{decode_client_event, encode_server_event, EndpointId, RoomId, ServerEvent};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, instrument, warn};

/// Shared state of the WebSocket routes.
#[derive(Clone)]
pub struct AppState {
    pub controller: RoomControllerActorHandle,
    pub config: Arc<Config>,
}

/// Routes `GET /ws` (default room) and `GET /rooms/:room_id/ws`.
pub fn relay_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(default_room_handler))
        .route("/rooms/:room_id/ws", get(named_room_handler))
        .with_state(state)
}

/// CORS for the browser client: a single origin with credentials.
pub fn cors_layer(allowed_origin: &str) -> Result<CorsLayer, ConfigError> {
    let origin = HeaderValue::from_str(allowed_origin).map_err(|e| {
        ConfigError::InvalidValue(format!("RELAY_ALLOWED_ORIGIN {allowed_origin:?}: {e}"))
    })?;

    Ok(CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true))
}

async fn default_room_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let room_id = state.config.default_room.clone();
    upgrade(ws, state, room_id)
}

async fn named_room_handler(
    ws: WebSocketUpgrade,
    Path(room_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    upgrade(ws, state, RoomId::new(room_id))
}

fn upgrade(ws: WebSocketUpgrade, state: AppState, room_id: RoomId) -> Response {
    ws.max_message_size(state.config.max_message_bytes)
        .on_upgrade(move |socket| handle_socket(socket, state, room_id))
}

/// Why the reader loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadEnd {
    /// Client closed the socket or the stream ended.
    ClientClosed,
    /// The relay closed the channel (eviction or shutdown).
    RelayClosed,
    /// No frame within `idle_timeout`.
    IdleTimeout,
    /// Socket error or the room stopped accepting events.
    Failed,
}

impl ReadEnd {
    const fn as_str(self) -> &'static str {
        match self {
            ReadEnd::ClientClosed => "client_closed",
            ReadEnd::RelayClosed => "relay_closed",
            ReadEnd::IdleTimeout => "idle_timeout",
            ReadEnd::Failed => "failed",
        }
    }
}

#[instrument(
    skip_all,
    name = "relay.transport.ws",
    fields(room_id = %room_id, endpoint_id = tracing::field::Empty)
)]
async fn handle_socket(socket: WebSocket, state: AppState, room_id: RoomId) {
    let endpoint_id = EndpointId::new();
    tracing::Span::current().record("endpoint_id", tracing::field::display(endpoint_id));
    let opened_at = Instant::now();

    let cancel_token = state.controller.child_token();
    let (channel, outbound) =
        ChannelHandle::channel(endpoint_id, state.config.channel_buffer, cancel_token.clone());
    let (mut sink, mut stream) = socket.split();

    let room = match state.controller.open_channel(room_id.clone(), channel).await {
        Ok(room) => room,
        Err(e) => {
            warn!(
                target: "relay.transport.ws",
                error = %e,
                "Channel rejected"
            );
            let _ = sink
                .send(Message::Close(Some(CloseFrame {
                    code: close_code::AGAIN,
                    reason: Cow::Borrowed(e.client_message()),
                })))
                .await;
            return;
        }
    };

    info!(target: "relay.transport.ws", "Channel opened");

    let writer = tokio::spawn(write_loop(
        sink,
        outbound,
        cancel_token.clone(),
        state.config.ping_interval,
    ));

    let end = read_loop(
        &mut stream,
        &room,
        endpoint_id,
        &cancel_token,
        state.config.idle_timeout,
    )
    .await;

    // Stops the writer if the reader ended first
    cancel_token.cancel();

    if let Err(e) = room.channel_closed(endpoint_id).await {
        debug!(
            target: "relay.transport.ws",
            error = %e,
            "Room gone before channel close"
        );
    }

    if let Err(e) = writer.await {
        warn!(
            target: "relay.transport.ws",
            error = ?e,
            "Writer task failed"
        );
    }

    let duration = opened_at.elapsed();
    prom::record_channel_duration(duration);
    info!(
        target: "relay.transport.ws",
        reason = end.as_str(),
        duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        "Channel closed"
    );
}

async fn read_loop(
    stream: &mut SplitStream<WebSocket>,
    room: &RoomActorHandle,
    endpoint_id: EndpointId,
    cancel_token: &CancellationToken,
    idle_timeout: Duration,
) -> ReadEnd {
    loop {
        let frame = tokio::select! {
            () = cancel_token.cancelled() => return ReadEnd::RelayClosed,
            frame = tokio::time::timeout(idle_timeout, stream.next()) => frame,
        };

        let message = match frame {
            Err(_) => {
                info!(
                    target: "relay.transport.ws",
                    idle_timeout_secs = idle_timeout.as_secs(),
                    "Channel idle, closing"
                );
                return ReadEnd::IdleTimeout;
            }
            Ok(None) => return ReadEnd::ClientClosed,
            Ok(Some(Err(e))) => {
                debug!(
                    target: "relay.transport.ws",
                    error = %e,
                    "Socket read failed"
                );
                return ReadEnd::Failed;
            }
            Ok(Some(Ok(message))) => message,
        };

        match message {
            Message::Text(text) => match decode_client_event(&text) {
                Ok(event) => {
                    if room.client_event(endpoint_id, event).await.is_err() {
                        return ReadEnd::Failed;
                    }
                }
                Err(e) => {
                    warn!(
                        target: "relay.transport.ws",
                        error = %e,
                        "Ignoring undecodable frame"
                    );
                    prom::record_frame_rejected();
                }
            },
            Message::Binary(_) => {
                warn!(
                    target: "relay.transport.ws",
                    "Ignoring binary frame"
                );
                prom::record_frame_rejected();
            }
            Message::Close(_) => return ReadEnd::ClientClosed,
            // Pings are answered by axum; pongs only refresh the idle timer
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<ServerEvent>,
    cancel_token: CancellationToken,
    ping_interval: Duration,
) {
    let mut ping = tokio::time::interval_at(Instant::now() + ping_interval, ping_interval);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,

            event = outbound.recv() => {
                let Some(event) = event else { break };
                let text = match encode_server_event(&event) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(
                            target: "relay.transport.ws",
                            event = event.name(),
                            error = %e,
                            "Failed to encode event"
                        );
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }

            _ = ping.tick() => {
                if sink.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    // A write failure ends the reader too
    cancel_token.cancel();
    let _ = sink
        .send(Message::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: Cow::Borrowed(""),
        })))
        .await;
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cors_layer_accepts_origin() {
        assert!(cors_layer("http://localhost:5173").is_ok());
    }

    #[test]
    fn test_cors_layer_rejects_invalid_origin() {
        let result = cors_layer("http://bad\norigin");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_read_end_labels() {
        assert_eq!(ReadEnd::IdleTimeout.as_str(), "idle_timeout");
        assert_eq!(ReadEnd::RelayClosed.as_str(), "relay_closed");
    }
}
