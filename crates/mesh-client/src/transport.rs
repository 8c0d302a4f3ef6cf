//! WebSocket connection to the relay.
//!
//! The socket is split into a writer task draining an outbound queue of
//! [`ClientEvent`]s and a reader task decoding [`ServerEvent`]s into an
//! inbound queue. The inbound queue ends when the socket closes.

use crate::errors::MeshError;

use futures::{SinkExt, StreamExt};
use room_protocol::{decode_server_event, encode_client_event, ClientEvent, ServerEvent};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Queue sizes in each direction.
const CONNECTION_BUFFER: usize = 256;

/// An open relay channel.
pub struct RelayConnection {
    /// Events to send to the relay.
    pub outbound: mpsc::Sender<ClientEvent>,
    /// Events from the relay; yields `None` once the socket is closed.
    pub inbound: mpsc::Receiver<ServerEvent>,
    /// Cancelling closes the socket.
    pub cancel_token: CancellationToken,
}

/// Open a channel to the relay at `url` (e.g. `ws://localhost:5000/ws`).
pub async fn connect(url: &str, cancel_token: CancellationToken) -> Result<RelayConnection, MeshError> {
    let (stream, _response) = connect_async(url).await?;
    info!(target: "mesh.transport", url, "Connected to relay");

    let (mut sink, mut source) = stream.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ClientEvent>(CONNECTION_BUFFER);
    let (inbound_tx, inbound_rx) = mpsc::channel::<ServerEvent>(CONNECTION_BUFFER);

    let writer_token = cancel_token.clone();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                () = writer_token.cancelled() => break,
                event = outbound_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match encode_client_event(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(
                                target: "mesh.transport",
                                event = event.name(),
                                error = %e,
                                "Failed to encode event"
                            );
                            continue;
                        }
                    };
                    if let Err(e) = sink.send(Message::Text(text.into())).await {
                        debug!(target: "mesh.transport", error = %e, "Socket write failed");
                        break;
                    }
                }
            }
        }
        writer_token.cancel();
        let _ = sink.close().await;
    });

    let reader_token = cancel_token.clone();
    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                () = reader_token.cancelled() => break,
                frame = source.next() => frame,
            };

            let message = match frame {
                None => break,
                Some(Err(e)) => {
                    debug!(target: "mesh.transport", error = %e, "Socket read failed");
                    break;
                }
                Some(Ok(message)) => message,
            };

            if message.is_close() {
                break;
            }
            if !message.is_text() {
                // Pings are answered by tungstenite
                continue;
            }

            let event = match message.to_text().map_err(MeshError::from).and_then(|text| {
                decode_server_event(text).map_err(MeshError::from)
            }) {
                Ok(event) => event,
                Err(e) => {
                    warn!(
                        target: "mesh.transport",
                        error = %e,
                        "Ignoring undecodable frame"
                    );
                    continue;
                }
            };

            if inbound_tx.send(event).await.is_err() {
                break;
            }
        }
        reader_token.cancel();
        info!(target: "mesh.transport", "Relay connection closed");
    });

    Ok(RelayConnection {
        outbound: outbound_tx,
        inbound: inbound_rx,
        cancel_token,
    })
}
