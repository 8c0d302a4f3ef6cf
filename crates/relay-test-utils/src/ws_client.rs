//! WebSocket client for end-to-end relay tests.

use futures::{SinkExt, StreamExt};
use room_protocol::{
    decode_server_event, encode_client_event, ClientEvent, EndpointId, RoomId, ServerEvent,
};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::recorder::{describe, EVENT_TIMEOUT};

/// A connected relay client that has already consumed its `welcome`.
pub struct WsTestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub endpoint_id: EndpointId,
    pub room_id: RoomId,
}

impl WsTestClient {
    /// Connect and wait for the `welcome` handshake.
    ///
    /// # Panics
    ///
    /// Panics if the connection fails or the first event is not `welcome`.
    pub async fn connect(url: &str) -> Self {
        let (stream, _) = connect_async(url).await.expect("Failed to connect");
        let mut client = Self {
            stream,
            endpoint_id: EndpointId::new(),
            room_id: RoomId::default(),
        };
        match client.next().await {
            ServerEvent::Welcome {
                endpoint_id,
                room_id,
            } => {
                client.endpoint_id = endpoint_id;
                client.room_id = room_id;
            }
            other => panic!("expected welcome, got {other:?}"),
        }
        client
    }

    /// Connect and join under `name`.
    pub async fn join(url: &str, name: &str) -> Self {
        let mut client = Self::connect(url).await;
        client
            .send(&ClientEvent::Join {
                display_name: name.to_string(),
                user_id: None,
            })
            .await;
        client
    }

    pub async fn send(&mut self, event: &ClientEvent) {
        let text = encode_client_event(event).expect("encode");
        self.send_raw(text).await;
    }

    /// Send an arbitrary text frame.
    pub async fn send_raw(&mut self, text: String) {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .expect("Failed to send frame");
    }

    /// Wait for the next relay event, skipping control frames.
    pub async fn next(&mut self) -> ServerEvent {
        loop {
            let frame = tokio::time::timeout(EVENT_TIMEOUT, self.stream.next())
                .await
                .expect("Timeout waiting for relay event")
                .expect("Socket closed")
                .expect("Socket error");
            if frame.is_text() {
                let text = frame.to_text().expect("text frame");
                return decode_server_event(text).expect("decode");
            }
            if frame.is_close() {
                panic!("Socket closed by relay");
            }
        }
    }

    /// Wait for `count` events and describe them.
    pub async fn next_described(&mut self, count: usize) -> Vec<String> {
        let mut described = Vec::with_capacity(count);
        for _ in 0..count {
            described.push(describe(&self.next().await));
        }
        described
    }

    /// Whether the relay closes the socket within the event timeout.
    pub async fn closed_by_relay(&mut self) -> bool {
        loop {
            match tokio::time::timeout(EVENT_TIMEOUT, self.stream.next()).await {
                Err(_) => return false,
                Ok(None | Some(Err(_))) => return true,
                Ok(Some(Ok(frame))) if frame.is_close() => return true,
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
