//! WebSocket subscription endpoint.
//!
//! A connected client only listens. Whatever it sends is treated as a
//! liveness signal and dropped; the read loop exists to notice the disconnect.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::AppState;
use crate::hub::{BroadcastHub, SendError, Subscriber};

/// Outbound half of one WebSocket, registered with the hub.
pub struct WsSubscriber {
    sink: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSubscriber {
    pub fn new(sink: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sink: Mutex::new(sink),
        }
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn send_text(&self, text: &str) -> Result<(), SendError> {
        self.sink
            .lock()
            .await
            .send(Message::Text(text.to_owned().into()))
            .await
            .map_err(|e| SendError(e.to_string()))
    }
}

pub async fn subscribe(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.hub))
}

async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let (sink, mut stream) = socket.split();
    let id = hub.register(Arc::new(WsSubscriber::new(sink)));

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(target: "ws", %id, error = %e, "websocket read failed");
                break;
            }
        }
    }

    hub.unregister(id);
}
