/**
 * WebSocket Server
 *
 * This module terminates browser WebSocket connections. Each connection
 * gets a random identity, an entry in the connection registry and a writer
 * task; inbound text frames are wrapped with the connection's identity and
 * cached session key and published to the listener queue without being
 * parsed beyond JSON well-formedness - validation is the listener's job.
 *
 * # Connection Lifecycle
 *
 * 1. Upgrade: register the endpoint at guest level, spawn the writer task
 * 2. Read loop: forward each text frame to the broker; a frame that is not
 *    JSON closes the connection
 * 3. Teardown: remove the endpoint from the registry first, then stop the
 *    writer, so the fanout never delivers to a dead connection
 */
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::shared::envelope::{InboundEnvelope, InboundHead};
use crate::shared::mq::MqConnection;
use crate::socket::registry::ConnectionRegistry;

/// Shared state of the socket service
#[derive(Clone)]
pub struct SocketState {
    /// Registry of connected endpoints, injected at startup
    pub registry: Arc<ConnectionRegistry>,
    /// Broker connection used to publish client requests
    pub publisher: Arc<MqConnection>,
}

/// Create the Axum application serving the WebSocket endpoint
pub fn create_app(state: SocketState) -> Router {
    Router::new().route("/ws", get(ws_handler)).with_state(state)
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<SocketState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Run one connection to completion
async fn handle_socket(socket: WebSocket, state: SocketState) {
    let connection_id = Uuid::new_v4().simple().to_string();
    let (mut sink, mut stream) = socket.split();

    let (sender, mut receiver) = mpsc::unbounded_channel::<String>();
    state.registry.insert(&connection_id, sender).await;
    tracing::info!(connection_id = %connection_id, "Socket connection opened");

    // Writer task: drains the registry channel into the socket
    let writer = tokio::spawn(async move {
        while let Some(text) = receiver.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(message) => message,
            Err(_) => break,
        };
        match message {
            Message::Text(text) => {
                // A client sending non-JSON gets disconnected
                let body: Value = match serde_json::from_str(text.as_str()) {
                    Ok(body) => body,
                    Err(_) => {
                        tracing::warn!(connection_id = %connection_id, "Closing connection on invalid JSON");
                        break;
                    }
                };

                let envelope = InboundEnvelope {
                    head: InboundHead {
                        connection_id: connection_id.clone(),
                        session_key: state.registry.session_key(&connection_id).await,
                    },
                    body,
                };
                if let Err(e) = state.publisher.publish_json(&envelope).await {
                    tracing::error!("Failed to publish client request: {:?}", e);
                    break;
                }
            }
            Message::Close(_) => break,
            // Pings are answered by axum itself; binary frames are ignored
            _ => {}
        }
    }

    state.registry.remove(&connection_id).await;
    writer.abort();
    tracing::info!(connection_id = %connection_id, "Socket connection closed");
}
