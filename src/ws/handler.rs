//! WebSocket upgrade handler: the transport boundary
//!
//! Each connection gets a fresh client id, a reader loop that forwards
//! binary frames to the game loop and a writer task draining the
//! connection's outbound queue.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::game::TransportEvent;
use crate::http::AppError;
use crate::util::rate_limit::ConnectionRateLimiter;
use crate::ws::clients::ClientId;

/// Frames queued per connection before new ones are dropped
const OUTBOUND_BUFFER: usize = 256;

/// WebSocket upgrade handler
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> Result<Response, AppError> {
    if state.server.events().is_closed() {
        return Err(AppError::Unavailable("game loop is not running".to_string()));
    }

    let Some(client) = state.next_client_id() else {
        warn!("Client ids exhausted, refusing connection");
        return Err(AppError::Unavailable("no client ids left".to_string()));
    };
    info!(client = %client, "WebSocket upgrade");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, client, state)))
}

/// Handle the upgraded WebSocket connection
async fn handle_socket(socket: WebSocket, client: ClientId, state: AppState) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (outbound, mut outbound_rx) = mpsc::channel::<Bytes>(OUTBOUND_BUFFER);
    let events = state.server.events().clone();

    if events
        .send(TransportEvent::Connected { client, outbound })
        .await
        .is_err()
    {
        warn!(client = %client, "Game loop gone, closing connection");
        return;
    }
    info!(client = %client, "New WebSocket connection");

    // Writer task: outbound queue -> WebSocket
    let writer_handle = tokio::spawn(async move {
        while let Some(data) = outbound_rx.recv().await {
            if let Err(e) = ws_sink.send(Message::Binary(data.to_vec())).await {
                debug!(client = %client, error = %e, "WebSocket send failed");
                break;
            }
        }
    });

    // Reader loop: WebSocket -> game loop
    let rate_limiter = ConnectionRateLimiter::new(state.config.input_rate_limit);
    while let Some(result) = ws_stream.next().await {
        match result {
            Ok(Message::Binary(data)) => {
                if !rate_limiter.check_frame() {
                    warn!(client = %client, "Rate limited inbound frame");
                    continue;
                }

                let event = TransportEvent::Message {
                    client,
                    data: Bytes::from(data),
                };
                if events.send(event).await.is_err() {
                    debug!(client = %client, "Event channel closed");
                    break;
                }
            }
            Ok(Message::Text(_)) => {
                debug!(client = %client, "Received text message, ignoring");
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => {
                info!(client = %client, "Client initiated close");
                break;
            }
            Err(e) => {
                error!(client = %client, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Signal disconnect to the game loop
    let _ = events.send(TransportEvent::Disconnected { client }).await;
    writer_handle.abort();

    info!(client = %client, "WebSocket connection closed");
}
