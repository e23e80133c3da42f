//! WebSocket transport
//!
//! `GET /ws?username=<name>&userID=<id>`
//!
//! The handshake is validated before the upgrade, so a rejected client gets a
//! plain HTTP 400 with a JSON error body. After the upgrade one task reads frames
//! into the connection handler and a second forwards the handler's outbox to the
//! socket.

use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::config::AppState;
use crate::connection::ConnectionHandler;
use crate::error::Result;
use crate::models::{Handshake, OutboundEvent};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(handshake): Query<Handshake>,
) -> Result<Response> {
    let (tx, rx) = mpsc::channel(state.config.outbox_capacity);
    let mut handler = ConnectionHandler::new(state.relay.clone(), tx);
    handler.handshake(handshake)?;

    Ok(ws.on_upgrade(move |socket| run_socket(socket, handler, rx)))
}

async fn run_socket(
    socket: WebSocket,
    mut handler: ConnectionHandler,
    mut outbox: mpsc::Receiver<OutboundEvent>,
) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let forward_task = tokio::spawn(async move {
        while let Some(event) = outbox.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!("[WebSocket] Failed to encode {}: {}", event.name(), e);
                    continue;
                }
            };
            if ws_sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => handler.handle_text(text.as_str()).await,
            Ok(WsMessage::Binary(_)) => debug!("[WebSocket] Ignoring binary frame"),
            Ok(WsMessage::Close(_)) => break,
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {}
            Err(e) => {
                debug!("[WebSocket] Receive error: {}", e);
                break;
            }
        }
    }

    handler.disconnect();
    drop(handler);
    forward_task.abort();
}
