//! WebSocket stream of rate-limit changes
//!
//! Each client gets the current status on connect, then every change the
//! queue publishes.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;

use super::AppState;
use crate::queue::RateLimitStatus;

/// Events that can be sent over WebSocket
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum WsEvent {
    /// Rate-limit status changed
    #[serde(rename = "rate_limit")]
    RateLimit(RateLimitUpdate),
}

#[derive(Clone, Debug, Serialize)]
pub struct RateLimitUpdate {
    #[serde(flatten)]
    pub status: RateLimitStatus,
    pub seconds_until_retry: i64,
}

impl From<RateLimitStatus> for RateLimitUpdate {
    fn from(status: RateLimitStatus) -> Self {
        Self {
            seconds_until_retry: status.seconds_until_retry(),
            status,
        }
    }
}

impl From<RateLimitStatus> for WsEvent {
    fn from(status: RateLimitStatus) -> Self {
        WsEvent::RateLimit(status.into())
    }
}

fn encode(event: &WsEvent) -> Option<Message> {
    match serde_json::to_string(event) {
        Ok(json) => Some(Message::Text(json)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize WebSocket event");
            None
        }
    }
}

/// WebSocket upgrade handler
///
/// GET /api/v1/ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the snapshot so no change is missed
    let mut rx = state.signal.subscribe();
    let initial = WsEvent::from(state.signal.current());

    let mut send_task = tokio::spawn(async move {
        if let Some(msg) = encode(&initial) {
            if sender.send(msg).await.is_err() {
                return;
            }
        }
        loop {
            let status = match rx.recv().await {
                Ok(status) => status,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped = skipped, "WebSocket client lagged behind rate-limit updates");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(msg) = encode(&WsEvent::from(status)) else {
                continue;
            };
            if sender.send(msg).await.is_err() {
                // Client disconnected
                break;
            }
        }
    });

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Close(_) => {
                    tracing::debug!("Client requested close");
                    break;
                }
                // Pong is automatically sent by axum
                _ => {}
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::debug!("WebSocket connection closed");
}
