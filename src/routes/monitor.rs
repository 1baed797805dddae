//! # routes::monitor
//!
//! | Method    | Path           | Description                          |
//! |-----------|----------------|--------------------------------------|
//! | GET (WS)  | `/ws/monitor`  | Real-time [`EngineEvent`] stream     |
//! | GET       | `/api/stats`   | Engine counters and uptime           |
//!
//! [`EngineEvent`]: crate::events::EngineEvent

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tracing::{debug, info};

use crate::state::SharedState;

// ─── WebSocket Handler ────────────────────────────────────────────────────────

/// Each event arrives as one JSON text frame, after an initial `SNAPSHOT`.
pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 Monitor client connected");

    let snapshot = json!({
        "event":       "SNAPSHOT",
        "network":     state.config.network,
        "stats":       state.stats.snapshot(),
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
    })
    .to_string();

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        debug!("Monitor client lagged, skipped {n} events");
                    }
                    Err(_) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 Monitor client disconnected");
}

// ─── Stats ────────────────────────────────────────────────────────────────────

/// GET /api/stats
pub async fn get_stats(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":              true,
        "stats":           state.stats.snapshot(),
        "metadata_cache":  state.registry.metadata().len().await,
        "monitor_clients": state.broadcast_tx.receiver_count(),
        "started_at":      state.started_at,
        "uptime_secs":     (Utc::now() - state.started_at).num_seconds(),
    }))
}
