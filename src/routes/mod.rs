//! # routes — Read-only HTTP + WebSocket API
//!
//! ```text
//!  GET /api/health               open even with API_KEY set
//!  GET /api/assets
//!  GET /api/positions?owner=
//!  GET /api/positions/:id
//!  GET /api/stats
//!  WS  /ws/monitor               EngineEvent stream
//! ```

pub mod assets;
pub mod monitor;
pub mod positions;

use axum::{middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_api_key;
use crate::state::SharedState;

use assets::{health_check, list_assets};
use monitor::{get_stats, ws_monitor};
use positions::{get_position, list_positions};

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health",        get(health_check))
        .route("/api/assets",        get(list_assets))
        .route("/api/positions",     get(list_positions))
        .route("/api/positions/:id", get(get_position))
        .route("/api/stats",         get(get_stats))
        .route("/ws/monitor",        get(ws_monitor))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
