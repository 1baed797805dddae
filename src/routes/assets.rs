//! # routes::assets
//!
//! | Method | Path           | Description                         |
//! |--------|----------------|-------------------------------------|
//! | GET    | `/api/health`  | Liveness + ledger mode              |
//! | GET    | `/api/assets`  | Registered assets with USD prices   |

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;

use crate::error::AppError;
use crate::state::SharedState;

/// GET /api/health
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":      true,
        "service": "crumb",
        "network": state.config.network,
        "ledger":  state.config.ledger.to_string(),
    }))
}

/// GET /api/assets
pub async fn list_assets(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    let assets = state.registry.list_assets().await?;
    let rows: Vec<_> = assets
        .iter()
        .map(|a| {
            json!({
                "id":        a.id,
                "coin_type": a.coin_type,
                "symbol":    a.symbol,
                "name":      a.name,
                "decimals":  a.decimals,
                "price_usd": a.price_usd,
                "price":     a.display_price(),
            })
        })
        .collect();

    Ok(Json(json!({
        "ok":     true,
        "count":  rows.len(),
        "assets": rows,
    })))
}
