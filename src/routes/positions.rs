//! # routes::positions
//!
//! | Method | Path                   | Description                                 |
//! |--------|------------------------|---------------------------------------------|
//! | GET    | `/api/positions`       | All live positions, `?owner=0x…` to filter  |
//! | GET    | `/api/positions/:id`   | One position with eligibility and next trade |

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::models::Position;
use crate::state::SharedState;

#[derive(Debug, Deserialize)]
pub struct PositionQuery {
    pub owner: Option<String>,
}

/// A position plus what the scheduler would make of it right now.
#[derive(Debug, Serialize)]
pub struct PositionView {
    #[serde(flatten)]
    pub position:      Position,
    pub eligible:      bool,
    pub next_trade_at: Option<DateTime<Utc>>,
}

impl PositionView {
    pub fn at(position: Position, now: DateTime<Utc>) -> Self {
        Self {
            eligible:      position.is_eligible_at(now),
            next_trade_at: position.next_trade_at(now),
            position,
        }
    }
}

/// GET /api/positions?owner=
pub async fn list_positions(
    State(state): State<SharedState>,
    Query(query): Query<PositionQuery>,
) -> Result<impl IntoResponse, AppError> {
    let now = Utc::now();
    let positions: Vec<PositionView> = state
        .store
        .list(query.owner.as_deref())
        .await?
        .into_iter()
        .map(|p| PositionView::at(p, now))
        .collect();

    Ok(Json(json!({
        "ok":        true,
        "count":     positions.len(),
        "positions": positions,
    })))
}

/// GET /api/positions/:id
pub async fn get_position(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    // fresh read; the cache may predate the last trade
    state.store.invalidate(&id).await;
    let position = state.store.get(&id).await?;

    Ok(Json(json!({
        "ok":       true,
        "position": PositionView::at(position, Utc::now()),
    })))
}
