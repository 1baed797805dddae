//! # error
//!
//! Centralised error taxonomy for the operator.
//!
//! Per-item failures inside a loop cycle (one asset, one position) surface as
//! [`AppError`] and are logged at the item boundary; they never abort the
//! cycle. Startup failures (`MissingCredential`, bad config) are fatal and
//! bubble up to `main` through `anyhow`.
//!
//! API handlers return `Result<_, AppError>` too; the `IntoResponse` impl
//! turns them into `{ "ok": false, "error": ... }` bodies.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::ledger::LedgerError;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing asset, position, coin metadata or capability object.
    #[error("Not found: {0}")]
    NotFound(String),

    /// No signer configured, or the signer lacks a required capability.
    #[error("Missing credential: {0}")]
    MissingCredential(String),

    /// The ledger rejected the transaction.
    #[error("Transaction submission failed: {0}")]
    TransactionSubmission(String),

    /// A position references an asset that is not in the registry.
    #[error("Data consistency error: {0}")]
    DataConsistency(String),

    /// A price that cannot be represented in fixed-point.
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Insufficient balance: need {needed}, have {available}")]
    InsufficientBalance { needed: u64, available: u64 },

    /// Caller-supplied parameters rejected before anything is submitted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Transport-level failure talking to the ledger.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::InvalidPrice(_) => StatusCode::BAD_REQUEST,
            AppError::Ledger(_) | AppError::TransactionSubmission(_) => StatusCode::BAD_GATEWAY,
            AppError::MissingCredential(_) => StatusCode::UNAUTHORIZED,
            AppError::DataConsistency(_) | AppError::InsufficientBalance { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(json!({
            "ok":    false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}
