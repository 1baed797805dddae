//! # ledger
//!
//! The [`LedgerGateway`] seam: everything the operator needs from the chain.
//!
//! ```text
//!  registry / store ──reads──▶ ┌────────────────────┐
//!                              │  LedgerGateway     │ ── RpcLedger    (node JSON-RPC + signer bridge)
//!  oracle / scheduler ─submit─▶│  (SerializedLedger)│ ── MemoryLedger (in-process contract)
//!                              └────────────────────┘
//! ```
//!
//! Reads return raw objects and events; typed parsing lives with the
//! registry and the position store. `submit` never fails for an on-chain
//! rejection (that is `SubmitResult { success: false, .. }`), only for
//! transport failures.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

pub mod memory;
pub mod rpc;
pub mod tx;

pub use tx::TransactionBlock;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger transport failed: {0}")]
    Transport(String),

    #[error("ledger node returned error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("malformed ledger response: {0}")]
    Decode(String),

    #[error("local ledger snapshot: {0}")]
    Snapshot(String),
}

impl From<reqwest::Error> for LedgerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            LedgerError::Decode(e.to_string())
        } else {
            LedgerError::Transport(e.to_string())
        }
    }
}

// ─── Raw Ledger Types ─────────────────────────────────────────────────────────

/// An object as stored on the ledger: a type tag plus its Move fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerObject {
    pub object_id:   String,
    pub object_type: String,
    /// Address owner; `None` for shared objects.
    pub owner:       Option<String>,
    pub fields:      serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEvent {
    pub event_type:   String,
    pub timestamp_ms: Option<u64>,
    pub parsed_json:  serde_json::Value,
}

/// An owned coin object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub coin_object_id: String,
    pub coin_type:      String,
    pub balance:        u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinMetadata {
    pub id:       String,
    pub symbol:   String,
    pub name:     String,
    pub decimals: u32,
}

/// Outcome of one transaction submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitResult {
    pub success: bool,
    pub digest:  String,
    #[serde(default)]
    pub errors:  Vec<String>,
}

impl SubmitResult {
    pub fn ok(digest: impl Into<String>) -> Self {
        Self { success: true, digest: digest.into(), errors: Vec::new() }
    }

    pub fn rejected(digest: impl Into<String>, error: impl Into<String>) -> Self {
        Self { success: false, digest: digest.into(), errors: vec![error.into()] }
    }
}

// ─── Gateway Trait ────────────────────────────────────────────────────────────

#[async_trait]
pub trait LedgerGateway: Send + Sync {
    async fn get_object(&self, object_id: &str) -> Result<Option<LedgerObject>, LedgerError>;

    /// Objects owned by `owner` whose type is exactly `struct_type`.
    async fn owned_objects(
        &self,
        owner: &str,
        struct_type: &str,
    ) -> Result<Vec<LedgerObject>, LedgerError>;

    /// All events of `event_type`, oldest first.
    async fn query_events(&self, event_type: &str) -> Result<Vec<LedgerEvent>, LedgerError>;

    async fn coins(&self, owner: &str, coin_type: &str) -> Result<Vec<Coin>, LedgerError>;

    async fn coin_metadata(&self, coin_type: &str) -> Result<Option<CoinMetadata>, LedgerError>;

    /// Sign as `signer` and execute `tx`.
    async fn submit(&self, signer: &str, tx: &TransactionBlock) -> Result<SubmitResult, LedgerError>;
}

pub type SharedLedger = Arc<dyn LedgerGateway>;

#[async_trait]
impl<L: LedgerGateway + ?Sized> LedgerGateway for Arc<L> {
    async fn get_object(&self, object_id: &str) -> Result<Option<LedgerObject>, LedgerError> {
        (**self).get_object(object_id).await
    }

    async fn owned_objects(
        &self,
        owner: &str,
        struct_type: &str,
    ) -> Result<Vec<LedgerObject>, LedgerError> {
        (**self).owned_objects(owner, struct_type).await
    }

    async fn query_events(&self, event_type: &str) -> Result<Vec<LedgerEvent>, LedgerError> {
        (**self).query_events(event_type).await
    }

    async fn coins(&self, owner: &str, coin_type: &str) -> Result<Vec<Coin>, LedgerError> {
        (**self).coins(owner, coin_type).await
    }

    async fn coin_metadata(&self, coin_type: &str) -> Result<Option<CoinMetadata>, LedgerError> {
        (**self).coin_metadata(coin_type).await
    }

    async fn submit(&self, signer: &str, tx: &TransactionBlock) -> Result<SubmitResult, LedgerError> {
        (**self).submit(signer, tx).await
    }
}

// ─── Per-Identity Serialization ───────────────────────────────────────────────

/// Wraps a gateway so that submissions from the same signing identity run one
/// at a time, in the order they acquire the lock.
///
/// The oracle loop and the executor loop may share a signer; concurrent
/// submissions from one identity would race on its sequence numbers and gas
/// coins. Reads pass straight through.
pub struct SerializedLedger<L> {
    inner: L,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<L: LedgerGateway> SerializedLedger<L> {
    pub fn new(inner: L) -> Self {
        Self { inner, locks: Mutex::new(HashMap::new()) }
    }

    async fn identity_lock(&self, signer: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(signer.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl<L: LedgerGateway> LedgerGateway for SerializedLedger<L> {
    async fn get_object(&self, object_id: &str) -> Result<Option<LedgerObject>, LedgerError> {
        self.inner.get_object(object_id).await
    }

    async fn owned_objects(
        &self,
        owner: &str,
        struct_type: &str,
    ) -> Result<Vec<LedgerObject>, LedgerError> {
        self.inner.owned_objects(owner, struct_type).await
    }

    async fn query_events(&self, event_type: &str) -> Result<Vec<LedgerEvent>, LedgerError> {
        self.inner.query_events(event_type).await
    }

    async fn coins(&self, owner: &str, coin_type: &str) -> Result<Vec<Coin>, LedgerError> {
        self.inner.coins(owner, coin_type).await
    }

    async fn coin_metadata(&self, coin_type: &str) -> Result<Option<CoinMetadata>, LedgerError> {
        self.inner.coin_metadata(coin_type).await
    }

    async fn submit(&self, signer: &str, tx: &TransactionBlock) -> Result<SubmitResult, LedgerError> {
        let lock = self.identity_lock(signer).await;
        let _guard = lock.lock().await;
        self.inner.submit(signer, tx).await
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// Block-explorer link for a transaction digest.
pub fn explorer_url(digest: &str, network: &str) -> String {
    format!("https://suiscan.xyz/{network}/tx/{digest}")
}

/// Canonical `0x<address>::module::Name` form of a coin type.
///
/// Contract events carry type names zero-padded and without `0x`
/// (`000…0002::sui::SUI`); operators type the short form (`0x2::sui::SUI`).
/// Both map to the same string.
pub fn normalize_coin_type(raw: &str) -> String {
    let raw = raw.trim();
    let Some((address, rest)) = raw.split_once("::") else {
        return raw.to_string();
    };
    let digits = address.strip_prefix("0x").unwrap_or(address).trim_start_matches('0');
    let digits = if digits.is_empty() { "0" } else { digits };
    format!("0x{}::{rest}", digits.to_ascii_lowercase())
}

/// Parse a JSON field holding a u64 (the node encodes them as strings).
pub fn field_u64(fields: &serde_json::Value, name: &str) -> Result<u64, LedgerError> {
    match fields.get(name) {
        Some(serde_json::Value::String(s)) => s
            .parse()
            .map_err(|_| LedgerError::Decode(format!("field `{name}` is not a u64: {s}"))),
        Some(serde_json::Value::Number(n)) => n
            .as_u64()
            .ok_or_else(|| LedgerError::Decode(format!("field `{name}` is not a u64: {n}"))),
        _ => Err(LedgerError::Decode(format!("missing field `{name}`"))),
    }
}

pub fn field_str(fields: &serde_json::Value, name: &str) -> Result<String, LedgerError> {
    fields
        .get(name)
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .ok_or_else(|| LedgerError::Decode(format!("missing string field `{name}`")))
}
