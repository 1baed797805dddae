//! # ledger::rpc
//!
//! **RpcLedger**: reads from a Sui full node over JSON-RPC and hands
//! transaction blocks to an external signer bridge for execution.
//!
//! ## Node methods used
//! | Gateway call     | JSON-RPC method          | Paginated |
//! |------------------|--------------------------|-----------|
//! | `get_object`     | `sui_getObject`          | no        |
//! | `owned_objects`  | `suix_getOwnedObjects`   | yes       |
//! | `query_events`   | `suix_queryEvents`       | yes       |
//! | `coins`          | `suix_getCoins`          | yes       |
//! | `coin_metadata`  | `suix_getCoinMetadata`   | no        |
//!
//! ## Signer Bridge Contract
//! The operator holds no keys. The bridge owns the keystore, signs as the
//! requested address and executes. It must accept POST `/tx/execute`:
//! ```json
//! { "signer": "0x…", "transaction": { "commands": [ … ], "gas_budget": 50000000 } }
//! ```
//! and reply with
//! ```json
//! { "digest": "8Jt…", "status": "success", "errors": [] }
//! ```
//! `status` other than `"success"` means the block was rejected on chain.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use super::{
    field_u64, normalize_coin_type, Coin, CoinMetadata, LedgerError, LedgerEvent, LedgerGateway,
    LedgerObject, SubmitResult, TransactionBlock,
};

const READ_TIMEOUT: Duration = Duration::from_secs(10);
const SUBMIT_TIMEOUT: Duration = Duration::from_secs(60);
const PAGE_LIMIT: u64 = 50;

pub fn default_rpc_url(network: &str) -> String {
    format!("https://fullnode.{network}.sui.io:443")
}

// ─── Wire Types ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error:  Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code:    i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page {
    #[serde(default)]
    data:          Vec<Value>,
    next_cursor:   Option<Value>,
    #[serde(default)]
    has_next_page: bool,
}

#[derive(Debug, Serialize)]
struct BridgeExecuteRequest<'a> {
    signer:      &'a str,
    transaction: &'a TransactionBlock,
}

#[derive(Debug, Deserialize)]
struct BridgeExecuteResponse {
    digest: String,
    status: String,
    #[serde(default)]
    errors: Vec<String>,
}

// ─── Response Parsing ─────────────────────────────────────────────────────────

/// Parse the `data` member of a `SuiObjectResponse`.
fn parse_object(data: &Value) -> Result<LedgerObject, LedgerError> {
    let object_id = data["objectId"]
        .as_str()
        .ok_or_else(|| LedgerError::Decode("object without objectId".into()))?
        .to_string();
    let object_type = data["type"]
        .as_str()
        .or_else(|| data["content"]["type"].as_str())
        .ok_or_else(|| LedgerError::Decode(format!("object {object_id} without type")))?
        .to_string();
    let owner = data["owner"]["AddressOwner"].as_str().map(str::to_string);
    let fields = data["content"]["fields"].clone();

    Ok(LedgerObject { object_id, object_type, owner, fields })
}

fn parse_event(raw: &Value) -> Result<LedgerEvent, LedgerError> {
    let event_type = raw["type"]
        .as_str()
        .ok_or_else(|| LedgerError::Decode("event without type".into()))?
        .to_string();
    let timestamp_ms = match raw.get("timestampMs") {
        Some(Value::Null) | None => None,
        Some(_) => Some(field_u64(raw, "timestampMs")?),
    };
    Ok(LedgerEvent { event_type, timestamp_ms, parsed_json: raw["parsedJson"].clone() })
}

fn parse_coin(raw: &Value) -> Result<Coin, LedgerError> {
    Ok(Coin {
        coin_object_id: raw["coinObjectId"]
            .as_str()
            .ok_or_else(|| LedgerError::Decode("coin without coinObjectId".into()))?
            .to_string(),
        coin_type:      normalize_coin_type(raw["coinType"].as_str().unwrap_or_default()),
        balance:        field_u64(raw, "balance")?,
    })
}

fn parse_metadata(raw: &Value) -> Result<CoinMetadata, LedgerError> {
    let decimals = field_u64(raw, "decimals")?;
    Ok(CoinMetadata {
        id:       raw["id"].as_str().unwrap_or_default().to_string(),
        symbol:   raw["symbol"].as_str().unwrap_or_default().to_string(),
        name:     raw["name"].as_str().unwrap_or_default().to_string(),
        decimals: u32::try_from(decimals)
            .map_err(|_| LedgerError::Decode(format!("decimals out of range: {decimals}")))?,
    })
}

// ─── RpcLedger ────────────────────────────────────────────────────────────────

pub struct RpcLedger {
    client:     reqwest::Client,
    rpc_url:    String,
    signer_url: Option<String>,
    request_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(client: reqwest::Client, rpc_url: String, signer_url: Option<String>) -> Self {
        Self { client, rpc_url, signer_url, request_id: AtomicU64::new(1) }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let id = self.request_id.fetch_add(1, Ordering::Relaxed);
        debug!(method, id, "→ rpc");

        let resp = self
            .client
            .post(&self.rpc_url)
            .json(&json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params }))
            .timeout(READ_TIMEOUT)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(LedgerError::Transport(format!("{method}: HTTP {status}: {body}")));
        }

        let body: RpcResponse = resp.json().await?;
        if let Some(err) = body.error {
            return Err(LedgerError::Rpc { code: err.code, message: err.message });
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    /// Follow `nextCursor` until `hasNextPage` is false. `params` receives the
    /// current cursor and must return the full parameter list.
    async fn paginate(
        &self,
        method: &str,
        params: impl Fn(Value) -> Value + Send + Sync,
    ) -> Result<Vec<Value>, LedgerError> {
        let mut items = Vec::new();
        let mut cursor = Value::Null;
        loop {
            let page: Page = serde_json::from_value(self.call(method, params(cursor)).await?)
                .map_err(|e| LedgerError::Decode(format!("{method}: {e}")))?;
            items.extend(page.data);
            match page.next_cursor {
                Some(next) if page.has_next_page && !next.is_null() => cursor = next,
                _ => return Ok(items),
            }
        }
    }
}

fn object_options() -> Value {
    json!({ "showType": true, "showOwner": true, "showContent": true })
}

#[async_trait]
impl LedgerGateway for RpcLedger {
    async fn get_object(&self, object_id: &str) -> Result<Option<LedgerObject>, LedgerError> {
        let result = self.call("sui_getObject", json!([object_id, object_options()])).await?;
        match result.get("data") {
            Some(data) if !data.is_null() => parse_object(data).map(Some),
            // deleted or never existed
            _ => Ok(None),
        }
    }

    async fn owned_objects(
        &self,
        owner: &str,
        struct_type: &str,
    ) -> Result<Vec<LedgerObject>, LedgerError> {
        let query = json!({ "filter": { "StructType": struct_type }, "options": object_options() });
        self.paginate("suix_getOwnedObjects", |cursor| json!([owner, query, cursor, PAGE_LIMIT]))
            .await?
            .iter()
            .map(|item| parse_object(&item["data"]))
            .collect()
    }

    async fn query_events(&self, event_type: &str) -> Result<Vec<LedgerEvent>, LedgerError> {
        let filter = json!({ "MoveEventType": event_type });
        self.paginate("suix_queryEvents", |cursor| json!([filter, cursor, PAGE_LIMIT, false]))
            .await?
            .iter()
            .map(parse_event)
            .collect()
    }

    async fn coins(&self, owner: &str, coin_type: &str) -> Result<Vec<Coin>, LedgerError> {
        self.paginate("suix_getCoins", |cursor| json!([owner, coin_type, cursor, PAGE_LIMIT]))
            .await?
            .iter()
            .map(parse_coin)
            .collect()
    }

    async fn coin_metadata(&self, coin_type: &str) -> Result<Option<CoinMetadata>, LedgerError> {
        let result = self.call("suix_getCoinMetadata", json!([coin_type])).await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_metadata(&result).map(Some)
    }

    async fn submit(&self, signer: &str, tx: &TransactionBlock) -> Result<SubmitResult, LedgerError> {
        let base = self
            .signer_url
            .as_deref()
            .ok_or_else(|| LedgerError::Transport("no signer bridge configured (CRUMB_SIGNER_URL)".into()))?;
        let url = format!("{base}/tx/execute");

        let resp = self
            .client
            .post(&url)
            .json(&BridgeExecuteRequest { signer, transaction: tx })
            .timeout(SUBMIT_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Signer bridge unreachable");
                LedgerError::from(e)
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            error!(http_status = %status, body = %body, "Signer bridge returned HTTP error");
            return Err(LedgerError::Transport(format!("signer bridge HTTP {status}: {body}")));
        }

        let body: BridgeExecuteResponse = resp.json().await?;
        Ok(SubmitResult {
            success: body.status == "success",
            digest:  body.digest,
            errors:  body.errors,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owned_object() {
        let data = json!({
            "objectId": "0xcap",
            "type": "0xpkg::dca::Oracle",
            "owner": { "AddressOwner": "0xop" },
            "content": { "dataType": "moveObject", "type": "0xpkg::dca::Oracle", "fields": { "id": { "id": "0xcap" } } }
        });
        let object = parse_object(&data).unwrap();
        assert_eq!(object.object_id, "0xcap");
        assert_eq!(object.owner.as_deref(), Some("0xop"));
    }

    #[test]
    fn test_parse_shared_object_has_no_owner() {
        let data = json!({
            "objectId": "0xpos",
            "owner": { "Shared": { "initial_shared_version": 3 } },
            "content": { "type": "0xpkg::dca::Position<A, B>", "fields": { "deposit": "10" } }
        });
        let object = parse_object(&data).unwrap();
        assert_eq!(object.object_type, "0xpkg::dca::Position<A, B>");
        assert_eq!(object.owner, None);
        assert_eq!(object.fields["deposit"], "10");
    }

    #[test]
    fn test_parse_event_and_coin() {
        let event = parse_event(&json!({
            "type": "0xpkg::dca::PositionCreationEvent",
            "timestampMs": "1700000000000",
            "parsedJson": { "position_id": "0xp" }
        }))
        .unwrap();
        assert_eq!(event.timestamp_ms, Some(1_700_000_000_000));

        let coin = parse_coin(&json!({
            "coinObjectId": "0xc",
            "coinType": "0x2::sui::SUI",
            "balance": "123"
        }))
        .unwrap();
        assert_eq!(coin.balance, 123);
    }

    #[test]
    fn test_parse_page() {
        let page: Page = serde_json::from_value(json!({
            "data": [1, 2],
            "nextCursor": { "txDigest": "x", "eventSeq": "1" },
            "hasNextPage": true
        }))
        .unwrap();
        assert_eq!(page.data.len(), 2);
        assert!(page.has_next_page);

        let last: Page = serde_json::from_value(json!({ "data": [], "nextCursor": null, "hasNextPage": false })).unwrap();
        assert!(last.next_cursor.is_none() || last.next_cursor == Some(Value::Null));
    }

    #[test]
    fn test_default_rpc_url() {
        assert_eq!(default_rpc_url("devnet"), "https://fullnode.devnet.sui.io:443");
    }
}
