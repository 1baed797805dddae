//! # ledger::memory
//!
//! **MemoryLedger**: an in-process object store that executes the Crumb
//! `dca` contract. Used by `CRUMB_LEDGER=local` for development without a
//! node, and as the fixture for every engine test.
//!
//! Each transaction block runs against a copy of the state and is committed
//! only if every command succeeds, so an aborted block leaves no trace. When
//! a snapshot path is set the state is written out after every commit and
//! reloaded on start.

use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::tx::{dca_type, Argument, Command, PureValue, TransactionBlock};
use super::{
    field_str, field_u64, normalize_coin_type, Coin, CoinMetadata, LedgerError, LedgerEvent,
    LedgerGateway, LedgerObject, SubmitResult,
};
use crate::math::trade_out_amount;
use crate::models::position::parse_type_args;

const COIN_PREFIX: &str = "0x2::coin::Coin<";
const METADATA_PREFIX: &str = "0x2::coin::CoinMetadata<";

fn coin_object_type(coin_type: &str) -> String {
    format!("{COIN_PREFIX}{coin_type}>")
}

fn coin_type_of(object_type: &str) -> Option<&str> {
    object_type.strip_prefix(COIN_PREFIX)?.strip_suffix('>')
}

/// Inverse of [`normalize_coin_type`]: the zero-padded form events carry.
fn type_name_of(coin_type: &str) -> String {
    let stripped = coin_type.strip_prefix("0x").unwrap_or(coin_type);
    match stripped.split_once("::") {
        Some((address, rest)) => format!("{address:0>64}::{rest}"),
        None => stripped.to_string(),
    }
}

fn new_object_id() -> String {
    format!("0x{}", Uuid::new_v4().simple())
}

// ─── State ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LedgerState {
    package_id:       String,
    native_coin_type: String,
    global_table_id:  String,
    objects:          BTreeMap<String, LedgerObject>,
    events:           Vec<LedgerEvent>,
    /// coin type → metadata
    metadata:         BTreeMap<String, CoinMetadata>,
}

impl LedgerState {
    fn genesis(package_id: &str, admin: &str, native_coin_type: &str) -> Self {
        let mut state = Self {
            package_id:       package_id.to_string(),
            native_coin_type: native_coin_type.to_string(),
            global_table_id:  new_object_id(),
            objects:          BTreeMap::new(),
            events:           Vec::new(),
            metadata:         BTreeMap::new(),
        };

        let table = LedgerObject {
            object_id:   state.global_table_id.clone(),
            object_type: dca_type(package_id, "GlobalTable"),
            owner:       None,
            fields:      json!({ "assets": {} }),
        };
        state.insert(table);
        state.create(dca_type(package_id, "Admin"), Some(admin.to_string()), json!({}));
        state
    }

    fn insert(&mut self, object: LedgerObject) {
        self.objects.insert(object.object_id.clone(), object);
    }

    fn create(&mut self, object_type: String, owner: Option<String>, fields: serde_json::Value) -> String {
        let id = new_object_id();
        self.insert(LedgerObject { object_id: id.clone(), object_type, owner, fields });
        id
    }

    fn create_coin(&mut self, owner: &str, coin_type: &str, balance: u64) -> String {
        self.create(
            coin_object_type(coin_type),
            Some(owner.to_string()),
            json!({ "balance": balance.to_string() }),
        )
    }

    fn emit(&mut self, name: &str, parsed_json: serde_json::Value, timestamp_ms: u64) {
        self.events.push(LedgerEvent {
            event_type: dca_type(&self.package_id, name),
            timestamp_ms: Some(timestamp_ms),
            parsed_json,
        });
    }

    fn object(&self, id: &str) -> Result<&LedgerObject, String> {
        self.objects.get(id).ok_or_else(|| format!("object {id} does not exist"))
    }

    fn object_mut(&mut self, id: &str) -> Result<&mut LedgerObject, String> {
        self.objects.get_mut(id).ok_or_else(|| format!("object {id} does not exist"))
    }

    fn require_owned(&self, id: &str, signer: &str, object_type: &str) -> Result<(), String> {
        let object = self.object(id)?;
        if object.object_type != object_type {
            return Err(format!("object {id} is {} not {object_type}", object.object_type));
        }
        if object.owner.as_deref() != Some(signer) {
            return Err(format!("object {id} is not owned by {signer}"));
        }
        Ok(())
    }

    /// `(coin_type, balance)` of a coin owned by `signer`.
    fn owned_coin(&self, id: &str, signer: &str) -> Result<(String, u64), String> {
        let object = self.object(id)?;
        let coin_type = coin_type_of(&object.object_type)
            .ok_or_else(|| format!("object {id} is not a coin"))?
            .to_string();
        if object.owner.as_deref() != Some(signer) {
            return Err(format!("coin {id} is not owned by {signer}"));
        }
        let balance = field_u64(&object.fields, "balance").map_err(|e| e.to_string())?;
        Ok((coin_type, balance))
    }

    fn set_balance(&mut self, id: &str, balance: u64) -> Result<(), String> {
        self.object_mut(id)?.fields["balance"] = json!(balance.to_string());
        Ok(())
    }

    fn registered_asset(&self, coin_type: &str) -> Option<String> {
        self.objects
            .get(&self.global_table_id)?
            .fields["assets"]
            .get(coin_type)?
            .as_str()
            .map(str::to_string)
    }

    /// Merge every native coin `signer` owns, except those in `inputs`, into
    /// the largest one and return its id. This is the gas coin for the block.
    fn smash_gas(&mut self, signer: &str, inputs: &HashSet<String>) -> Result<Option<String>, String> {
        let object_type = coin_object_type(&self.native_coin_type);
        let mut coins = self
            .objects
            .values()
            .filter(|o| o.object_type == object_type && o.owner.as_deref() == Some(signer))
            .filter(|o| !inputs.contains(&o.object_id))
            .map(|o| {
                let balance = field_u64(&o.fields, "balance").map_err(|e| e.to_string())?;
                Ok((o.object_id.clone(), balance))
            })
            .collect::<Result<Vec<(String, u64)>, String>>()?;
        coins.sort_by(|a, b| b.1.cmp(&a.1));

        let Some((gas, _)) = coins.first().cloned() else {
            return Ok(None);
        };
        let total = coins
            .iter()
            .try_fold(0u64, |acc, (_, balance)| acc.checked_add(*balance))
            .ok_or("gas balance overflow")?;
        for (id, _) in &coins[1..] {
            self.objects.remove(id);
        }
        self.set_balance(&gas, total)?;
        Ok(Some(gas))
    }
}

/// Object ids a block names explicitly. They are inputs, never gas.
fn explicit_objects(tx: &TransactionBlock) -> HashSet<String> {
    let mut ids = HashSet::new();
    let mut collect = |arg: &Argument| {
        if let Argument::Object { id } = arg {
            ids.insert(id.clone());
        }
    };
    for command in &tx.commands {
        match command {
            Command::MergeCoins { destination, sources } => {
                collect(destination);
                sources.iter().for_each(&mut collect);
            }
            Command::SplitCoins { coin, .. } => collect(coin),
            Command::MoveCall { arguments, .. } => arguments.iter().for_each(&mut collect),
        }
    }
    ids
}

// ─── Execution ────────────────────────────────────────────────────────────────

/// Value produced by a command, addressable by later commands.
#[derive(Debug, Clone)]
enum Slot {
    Object(String),
}

struct Execution<'a> {
    state:   &'a mut LedgerState,
    signer:  &'a str,
    gas:     Option<String>,
    now_ms:  u64,
    results: Vec<Vec<Slot>>,
}

impl<'a> Execution<'a> {
    fn object_arg(&self, arg: &Argument) -> Result<String, String> {
        match arg {
            Argument::GasCoin => self
                .gas
                .clone()
                .ok_or_else(|| format!("{} has no gas coin", self.signer)),
            Argument::Object { id } => Ok(id.clone()),
            Argument::Result { index } => self.slot(*index, 0),
            Argument::NestedResult { index, result } => self.slot(*index, *result),
            Argument::Pure { .. } => Err("expected an object argument, got a pure value".into()),
        }
    }

    fn slot(&self, index: usize, result: usize) -> Result<String, String> {
        match self.results.get(index).and_then(|r| r.get(result)) {
            Some(Slot::Object(id)) => Ok(id.clone()),
            None => Err(format!("command {index} has no result {result}")),
        }
    }

    fn u64_arg(arg: &Argument) -> Result<u64, String> {
        match arg {
            Argument::Pure { value: PureValue::U64(v) } => Ok(*v),
            other => Err(format!("expected u64, got {other:?}")),
        }
    }

    fn address_arg(arg: &Argument) -> Result<String, String> {
        match arg {
            Argument::Pure { value: PureValue::Address(a) } => Ok(a.clone()),
            other => Err(format!("expected address, got {other:?}")),
        }
    }

    fn run(&mut self, command: &Command) -> Result<Vec<Slot>, String> {
        match command {
            Command::MergeCoins { destination, sources } => {
                let dest = self.object_arg(destination)?;
                let (coin_type, mut total) = self.state.owned_coin(&dest, self.signer)?;
                for source in sources {
                    let id = self.object_arg(source)?;
                    if id == dest {
                        return Err(format!("cannot merge coin {id} into itself"));
                    }
                    let (source_type, balance) = self.state.owned_coin(&id, self.signer)?;
                    if source_type != coin_type {
                        return Err(format!("cannot merge {source_type} into {coin_type}"));
                    }
                    total = total.checked_add(balance).ok_or("balance overflow")?;
                    self.state.objects.remove(&id);
                }
                self.state.set_balance(&dest, total)?;
                Ok(vec![])
            }
            Command::SplitCoins { coin, amounts } => {
                let id = self.object_arg(coin)?;
                let (coin_type, mut balance) = self.state.owned_coin(&id, self.signer)?;
                let mut out = Vec::with_capacity(amounts.len());
                for &amount in amounts {
                    balance = balance
                        .checked_sub(amount)
                        .ok_or_else(|| format!("insufficient balance in {id} to split {amount}"))?;
                    out.push(Slot::Object(self.state.create_coin(self.signer, &coin_type, amount)));
                }
                self.state.set_balance(&id, balance)?;
                Ok(out)
            }
            Command::MoveCall { target, type_arguments, arguments } => {
                let prefix = format!("{}::{}::", self.state.package_id, super::tx::MODULE);
                let function = target
                    .strip_prefix(&prefix)
                    .ok_or_else(|| format!("unknown call target {target}"))?;
                self.call(function, type_arguments, arguments)
            }
        }
    }

    fn call(&mut self, function: &str, types: &[String], args: &[Argument]) -> Result<Vec<Slot>, String> {
        let arity = |n: usize, t: usize| -> Result<(), String> {
            if args.len() != n || types.len() != t {
                return Err(format!("{function} expects {n} arguments and {t} type arguments"));
            }
            Ok(())
        };

        match function {
            "add_asset" => {
                arity(3, 1)?;
                let admin = self.object_arg(&args[0])?;
                let coin_meta = self.object_arg(&args[1])?;
                let table = self.object_arg(&args[2])?;
                self.add_asset(&types[0], &admin, &coin_meta, &table)
            }
            "add_oracle" => {
                arity(2, 0)?;
                let admin = self.object_arg(&args[0])?;
                self.require_admin(&admin)?;
                let receiver = Self::address_arg(&args[1])?;
                let oracle_type = dca_type(&self.state.package_id, "Oracle");
                let id = self.state.create(oracle_type, Some(receiver), json!({}));
                Ok(vec![Slot::Object(id)])
            }
            "update_price" => {
                arity(3, 1)?;
                let cap = self.object_arg(&args[0])?;
                let oracle_type = dca_type(&self.state.package_id, "Oracle");
                self.state.require_owned(&cap, self.signer, &oracle_type)?;
                let asset = self.object_arg(&args[1])?;
                self.require_asset(&asset, &types[0])?;
                let price = Self::u64_arg(&args[2])?;
                self.state.object_mut(&asset)?.fields["price_usd"] = json!(price.to_string());
                Ok(vec![])
            }
            "create_position" => {
                arity(3, 2)?;
                let coin = self.object_arg(&args[0])?;
                let amount_per_trade = Self::u64_arg(&args[1])?;
                let frequency = Self::u64_arg(&args[2])?;
                self.create_position(&types[0], &types[1], &coin, amount_per_trade, frequency)
            }
            "execute_trade" => {
                arity(4, 2)?;
                let position = self.object_arg(&args[0])?;
                let coin = self.object_arg(&args[1])?;
                let input_asset = self.object_arg(&args[2])?;
                let output_asset = self.object_arg(&args[3])?;
                self.execute_trade(&types[0], &types[1], &position, &coin, &input_asset, &output_asset)
            }
            "withdraw_funds" => {
                arity(1, 2)?;
                let position = self.object_arg(&args[0])?;
                self.withdraw_funds(&types[0], &types[1], &position)
            }
            "close_position" => {
                arity(1, 2)?;
                let position = self.object_arg(&args[0])?;
                self.close_position(&types[0], &types[1], &position)
            }
            other => Err(format!("unknown function dca::{other}")),
        }
    }

    fn require_admin(&self, id: &str) -> Result<(), String> {
        let admin_type = dca_type(&self.state.package_id, "Admin");
        self.state.require_owned(id, self.signer, &admin_type)
    }

    fn require_asset(&self, id: &str, coin_type: &str) -> Result<(), String> {
        let expected = format!("{}<{coin_type}>", dca_type(&self.state.package_id, "Asset"));
        let object = self.state.object(id)?;
        if object.object_type != expected {
            return Err(format!("object {id} is {} not {expected}", object.object_type));
        }
        Ok(())
    }

    fn position_fields(&self, id: &str, input: &str, output: &str) -> Result<serde_json::Value, String> {
        let object = self.state.object(id)?;
        match parse_type_args(&object.object_type) {
            Some((i, o)) if i == input && o == output => Ok(object.fields.clone()),
            _ => Err(format!("object {id} is not a Position<{input}, {output}>")),
        }
    }

    fn add_asset(&mut self, coin_type: &str, admin: &str, coin_meta: &str, table: &str) -> Result<Vec<Slot>, String> {
        self.require_admin(admin)?;
        if table != self.state.global_table_id {
            return Err(format!("{table} is not the global table"));
        }
        let meta_object = self.state.object(coin_meta)?;
        if meta_object.object_type != format!("{METADATA_PREFIX}{coin_type}>") {
            return Err(format!("{coin_meta} is not the metadata of {coin_type}"));
        }
        let decimals = field_u64(&meta_object.fields, "decimals").map_err(|e| e.to_string())?;
        let name = field_str(&meta_object.fields, "name").map_err(|e| e.to_string())?;
        if self.state.registered_asset(coin_type).is_some() {
            return Err(format!("asset {coin_type} already registered"));
        }

        let asset_type = format!("{}<{coin_type}>", dca_type(&self.state.package_id, "Asset"));
        let asset_id = self.state.create(
            asset_type,
            None,
            json!({ "price_usd": "0", "decimals": decimals.to_string() }),
        );
        self.state.object_mut(table)?.fields["assets"][coin_type] = json!(asset_id);
        self.state.emit(
            "AssetAddEvent",
            json!({
                "asset_id":       asset_id,
                "coin_type_name": type_name_of(coin_type),
                "coinmeta_id":    coin_meta,
                "name":           name,
            }),
            self.now_ms,
        );
        Ok(vec![Slot::Object(asset_id)])
    }

    fn create_position(
        &mut self,
        input: &str,
        output: &str,
        coin: &str,
        amount_per_trade: u64,
        frequency: u64,
    ) -> Result<Vec<Slot>, String> {
        let (coin_type, deposit) = self.state.owned_coin(coin, self.signer)?;
        if coin_type != input {
            return Err(format!("deposit coin is {coin_type}, expected {input}"));
        }
        if deposit == 0 || amount_per_trade == 0 || frequency == 0 {
            return Err("deposit, amount per trade and frequency must be positive".into());
        }
        for coin_type in [input, output] {
            if self.state.registered_asset(coin_type).is_none() {
                return Err(format!("asset {coin_type} is not registered"));
            }
        }
        self.state.objects.remove(coin);

        let position_type = format!("{}<{input}, {output}>", dca_type(&self.state.package_id, "Position"));
        let position_id = self.state.create(
            position_type,
            None,
            json!({
                "owner":            self.signer,
                "deposit":          deposit.to_string(),
                "amount_per_trade": amount_per_trade.to_string(),
                "frequency":        frequency.to_string(),
                "last_trade_time":  "0",
                "received":         "0",
            }),
        );
        self.state.emit(
            "PositionCreationEvent",
            json!({
                "position_id":    position_id,
                "creator":        self.signer,
                "deposit_amount": deposit.to_string(),
            }),
            self.now_ms,
        );
        Ok(vec![Slot::Object(position_id)])
    }

    fn execute_trade(
        &mut self,
        input: &str,
        output: &str,
        position: &str,
        coin: &str,
        input_asset: &str,
        output_asset: &str,
    ) -> Result<Vec<Slot>, String> {
        let fields = self.position_fields(position, input, output)?;
        self.require_asset(input_asset, input)?;
        self.require_asset(output_asset, output)?;
        let (coin_type, offered) = self.state.owned_coin(coin, self.signer)?;
        if coin_type != output {
            return Err(format!("trade coin is {coin_type}, expected {output}"));
        }

        let num = |name: &str| field_u64(&fields, name).map_err(|e| e.to_string());
        let deposit = num("deposit")?;
        if deposit == 0 {
            return Err("position is empty".into());
        }
        let last_trade = num("last_trade_time")?;
        let frequency_ms = num("frequency")?.saturating_mul(1000);
        if last_trade != 0 && self.now_ms.saturating_sub(last_trade) < frequency_ms {
            return Err("position is not due for a trade".into());
        }

        let price = |id: &str| -> Result<u64, String> {
            let p = field_u64(&self.state.object(id)?.fields, "price_usd").map_err(|e| e.to_string())?;
            if p == 0 {
                return Err(format!("asset {id} has no price"));
            }
            Ok(p)
        };
        let input_amount = num("amount_per_trade")?.min(deposit);
        let expected = trade_out_amount(input_amount, price(input_asset)?, price(output_asset)?)
            .map_err(|e| e.to_string())?;
        if offered < expected {
            return Err(format!("trade amount {offered} below required {expected}"));
        }

        let received = num("received")?.checked_add(offered).ok_or("received overflow")?;
        self.state.objects.remove(coin);
        let now_ms = self.now_ms;
        let fields = &mut self.state.object_mut(position)?.fields;
        fields["deposit"] = json!((deposit - input_amount).to_string());
        fields["received"] = json!(received.to_string());
        fields["last_trade_time"] = json!(now_ms.to_string());

        let paid = self.state.create_coin(self.signer, input, input_amount);
        Ok(vec![Slot::Object(paid)])
    }

    fn require_position_owner(&self, fields: &serde_json::Value) -> Result<(), String> {
        let owner = field_str(fields, "owner").map_err(|e| e.to_string())?;
        if owner != self.signer {
            return Err(format!("position belongs to {owner}"));
        }
        Ok(())
    }

    fn withdraw_funds(&mut self, input: &str, output: &str, position: &str) -> Result<Vec<Slot>, String> {
        let fields = self.position_fields(position, input, output)?;
        self.require_position_owner(&fields)?;
        let deposit = field_u64(&fields, "deposit").map_err(|e| e.to_string())?;
        self.state.object_mut(position)?.fields["deposit"] = json!("0");
        if deposit == 0 {
            return Ok(vec![]);
        }
        let coin = self.state.create_coin(self.signer, input, deposit);
        Ok(vec![Slot::Object(coin)])
    }

    fn close_position(&mut self, input: &str, output: &str, position: &str) -> Result<Vec<Slot>, String> {
        let fields = self.position_fields(position, input, output)?;
        self.require_position_owner(&fields)?;
        let deposit = field_u64(&fields, "deposit").map_err(|e| e.to_string())?;
        let received = field_u64(&fields, "received").map_err(|e| e.to_string())?;
        if deposit > 0 {
            return Err("withdraw the remaining deposit before closing".into());
        }

        let mut out = Vec::new();
        if received > 0 {
            out.push(Slot::Object(self.state.create_coin(self.signer, output, received)));
        }
        self.state.objects.remove(position);
        self.state.emit(
            "PositionDeletionEvent",
            json!({ "position_id": position, "owner": self.signer }),
            self.now_ms,
        );
        Ok(out)
    }
}

// ─── MemoryLedger ─────────────────────────────────────────────────────────────

pub struct MemoryLedger {
    state:    Mutex<LedgerState>,
    snapshot: Option<PathBuf>,
}

impl MemoryLedger {
    /// Fresh ledger with the contract published: an `Admin` cap owned by
    /// `admin` and an empty global asset table.
    pub fn new(package_id: &str, admin: &str, native_coin_type: &str) -> Self {
        Self {
            state:    Mutex::new(LedgerState::genesis(package_id, admin, native_coin_type)),
            snapshot: None,
        }
    }

    /// Load `path` if it exists, otherwise start from genesis; every commit
    /// is written back to `path`.
    pub async fn open(
        path: PathBuf,
        package_id: &str,
        admin: &str,
        native_coin_type: &str,
    ) -> Result<Self, LedgerError> {
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let state: LedgerState = serde_json::from_slice(&bytes)
                    .map_err(|e| LedgerError::Snapshot(format!("{}: {e}", path.display())))?;
                if state.package_id != package_id {
                    return Err(LedgerError::Snapshot(format!(
                        "{} belongs to package {}, not {package_id}",
                        path.display(),
                        state.package_id
                    )));
                }
                info!(path = %path.display(), objects = state.objects.len(), "Local ledger loaded");
                state
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), admin, "Local ledger created from genesis");
                LedgerState::genesis(package_id, admin, native_coin_type)
            }
            Err(e) => return Err(LedgerError::Snapshot(format!("{}: {e}", path.display()))),
        };

        let ledger = Self { state: Mutex::new(state), snapshot: Some(path) };
        ledger.persist(&*ledger.state.lock().await).await?;
        Ok(ledger)
    }

    async fn persist(&self, state: &LedgerState) -> Result<(), LedgerError> {
        let Some(path) = &self.snapshot else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(state).map_err(|e| LedgerError::Snapshot(e.to_string()))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| LedgerError::Snapshot(format!("{}: {e}", path.display())))
    }

    pub async fn global_table_id(&self) -> String {
        self.state.lock().await.global_table_id.clone()
    }

    /// Publish coin metadata for `coin_type`; returns the metadata object id.
    pub async fn register_coin(
        &self,
        coin_type: &str,
        symbol: &str,
        name: &str,
        decimals: u32,
    ) -> Result<String, LedgerError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.metadata.get(coin_type) {
            return Ok(existing.id.clone());
        }
        let mut draft = state.clone();
        let id = draft.create(
            format!("{METADATA_PREFIX}{coin_type}>"),
            None,
            json!({ "symbol": symbol, "name": name, "decimals": decimals.to_string() }),
        );
        draft.metadata.insert(coin_type.to_string(), CoinMetadata {
            id: id.clone(),
            symbol: symbol.to_string(),
            name: name.to_string(),
            decimals,
        });
        self.persist(&draft).await?;
        *state = draft;
        Ok(id)
    }

    /// Dev faucet: create a coin of `amount` owned by `owner`.
    pub async fn mint(&self, owner: &str, coin_type: &str, amount: u64) -> Result<String, LedgerError> {
        let mut state = self.state.lock().await;
        let mut draft = state.clone();
        let id = draft.create_coin(owner, coin_type, amount);
        self.persist(&draft).await?;
        *state = draft;
        debug!(owner, coin_type, amount, coin_id = %id, "Minted coin");
        Ok(id)
    }
}

#[async_trait]
impl LedgerGateway for MemoryLedger {
    async fn get_object(&self, object_id: &str) -> Result<Option<LedgerObject>, LedgerError> {
        Ok(self.state.lock().await.objects.get(object_id).cloned())
    }

    async fn owned_objects(
        &self,
        owner: &str,
        struct_type: &str,
    ) -> Result<Vec<LedgerObject>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state
            .objects
            .values()
            .filter(|o| o.object_type == struct_type && o.owner.as_deref() == Some(owner))
            .cloned()
            .collect())
    }

    async fn query_events(&self, event_type: &str) -> Result<Vec<LedgerEvent>, LedgerError> {
        let state = self.state.lock().await;
        Ok(state.events.iter().filter(|e| e.event_type == event_type).cloned().collect())
    }

    async fn coins(&self, owner: &str, coin_type: &str) -> Result<Vec<Coin>, LedgerError> {
        let coin_type = normalize_coin_type(coin_type);
        let object_type = coin_object_type(&coin_type);
        let state = self.state.lock().await;
        state
            .objects
            .values()
            .filter(|o| o.object_type == object_type && o.owner.as_deref() == Some(owner))
            .map(|o| -> Result<Coin, LedgerError> {
                Ok(Coin {
                    coin_object_id: o.object_id.clone(),
                    coin_type:      coin_type.clone(),
                    balance:        field_u64(&o.fields, "balance")?,
                })
            })
            .collect()
    }

    async fn coin_metadata(&self, coin_type: &str) -> Result<Option<CoinMetadata>, LedgerError> {
        Ok(self.state.lock().await.metadata.get(coin_type).cloned())
    }

    async fn submit(&self, signer: &str, tx: &TransactionBlock) -> Result<SubmitResult, LedgerError> {
        let digest = Uuid::new_v4().simple().to_string();
        let mut state = self.state.lock().await;

        if tx.gas_budget == 0 {
            return Ok(SubmitResult::rejected(digest, "gas budget must be positive"));
        }

        let mut draft = state.clone();
        let gas = match draft.smash_gas(signer, &explicit_objects(tx)) {
            Ok(gas) => gas,
            Err(reason) => return Ok(SubmitResult::rejected(digest, format!("gas: {reason}"))),
        };
        let mut execution = Execution {
            state: &mut draft,
            signer,
            gas,
            now_ms: Utc::now().timestamp_millis().max(0) as u64,
            results: Vec::with_capacity(tx.commands.len()),
        };

        for (index, command) in tx.commands.iter().enumerate() {
            match execution.run(command) {
                Ok(slots) => execution.results.push(slots),
                Err(reason) => {
                    warn!(signer, command = index, %reason, "Local ledger aborted transaction");
                    return Ok(SubmitResult::rejected(digest, format!("command {index}: {reason}")));
                }
            }
        }

        self.persist(&draft).await?;
        *state = draft;
        debug!(signer, %digest, commands = tx.commands.len(), "Local ledger committed transaction");
        Ok(SubmitResult::ok(digest))
    }
}
