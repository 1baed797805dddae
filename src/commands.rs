//! # commands — One-shot operator actions
//!
//! | Command            | Signer needs                | Contract call       |
//! |--------------------|-----------------------------|---------------------|
//! | `add-asset`        | `Admin` cap                 | `add_asset`         |
//! | `add-price-oracle` | `Admin` cap                 | `add_oracle`        |
//! | `create-position`  | input coins (+ fee reserve) | `create_position`   |
//! | `withdraw`         | position ownership          | `withdraw_funds`    |
//! | `close-position`   | ownership, empty deposit    | `close_position`    |
//! | `mint`             | local ledger only           | none (faucet)       |
//!
//! Every submission logs its explorer link.

use tracing::{info, warn};

use crate::engine::find_capability;
use crate::error::AppError;
use crate::ledger::tx::{self, AddAssetParams, CoinAmount, CreatePositionParams, Payment};
use crate::ledger::{normalize_coin_type, TransactionBlock};
use crate::math::decimal_to_fixed;
use crate::models::{Asset, Position};
use crate::state::AppState;

/// Submit `block` as `signer`; a rejection becomes `TransactionSubmission`.
async fn submit(state: &AppState, signer: &str, block: &TransactionBlock, action: &str) -> Result<String, AppError> {
    let result = state.ledger.submit(signer, block).await?;
    if !result.success {
        return Err(AppError::TransactionSubmission(format!(
            "{action} ({}): {}",
            result.digest,
            result.errors.join("; ")
        )));
    }
    info!(action, digest = %result.digest, explorer = %state.explorer_url(&result.digest), "✅ Transaction executed");
    Ok(result.digest)
}

// ─── Admin ────────────────────────────────────────────────────────────────────

/// Register `coin_type` as a tradable asset.
pub async fn add_asset(state: &AppState, coin_type: &str) -> Result<String, AppError> {
    let signer = state.config.require_signer()?;
    let admin_cap = find_capability(state, signer, "Admin").await?;
    let metadata = state.registry.coin_metadata(coin_type).await?;
    let global_table_id = state
        .global_table_id()
        .await
        .ok_or_else(|| AppError::NotFound("global asset table: set CRUMB_GLOBAL_TABLE_ID".into()))?;

    let mut block = TransactionBlock::new(state.config.gas_budget);
    tx::add_asset(&mut block, &state.config.package_id, &AddAssetParams {
        admin_cap_id:    &admin_cap,
        coin_type,
        coin_meta_id:    &metadata.id,
        global_table_id: &global_table_id,
    });

    info!(coin_type, symbol = %metadata.symbol, decimals = metadata.decimals, "Registering asset");
    submit(state, signer, &block, "add_asset").await
}

/// Grant the `Oracle` capability to `receiver`.
pub async fn add_price_oracle(state: &AppState, receiver: &str) -> Result<String, AppError> {
    let signer = state.config.require_signer()?;
    let admin_cap = find_capability(state, signer, "Admin").await?;

    let mut block = TransactionBlock::new(state.config.gas_budget);
    tx::add_oracle(&mut block, &state.config.package_id, &admin_cap, receiver);

    info!(receiver, "Granting oracle capability");
    submit(state, signer, &block, "add_oracle").await
}

// ─── Positions ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct CreatePosition {
    pub input_coin_type:  String,
    pub output_coin_type: String,
    /// Whole input tokens, e.g. `1.5`
    pub deposit:          f64,
    pub amount_per_trade: f64,
    pub frequency_secs:   u64,
}

/// Open a position funded from the signer's coins of the input type.
///
/// Both assets must be registered. Depositing the native asset keeps
/// `FEE_RESERVE` back for gas.
pub async fn create_position(state: &AppState, req: &CreatePosition) -> Result<String, AppError> {
    let signer = state.config.require_signer()?;
    if normalize_coin_type(&req.input_coin_type) == normalize_coin_type(&req.output_coin_type) {
        return Err(AppError::Validation("input and output coin must differ".into()));
    }

    let input: Asset = state.registry.get_asset(&req.input_coin_type).await?;
    let output: Asset = state.registry.get_asset(&req.output_coin_type).await?;

    let deposit = decimal_to_fixed(req.deposit, input.decimals)?;
    let amount_per_trade = decimal_to_fixed(req.amount_per_trade, input.decimals)?;
    if deposit == 0 {
        return Err(AppError::Validation("deposit must be positive".into()));
    }
    if amount_per_trade > deposit {
        warn!(deposit, amount_per_trade, "Amount per trade exceeds deposit; position trades once");
    }

    let coins = state.ledger.coins(signer, &input.coin_type).await?;
    let available = coins.iter().fold(0u64, |acc, c| acc.saturating_add(c.balance));
    let native = input.coin_type == state.config.native_coin_type;
    let needed = if native { deposit.saturating_add(state.config.fee_reserve) } else { deposit };
    if available < needed {
        return Err(AppError::InsufficientBalance { needed, available });
    }

    let coin_ids: Vec<String> = coins.into_iter().map(|c| c.coin_object_id).collect();
    let payment = if native {
        Payment::Gas(deposit)
    } else {
        Payment::Coins { ids: &coin_ids, amount: CoinAmount::Exact(deposit) }
    };

    let mut block = TransactionBlock::new(state.config.gas_budget);
    tx::create_position(&mut block, &state.config.package_id, &CreatePositionParams {
        input_coin_type:  &input.coin_type,
        output_coin_type: &output.coin_type,
        deposit:          payment,
        amount_per_trade,
        frequency:        req.frequency_secs,
    })?;

    info!(
        input     = %input.coin_type,
        output    = %output.coin_type,
        deposit,
        amount_per_trade,
        frequency = req.frequency_secs,
        "Creating position"
    );
    submit(state, signer, &block, "create_position").await
}

/// Fresh read of a position the signer owns.
async fn owned_position(state: &AppState, signer: &str, position_id: &str) -> Result<Position, AppError> {
    state.store.invalidate(position_id).await;
    let position = state.store.get(position_id).await?;
    if position.owner != signer {
        return Err(AppError::Validation(format!(
            "position {position_id} belongs to {}, not {signer}",
            position.owner
        )));
    }
    Ok(position)
}

/// Return the remaining deposit to the owner.
pub async fn withdraw(state: &AppState, position_id: &str) -> Result<String, AppError> {
    let signer = state.config.require_signer()?;
    let position = owned_position(state, signer, position_id).await?;
    if position.is_terminal() {
        return Err(AppError::Validation(format!("position {position_id} has nothing left to withdraw")));
    }

    let mut block = TransactionBlock::new(state.config.gas_budget);
    tx::withdraw_funds(
        &mut block,
        &state.config.package_id,
        position_id,
        &position.input_coin_type,
        &position.output_coin_type,
    );

    info!(position_id, deposit = position.deposit, "Withdrawing deposit");
    let digest = submit(state, signer, &block, "withdraw_funds").await;
    state.store.invalidate(position_id).await;
    digest
}

/// Delete an emptied position, paying out what it received.
pub async fn close_position(state: &AppState, position_id: &str) -> Result<String, AppError> {
    let signer = state.config.require_signer()?;
    let position = owned_position(state, signer, position_id).await?;
    if !position.is_terminal() {
        return Err(AppError::Validation(format!(
            "position {position_id} still holds {}; withdraw it first",
            position.deposit
        )));
    }

    let mut block = TransactionBlock::new(state.config.gas_budget);
    tx::close_position(
        &mut block,
        &state.config.package_id,
        position_id,
        &position.input_coin_type,
        &position.output_coin_type,
    );

    info!(position_id, received = position.received, "Closing position");
    let digest = submit(state, signer, &block, "close_position").await;
    state.store.invalidate(position_id).await;
    digest
}

// ─── Faucet ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Mint {
    pub to:        String,
    pub coin_type: String,
    /// Whole tokens
    pub amount:    f64,
    /// Registers coin metadata when the type is new
    pub symbol:    Option<String>,
    pub decimals:  u32,
}

/// Create a coin on the local ledger. Returns the coin id.
pub async fn mint(state: &AppState, req: &Mint) -> Result<String, AppError> {
    let local = state
        .local
        .as_ref()
        .ok_or_else(|| AppError::Validation("mint only works with CRUMB_LEDGER=local".into()))?;

    if let Some(symbol) = &req.symbol {
        local.register_coin(&req.coin_type, symbol, symbol, req.decimals).await?;
    }
    let metadata = state.registry.coin_metadata(&req.coin_type).await?;
    let amount = decimal_to_fixed(req.amount, metadata.decimals)?;

    let coin_id = local.mint(&req.to, &req.coin_type, amount).await?;
    info!(to = %req.to, coin_type = %req.coin_type, amount, coin_id = %coin_id, "🪙 Minted");
    Ok(coin_id)
}
