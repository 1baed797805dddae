//! # ledger::tx
//!
//! Programmable transaction blocks and the Crumb contract call builders.
//!
//! A block is an ordered list of commands; later commands refer to earlier
//! results with [`Argument::Result`] / [`Argument::NestedResult`]. The
//! builders below append the calls of the `dca` module:
//!
//! | Call              | Signature (Move)                                                              |
//! |-------------------|-------------------------------------------------------------------------------|
//! | `add_asset`       | `add_asset<T>(&Admin, &CoinMetadata<T>, &mut GlobalTable)`                    |
//! | `add_oracle`      | `add_oracle(&Admin, address)`                                                 |
//! | `update_price`    | `update_price<T>(&Oracle, &mut Asset<T>, price_usd: u64)`                     |
//! | `create_position` | `create_position<I, O>(Coin<I>, amount_per_trade: u64, frequency: u64): ID`   |
//! | `execute_trade`   | `execute_trade<I, O>(&mut Position<I, O>, Coin<O>, &Asset<I>, &Asset<O>)`     |
//! | `withdraw_funds`  | `withdraw_funds<I, O>(&mut Position<I, O>)`                                   |
//! | `close_position`  | `close_position<I, O>(Position<I, O>)`                                        |

use serde::{Deserialize, Serialize};

use crate::error::AppError;

// ─── Block Model ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PureValue {
    U64(u64),
    Address(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Argument {
    /// The gas coin of the signer.
    GasCoin,
    Object { id: String },
    Pure { value: PureValue },
    /// Sole result of command `index`.
    Result { index: usize },
    /// Result `result` of a multi-result command `index`.
    NestedResult { index: usize, result: usize },
}

impl Argument {
    pub fn object(id: impl Into<String>) -> Self {
        Argument::Object { id: id.into() }
    }

    pub fn u64(value: u64) -> Self {
        Argument::Pure { value: PureValue::U64(value) }
    }

    pub fn address(value: impl Into<String>) -> Self {
        Argument::Pure { value: PureValue::Address(value.into()) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Fold `sources` into `destination`. Produces no result.
    MergeCoins { destination: Argument, sources: Vec<Argument> },
    /// Split one new coin per amount off `coin`.
    SplitCoins { coin: Argument, amounts: Vec<u64> },
    MoveCall {
        target:         String,
        type_arguments: Vec<String>,
        arguments:      Vec<Argument>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionBlock {
    pub commands:   Vec<Command>,
    pub gas_budget: u64,
}

impl TransactionBlock {
    pub fn new(gas_budget: u64) -> Self {
        Self { commands: Vec::new(), gas_budget }
    }

    /// Append a command and return the argument referring to its result.
    pub fn push(&mut self, command: Command) -> Argument {
        self.commands.push(command);
        Argument::Result { index: self.commands.len() - 1 }
    }

    pub fn move_call(
        &mut self,
        target: String,
        type_arguments: Vec<String>,
        arguments: Vec<Argument>,
    ) -> Argument {
        self.push(Command::MoveCall { target, type_arguments, arguments })
    }

    /// Merge all `coins` into the first one and return it.
    ///
    /// A single coin is returned untouched; merging only makes sense for two
    /// or more.
    pub fn merge_coins(&mut self, coins: &[String]) -> Result<Argument, AppError> {
        let (first, rest) = coins
            .split_first()
            .ok_or_else(|| AppError::Validation("no coins to merge".into()))?;

        let destination = Argument::object(first.clone());
        if !rest.is_empty() {
            self.push(Command::MergeCoins {
                destination: destination.clone(),
                sources:     rest.iter().cloned().map(Argument::object).collect(),
            });
        }
        Ok(destination)
    }

    /// Merge `coins` and split `amount` off, or hand over the whole merged
    /// coin with [`CoinAmount::Max`].
    pub fn merge_and_split(&mut self, coins: &[String], amount: CoinAmount) -> Result<Argument, AppError> {
        let merged = self.merge_coins(coins)?;
        match amount {
            CoinAmount::Max => Ok(merged),
            CoinAmount::Exact(value) => Ok(self.split(merged, value)),
        }
    }

    /// Split one coin of `amount` off `coin`.
    pub fn split(&mut self, coin: Argument, amount: u64) -> Argument {
        self.commands.push(Command::SplitCoins { coin, amounts: vec![amount] });
        Argument::NestedResult { index: self.commands.len() - 1, result: 0 }
    }

    /// Resolve a [`Payment`] into a single coin argument.
    pub fn payment(&mut self, payment: Payment<'_>) -> Result<Argument, AppError> {
        match payment {
            Payment::Coins { ids, amount } => self.merge_and_split(ids, amount),
            Payment::Gas(amount) => Ok(self.split(Argument::GasCoin, amount)),
        }
    }
}

/// How much of a set of coins to spend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinAmount {
    Exact(u64),
    Max,
}

/// Where a coin argument comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payment<'a> {
    /// Merge these owned coins, then split `amount` off.
    Coins { ids: &'a [String], amount: CoinAmount },
    /// Split off the signer's gas coin. The native asset is always paid
    /// this way; its coins double as gas.
    Gas(u64),
}

// ─── Crumb Contract Calls ─────────────────────────────────────────────────────

pub const MODULE: &str = "dca";

pub fn dca_target(package_id: &str, function: &str) -> String {
    format!("{package_id}::{MODULE}::{function}")
}

pub fn dca_type(package_id: &str, name: &str) -> String {
    format!("{package_id}::{MODULE}::{name}")
}

pub struct AddAssetParams<'a> {
    pub admin_cap_id:    &'a str,
    pub coin_type:       &'a str,
    pub coin_meta_id:    &'a str,
    pub global_table_id: &'a str,
}

pub fn add_asset(tx: &mut TransactionBlock, package_id: &str, p: &AddAssetParams<'_>) {
    tx.move_call(
        dca_target(package_id, "add_asset"),
        vec![p.coin_type.to_string()],
        vec![
            Argument::object(p.admin_cap_id),
            Argument::object(p.coin_meta_id),
            Argument::object(p.global_table_id),
        ],
    );
}

pub fn add_oracle(tx: &mut TransactionBlock, package_id: &str, admin_cap_id: &str, receiver: &str) {
    tx.move_call(
        dca_target(package_id, "add_oracle"),
        vec![],
        vec![Argument::object(admin_cap_id), Argument::address(receiver)],
    );
}

pub struct UpdatePriceParams<'a> {
    pub oracle_cap_id: &'a str,
    pub asset_id:      &'a str,
    pub coin_type:     &'a str,
    pub price_usd:     u64,
}

pub fn update_price(tx: &mut TransactionBlock, package_id: &str, p: &UpdatePriceParams<'_>) {
    tx.move_call(
        dca_target(package_id, "update_price"),
        vec![p.coin_type.to_string()],
        vec![
            Argument::object(p.oracle_cap_id),
            Argument::object(p.asset_id),
            Argument::u64(p.price_usd),
        ],
    );
}

pub struct CreatePositionParams<'a> {
    pub input_coin_type:  &'a str,
    pub output_coin_type: &'a str,
    pub deposit:          Payment<'a>,
    pub amount_per_trade: u64,
    /// Seconds between trades.
    pub frequency:        u64,
}

pub fn create_position(
    tx: &mut TransactionBlock,
    package_id: &str,
    p: &CreatePositionParams<'_>,
) -> Result<Argument, AppError> {
    if p.amount_per_trade == 0 {
        return Err(AppError::Validation("amount per trade must be positive".into()));
    }
    if p.frequency == 0 {
        return Err(AppError::Validation("frequency must be positive".into()));
    }

    let deposit = tx.payment(p.deposit)?;
    Ok(tx.move_call(
        dca_target(package_id, "create_position"),
        vec![p.input_coin_type.to_string(), p.output_coin_type.to_string()],
        vec![deposit, Argument::u64(p.amount_per_trade), Argument::u64(p.frequency)],
    ))
}

pub struct ExecuteTradeParams<'a> {
    pub position_id:      &'a str,
    /// Operator coins of the output type being sold into the position.
    pub payment:          Payment<'a>,
    pub input_asset_id:   &'a str,
    pub output_asset_id:  &'a str,
    pub input_coin_type:  &'a str,
    pub output_coin_type: &'a str,
}

pub fn execute_trade(
    tx: &mut TransactionBlock,
    package_id: &str,
    p: &ExecuteTradeParams<'_>,
) -> Result<Argument, AppError> {
    let coin = tx.payment(p.payment)?;
    Ok(tx.move_call(
        dca_target(package_id, "execute_trade"),
        vec![p.input_coin_type.to_string(), p.output_coin_type.to_string()],
        vec![
            Argument::object(p.position_id),
            coin,
            Argument::object(p.input_asset_id),
            Argument::object(p.output_asset_id),
        ],
    ))
}

pub fn withdraw_funds(
    tx: &mut TransactionBlock,
    package_id: &str,
    position_id: &str,
    input_coin_type: &str,
    output_coin_type: &str,
) -> Argument {
    tx.move_call(
        dca_target(package_id, "withdraw_funds"),
        vec![input_coin_type.to_string(), output_coin_type.to_string()],
        vec![Argument::object(position_id)],
    )
}

pub fn close_position(
    tx: &mut TransactionBlock,
    package_id: &str,
    position_id: &str,
    input_coin_type: &str,
    output_coin_type: &str,
) -> Argument {
    tx.move_call(
        dca_target(package_id, "close_position"),
        vec![input_coin_type.to_string(), output_coin_type.to_string()],
        vec![Argument::object(position_id)],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coins(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_single_coin_is_not_merged() {
        let mut tx = TransactionBlock::new(1);
        let arg = tx.merge_coins(&coins(&["0xc1"])).unwrap();
        assert!(tx.commands.is_empty());
        assert_eq!(arg, Argument::object("0xc1"));
    }

    #[test]
    fn test_merge_coins_requires_one() {
        let mut tx = TransactionBlock::new(1);
        assert!(matches!(tx.merge_coins(&[]), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_execute_trade_merges_then_splits() {
        let mut tx = TransactionBlock::new(50_000_000);
        let ids = coins(&["0xc1", "0xc2", "0xc3"]);
        execute_trade(&mut tx, "0xpkg", &ExecuteTradeParams {
            position_id:      "0xpos",
            payment:          Payment::Coins { ids: &ids, amount: CoinAmount::Exact(50) },
            input_asset_id:   "0xin",
            output_asset_id:  "0xout",
            input_coin_type:  "0x2::sui::SUI",
            output_coin_type: "0xabc::usdc::USDC",
        })
        .unwrap();

        assert_eq!(tx.commands.len(), 3);
        assert_eq!(tx.commands[0], Command::MergeCoins {
            destination: Argument::object("0xc1"),
            sources:     vec![Argument::object("0xc2"), Argument::object("0xc3")],
        });
        assert_eq!(tx.commands[1], Command::SplitCoins {
            coin:    Argument::object("0xc1"),
            amounts: vec![50],
        });
        match &tx.commands[2] {
            Command::MoveCall { target, type_arguments, arguments } => {
                assert_eq!(target, "0xpkg::dca::execute_trade");
                assert_eq!(type_arguments, &vec!["0x2::sui::SUI".to_string(), "0xabc::usdc::USDC".to_string()]);
                assert_eq!(arguments[0], Argument::object("0xpos"));
                assert_eq!(arguments[1], Argument::NestedResult { index: 1, result: 0 });
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_execute_trade_max_skips_split() {
        let mut tx = TransactionBlock::new(1);
        let ids = coins(&["0xc1", "0xc2"]);
        execute_trade(&mut tx, "0xpkg", &ExecuteTradeParams {
            position_id:      "0xpos",
            payment:          Payment::Coins { ids: &ids, amount: CoinAmount::Max },
            input_asset_id:   "0xin",
            output_asset_id:  "0xout",
            input_coin_type:  "A",
            output_coin_type: "B",
        })
        .unwrap();

        assert_eq!(tx.commands.len(), 2);
        assert!(matches!(tx.commands[1], Command::MoveCall { ref arguments, .. }
            if arguments[1] == Argument::object("0xc1")));
    }

    #[test]
    fn test_create_position_validates() {
        let mut tx = TransactionBlock::new(1);
        let ids = coins(&["0xc1"]);
        let params = CreatePositionParams {
            input_coin_type:  "A",
            output_coin_type: "B",
            deposit:          Payment::Coins { ids: &ids, amount: CoinAmount::Exact(1000) },
            amount_per_trade: 0,
            frequency:        60,
        };
        assert!(create_position(&mut tx, "0xpkg", &params).is_err());
        assert!(tx.commands.is_empty());
    }

    #[test]
    fn test_gas_payment_splits_gas_coin() {
        let mut tx = TransactionBlock::new(1);
        let coin = tx.payment(Payment::Gas(700)).unwrap();
        assert_eq!(tx.commands, vec![Command::SplitCoins { coin: Argument::GasCoin, amounts: vec![700] }]);
        assert_eq!(coin, Argument::NestedResult { index: 0, result: 0 });
    }

    #[test]
    fn test_update_price_call() {
        let mut tx = TransactionBlock::new(1);
        update_price(&mut tx, "0xpkg", &UpdatePriceParams {
            oracle_cap_id: "0xcap",
            asset_id:      "0xasset",
            coin_type:     "0x2::sui::SUI",
            price_usd:     4_200_000,
        });
        assert_eq!(tx.commands, vec![Command::MoveCall {
            target:         "0xpkg::dca::update_price".into(),
            type_arguments: vec!["0x2::sui::SUI".into()],
            arguments:      vec![
                Argument::object("0xcap"),
                Argument::object("0xasset"),
                Argument::u64(4_200_000),
            ],
        }]);
    }
}
