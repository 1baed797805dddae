//! # models::position
//!
//! A user's recurring-purchase plan and its trade eligibility.
//!
//! The ledger stores `last_trade_time` as milliseconds with `0` meaning
//! "never traded"; here that becomes `None`.

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{field_str, field_u64, normalize_coin_type, LedgerError, LedgerObject};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub id:                String,
    pub owner:             String,
    pub input_coin_type:   String,
    pub output_coin_type:  String,
    /// Remaining balance, input-token units.
    pub deposit:           u64,
    pub amount_per_trade:  u64,
    pub frequency_seconds: u64,
    pub last_trade_time:   Option<DateTime<Utc>>,
    /// Cumulative output-token units bought so far.
    pub received:          u64,
}

impl Position {
    pub fn from_object(object: &LedgerObject) -> Result<Self, LedgerError> {
        let (input_coin_type, output_coin_type) = parse_type_args(&object.object_type)
            .ok_or_else(|| {
                LedgerError::Decode(format!(
                    "position {} has no type arguments: {}",
                    object.object_id, object.object_type
                ))
            })?;

        let fields = &object.fields;
        let last_trade_ms = field_u64(fields, "last_trade_time")?;
        let last_trade_time = match last_trade_ms {
            0 => None,
            ms => Some(
                Utc.timestamp_millis_opt(ms as i64)
                    .single()
                    .ok_or_else(|| LedgerError::Decode(format!("bad last_trade_time {ms}")))?,
            ),
        };

        Ok(Self {
            id: object.object_id.clone(),
            owner: field_str(fields, "owner")?,
            input_coin_type: normalize_coin_type(&input_coin_type),
            output_coin_type: normalize_coin_type(&output_coin_type),
            deposit: field_u64(fields, "deposit")?,
            amount_per_trade: field_u64(fields, "amount_per_trade")?,
            frequency_seconds: field_u64(fields, "frequency")?,
            last_trade_time,
            received: field_u64(fields, "received")?,
        })
    }

    /// An emptied position never trades again.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.deposit == 0
    }

    /// `deposit > 0` and either never traded or at least `frequency_seconds`
    /// elapsed since the last trade (boundary inclusive).
    pub fn is_eligible_at(&self, now: DateTime<Utc>) -> bool {
        if self.is_terminal() {
            return false;
        }
        match self.last_trade_time {
            None => true,
            Some(last) => {
                let frequency = i64::try_from(self.frequency_seconds).unwrap_or(i64::MAX);
                (now - last).num_seconds() >= frequency
            }
        }
    }

    /// Earliest time the next trade may run; `None` once terminal.
    pub fn next_trade_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.is_terminal() {
            return None;
        }
        match self.last_trade_time {
            None => Some(now),
            // `None` as well when the sum falls outside the calendar range
            Some(last) => {
                let secs = i64::try_from(self.frequency_seconds).unwrap_or(i64::MAX).min(i64::MAX / 1000);
                last.checked_add_signed(Duration::seconds(secs))
            }
        }
    }

    /// Input amount the next trade consumes: a full slice, or whatever is left
    /// on the final one.
    #[inline]
    pub fn next_trade_input(&self) -> u64 {
        self.amount_per_trade.min(self.deposit)
    }
}

/// Extract `(Input, Output)` from `…::dca::Position<Input, Output>`.
pub fn parse_type_args(object_type: &str) -> Option<(String, String)> {
    let open = object_type.find('<')?;
    let close = object_type.rfind('>')?;
    if close <= open {
        return None;
    }
    let inner = &object_type[open + 1..close];

    // split on the top-level comma only; coin types may be generic themselves
    let mut depth = 0usize;
    for (i, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                let first = inner[..i].trim();
                let second = inner[i + 1..].trim();
                if first.is_empty() || second.is_empty() {
                    return None;
                }
                return Some((first.to_string(), second.to_string()));
            }
            _ => {}
        }
    }
    None
}
