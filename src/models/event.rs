//! # models::event
//!
//! Contract events the registry and the position store discover objects by.
//! Assets and positions are not enumerable on the ledger; their creation
//! events are.

use serde::{Deserialize, Serialize};

use crate::ledger::{field_str, field_u64, LedgerError, LedgerEvent};

/// Emitted by `add_asset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetAddEvent {
    pub asset_id:       String,
    /// Raw type name as emitted; see [`crate::ledger::normalize_coin_type`].
    pub coin_type_name: String,
    pub coinmeta_id:    String,
    pub name:           String,
}

/// Emitted by `create_position`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionCreationEvent {
    pub position_id:    String,
    pub creator:        String,
    pub deposit_amount: u64,
    #[serde(default)]
    pub created_at_ms:  Option<u64>,
}

impl AssetAddEvent {
    pub fn from_event(event: &LedgerEvent) -> Result<Self, LedgerError> {
        let json = &event.parsed_json;
        Ok(Self {
            asset_id:       field_str(json, "asset_id")?,
            coin_type_name: field_str(json, "coin_type_name")?,
            coinmeta_id:    field_str(json, "coinmeta_id")?,
            name:           field_str(json, "name")?,
        })
    }
}

impl PositionCreationEvent {
    pub fn from_event(event: &LedgerEvent) -> Result<Self, LedgerError> {
        let json = &event.parsed_json;
        Ok(Self {
            position_id:    field_str(json, "position_id")?,
            creator:        field_str(json, "creator")?,
            deposit_amount: field_u64(json, "deposit_amount")?,
            created_at_ms:  event.timestamp_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_position_creation_event() {
        let raw = LedgerEvent {
            event_type:   "0xpkg::dca::PositionCreationEvent".into(),
            timestamp_ms: Some(1_700_000_000_000),
            parsed_json:  json!({ "position_id": "0xp", "creator": "0xu", "deposit_amount": "1000" }),
        };
        let event = PositionCreationEvent::from_event(&raw).unwrap();
        assert_eq!(event.position_id, "0xp");
        assert_eq!(event.deposit_amount, 1000);
        assert_eq!(event.created_at_ms, Some(1_700_000_000_000));
    }

    #[test]
    fn test_asset_add_event_missing_field() {
        let raw = LedgerEvent {
            event_type:   "0xpkg::dca::AssetAddEvent".into(),
            timestamp_ms: None,
            parsed_json:  json!({ "asset_id": "0xa", "name": "Sui" }),
        };
        assert!(AssetAddEvent::from_event(&raw).is_err());
    }
}
