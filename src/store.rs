//! # store
//!
//! **PositionStore**: read-through cache of DCA positions.
//!
//! Positions are shared objects found through `PositionCreationEvent`s.
//! [`PositionStore::refresh`] reloads the whole set (minus the caller's
//! skip-set and anything closed); [`PositionStore::invalidate`] drops one
//! entry after the engine mutates it so the next read goes back to the ledger.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::ledger::tx::dca_type;
use crate::ledger::{field_str, LedgerError, SharedLedger};
use crate::models::{Position, PositionCreationEvent};

pub struct PositionStore {
    ledger:     SharedLedger,
    package_id: String,
    cache:      RwLock<HashMap<String, Position>>,
}

impl PositionStore {
    pub fn new(ledger: SharedLedger, package_id: impl Into<String>) -> Self {
        Self {
            ledger,
            package_id: package_id.into(),
            cache:      RwLock::new(HashMap::new()),
        }
    }

    /// Ids of every position ever created and not yet closed, oldest first.
    async fn live_ids(&self) -> Result<Vec<String>, AppError> {
        let created = self
            .ledger
            .query_events(&dca_type(&self.package_id, "PositionCreationEvent"))
            .await?;
        let closed: HashSet<String> = self
            .ledger
            .query_events(&dca_type(&self.package_id, "PositionDeletionEvent"))
            .await?
            .iter()
            .filter_map(|e| field_str(&e.parsed_json, "position_id").ok())
            .collect();

        let mut ids = Vec::with_capacity(created.len());
        for raw in &created {
            match PositionCreationEvent::from_event(raw) {
                Ok(event) if !closed.contains(&event.position_id) => ids.push(event.position_id),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "Skipping undecodable PositionCreationEvent"),
            }
        }
        Ok(ids)
    }

    /// Reload every live position not in `skip` straight from the ledger.
    ///
    /// Ids in `skip` are never read. A position whose object is gone or
    /// cannot be decoded is logged and left out.
    pub async fn refresh(&self, skip: &HashSet<String>) -> Result<Vec<Position>, AppError> {
        let ids = self.live_ids().await?;
        let mut positions = Vec::with_capacity(ids.len());

        for id in ids.iter().filter(|id| !skip.contains(*id)) {
            match self.fetch(id).await {
                Ok(position) => positions.push(position),
                Err(AppError::NotFound(_)) => debug!(position_id = %id, "Position object gone"),
                Err(AppError::Ledger(LedgerError::Decode(e))) => {
                    warn!(position_id = %id, error = %e, "Skipping undecodable position");
                }
                Err(e) => return Err(e),
            }
        }

        debug!(loaded = positions.len(), skipped = skip.len(), "Positions refreshed");
        Ok(positions)
    }

    async fn fetch(&self, id: &str) -> Result<Position, AppError> {
        let object = self
            .ledger
            .get_object(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("position {id}")))?;

        let prefix = dca_type(&self.package_id, "Position<");
        if !object.object_type.starts_with(&prefix) {
            return Err(AppError::NotFound(format!("{id} is not a position ({})", object.object_type)));
        }

        let position = Position::from_object(&object)?;
        self.cache.write().await.insert(position.id.clone(), position.clone());
        Ok(position)
    }

    /// All live positions, optionally only those owned by `owner`.
    pub async fn list(&self, owner: Option<&str>) -> Result<Vec<Position>, AppError> {
        let mut positions = self.refresh(&HashSet::new()).await?;
        if let Some(owner) = owner {
            positions.retain(|p| p.owner == owner);
        }
        Ok(positions)
    }

    /// One position, from the cache when present.
    pub async fn get(&self, id: &str) -> Result<Position, AppError> {
        if let Some(position) = self.cache.read().await.get(id) {
            return Ok(position.clone());
        }
        self.fetch(id).await
    }

    pub async fn invalidate(&self, id: &str) {
        self.cache.write().await.remove(id);
    }
}
