//! Bounded update history, optionally backed by a [`ConfigStore`](crate::management::ConfigStore).

use std::{collections::VecDeque, sync::Arc};

use tokio::sync::RwLock;

use crate::{management::ConfigStore, MonoupdateResult};

use super::UpdateRecord;

//--------------------------------------------------------------------------------------------------
// Types
//--------------------------------------------------------------------------------------------------

/// Bounded, append-only history of update executions.
///
/// The oldest record is evicted once `capacity` is reached. When a [`ConfigStore`] is attached,
/// appended records are also persisted; persistence failures are logged and do not lose the
/// in-memory record.
#[derive(Clone)]
pub struct UpdateHistory {
    records: Arc<RwLock<VecDeque<UpdateRecord>>>,
    capacity: usize,
    store: Option<Arc<dyn ConfigStore>>,
}

//--------------------------------------------------------------------------------------------------
// Methods
//--------------------------------------------------------------------------------------------------

impl UpdateHistory {
    /// Creates an in-memory history holding at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(capacity))),
            capacity,
            store: None,
        }
    }

    /// Creates a history that persists records to `store`.
    pub fn with_store(capacity: usize, store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store: Some(store),
            ..Self::new(capacity)
        }
    }

    /// Replaces the in-memory records with the most recent ones from the store.
    pub async fn load(&self) -> MonoupdateResult<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };

        let loaded = store.load_update_history(self.capacity).await?;
        tracing::debug!(count = loaded.len(), "loaded update history");

        let mut records = self.records.write().await;
        records.clear();
        records.extend(loaded);
        Ok(())
    }

    /// Appends a record, evicting the oldest one at capacity.
    pub async fn append(&self, record: UpdateRecord) {
        if let Some(store) = &self.store {
            if let Err(e) = store.append_update_record(&record, self.capacity).await {
                tracing::warn!(image = %record.image, error = %e, "failed to persist update record");
            }
        }

        let mut records = self.records.write().await;
        records.push_back(record);
        while records.len() > self.capacity {
            records.pop_front();
        }
    }

    /// Returns up to `limit` records, newest first.
    pub async fn list(&self, limit: usize) -> Vec<UpdateRecord> {
        self.records
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the number of records held.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if no record is held.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Returns the maximum number of records held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

//--------------------------------------------------------------------------------------------------
// Trait Implementations
//--------------------------------------------------------------------------------------------------

impl std::fmt::Debug for UpdateHistory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateHistory")
            .field("capacity", &self.capacity)
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
