//! In-memory resource storage.

use std::{collections::HashMap, sync::RwLock};

use async_trait::async_trait;
use execstream_core::traits::{ResourceKind, ResourceStore, StoreError};

/// In-memory storage implementation.
///
/// Useful for development, tests and single-process deployments.
/// Data is lost on restart.
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Number of stored entries across all kinds.
    ///
    /// # Errors
    /// Returns `StoreError::Internal` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .len())
    }

    /// Whether the store holds no entries.
    ///
    /// # Errors
    /// Returns `StoreError::Internal` if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, StoreError> {
        self.len().map(|n| n == 0)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn get(&self, kind: ResourceKind, id: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .get(&kind.key(id))
            .cloned())
    }

    async fn save(&self, kind: ResourceKind, id: &str, data: Vec<u8>) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .insert(kind.key(id), data);
        Ok(())
    }

    async fn list(&self, kind: ResourceKind) -> Result<Vec<Vec<u8>>, StoreError> {
        let prefix = kind.key("");
        let entries = self
            .entries
            .read()
            .map_err(|e| StoreError::Internal(e.to_string()))?;

        Ok(entries
            .iter()
            .filter(|(key, _)| key.starts_with(&prefix))
            .map(|(_, data)| data.clone())
            .collect())
    }

    async fn delete(&self, kind: ResourceKind, id: &str) -> Result<(), StoreError> {
        self.entries
            .write()
            .map_err(|e| StoreError::Internal(e.to_string()))?
            .remove(&kind.key(id));
        Ok(())
    }
}
