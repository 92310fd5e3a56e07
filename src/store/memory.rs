//! In-process key-value store
//!
//! Backs the binary in single-node deployments and doubles as the test
//! store. A network-backed implementation replaces it behind the same trait
//! without touching any caller.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tokio::sync::RwLock;

use super::KeyValueStore;
use crate::error::StoreError;

/// [`KeyValueStore`] over a `tokio` read-write lock
///
/// Writes take the lock exclusively, so `put_if_absent` observes and claims
/// the key in one step.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<HashMap<String, String>>,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl KeyValueStore for InMemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: String) -> Result<bool, StoreError> {
        match self.entries.write().await.entry(key.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(slot) => {
                slot.insert(value);
                Ok(true)
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
