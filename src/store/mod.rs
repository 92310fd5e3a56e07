//! Key-value storage layer
//!
//! All worker state lives in one shared key-value store with string keys and
//! JSON-string values. [`KeyValueStore`] is the seam a network-backed store
//! plugs into; [`InMemoryStore`] is the in-process implementation. Every
//! component reads and writes through a [`Namespace`], which prefixes each
//! logical key with the deployment identifier so independent deployments
//! sharing one store never collide.
//!
//! # Key layout (within a namespace)
//!
//! ```text
//! tenant:<subdomain>        Tenant record
//! tenants:list              Tenant Index (ordered subdomains)
//! user:<userId>             User record
//! users:list                User Index
//! subscription:<userId>     Subscription record
//! subscriptions:list        Subscription Index
//! invoice:<invoiceId>       Invoice record (append-only)
//! revenue:<YYYY-MM>         Monthly revenue ledger
//! owner:<userId>            Subdomains registered by a user
//! stats:*                   Materialized aggregate counters
//! ```

mod memory;

pub use memory::InMemoryStore;

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;

/// Async interface to the shared key-value store
///
/// Keys are plain strings, values are JSON text. Implementations are shared
/// across request tasks, so all methods take `&self`.
#[async_trait::async_trait]
pub trait KeyValueStore: Send + Sync + 'static {
    /// Fetch the value stored under `key`, if any
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store `value` under `key`, overwriting any previous value
    async fn put(&self, key: &str, value: String) -> Result<(), StoreError>;

    /// Store `value` under `key` only if the key is currently absent
    ///
    /// Returns `true` if the write happened. The check and the write are a
    /// single atomic step: concurrent callers see exactly one winner.
    async fn put_if_absent(&self, key: &str, value: String) -> Result<bool, StoreError>;

    /// Remove `key`; removing an absent key is not an error
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Shared handle to a store implementation
pub type SharedStore = Arc<dyn KeyValueStore>;

/// Logical key builders for the namespace layout
pub mod keys {
    /// The Tenant Index: ordered list of every registered subdomain
    pub const TENANT_INDEX: &str = "tenants:list";
    /// The User Index: ids seen via `user.created`
    pub const USER_INDEX: &str = "users:list";
    /// The Subscription Index: userIds with a subscription record
    pub const SUBSCRIPTION_INDEX: &str = "subscriptions:list";
    /// Materialized tenant count
    pub const STATS_TENANT_COUNT: &str = "stats:tenantCount";
    /// Materialized user count
    pub const STATS_USER_COUNT: &str = "stats:userCount";
    /// Materialized subscriber count
    pub const STATS_SUBSCRIBER_COUNT: &str = "stats:subscriberCount";
    /// Materialized Monthly Recurring Revenue
    pub const STATS_MRR: &str = "stats:mrr";

    /// Tenant record for a subdomain
    pub fn tenant(subdomain: &str) -> String {
        format!("tenant:{subdomain}")
    }

    /// User record for an external identity id
    pub fn user(user_id: &str) -> String {
        format!("user:{user_id}")
    }

    /// Subscription record for a user
    pub fn subscription(user_id: &str) -> String {
        format!("subscription:{user_id}")
    }

    /// Invoice record for a paid invoice id
    pub fn invoice(invoice_id: &str) -> String {
        format!("invoice:{invoice_id}")
    }

    /// Revenue ledger entry for a `YYYY-MM` calendar month
    pub fn revenue(month: &str) -> String {
        format!("revenue:{month}")
    }

    /// Subdomains registered by a user
    pub fn owner(user_id: &str) -> String {
        format!("owner:{user_id}")
    }
}

/// A deployment-scoped view of the store
///
/// Every logical key is prefixed with `<deployment>:` before it reaches the
/// backing store. Components never hold a raw store handle; this wrapper is
/// the only read/write path, which rules out cross-deployment key collisions
/// by construction.
#[derive(Clone)]
pub struct Namespace {
    store: SharedStore,
    prefix: Arc<str>,
}

impl Namespace {
    /// Scope `store` to the given deployment identifier
    pub fn new(store: SharedStore, deployment: &str) -> Self {
        Self {
            store,
            prefix: Arc::from(deployment),
        }
    }

    /// The deployment identifier this namespace prefixes keys with
    pub fn deployment(&self) -> &str {
        &self.prefix
    }

    /// The fully prefixed storage key for a logical key
    pub fn storage_key(&self, key: &str) -> String {
        format!("{}:{}", self.prefix, key)
    }

    /// Fetch the raw JSON text stored under a logical key
    pub async fn get_raw(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.store.get(&self.storage_key(key)).await
    }

    /// Store raw JSON text under a logical key
    pub async fn put_raw(&self, key: &str, value: String) -> Result<(), StoreError> {
        self.store.put(&self.storage_key(key), value).await
    }

    /// Fetch and decode the value stored under a logical key
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let storage_key = self.storage_key(key);
        match self.store.get(&storage_key).await? {
            Some(text) => {
                let value = serde_json::from_str(&text).map_err(|e| StoreError::Codec {
                    key: storage_key,
                    reason: e.to_string(),
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Encode and store a value under a logical key
    pub async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let storage_key = self.storage_key(key);
        let text = serde_json::to_string(value).map_err(|e| StoreError::Codec {
            key: storage_key.clone(),
            reason: e.to_string(),
        })?;
        self.store.put(&storage_key, text).await
    }

    /// Encode and store a value only if the logical key is currently absent
    ///
    /// Returns `true` if this call claimed the key.
    pub async fn put_json_if_absent<T: Serialize>(
        &self,
        key: &str,
        value: &T,
    ) -> Result<bool, StoreError> {
        let storage_key = self.storage_key(key);
        let text = serde_json::to_string(value).map_err(|e| StoreError::Codec {
            key: storage_key.clone(),
            reason: e.to_string(),
        })?;
        self.store.put_if_absent(&storage_key, text).await
    }

    /// Remove a logical key
    pub async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.store.delete(&self.storage_key(key)).await
    }

    /// Append `value` to the string list at `key` unless already present
    ///
    /// Returns `true` if the list changed. Read-modify-write without locking,
    /// like every other multi-key sequence against this store.
    pub async fn index_append(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let mut list: Vec<String> = self.get_json(key).await?.unwrap_or_default();
        if list.iter().any(|v| v == value) {
            return Ok(false);
        }
        list.push(value.to_string());
        self.put_json(key, &list).await?;
        Ok(true)
    }

    /// Remove every occurrence of `value` from the string list at `key`
    ///
    /// Returns `true` if the list changed. Removing from an absent list is
    /// not an error.
    pub async fn index_remove(&self, key: &str, value: &str) -> Result<bool, StoreError> {
        let Some(mut list) = self.get_json::<Vec<String>>(key).await? else {
            return Ok(false);
        };
        let before = list.len();
        list.retain(|v| v != value);
        if list.len() == before {
            return Ok(false);
        }
        self.put_json(key, &list).await?;
        Ok(true)
    }

    /// Read a counter-style value, falling back to `default` when the key is
    /// absent or holds unparsable text
    pub async fn get_u64_or(&self, key: &str, default: u64) -> Result<u64, StoreError> {
        Ok(self
            .get_raw(key)
            .await?
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or(default))
    }

    /// Read a gauge-style value, falling back to `default` when the key is
    /// absent or holds unparsable text
    pub async fn get_f64_or(&self, key: &str, default: f64) -> Result<f64, StoreError> {
        Ok(self
            .get_raw(key)
            .await?
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or(default))
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("deployment", &self.prefix)
            .finish()
    }
}
