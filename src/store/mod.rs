//! Key-value store contract consumed by the ingestion engine.
//!
//! The store is a plain associative map with scalar values, hash values
//! (field → value maps) and prefix enumeration. Two conditional primitives,
//! [`Store::hash_set_if_absent`] and [`Store::advance_counter`], are atomic
//! inside the backend so that concurrent ingestions cannot lose ledger
//! entries or move the checkpoint backwards.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// True when `key` holds either a scalar or a hash.
    async fn exists(&self, key: &str) -> Result<bool>;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Inserts `field` only if it is not present yet. Returns whether it was inserted.
    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    async fn hash_len(&self, key: &str) -> Result<usize>;

    /// Stores `value` under `key` unless the current value is an integer `>= value`.
    /// Returns whether the stored value changed.
    async fn advance_counter(&self, key: &str, value: u64) -> Result<bool>;

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}
