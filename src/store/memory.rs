use super::Store;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    scalars: BTreeMap<String, String>,
    hashes: BTreeMap<String, HashMap<String, String>>,
}

/// In-process store. Every operation holds one lock, so the conditional
/// primitives are atomic with respect to each other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow::anyhow!("memory store mutex poisoned"))
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let inner = self.lock()?;
        Ok(inner.scalars.contains_key(key) || inner.hashes.contains_key(key))
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.lock()?.scalars.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?
            .scalars
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        self.lock()?
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_set_if_absent(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let mut inner = self.lock()?;
        let hash = inner.hashes.entry(key.to_string()).or_default();
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        Ok(self
            .lock()?
            .hashes
            .get(key)
            .and_then(|hash| hash.get(field))
            .cloned())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        Ok(self.lock()?.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_len(&self, key: &str) -> Result<usize> {
        Ok(self.lock()?.hashes.get(key).map_or(0, HashMap::len))
    }

    async fn advance_counter(&self, key: &str, value: u64) -> Result<bool> {
        let mut inner = self.lock()?;
        let current = inner
            .scalars
            .get(key)
            .and_then(|raw| raw.parse::<u64>().ok());
        if current.is_some_and(|current| current >= value) {
            return Ok(false);
        }
        inner.scalars.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let inner = self.lock()?;
        let mut keys: Vec<String> = inner
            .scalars
            .keys()
            .chain(inner.hashes.keys())
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys.dedup();
        Ok(keys)
    }
}
