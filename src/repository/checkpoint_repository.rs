use super::keys;
use crate::store::Store;
use anyhow::{Context, Result};

/// The last block number whose ingestion ran to completion.
pub struct CheckpointRepository<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> CheckpointRepository<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    pub async fn get(&self) -> Result<Option<u64>> {
        let raw = self.store.get(keys::CHECKPOINT).await?;
        raw.map(|raw| {
            raw.trim()
                .parse::<u64>()
                .with_context(|| format!("Invalid checkpoint value: {raw}"))
        })
        .transpose()
    }

    /// Moves the checkpoint to `block_number` unless it is already at or past it.
    pub async fn advance(&self, block_number: u64) -> Result<bool> {
        self.store
            .advance_counter(keys::CHECKPOINT, block_number)
            .await
    }
}
