use super::keys;
use super::models::{Block, Transaction};
use crate::store::Store;
use alloy_primitives::B256;
use anyhow::{Context, Result};

/// Append-only block and transaction ledgers.
///
/// Each ledger is one hash under a fixed key; the field is the record's
/// identity (block number, transaction hash) and the value its JSON form.
/// Appends are conditional inserts, so a record is written at most once.
pub struct LedgerRepository<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> LedgerRepository<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Returns `false` when a block with the same number is already recorded.
    pub async fn append_block(&self, block: &Block) -> Result<bool> {
        let value = serde_json::to_string(block)?;
        self.store
            .hash_set_if_absent(keys::BLOCKS, &block.number.to_string(), &value)
            .await
    }

    /// Returns `false` when a transaction with the same hash is already recorded.
    pub async fn append_transaction(&self, transaction: &Transaction) -> Result<bool> {
        let value = serde_json::to_string(transaction)?;
        self.store
            .hash_set_if_absent(keys::TRANSACTIONS, &format!("{:?}", transaction.hash), &value)
            .await
    }

    pub async fn get_block(&self, number: u64) -> Result<Option<Block>> {
        let raw = self.store.hash_get(keys::BLOCKS, &number.to_string()).await?;
        raw.map(|raw| {
            serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt ledger entry for block {number}"))
        })
        .transpose()
    }

    pub async fn get_transaction(&self, hash: &B256) -> Result<Option<Transaction>> {
        let raw = self
            .store
            .hash_get(keys::TRANSACTIONS, &format!("{hash:?}"))
            .await?;
        raw.map(|raw| {
            serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt ledger entry for transaction {hash:?}"))
        })
        .transpose()
    }

    pub async fn block_count(&self) -> Result<usize> {
        self.store.hash_len(keys::BLOCKS).await
    }

    pub async fn transaction_count(&self) -> Result<usize> {
        self.store.hash_len(keys::TRANSACTIONS).await
    }
}
