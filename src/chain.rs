//! Chain client contract consumed by the ingestion engine.

use crate::error::IngestError;
use crate::repository::{Block, LogEntry};
use alloy::sol_types::SolCall;
use alloy_primitives::{Address, Bytes};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

#[async_trait]
pub trait ChainClient: Send + Sync + 'static {
    /// Current chain tip.
    async fn block_number(&self) -> Result<u64>;

    /// Full block with inlined transactions, `None` when the node does not know it.
    async fn block_with_transactions(&self, number: u64) -> Result<Option<Block>>;

    /// Bytecode at `address` on the latest block; empty for externally owned accounts.
    async fn code_at(&self, address: Address) -> Result<Bytes>;

    /// `eth_call` against the latest block. A call the node executed and that
    /// reverted fails with [`ExecutionReverted`].
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes>;

    /// Logs emitted by `address` in block `block_number`.
    async fn logs(&self, block_number: u64, address: Address) -> Result<Vec<LogEntry>>;

    /// Every block number above `after` as it appears on chain, ascending and
    /// without gaps.
    async fn new_blocks(&self, after: u64) -> Result<BoxStream<'static, Result<u64>>>;
}

/// The contract was executed and reverted. Retrying gives the same answer.
#[derive(Debug, thiserror::Error)]
#[error("eth_call to {to:?} reverted: {message}")]
pub struct ExecutionReverted {
    pub to: Address,
    pub message: String,
}

pub fn is_revert(err: &anyhow::Error) -> bool {
    err.is::<ExecutionReverted>()
}

/// Calls a typed contract method and decodes its return value.
pub async fn call_contract<C, T>(client: &C, to: Address, call: T) -> Result<T::Return, IngestError>
where
    C: ChainClient + ?Sized,
    T: SolCall + Send,
{
    let data = client
        .call(to, call.abi_encode().into())
        .await
        .map_err(IngestError::chain)?;
    T::abi_decode_returns(&data).map_err(IngestError::decode)
}
