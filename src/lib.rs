//! ERC20 ingestion engine: walks blocks from a JSON-RPC node, detects token
//! contracts among transaction recipients, and keeps token metadata and
//! per-holder balances in a key-value store.

pub mod amount;
pub mod chain;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod live_worker;
pub mod locks;
pub mod pipeline;
pub mod query;
pub mod reconciler;
pub mod repository;
pub mod rpc;
pub mod sequencer;
pub mod store;

#[cfg(test)]
pub(crate) mod testing;
