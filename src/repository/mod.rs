pub mod checkpoint_repository;
pub mod ledger_repository;
pub mod models;
pub mod token_repository;

pub use checkpoint_repository::CheckpointRepository;
pub use ledger_repository::LedgerRepository;
pub use models::{Block, Holder, LedgerStats, LogEntry, TokenRecord, Transaction, address_key};
pub use token_repository::TokenRepository;

/// Store key layout shared by the writers and the query tooling.
pub mod keys {
    use super::address_key;
    use alloy_primitives::Address;

    pub const BLOCKS: &str = "sequencer:blocks";
    pub const TRANSACTIONS: &str = "sequencer:transactions";
    pub const TOKENS_PREFIX: &str = "sequencer:tokens:";
    pub const BALANCES_PREFIX: &str = "sequencer:erc20:balances:";
    pub const CHECKPOINT: &str = "sequencer:last:block:processed";

    pub fn token(address: &Address) -> String {
        format!("{TOKENS_PREFIX}{}", address_key(address))
    }

    pub fn balances(address: &Address) -> String {
        format!("{BALANCES_PREFIX}{}", address_key(address))
    }
}
