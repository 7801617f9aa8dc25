use alloy_primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    pub block_number: u64,
    pub from: Address,
    /// `None` for contract creations.
    pub to: Option<Address>,
    pub value: U256,
    pub nonce: u64,
    pub gas_limit: u64,
    pub input: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRecord {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    pub total_supply: String,
    pub holders_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Holder {
    pub address: String,
    pub balance: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub blocks: usize,
    pub transactions: usize,
    pub tokens: usize,
    pub checkpoint: Option<u64>,
}

/// Lowercase `0x` hex form used for every address inside store keys and fields.
pub fn address_key(address: &Address) -> String {
    format!("{address:?}")
}
