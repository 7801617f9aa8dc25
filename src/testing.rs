//! Scripted in-process chain for unit tests.

use crate::chain::{ChainClient, ExecutionReverted};
use crate::events::{Transfer, balanceOfCall, decimalsCall, nameCall, symbolCall, totalSupplyCall};
use crate::repository::{Block, LogEntry, Transaction};
use alloy::sol_types::{SolCall, SolEvent, SolValue};
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// `amount * 10^decimals`
pub fn units(amount: u64, decimals: u8) -> U256 {
    U256::from(amount) * U256::from(10u64).pow(U256::from(decimals))
}

pub fn block(number: u64, transactions: Vec<Transaction>) -> Block {
    Block {
        number,
        hash: B256::with_last_byte(number as u8),
        parent_hash: B256::with_last_byte(number.wrapping_sub(1) as u8),
        timestamp: 1_700_000_000 + number,
        transactions,
    }
}

pub fn transaction(hash_byte: u8, block_number: u64, to: Option<Address>) -> Transaction {
    Transaction {
        hash: B256::repeat_byte(hash_byte),
        block_number,
        from: Address::repeat_byte(0xf0),
        to,
        value: U256::ZERO,
        nonce: u64::from(hash_byte),
        gas_limit: 21_000,
        input: Bytes::new(),
    }
}

#[derive(Debug, Clone)]
pub struct MockToken {
    name: String,
    symbol: String,
    decimals: u8,
    total_supply: U256,
    balances: HashMap<Address, U256>,
    malformed_name: bool,
}

impl MockToken {
    pub fn new(name: &str, symbol: &str, decimals: u8, total_supply: U256) -> Self {
        Self {
            name: name.to_string(),
            symbol: symbol.to_string(),
            decimals,
            total_supply,
            balances: HashMap::new(),
            malformed_name: false,
        }
    }

    /// `name()` answers with bytes that are not a valid ABI string.
    pub fn with_malformed_name(mut self) -> Self {
        self.malformed_name = true;
        self
    }

    fn answer(&self, data: &[u8]) -> Result<Bytes> {
        let Some(selector) = data.get(..4) else {
            return Ok(Bytes::new());
        };

        let encoded = if selector == decimalsCall::SELECTOR {
            (U256::from(self.decimals),).abi_encode_params()
        } else if selector == nameCall::SELECTOR {
            if self.malformed_name {
                vec![0xff; 3]
            } else {
                (self.name.clone(),).abi_encode_params()
            }
        } else if selector == symbolCall::SELECTOR {
            (self.symbol.clone(),).abi_encode_params()
        } else if selector == totalSupplyCall::SELECTOR {
            (self.total_supply,).abi_encode_params()
        } else if selector == balanceOfCall::SELECTOR {
            let call = balanceOfCall::abi_decode(data)?;
            let balance = self.balances.get(&call.owner).copied().unwrap_or_default();
            (balance,).abi_encode_params()
        } else {
            Vec::new()
        };
        Ok(encoded.into())
    }
}

#[derive(Default)]
struct MockState {
    tip: u64,
    blocks: HashMap<u64, Block>,
    code: HashMap<Address, Bytes>,
    tokens: HashMap<Address, MockToken>,
    logs: HashMap<(u64, Address), Vec<LogEntry>>,
    failing_calls: HashSet<Address>,
    failing_blocks: HashSet<u64>,
    failing_code: HashSet<Address>,
    failing_logs: HashSet<Address>,
    announced: Vec<u64>,
}

#[derive(Default)]
pub struct MockChain {
    state: Mutex<MockState>,
    calls: AtomicUsize,
}

impl MockChain {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn set_tip(&self, tip: u64) {
        self.state().tip = tip;
    }

    pub fn add_block(&self, block: Block) {
        let mut state = self.state();
        state.tip = state.tip.max(block.number);
        state.blocks.insert(block.number, block);
    }

    pub fn deploy_contract(&self, address: Address) {
        self.state()
            .code
            .insert(address, Bytes::from_static(&[0x60, 0x80, 0x60, 0x40]));
    }

    pub fn deploy_token(&self, address: Address, token: MockToken) {
        self.deploy_contract(address);
        self.state().tokens.insert(address, token);
    }

    pub fn set_balance(&self, token: Address, holder: Address, balance: U256) {
        if let Some(token) = self.state().tokens.get_mut(&token) {
            token.balances.insert(holder, balance);
        }
    }

    pub fn add_transfer_log(
        &self,
        block_number: u64,
        token: Address,
        from: Address,
        to: Address,
        value: U256,
    ) {
        let data = Transfer { from, to, value }.encode_log_data();
        self.add_log(
            block_number,
            LogEntry {
                address: token,
                topics: data.topics().to_vec(),
                data: data.data.clone(),
            },
        );
    }

    pub fn add_log(&self, block_number: u64, log: LogEntry) {
        self.state()
            .logs
            .entry((block_number, log.address))
            .or_default()
            .push(log);
    }

    /// `eth_call` to `address` fails in transport, as a timeout would.
    pub fn fail_calls_to(&self, address: Address) {
        self.state().failing_calls.insert(address);
    }

    pub fn fail_block_fetch(&self, number: u64) {
        self.state().failing_blocks.insert(number);
    }

    pub fn fail_code_lookup_for(&self, address: Address) {
        self.state().failing_code.insert(address);
    }

    pub fn fail_logs_for(&self, address: Address) {
        self.state().failing_logs.insert(address);
    }

    /// Tips reported, in order, by the new-block stream.
    pub fn announce(&self, numbers: impl IntoIterator<Item = u64>) {
        self.state().announced.extend(numbers);
    }

    /// Number of `eth_call` requests served so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn block_number(&self) -> Result<u64> {
        Ok(self.state().tip)
    }

    async fn block_with_transactions(&self, number: u64) -> Result<Option<Block>> {
        let state = self.state();
        if state.failing_blocks.contains(&number) {
            anyhow::bail!("eth_getBlockByNumber timed out for block {number}");
        }
        Ok(state.blocks.get(&number).cloned())
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        let state = self.state();
        if state.failing_code.contains(&address) {
            anyhow::bail!("eth_getCode timed out for {address:?}");
        }
        Ok(state.code.get(&address).cloned().unwrap_or_default())
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state();
        if state.failing_calls.contains(&to) {
            anyhow::bail!("eth_call to {to:?} timed out");
        }
        if let Some(token) = state.tokens.get(&to) {
            return token.answer(&data);
        }
        if state.code.contains_key(&to) {
            return Err(ExecutionReverted {
                to,
                message: "execution reverted".to_string(),
            }
            .into());
        }
        Ok(Bytes::new())
    }

    async fn logs(&self, block_number: u64, address: Address) -> Result<Vec<LogEntry>> {
        let state = self.state();
        if state.failing_logs.contains(&address) {
            anyhow::bail!("eth_getLogs failed for {address:?}");
        }
        Ok(state
            .logs
            .get(&(block_number, address))
            .cloned()
            .unwrap_or_default())
    }

    async fn new_blocks(&self, after: u64) -> Result<BoxStream<'static, Result<u64>>> {
        let announced = self.state().announced.clone();
        let last = announced.into_iter().max().unwrap_or(after);
        Ok(stream::iter((after + 1..=last).map(Ok)).boxed())
    }
}
