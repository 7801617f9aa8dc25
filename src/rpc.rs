use crate::chain::{ChainClient, ExecutionReverted};
use crate::config::Config;
use crate::repository::{Block, LogEntry, Transaction};
use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::network::TransactionResponse;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{BlockNumberOrTag, Filter, TransactionInput, TransactionRequest};
use alloy::transports::{TransportError, TransportResult};
use alloy_primitives::{Address, Bytes};
use anyhow::Result;
use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::{self, BoxStream};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

/// JSON-RPC error code nodes use for a reverted `eth_call`.
const EXECUTION_REVERTED_CODE: i64 = 3;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);

#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
    request_timeout: Duration,
    poll_interval: Duration,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: 5,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let mut client = Self::new(&config.json_rpc_urls)?;
        client.max_retries = config.max_retries;
        client.request_timeout = config.request_timeout;
        client.poll_interval = config.poll_interval;
        Ok(client)
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> + Send + use<> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, method: &str, error_str: &str) {
        let current_url = self.get_current_url();
        warn!(
            "RPC error on {} during {}: {}, rotating provider",
            current_url, method, error_str
        );
        self.rotate_provider();
    }

    fn handle_timeout(&self, method: &str) -> anyhow::Error {
        let current_url = self.get_current_url();
        warn!(
            "{} timed out after {} seconds on {}, rotating provider",
            method,
            self.request_timeout.as_secs(),
            current_url
        );
        self.rotate_provider();
        anyhow::anyhow!(
            "{} timed out after {} seconds",
            method,
            self.request_timeout.as_secs()
        )
    }

    /// Runs `op` against the current provider with a timeout, rotating the
    /// provider and retrying with backoff on failure.
    async fn request<T, F, Fut>(&self, method: &'static str, op: F) -> Result<T>
    where
        T: Send,
        F: Fn(AlloyFullProvider) -> Fut + Send + Sync,
        Fut: Future<Output = TransportResult<T>> + Send,
    {
        self.request_with(method, op, |_| None).await
    }

    /// Like [`RpcClient::request`], but errors for which `final_error` returns
    /// `Some` end the request at once, without retry or rotation.
    async fn request_with<T, F, Fut, E>(
        &self,
        method: &'static str,
        op: F,
        final_error: E,
    ) -> Result<T>
    where
        T: Send,
        F: Fn(AlloyFullProvider) -> Fut + Send + Sync,
        Fut: Future<Output = TransportResult<T>> + Send,
        E: Fn(&TransportError) -> Option<anyhow::Error> + Send + Sync,
    {
        RetryIf::spawn(
            self.get_retry_strategy(),
            || {
                let future = op(self.get_provider().clone());
                let final_error = &final_error;
                async move {
                    match timeout(self.request_timeout, future).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => {
                            if let Some(err) = final_error(&e) {
                                return Err(Attempt::Final(err));
                            }
                            let error_str = e.to_string();
                            self.handle_error(method, &error_str);
                            Err(Attempt::Retry(anyhow::anyhow!("{} failed: {}", method, e)))
                        }
                        Err(_) => Err(Attempt::Retry(self.handle_timeout(method))),
                    }
                }
            },
            |attempt: &Attempt| matches!(attempt, Attempt::Retry(_)),
        )
        .await
        .map_err(Attempt::into_error)
    }
}

enum Attempt {
    Retry(anyhow::Error),
    Final(anyhow::Error),
}

impl Attempt {
    fn into_error(self) -> anyhow::Error {
        match self {
            Attempt::Retry(err) | Attempt::Final(err) => err,
        }
    }
}

/// Maps an error response for a reverted `eth_call` to [`ExecutionReverted`].
fn reverted_call(to: Address, error: &TransportError) -> Option<anyhow::Error> {
    let payload = error.as_error_resp()?;
    let reverted = payload.code == EXECUTION_REVERTED_CODE
        || payload.message.to_lowercase().contains("revert");
    reverted.then(|| {
        ExecutionReverted {
            to,
            message: payload.message.to_string(),
        }
        .into()
    })
}

fn convert_block(block: alloy::rpc::types::Block) -> Block {
    let number = block.header.inner.number;
    let transactions = block
        .transactions
        .txns()
        .map(|tx| convert_transaction(number, tx))
        .collect();

    Block {
        number,
        hash: block.header.hash,
        parent_hash: block.header.inner.parent_hash,
        timestamp: block.header.inner.timestamp,
        transactions,
    }
}

fn convert_transaction(block_number: u64, tx: &alloy::rpc::types::Transaction) -> Transaction {
    Transaction {
        hash: TransactionResponse::tx_hash(tx),
        block_number,
        from: TransactionResponse::from(tx),
        to: ConsensusTransaction::to(tx),
        value: ConsensusTransaction::value(tx),
        nonce: ConsensusTransaction::nonce(tx),
        gas_limit: ConsensusTransaction::gas_limit(tx),
        input: ConsensusTransaction::input(tx).clone(),
    }
}

fn convert_log(log: alloy::rpc::types::Log) -> LogEntry {
    LogEntry {
        address: log.address(),
        topics: log.topics().to_vec(),
        data: log.data().data.clone(),
    }
}

/// Cursor over block numbers announced by a polled tip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BlockWatch {
    next: u64,
    tip: u64,
}

impl BlockWatch {
    fn after(block: u64) -> Self {
        Self {
            next: block + 1,
            tip: block,
        }
    }

    fn observe(&mut self, tip: u64) {
        self.tip = self.tip.max(tip);
    }

    fn next_ready(&mut self) -> Option<u64> {
        if self.next > self.tip {
            return None;
        }
        let number = self.next;
        self.next += 1;
        Some(number)
    }
}

/// Polls `fetch_tip` every `interval` and yields each block number above
/// `after` once, ascending. A failed poll is yielded as an error and polling
/// goes on.
pub fn poll_blocks<F, Fut>(
    after: u64,
    interval: Duration,
    fetch_tip: F,
) -> BoxStream<'static, Result<u64>>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<u64>> + Send + 'static,
{
    stream::unfold(
        (BlockWatch::after(after), fetch_tip),
        move |(mut watch, mut fetch_tip)| async move {
            loop {
                if let Some(number) = watch.next_ready() {
                    return Some((Ok(number), (watch, fetch_tip)));
                }

                sleep(interval).await;
                match fetch_tip().await {
                    Ok(tip) => watch.observe(tip),
                    Err(e) => return Some((Err(e), (watch, fetch_tip))),
                }
            }
        },
    )
    .boxed()
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn block_number(&self) -> Result<u64> {
        self.request("eth_blockNumber", |provider| async move {
            provider.get_block_number().await
        })
        .await
    }

    async fn block_with_transactions(&self, number: u64) -> Result<Option<Block>> {
        let block = self
            .request("eth_getBlockByNumber", move |provider| async move {
                provider
                    .get_block_by_number(BlockNumberOrTag::Number(number))
                    .full()
                    .await
            })
            .await?;
        Ok(block.map(convert_block))
    }

    async fn code_at(&self, address: Address) -> Result<Bytes> {
        self.request("eth_getCode", move |provider| async move {
            provider.get_code_at(address).await
        })
        .await
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes> {
        self.request_with(
            "eth_call",
            move |provider| {
                let request = TransactionRequest::default()
                    .to(to)
                    .input(TransactionInput::new(data.clone()));
                async move { provider.call(request).await }
            },
            |error| reverted_call(to, error),
        )
        .await
    }

    async fn logs(&self, block_number: u64, address: Address) -> Result<Vec<LogEntry>> {
        let filter = Filter::new()
            .address(address)
            .from_block(block_number)
            .to_block(block_number);

        let logs = self
            .request("eth_getLogs", move |provider| {
                let filter = filter.clone();
                async move { provider.get_logs(&filter).await }
            })
            .await?;
        Ok(logs.into_iter().map(convert_log).collect())
    }

    /// Polls `eth_blockNumber` every `poll_interval`.
    async fn new_blocks(&self, after: u64) -> Result<BoxStream<'static, Result<u64>>> {
        let client = self.clone();
        Ok(poll_blocks(after, self.poll_interval, move || {
            let client = client.clone();
            async move { client.block_number().await }
        }))
    }
}
