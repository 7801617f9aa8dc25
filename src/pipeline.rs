//! Per-block ingestion: fetch, ledger append, classification, reconciliation,
//! checkpoint.
//!
//! [`Pipeline::ingest`] never returns an error. Every failure is logged and
//! recorded in the [`IngestReport`]; the [`CheckpointPolicy`] then decides
//! whether the checkpoint moves past the block.

use crate::chain::ChainClient;
use crate::classifier::{Classification, TokenClassifier, TokenMetadata};
use crate::error::{FailureKind, IngestError};
use crate::events::{decode_transfer_event, is_transfer};
use crate::locks::TokenLocks;
use crate::reconciler::BalanceReconciler;
use crate::repository::{CheckpointRepository, LedgerRepository, Transaction};
use crate::store::Store;
use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CheckpointPolicy {
    /// Advance after every ingestion, including aborted ones.
    #[default]
    AlwaysAdvance,
    /// Advance only when the block was processed without any failure.
    AdvanceOnSuccess,
}

impl CheckpointPolicy {
    pub fn should_advance(&self, report: &IngestReport) -> bool {
        match self {
            CheckpointPolicy::AlwaysAdvance => true,
            CheckpointPolicy::AdvanceOnSuccess => report.is_clean(),
        }
    }
}

impl FromStr for CheckpointPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "always" => Ok(CheckpointPolicy::AlwaysAdvance),
            "on-success" | "on_success" => Ok(CheckpointPolicy::AdvanceOnSuccess),
            other => Err(anyhow::anyhow!(
                "unknown checkpoint policy {other:?}, expected \"always\" or \"on-success\""
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Step {
    FetchBlock,
    AppendBlock,
    CodeLookup,
    AppendTransaction,
    Classify,
    FetchLogs,
    DecodeLog,
    Reconcile,
    Checkpoint,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::FetchBlock => "fetch-block",
            Step::AppendBlock => "append-block",
            Step::CodeLookup => "code-lookup",
            Step::AppendTransaction => "append-transaction",
            Step::Classify => "classify",
            Step::FetchLogs => "fetch-logs",
            Step::DecodeLog => "decode-log",
            Step::Reconcile => "reconcile",
            Step::Checkpoint => "checkpoint",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepFailure {
    pub step: Step,
    pub kind: FailureKind,
    /// Transaction hash or contract address the step was working on.
    pub target: Option<String>,
    pub message: String,
}

impl StepFailure {
    fn new(step: Step, target: Option<String>, err: &IngestError) -> Self {
        Self {
            step,
            kind: err.kind(),
            target,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub block: u64,
    pub transactions: usize,
    pub new_transactions: usize,
    pub contracts: usize,
    pub tokens: usize,
    pub transfers: usize,
    /// Failures that skipped part of the block.
    pub failures: Vec<StepFailure>,
    /// Failure that stopped the block early.
    pub aborted: Option<StepFailure>,
    /// The node did not return the block; the checkpoint is never moved for it.
    pub missing: bool,
    /// The checkpoint is at or beyond this block after the ingestion.
    pub checkpoint_committed: bool,
}

impl IngestReport {
    fn new(block: u64) -> Self {
        Self {
            block,
            ..Default::default()
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.aborted.is_none()
    }
}

/// Anything that can ingest a block by number.
#[async_trait]
pub trait Ingest: Send + Sync + 'static {
    async fn ingest(&self, block_number: u64) -> IngestReport;
}

pub struct Pipeline<C, S> {
    client: Arc<C>,
    store: Arc<S>,
    classifier: TokenClassifier<C>,
    reconciler: BalanceReconciler<C, S>,
    policy: CheckpointPolicy,
}

impl<C: ChainClient, S: Store> Pipeline<C, S> {
    pub fn new(client: Arc<C>, store: Arc<S>, policy: CheckpointPolicy) -> Self {
        let classifier = TokenClassifier::new(Arc::clone(&client));
        let reconciler =
            BalanceReconciler::new(Arc::clone(&client), Arc::clone(&store), TokenLocks::new());
        Self {
            client,
            store,
            classifier,
            reconciler,
            policy,
        }
    }

    async fn process_block(
        &self,
        number: u64,
        report: &mut IngestReport,
    ) -> Result<(), StepFailure> {
        let block = self
            .client
            .block_with_transactions(number)
            .await
            .map_err(|e| StepFailure::new(Step::FetchBlock, None, &IngestError::chain(e)))?;
        let Some(block) = block else {
            report.missing = true;
            let err = IngestError::chain(anyhow::anyhow!("block {number} not found"));
            return Err(StepFailure::new(Step::FetchBlock, None, &err));
        };

        let ledger = LedgerRepository::new(self.store.as_ref());
        let appended = ledger
            .append_block(&block)
            .await
            .map_err(|e| StepFailure::new(Step::AppendBlock, None, &IngestError::store(e)))?;
        if !appended {
            debug!("Block {} already in ledger, reconciling again", number);
        }

        report.transactions = block.transactions.len();
        for transaction in &block.transactions {
            self.process_transaction(number, transaction, report).await?;
        }

        Ok(())
    }

    /// Errors returned from here abort the block; everything else is recorded
    /// in `report` and processing moves on.
    async fn process_transaction(
        &self,
        number: u64,
        transaction: &Transaction,
        report: &mut IngestReport,
    ) -> Result<(), StepFailure> {
        let tx_target = Some(format!("{:?}", transaction.hash));

        let contract = match transaction.to {
            Some(to) => match self.client.code_at(to).await {
                Ok(code) if !code.is_empty() => Some(to),
                Ok(_) => None,
                Err(e) => {
                    let err = IngestError::chain(e);
                    let failure = StepFailure::new(Step::CodeLookup, tx_target.clone(), &err);
                    record(number, report, failure);
                    None
                }
            },
            None => None,
        };

        let appended = LedgerRepository::new(self.store.as_ref())
            .append_transaction(transaction)
            .await
            .map_err(|e| {
                StepFailure::new(Step::AppendTransaction, tx_target.clone(), &IngestError::store(e))
            })?;
        if appended {
            report.new_transactions += 1;
        }

        let Some(contract) = contract else {
            return Ok(());
        };
        report.contracts += 1;

        let token = match self.classifier.classify(contract).await {
            Ok(Classification::Token(token)) => token,
            Ok(Classification::NotAToken) => return Ok(()),
            Err(e) => {
                record(number, report, StepFailure::new(Step::Classify, tx_target, &e));
                return Ok(());
            }
        };
        report.tokens += 1;

        self.process_token_logs(number, &token, report).await
    }

    async fn process_token_logs(
        &self,
        number: u64,
        token: &TokenMetadata,
        report: &mut IngestReport,
    ) -> Result<(), StepFailure> {
        let token_target = Some(format!("{:?}", token.address));

        let logs = self
            .client
            .logs(number, token.address)
            .await
            .map_err(|e| {
                StepFailure::new(Step::FetchLogs, token_target.clone(), &IngestError::chain(e))
            })?;

        for log in logs.iter().filter(|log| is_transfer(log)) {
            let transfer = match decode_transfer_event(log) {
                Ok(transfer) => transfer,
                Err(e) => {
                    let err = IngestError::decode(e);
                    let failure = StepFailure::new(Step::DecodeLog, token_target.clone(), &err);
                    record(number, report, failure);
                    continue;
                }
            };

            match self.reconciler.reconcile(token, transfer.from, transfer.to).await {
                Ok(_) => {
                    report.transfers += 1;
                    debug!("Log processed for contract {:?}", token.address);
                }
                Err(e) => {
                    let failure = StepFailure::new(Step::Reconcile, token_target.clone(), &e);
                    record(number, report, failure);
                }
            }
        }

        Ok(())
    }

    async fn commit_checkpoint(&self, number: u64, report: &mut IngestReport) {
        if report.missing {
            warn!("Block {} is not on chain yet, checkpoint not moved", number);
            return;
        }
        if !self.policy.should_advance(report) {
            warn!("Checkpoint held before block {} after failures", number);
            return;
        }

        match CheckpointRepository::new(self.store.as_ref()).advance(number).await {
            Ok(_) => report.checkpoint_committed = true,
            Err(e) => {
                let err = IngestError::store(e);
                record(number, report, StepFailure::new(Step::Checkpoint, None, &err));
            }
        }
    }
}

#[async_trait]
impl<C: ChainClient, S: Store> Ingest for Pipeline<C, S> {
    async fn ingest(&self, number: u64) -> IngestReport {
        info!("Now processing block {}", number);
        let mut report = IngestReport::new(number);

        if let Err(failure) = self.process_block(number, &mut report).await {
            warn!(
                "Block {} aborted at {} ({}): {}",
                number, failure.step, failure.kind, failure.message
            );
            report.aborted = Some(failure);
        }

        self.commit_checkpoint(number, &mut report).await;
        report
    }
}

fn record(number: u64, report: &mut IngestReport, failure: StepFailure) {
    warn!(
        "Block {} {} failed ({}) for {}: {}",
        number,
        failure.step,
        failure.kind,
        failure.target.as_deref().unwrap_or("-"),
        failure.message
    );
    report.failures.push(failure);
}
