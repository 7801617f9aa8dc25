//! Drives block ingestion from two sources: a bounded backfill from the
//! checkpoint to a tip snapshot, and an open-ended live watch of newly
//! announced blocks. Both may run at once and feed the same [`Ingest`].

use crate::chain::ChainClient;
use crate::live_worker::spawn_live_workers;
use crate::pipeline::Ingest;
use crate::repository::CheckpointRepository;
use crate::store::Store;
use anyhow::Result;
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

/// Live watch sizing. Both values are at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveOptions {
    workers: usize,
    queue_capacity: usize,
}

impl LiveOptions {
    pub fn new(workers: usize, queue_capacity: usize) -> Result<Self> {
        if workers == 0 || queue_capacity == 0 {
            anyhow::bail!(
                "live workers ({workers}) and queue capacity ({queue_capacity}) must be at least 1"
            );
        }
        Ok(Self {
            workers,
            queue_capacity,
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }
}

impl Default for LiveOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    pub backfill: bool,
    pub watch: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            backfill: true,
            watch: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeSummary {
    pub from: u64,
    pub to: u64,
    pub ingested: u64,
    /// Blocks whose report carried at least one failure.
    pub failed: u64,
    pub interrupted: bool,
}

pub struct Sequencer<C, S, I> {
    client: Arc<C>,
    store: Arc<S>,
    ingest: Arc<I>,
    live: LiveOptions,
}

impl<C: ChainClient, S: Store, I: Ingest> Sequencer<C, S, I> {
    pub fn new(client: Arc<C>, store: Arc<S>, ingest: Arc<I>, live: LiveOptions) -> Self {
        Self {
            client,
            store,
            ingest,
            live,
        }
    }

    /// Ingests every block from the checkpoint (0 when absent) through the tip
    /// read at start, one at a time and in ascending order.
    pub async fn backfill(&self, shutdown: &watch::Receiver<bool>) -> Result<RangeSummary> {
        let tip = self.client.block_number().await?;
        self.backfill_to(tip, shutdown).await
    }

    async fn backfill_to(
        &self,
        tip: u64,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<RangeSummary> {
        let checkpoint = CheckpointRepository::new(self.store.as_ref())
            .get()
            .await?
            .unwrap_or(0);

        if checkpoint > tip {
            warn!(
                "Checkpoint {} is ahead of chain tip {}, nothing to backfill",
                checkpoint, tip
            );
            return Ok(RangeSummary {
                from: checkpoint,
                to: tip,
                ..Default::default()
            });
        }

        info!("Backfilling blocks {} to {}", checkpoint, tip);
        self.ingest_range(checkpoint, tip, shutdown).await
    }

    /// Re-ingests an inclusive range regardless of the checkpoint. The range
    /// is cut at the current chain tip.
    pub async fn replay(
        &self,
        from: u64,
        to: u64,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<RangeSummary> {
        if from > to {
            anyhow::bail!("Replay range is empty: {from} > {to}");
        }

        let tip = self.client.block_number().await?;
        if from > tip {
            anyhow::bail!("Replay start {from} is beyond chain tip {tip}");
        }
        if to > tip {
            warn!("Replay end {} is beyond chain tip {}, stopping at the tip", to, tip);
        }
        let to = to.min(tip);

        info!("Replaying blocks {} to {}", from, to);
        self.ingest_range(from, to, shutdown).await
    }

    async fn ingest_range(
        &self,
        from: u64,
        to: u64,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<RangeSummary> {
        let mut summary = RangeSummary {
            from,
            to,
            ..Default::default()
        };

        for number in from..=to {
            if *shutdown.borrow() {
                info!("Shutdown requested, stopping before block {}", number);
                summary.interrupted = true;
                break;
            }

            let report = self.ingest.ingest(number).await;
            summary.ingested += 1;
            if !report.is_clean() {
                summary.failed += 1;
            }
        }

        Ok(summary)
    }

    /// Feeds every block above `after` into a bounded queue drained by the live
    /// workers until shutdown or the end of the notification stream.
    pub async fn watch(&self, after: u64, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut blocks = self.client.new_blocks(after).await?;
        let (tx, rx) = mpsc::channel(self.live.queue_capacity());
        let workers = spawn_live_workers(Arc::clone(&self.ingest), rx, &self.live);

        info!("Watching for new blocks with {} workers", workers.len());

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Shutdown requested, stopping live watch");
                        break;
                    }
                }
                next = blocks.next() => match next {
                    Some(Ok(number)) => {
                        debug!("New block announced: {}", number);
                        if tx.send(number).await.is_err() {
                            warn!("Live workers are gone, stopping live watch");
                            break;
                        }
                    }
                    Some(Err(e)) => warn!("New block notification failed: {:#}", e),
                    None => {
                        info!("New block stream ended");
                        break;
                    }
                },
            }
        }

        drop(tx);
        for handle in workers {
            if let Err(e) = handle.await {
                warn!("Live worker failed: {}", e);
            }
        }

        Ok(())
    }

    /// Runs backfill and live watch side by side. Both start from one tip
    /// snapshot: backfill ends at it and the live watch picks up right above it.
    pub async fn run(&self, options: RunOptions, shutdown: watch::Receiver<bool>) -> Result<()> {
        let tip = self.client.block_number().await?;

        let backfill = async {
            if !options.backfill {
                return Ok(());
            }
            let summary = self.backfill_to(tip, &shutdown).await?;
            info!(
                "Backfill finished: {} blocks ({} with failures) from {} to {}",
                summary.ingested, summary.failed, summary.from, summary.to
            );
            Ok::<_, anyhow::Error>(())
        };

        let live = async {
            if !options.watch {
                return Ok(());
            }
            self.watch(tip, shutdown.clone()).await
        };

        let (backfill, live) = tokio::join!(backfill, live);
        if let Err(e) = &backfill {
            warn!("Backfill stopped: {:#}", e);
        }
        backfill.and(live)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CheckpointPolicy, IngestReport, Pipeline};
    use crate::repository::LedgerRepository;
    use crate::store::MemoryStore;
    use crate::testing::{MockChain, block};
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<u64>>,
    }

    impl Recorder {
        fn calls(&self) -> Vec<u64> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Ingest for Recorder {
        async fn ingest(&self, block_number: u64) -> IngestReport {
            self.calls.lock().unwrap().push(block_number);
            IngestReport {
                block: block_number,
                ..Default::default()
            }
        }
    }

    fn sequencer(
        chain: &Arc<MockChain>,
        store: &Arc<MemoryStore>,
        recorder: &Arc<Recorder>,
    ) -> Sequencer<MockChain, MemoryStore, Recorder> {
        Sequencer::new(
            Arc::clone(chain),
            Arc::clone(store),
            Arc::clone(recorder),
            LiveOptions::new(2, 4).unwrap(),
        )
    }

    #[tokio::test]
    async fn backfill_runs_from_checkpoint_through_tip() {
        let chain = Arc::new(MockChain::new());
        chain.set_tip(100);
        let store = Arc::new(MemoryStore::new());
        CheckpointRepository::new(store.as_ref()).advance(97).await.unwrap();
        let recorder = Arc::new(Recorder::default());
        let (_tx, shutdown) = watch::channel(false);

        let summary = sequencer(&chain, &store, &recorder)
            .backfill(&shutdown)
            .await
            .unwrap();

        assert_eq!(recorder.calls(), vec![97, 98, 99, 100]);
        assert_eq!(summary.ingested, 4);
        assert!(!summary.interrupted);
    }

    #[tokio::test]
    async fn backfill_without_checkpoint_starts_at_genesis() {
        let chain = Arc::new(MockChain::new());
        chain.set_tip(3);
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let (_tx, shutdown) = watch::channel(false);

        sequencer(&chain, &store, &recorder)
            .backfill(&shutdown)
            .await
            .unwrap();

        assert_eq!(recorder.calls(), vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn backfill_stops_on_shutdown() {
        let chain = Arc::new(MockChain::new());
        chain.set_tip(10);
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let (_tx, shutdown) = watch::channel(true);

        let summary = sequencer(&chain, &store, &recorder)
            .backfill(&shutdown)
            .await
            .unwrap();

        assert!(summary.interrupted);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn replay_ignores_checkpoint() {
        let chain = Arc::new(MockChain::new());
        chain.set_tip(20);
        let store = Arc::new(MemoryStore::new());
        CheckpointRepository::new(store.as_ref()).advance(50).await.unwrap();
        let recorder = Arc::new(Recorder::default());
        let (_tx, shutdown) = watch::channel(false);
        let sequencer = sequencer(&chain, &store, &recorder);

        sequencer.replay(10, 12, &shutdown).await.unwrap();
        assert_eq!(recorder.calls(), vec![10, 11, 12]);
        assert!(sequencer.replay(5, 4, &shutdown).await.is_err());
    }

    #[tokio::test]
    async fn watch_ingests_every_announced_block() {
        let chain = Arc::new(MockChain::new());
        chain.announce([101, 102, 103, 104, 105]);
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let (_tx, shutdown) = watch::channel(false);

        sequencer(&chain, &store, &recorder)
            .watch(100, shutdown)
            .await
            .unwrap();

        let mut calls = recorder.calls();
        calls.sort_unstable();
        assert_eq!(calls, vec![101, 102, 103, 104, 105]);
    }

    #[tokio::test]
    async fn run_combines_backfill_and_live_watch() {
        let chain = Arc::new(MockChain::new());
        chain.set_tip(2);
        chain.announce([3, 4]);
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let (_tx, shutdown) = watch::channel(false);

        sequencer(&chain, &store, &recorder)
            .run(RunOptions::default(), shutdown)
            .await
            .unwrap();

        let mut calls = recorder.calls();
        calls.sort_unstable();
        assert_eq!(calls, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn run_leaves_no_gap_between_backfill_and_live_watch() {
        let chain = Arc::new(MockChain::new());
        chain.set_tip(2);
        chain.announce([6]);
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let (_tx, shutdown) = watch::channel(false);

        sequencer(&chain, &store, &recorder)
            .run(RunOptions::default(), shutdown)
            .await
            .unwrap();

        let mut calls = recorder.calls();
        calls.sort_unstable();
        assert_eq!(calls, vec![0, 1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn live_watch_alone_starts_above_current_tip() {
        let chain = Arc::new(MockChain::new());
        chain.set_tip(40);
        chain.announce([42]);
        let store = Arc::new(MemoryStore::new());
        let recorder = Arc::new(Recorder::default());
        let (_tx, shutdown) = watch::channel(false);
        let options = RunOptions {
            backfill: false,
            watch: true,
        };

        sequencer(&chain, &store, &recorder)
            .run(options, shutdown)
            .await
            .unwrap();

        let mut calls = recorder.calls();
        calls.sort_unstable();
        assert_eq!(calls, vec![41, 42]);
    }

    #[tokio::test]
    async fn replay_past_tip_keeps_checkpoint_on_chain() {
        let chain = Arc::new(MockChain::new());
        for number in 0..=5 {
            chain.add_block(block(number, vec![]));
        }
        let store = Arc::new(MemoryStore::new());
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&chain),
            Arc::clone(&store),
            CheckpointPolicy::AlwaysAdvance,
        ));
        let (_tx, shutdown) = watch::channel(false);
        let sequencer = Sequencer::new(
            Arc::clone(&chain),
            Arc::clone(&store),
            pipeline,
            LiveOptions::default(),
        );

        let summary = sequencer.replay(0, 10, &shutdown).await.unwrap();
        assert_eq!(summary.to, 5);
        assert_eq!(
            CheckpointRepository::new(store.as_ref()).get().await.unwrap(),
            Some(5)
        );

        for number in 6..=12 {
            chain.add_block(block(number, vec![]));
        }
        let summary = sequencer.backfill(&shutdown).await.unwrap();
        assert_eq!((summary.from, summary.to), (5, 12));

        let ledger = LedgerRepository::new(store.as_ref());
        for number in 6..=9 {
            assert!(ledger.get_block(number).await.unwrap().is_some());
        }
        assert!(sequencer.replay(13, 14, &shutdown).await.is_err());
    }

    #[test]
    fn live_options_reject_zero_sizes() {
        assert!(LiveOptions::new(0, 8).is_err());
        assert!(LiveOptions::new(2, 0).is_err());

        let options = LiveOptions::new(2, 8).unwrap();
        assert_eq!((options.workers(), options.queue_capacity()), (2, 8));
    }

    #[tokio::test]
    async fn backfill_through_pipeline_moves_checkpoint_to_tip() {
        let chain = Arc::new(MockChain::new());
        for number in 5..=8 {
            chain.add_block(block(number, vec![]));
        }
        let store = Arc::new(MemoryStore::new());
        CheckpointRepository::new(store.as_ref()).advance(5).await.unwrap();
        let pipeline = Arc::new(Pipeline::new(
            Arc::clone(&chain),
            Arc::clone(&store),
            CheckpointPolicy::AlwaysAdvance,
        ));
        let (_tx, shutdown) = watch::channel(false);

        let sequencer = Sequencer::new(
            Arc::clone(&chain),
            Arc::clone(&store),
            pipeline,
            LiveOptions::default(),
        );
        let summary = sequencer.backfill(&shutdown).await.unwrap();

        assert_eq!(summary.ingested, 4);
        assert_eq!(summary.failed, 0);
        assert_eq!(
            CheckpointRepository::new(store.as_ref()).get().await.unwrap(),
            Some(8)
        );
    }
}
