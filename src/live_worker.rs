use crate::pipeline::Ingest;
use crate::sequencer::LiveOptions;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Spawns `options.workers()` tasks draining announced block numbers from `rx`.
///
/// Each worker ingests one block at a time; the tasks exit once every
/// sender is dropped and the queue is empty.
pub fn spawn_live_workers<I: Ingest>(
    ingest: Arc<I>,
    rx: mpsc::Receiver<u64>,
    options: &LiveOptions,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));

    (0..options.workers())
        .map(|id| {
            let rx = Arc::clone(&rx);
            let ingest = Arc::clone(&ingest);
            tokio::spawn(run_live_worker(id, ingest, rx))
        })
        .collect()
}

async fn run_live_worker<I: Ingest>(
    id: usize,
    ingest: Arc<I>,
    rx: Arc<Mutex<mpsc::Receiver<u64>>>,
) {
    loop {
        let next = {
            let mut guard = rx.lock().await;
            guard.recv().await
        };
        let Some(block_number) = next else { break };

        let report = ingest.ingest(block_number).await;
        info!(
            "Worker {} ingested live block {}: {} txs, {} transfers, {} failures",
            id,
            block_number,
            report.transactions,
            report.transfers,
            report.failures.len() + usize::from(report.aborted.is_some())
        );
    }
    debug!("Live worker {} stopped", id);
}
