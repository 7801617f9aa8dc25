use anyhow::Result;
use clap::Parser;
use erc20_sequencer::config::Config;
use erc20_sequencer::pipeline::Pipeline;
use erc20_sequencer::rpc::RpcClient;
use erc20_sequencer::sequencer::{RunOptions, Sequencer};
use erc20_sequencer::store::SqliteStore;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "sequencer")]
#[command(about = "Ingest blocks and track ERC20 token balances", long_about = None)]
struct Cli {
    /// Skip the catch-up from the last processed block to the chain tip.
    #[arg(long, default_value = "false")]
    no_backfill: bool,

    /// Skip watching for newly produced blocks.
    #[arg(long, default_value = "false")]
    no_watch: bool,

    /// Re-ingest an inclusive block range and exit.
    #[arg(long, num_args = 2, value_names = ["FROM", "TO"])]
    replay: Option<Vec<u64>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    info!("Starting ERC20 sequencer");

    let config = Config::from_env()?;
    info!("Configuration loaded");
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let store = Arc::new(SqliteStore::open(&config.database_url)?);
    info!("Database initialized at {}", config.database_url);

    let client = Arc::new(RpcClient::from_config(&config)?);
    info!("RPC client connected to {}", client.get_current_url());

    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&client),
        Arc::clone(&store),
        config.checkpoint_policy,
    ));
    let sequencer = Sequencer::new(client, store, pipeline, config.live);

    let (shutdown_tx, shutdown) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    let result = match cli.replay.as_deref() {
        Some([from, to]) => sequencer.replay(*from, *to, &shutdown).await.map(|summary| {
            info!(
                "Replay finished: {} blocks ({} with failures) from {} to {}",
                summary.ingested, summary.failed, summary.from, summary.to
            );
        }),
        _ => {
            let options = RunOptions {
                backfill: !cli.no_backfill,
                watch: !cli.no_watch,
            };
            sequencer.run(options, shutdown).await
        }
    };

    if let Err(e) = &result {
        error!("Sequencer error: {:#}", e);
    }
    result
}
