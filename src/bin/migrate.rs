use anyhow::Result;
use erc20_sequencer::config::database_url_from_env;
use erc20_sequencer::store::SqliteStore;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let database_url = database_url_from_env();

    println!("Running migrations on database: {database_url}");

    let _store = SqliteStore::open(&database_url)?;

    println!("Migrations completed successfully!");

    Ok(())
}
