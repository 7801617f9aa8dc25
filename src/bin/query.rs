use anyhow::Result;
use clap::{Parser, Subcommand};
use erc20_sequencer::config::database_url_from_env;
use erc20_sequencer::query::commands::{
    cmd_block, cmd_holders, cmd_stats, cmd_token, cmd_tokens, cmd_tx,
};
use erc20_sequencer::query::formatters::OutputFormat;
use erc20_sequencer::store::SqliteStore;

#[derive(Parser)]
#[command(name = "query")]
#[command(about = "Query sequenced blocks, tokens and balances", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "table")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Stats,
    Tokens {
        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    Token {
        address: String,
    },
    Holders {
        token: String,

        #[arg(long, default_value = "100")]
        limit: usize,

        #[arg(long, default_value = "0")]
        offset: usize,
    },
    Block {
        number: u64,
    },
    Tx {
        hash: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let format = OutputFormat::from(cli.format.as_str());

    let store = SqliteStore::open(&database_url_from_env())?;

    match cli.command {
        Commands::Stats => {
            cmd_stats(&store, &format).await?;
        }
        Commands::Tokens { limit, offset } => {
            cmd_tokens(&store, limit, offset, &format).await?;
        }
        Commands::Token { address } => {
            cmd_token(&store, &address, &format).await?;
        }
        Commands::Holders {
            token,
            limit,
            offset,
        } => {
            cmd_holders(&store, &token, limit, offset, &format).await?;
        }
        Commands::Block { number } => {
            cmd_block(&store, number, &format).await?;
        }
        Commands::Tx { hash } => {
            cmd_tx(&store, &hash, &format).await?;
        }
    }

    Ok(())
}
