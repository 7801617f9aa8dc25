use crate::pipeline::CheckpointPolicy;
use crate::sequencer::LiveOptions;
use anyhow::{Context, Result};
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_DATABASE_URL: &str = "sqlite:./sequencer.db";

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub database_url: String,
    pub poll_interval: Duration,
    pub live: LiveOptions,
    pub checkpoint_policy: CheckpointPolicy,
    pub max_retries: usize,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();

        let json_rpc_urls = match std::env::var("JSON_RPC_URLS") {
            Ok(urls) => parse_url_list(&urls),
            Err(_) => {
                let url = std::env::var("JSON_RPC_URL")
                    .context("JSON_RPC_URLS or JSON_RPC_URL must be set in .env")?;
                parse_url_list(&url)
            }
        };
        if json_rpc_urls.is_empty() {
            anyhow::bail!("JSON_RPC_URLS does not contain any URL");
        }

        let database_url = database_url_from_env();

        let poll_interval = Duration::from_secs(env_or("POLL_INTERVAL_SECS", 12)?);
        let defaults = LiveOptions::default();
        let live = LiveOptions::new(
            env_or("LIVE_WORKERS", defaults.workers())?,
            env_or("LIVE_QUEUE_CAPACITY", defaults.queue_capacity())?,
        )
        .context("Invalid LIVE_WORKERS or LIVE_QUEUE_CAPACITY")?;

        let checkpoint_policy = match std::env::var("CHECKPOINT_POLICY") {
            Ok(raw) => CheckpointPolicy::from_str(&raw).context("Invalid CHECKPOINT_POLICY")?,
            Err(_) => CheckpointPolicy::default(),
        };

        let max_retries = env_or("RPC_MAX_RETRIES", 5)?;
        let request_timeout = Duration::from_secs(env_or("RPC_TIMEOUT_SECS", 120)?);

        Ok(Config {
            json_rpc_urls,
            database_url,
            poll_interval,
            live,
            checkpoint_policy,
            max_retries,
            request_timeout,
        })
    }
}

/// `DATABASE_URL`, falling back to `sqlite:./sequencer.db`. Loads `.env` first.
pub fn database_url_from_env() -> String {
    dotenv::dotenv().ok();
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

fn parse_url_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {name} value: {raw}")),
        Err(_) => Ok(default),
    }
}
