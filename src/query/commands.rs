use crate::query::formatters::{
    OutputFormat, format_block, format_holders, format_stats, format_tokens, format_transaction,
};
use crate::repository::{CheckpointRepository, LedgerRepository, LedgerStats, TokenRepository};
use crate::store::Store;
use alloy_primitives::{Address, B256};
use anyhow::Result;
use std::str::FromStr;

fn parse_address(address: &str) -> Result<Address> {
    Address::from_str(address).map_err(|_| anyhow::anyhow!("Invalid address format: {}", address))
}

pub async fn load_stats<S: Store>(store: &S) -> Result<LedgerStats> {
    let ledger = LedgerRepository::new(store);

    Ok(LedgerStats {
        blocks: ledger.block_count().await?,
        transactions: ledger.transaction_count().await?,
        tokens: TokenRepository::new(store).token_count().await?,
        checkpoint: CheckpointRepository::new(store).get().await?,
    })
}

pub async fn cmd_stats<S: Store>(store: &S, format: &OutputFormat) -> Result<()> {
    let stats = load_stats(store).await?;
    let output = format_stats(&stats, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_tokens<S: Store>(
    store: &S,
    limit: usize,
    offset: usize,
    format: &OutputFormat,
) -> Result<()> {
    let tokens = TokenRepository::new(store).list_tokens(limit, offset).await?;
    let output = format_tokens(&tokens, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_token<S: Store>(store: &S, address: &str, format: &OutputFormat) -> Result<()> {
    let address = parse_address(address)?;

    let token = TokenRepository::new(store)
        .get_token(&address)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Token {:?} has not been indexed", address))?;
    let output = format_tokens(std::slice::from_ref(&token), format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_holders<S: Store>(
    store: &S,
    token: &str,
    limit: usize,
    offset: usize,
    format: &OutputFormat,
) -> Result<()> {
    let token = parse_address(token)?;

    let holders = TokenRepository::new(store)
        .holders(&token, limit, offset)
        .await?;
    let output = format_holders(&holders, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_block<S: Store>(store: &S, number: u64, format: &OutputFormat) -> Result<()> {
    let block = LedgerRepository::new(store)
        .get_block(number)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Block {} is not in the ledger", number))?;
    let output = format_block(&block, format);
    println!("{output}");

    Ok(())
}

pub async fn cmd_tx<S: Store>(store: &S, hash: &str, format: &OutputFormat) -> Result<()> {
    let hash = B256::from_str(hash)
        .map_err(|_| anyhow::anyhow!("Invalid transaction hash: {}", hash))?;

    let transaction = LedgerRepository::new(store)
        .get_transaction(&hash)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Transaction {:?} is not in the ledger", hash))?;
    let output = format_transaction(&transaction, format);
    println!("{output}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::testing::{block, transaction};

    #[tokio::test]
    async fn stats_count_ledger_and_tokens() {
        let store = MemoryStore::new();
        let ledger = LedgerRepository::new(&store);
        let tx = transaction(1, 4, Some(Address::repeat_byte(2)));
        ledger.append_block(&block(4, vec![tx.clone()])).await.unwrap();
        ledger.append_transaction(&tx).await.unwrap();
        CheckpointRepository::new(&store).advance(4).await.unwrap();

        let stats = load_stats(&store).await.unwrap();

        assert_eq!(
            stats,
            LedgerStats {
                blocks: 1,
                transactions: 1,
                tokens: 0,
                checkpoint: Some(4),
            }
        );
    }

    #[tokio::test]
    async fn unknown_entries_are_errors() {
        let store = MemoryStore::new();
        let format = OutputFormat::Table;

        assert!(cmd_block(&store, 9, &format).await.is_err());
        assert!(cmd_token(&store, "not-an-address", &format).await.is_err());
        assert!(
            cmd_tx(&store, &format!("{:?}", B256::ZERO), &format)
                .await
                .is_err()
        );
    }
}
