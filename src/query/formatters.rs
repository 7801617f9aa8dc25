use crate::repository::{Block, Holder, LedgerStats, TokenRecord, Transaction};
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::json;

#[derive(Debug, Clone)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            _ => OutputFormat::Table,
        }
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(header);
    table
}

fn finish_csv(wtr: Writer<Vec<u8>>) -> String {
    String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
}

pub fn format_tokens(tokens: &[TokenRecord], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => format_tokens_table(tokens),
        OutputFormat::Json => {
            serde_json::to_string_pretty(tokens).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => format_tokens_csv(tokens),
    }
}

fn format_tokens_table(tokens: &[TokenRecord]) -> String {
    if tokens.is_empty() {
        return "No tokens found.".to_string();
    }

    let mut table = new_table(vec![
        "Address",
        "Name",
        "Symbol",
        "Decimals",
        "Total Supply",
        "Holders",
    ]);

    for token in tokens {
        table.add_row(vec![
            Cell::new(format!("{:#}", token.address)),
            Cell::new(&token.name),
            Cell::new(&token.symbol),
            Cell::new(token.decimals),
            Cell::new(&token.total_supply),
            Cell::new(token.holders_count),
        ]);
    }

    table.to_string()
}

fn format_tokens_csv(tokens: &[TokenRecord]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "address",
        "name",
        "symbol",
        "decimals",
        "total_supply",
        "holders_count",
    ]);

    for token in tokens {
        let _ = wtr.write_record([
            &format!("{:?}", token.address),
            &token.name,
            &token.symbol,
            &token.decimals.to_string(),
            &token.total_supply,
            &token.holders_count.to_string(),
        ]);
    }

    finish_csv(wtr)
}

pub fn format_holders(holders: &[Holder], format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            if holders.is_empty() {
                return "No holders found.".to_string();
            }

            let mut table = new_table(vec!["Rank", "Address", "Balance"]);
            for (i, holder) in holders.iter().enumerate() {
                table.add_row(vec![
                    Cell::new(i + 1),
                    Cell::new(&holder.address),
                    Cell::new(&holder.balance),
                ]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            let json_holders: Vec<_> = holders
                .iter()
                .enumerate()
                .map(|(i, holder)| {
                    json!({
                        "rank": i + 1,
                        "address": holder.address,
                        "balance": holder.balance,
                    })
                })
                .collect();

            serde_json::to_string_pretty(&json_holders).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["rank", "address", "balance"]);
            for (i, holder) in holders.iter().enumerate() {
                let _ = wtr.write_record([&(i + 1).to_string(), &holder.address, &holder.balance]);
            }
            finish_csv(wtr)
        }
    }
}

pub fn format_stats(stats: &LedgerStats, format: &OutputFormat) -> String {
    let checkpoint = stats
        .checkpoint
        .map_or("N/A".to_string(), |b| b.to_string());

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Metric", "Value"]);
            table.add_row(vec![Cell::new("Blocks"), Cell::new(stats.blocks)]);
            table.add_row(vec![
                Cell::new("Transactions"),
                Cell::new(stats.transactions),
            ]);
            table.add_row(vec![Cell::new("Tokens"), Cell::new(stats.tokens)]);
            table.add_row(vec![
                Cell::new("Last Processed Block"),
                Cell::new(checkpoint),
            ]);
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(&json!({
            "blocks": stats.blocks,
            "transactions": stats.transactions,
            "tokens": stats.tokens,
            "last_processed_block": stats.checkpoint,
        }))
        .unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            let _ = wtr.write_record(["blocks", &stats.blocks.to_string()]);
            let _ = wtr.write_record(["transactions", &stats.transactions.to_string()]);
            let _ = wtr.write_record(["tokens", &stats.tokens.to_string()]);
            let _ = wtr.write_record(["last_processed_block", &checkpoint]);
            finish_csv(wtr)
        }
    }
}

pub fn format_block(block: &Block, format: &OutputFormat) -> String {
    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Field", "Value"]);
            table.add_row(vec![Cell::new("Number"), Cell::new(block.number)]);
            table.add_row(vec![
                Cell::new("Hash"),
                Cell::new(format!("{:?}", block.hash)),
            ]);
            table.add_row(vec![
                Cell::new("Parent Hash"),
                Cell::new(format!("{:?}", block.parent_hash)),
            ]);
            table.add_row(vec![Cell::new("Timestamp"), Cell::new(block.timestamp)]);
            table.add_row(vec![
                Cell::new("Transactions"),
                Cell::new(block.transactions.len()),
            ]);
            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(block).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => format_transactions_csv(&block.transactions),
    }
}

pub fn format_transaction(transaction: &Transaction, format: &OutputFormat) -> String {
    let to = transaction
        .to
        .map_or("(contract creation)".to_string(), |to| format!("{to:?}"));

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Field", "Value"]);
            table.add_row(vec![
                Cell::new("Hash"),
                Cell::new(format!("{:?}", transaction.hash)),
            ]);
            table.add_row(vec![
                Cell::new("Block"),
                Cell::new(transaction.block_number),
            ]);
            table.add_row(vec![
                Cell::new("From"),
                Cell::new(format!("{:#}", transaction.from)),
            ]);
            table.add_row(vec![Cell::new("To"), Cell::new(to)]);
            table.add_row(vec![
                Cell::new("Value (Wei)"),
                Cell::new(transaction.value.to_string()),
            ]);
            table.add_row(vec![Cell::new("Nonce"), Cell::new(transaction.nonce)]);
            table.add_row(vec![
                Cell::new("Gas Limit"),
                Cell::new(transaction.gas_limit),
            ]);
            table.add_row(vec![
                Cell::new("Input Size"),
                Cell::new(transaction.input.len()),
            ]);
            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(transaction).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => format_transactions_csv(std::slice::from_ref(transaction)),
    }
}

fn format_transactions_csv(transactions: &[Transaction]) -> String {
    let mut wtr = Writer::from_writer(vec![]);

    let _ = wtr.write_record([
        "hash",
        "block_number",
        "from",
        "to",
        "value_wei",
        "nonce",
        "gas_limit",
    ]);

    for tx in transactions {
        let _ = wtr.write_record([
            &format!("{:?}", tx.hash),
            &tx.block_number.to_string(),
            &format!("{:?}", tx.from),
            &tx.to.map(|to| format!("{to:?}")).unwrap_or_default(),
            &tx.value.to_string(),
            &tx.nonce.to_string(),
            &tx.gas_limit.to_string(),
        ]);
    }

    finish_csv(wtr)
}
