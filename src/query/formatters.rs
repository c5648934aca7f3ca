use crate::query::commands::{NodeStatus, WatchEntry};
use alloy_primitives::U256;
use alloy_primitives::utils::format_units;
use comfy_table::{Cell, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use csv::Writer;
use serde_json::{Value, json};

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

fn format_amount(value: &U256, decimals: u8) -> String {
    format_units(*value, decimals).unwrap_or_else(|_| value.to_string())
}

fn value_to_cell(value: &Option<Value>) -> String {
    match value {
        None | Some(Value::Null) => "N/A".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

pub fn format_watchlist(
    entries: &[WatchEntry],
    decimals: u8,
    symbol: &str,
    format: &OutputFormat,
) -> String {
    let with_balances = entries.iter().any(|e| e.balance.is_some());

    match format {
        OutputFormat::Table => {
            if entries.is_empty() {
                return "Watchlist is empty.".to_string();
            }

            let balance_header = format!("Balance ({symbol})");
            let mut header = vec!["#", "Address"];
            if with_balances {
                header.push(&balance_header);
            }
            let mut table = new_table(header);

            for (i, entry) in entries.iter().enumerate() {
                let mut row = vec![Cell::new(i + 1), Cell::new(&entry.address)];
                if with_balances {
                    row.push(Cell::new(
                        entry
                            .balance
                            .as_ref()
                            .map_or("N/A".to_string(), |b| format_amount(b, decimals)),
                    ));
                }
                table.add_row(row);
            }

            table.to_string()
        }
        OutputFormat::Json => {
            let addresses: Vec<_> = entries
                .iter()
                .map(|entry| match &entry.balance {
                    Some(balance) => json!({
                        "address": entry.address,
                        "balance": format_amount(balance, decimals),
                        "balance_wei": balance.to_string(),
                    }),
                    None => json!({ "address": entry.address }),
                })
                .collect();

            serde_json::to_string_pretty(&json!({ "addresses": addresses }))
                .unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            if with_balances {
                let _ = wtr.write_record(["address", "balance", "balance_wei"]);
            } else {
                let _ = wtr.write_record(["address"]);
            }

            for entry in entries {
                if with_balances {
                    let (formatted, raw) = entry.balance.as_ref().map_or(
                        (String::new(), String::new()),
                        |b| (format_amount(b, decimals), b.to_string()),
                    );
                    let _ = wtr.write_record([entry.address.as_str(), &formatted, &raw]);
                } else {
                    let _ = wtr.write_record([entry.address.as_str()]);
                }
            }

            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_status(status: &NodeStatus, format: &OutputFormat) -> String {
    let rows = [
        ("connected", Some(Value::Bool(status.connected))),
        ("block_number", status.block_number.map(Value::from)),
        ("peer_count", status.peer_count.map(Value::from)),
        ("syncing", status.syncing.clone()),
        ("txpool", status.txpool.clone()),
        ("mining_status", status.mining_status.clone()),
        ("hashrate", status.hashrate.map(Value::from)),
    ];

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Metric", "Value"]);
            for (metric, value) in &rows {
                if !status.connected && *metric != "connected" {
                    continue;
                }
                table.add_row(vec![Cell::new(metric), Cell::new(value_to_cell(value))]);
            }
            table.to_string()
        }
        OutputFormat::Json => {
            serde_json::to_string_pretty(status).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["metric", "value"]);
            for (metric, value) in &rows {
                if !status.connected && *metric != "connected" {
                    continue;
                }
                let _ = wtr.write_record([*metric, &value_to_cell(value)]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_balance(
    address: &str,
    balance: &U256,
    decimals: u8,
    symbol: &str,
    format: &OutputFormat,
) -> String {
    let formatted = format_amount(balance, decimals);

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec![
                "Address",
                &format!("Balance ({symbol})"),
                "Balance (Wei)",
            ]);
            table.add_row(vec![
                Cell::new(address),
                Cell::new(&formatted),
                Cell::new(balance.to_string()),
            ]);
            table.to_string()
        }
        OutputFormat::Json => json!({
            "address": address,
            "balance": formatted,
            "balance_wei": balance.to_string(),
            "symbol": symbol,
        })
        .to_string(),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["address", "balance", "balance_wei"]);
            let _ = wtr.write_record([address, &formatted, &balance.to_string()]);
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}

pub fn format_transaction(hash: &str, tx: Option<&Value>, format: &OutputFormat) -> String {
    let Some(tx) = tx else {
        return match format {
            OutputFormat::Json => json!({ "hash": hash, "found": false }).to_string(),
            _ => format!("Transaction {hash} not found."),
        };
    };

    let fields: Vec<(String, String)> = match tx.as_object() {
        Some(object) => object
            .iter()
            .map(|(key, value)| (key.clone(), value_to_cell(&Some(value.clone()))))
            .collect(),
        None => vec![("raw".to_string(), tx.to_string())],
    };

    match format {
        OutputFormat::Table => {
            let mut table = new_table(vec!["Field", "Value"]);
            for (key, value) in &fields {
                table.add_row(vec![Cell::new(key), Cell::new(value)]);
            }
            table.to_string()
        }
        OutputFormat::Json => serde_json::to_string_pretty(tx).unwrap_or_else(|_| "{}".to_string()),
        OutputFormat::Csv => {
            let mut wtr = Writer::from_writer(vec![]);
            let _ = wtr.write_record(["field", "value"]);
            for (key, value) in &fields {
                let _ = wtr.write_record([key, value]);
            }
            String::from_utf8(wtr.into_inner().unwrap_or_default()).unwrap_or_default()
        }
    }
}
