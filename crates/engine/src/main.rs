//! venue-recs - train on transaction rows and print recommendations
//!
//! Usage: `venue-recs <user_key> [rows.jsonl]`
//!
//! Rows are JSON objects with `user_key`, `item_category` and `item_name`,
//! one per line, read from the given file or stdin.

use anyhow::{bail, Context, Result};
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use tracing::info;
use venue_recs_core::{init_logging, load_dotenv, ConfigLoader, LogConfig, Partition};
use venue_recs_engine::{aggregate, train_partitions, PipelineConfig, TransactionRow};

fn main() -> Result<()> {
    load_dotenv();

    let log_config = LogConfig::from_env()?;
    log_config.validate()?;
    init_logging(&log_config)?;

    let mut args = std::env::args().skip(1);
    let Some(user_key) = args.next() else {
        bail!("usage: venue-recs <user_key> [rows.jsonl]");
    };

    let rows = match args.next() {
        Some(path) => {
            let file = File::open(&path).with_context(|| format!("Failed to open {}", path))?;
            read_rows(BufReader::new(file))?
        }
        None => read_rows(io::stdin().lock())?,
    };

    let config = PipelineConfig::from_env()?;
    config.validate()?;

    info!(rows = rows.len(), "Starting venue-recs");

    let aggregated = aggregate(&rows);
    let models = train_partitions(&aggregated, &config);

    let mut output = Map::new();
    for partition in Partition::ALL {
        let value = match models.recommend(partition, &user_key, config.top_n) {
            Ok(recs) => json!({ "recommendations": recs }),
            Err(e) => json!({ "error": e.to_string() }),
        };
        output.insert(partition.to_string(), value);
    }

    println!("{}", serde_json::to_string_pretty(&Value::Object(output))?);
    Ok(())
}

fn read_rows(reader: impl BufRead) -> Result<Vec<TransactionRow>> {
    let mut rows = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            continue;
        }
        let row: TransactionRow = serde_json::from_str(&line)
            .with_context(|| format!("Invalid row on line {}", line_no + 1))?;
        rows.push(row);
    }
    Ok(rows)
}
