//! # shopkeep CLI
//!
//! Back-office reports and writes from the command line. Every subcommand
//! prints JSON on stdout; failures print an `ApiError` JSON on stderr and
//! exit with 1.
//!
//! Writes are recorded with `createdBy` set to `SHOPKEEP_ACTOR`, or to
//! `--actor` when given.
//!
//! ## Usage
//! ```bash
//! shopkeep stats                # today
//! shopkeep stats --days 30      # last 30 days
//! shopkeep restock              # restock recommendations
//! shopkeep debts                # open debts and their total
//! shopkeep search cola --limit 5
//! SHOPKEEP_DB_PATH=./shop.db shopkeep low-stock
//!
//! # writes take the command's JSON input inline, from @file or from stdin (-)
//! shopkeep sell '{"items":[{"productId":"…","quantity":2}],"isDebt":true}'
//! shopkeep --actor alice return @return.json
//! shopkeep receive - < delivery.json
//! shopkeep pay-debt ORD2610160003
//! shopkeep cancel ORD2610160004
//! ```

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use chrono::Utc;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use shopkeep_backoffice::commands::{order, product, purchase, report};
use shopkeep_backoffice::config::BackofficeConfig;
use shopkeep_backoffice::error::ApiError;
use shopkeep_backoffice::{connect, init_tracing};
use shopkeep_core::stats::StatisticsPeriod;
use shopkeep_core::DateRange;
use shopkeep_db::Database;

#[derive(Debug, Parser)]
#[command(name = "shopkeep", version, about = "Shopkeep back-office reports and writes")]
struct Cli {
    /// Database file (overrides SHOPKEEP_DB_PATH)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Recorded as createdBy on writes (overrides SHOPKEEP_ACTOR)
    #[arg(long, global = true)]
    actor: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Revenue, cost, profit and margin of settled sales
    Stats {
        /// Last N days instead of today
        #[arg(long, value_parser = clap::value_parser!(i64).range(1..=3650))]
        days: Option<i64>,
    },
    /// Restock recommendations from the last 30 days of sales
    Restock,
    /// Unpaid sales and the outstanding total
    Debts,
    /// Active products at or below their minimum stock level
    LowStock,
    /// Full-text product search
    Search {
        query: String,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Record a sale from a SaleInput JSON
    Sell { input: String },
    /// Record a return from a ReturnInput JSON
    Return { input: String },
    /// Record an exchange from an ExchangeInput JSON
    Exchange { input: String },
    /// Record a supplier delivery from a PurchaseInput JSON
    Receive { input: String },
    /// Settle a debt sale
    PayDebt { order_number: String },
    /// Cancel a sale and restock its items
    Cancel { order_number: String },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut config = match BackofficeConfig::from_env() {
        Ok(config) => config,
        Err(e) => return fail(&e.into()),
    };
    if let Some(path) = cli.db {
        config.database_path = path;
    }
    if let Some(actor) = cli.actor {
        config.actor = actor;
    }

    init_tracing(&config);

    match run(cli.command, &config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e),
    }
}

async fn run(command: Command, config: &BackofficeConfig) -> Result<(), ApiError> {
    let db = connect(config).await?;
    let result = execute(&db, config, command).await;
    db.close().await;

    print_json(&result?)
}

async fn execute(
    db: &Database,
    config: &BackofficeConfig,
    command: Command,
) -> Result<Value, ApiError> {
    let actor = config.actor.as_str();

    match command {
        Command::Stats { days } => {
            let period = match days {
                Some(days) => StatisticsPeriod::Custom {
                    range: DateRange::last_days(Utc::now(), days),
                },
                None => StatisticsPeriod::Today,
            };
            let stats = report::get_statistics(db, period).await?;
            Ok(json!({
                "store": config.store_name,
                "revenue": config.format_currency(stats.total_revenue_cents),
                "profit": config.format_currency(stats.profit_cents),
                "statistics": stats,
            }))
        }
        Command::Restock => to_json(&report::restock_report(db).await?),
        Command::Debts => {
            let debts = order::list_debts(db).await?;
            let total: i64 = debts.iter().map(|o| o.total_cents).sum();
            Ok(json!({
                "count": debts.len(),
                "outstandingCents": total,
                "outstanding": config.format_currency(total),
                "orders": debts,
            }))
        }
        Command::LowStock => to_json(&product::low_stock_products(db).await?),
        Command::Search { query, limit } => {
            to_json(&product::search_products(db, &query, Some(limit)).await?)
        }
        Command::Sell { input } => {
            to_json(&order::create_sale(db, actor, read_input(&input)?).await?)
        }
        Command::Return { input } => {
            to_json(&order::create_return(db, actor, read_input(&input)?).await?)
        }
        Command::Exchange { input } => {
            to_json(&order::create_exchange(db, actor, read_input(&input)?).await?)
        }
        Command::Receive { input } => {
            to_json(&purchase::create_purchase(db, actor, read_input(&input)?).await?)
        }
        Command::PayDebt { order_number } => {
            let sale = order::get_order_by_number(db, &order_number).await?;
            to_json(&order::pay_debt(db, &sale.id).await?)
        }
        Command::Cancel { order_number } => {
            let sale = order::get_order_by_number(db, &order_number).await?;
            to_json(&order::cancel_sale(db, &sale.id).await?)
        }
    }
}

/// Parses a command input: inline JSON, `@path` for a file, `-` for stdin.
fn read_input<T: DeserializeOwned>(raw: &str) -> Result<T, ApiError> {
    let text = if raw == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .map_err(|e| ApiError::validation(format!("Cannot read stdin: {e}")))?;
        text
    } else if let Some(path) = raw.strip_prefix('@') {
        std::fs::read_to_string(path)
            .map_err(|e| ApiError::validation(format!("Cannot read {path}: {e}")))?
    } else {
        raw.to_string()
    };

    serde_json::from_str(&text).map_err(|e| ApiError::validation(format!("Invalid input: {e}")))
}

fn to_json<T: Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value)
        .map_err(|e| ApiError::internal(format!("Cannot serialize output: {e}")))
}

fn print_json(value: &Value) -> Result<(), ApiError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| ApiError::internal(format!("Cannot serialize output: {e}")))?;
    println!("{text}");
    Ok(())
}

fn fail(err: &ApiError) -> ExitCode {
    match serde_json::to_string(err) {
        Ok(text) => eprintln!("{text}"),
        Err(_) => eprintln!("{err}"),
    }
    ExitCode::FAILURE
}
