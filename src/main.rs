//! ashare-bot CLI
//!
//! ```bash
//! # 5-minute bars, primary source with fallback
//! ashare-bot klines 600519 5m 120
//!
//! # Daily bars over a window
//! ashare-bot range sh600519 1d 2026-01-01 2026-02-01
//!
//! # Paper account
//! ashare-bot buy 600519 200
//! ashare-bot sell 600519
//! ashare-bot balance
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use ashare_bot::config::AppConfig;
use ashare_bot::paper_trading::PaperTradingEngine;
use ashare_bot::types::MARKET_TZ;

#[derive(Parser)]
#[command(name = "ashare-bot")]
#[command(about = "A-share market data and paper trading", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Candles for a symbol
    Klines {
        symbol: String,
        /// 1m, 5m, 15m, 30m or 1d
        #[arg(default_value = "5m")]
        interval: String,
        /// Bars to fetch (0 = 500, max 5000)
        #[arg(default_value_t = 0)]
        limit: i64,
    },

    /// Live quote with price-limit band
    Snapshot { symbol: String },

    /// Symbol universe
    Symbols {
        /// watchlist, index or all
        #[arg(default_value = "watchlist")]
        scope: String,
        /// hs300, zz500 or zz1000
        #[arg(default_value = "")]
        index: String,
    },

    /// Candles overlapping a time window (YYYY-MM-DD or YYYY-MM-DD HH:MM, Shanghai time)
    Range {
        symbol: String,
        timeframe: String,
        start: String,
        end: String,
    },

    /// Paper account balance
    Balance,

    /// Paper account positions
    Positions,

    /// Buy shares (floored to 100-share lots)
    Buy { symbol: String, quantity: f64 },

    /// Sell settled shares (0 = everything sellable)
    Sell {
        symbol: String,
        #[arg(default_value_t = 0.0)]
        quantity: f64,
    },

    /// Paper order history
    Orders,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

fn parse_local_time(input: &str) -> Result<DateTime<Utc>> {
    let input = input.trim();
    let naive = NaiveDateTime::parse_from_str(input, "%Y-%m-%d %H:%M")
        .or_else(|_| {
            NaiveDate::parse_from_str(input, "%Y-%m-%d")
                .map(|d| d.and_hms_opt(0, 0, 0).unwrap_or_default())
        })
        .with_context(|| format!("invalid time: {input}"))?;
    MARKET_TZ
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("time does not exist in market timezone: {input}"))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load()?;
    init_logging(config.logging.json);
    info!(config = %config, "🚀 ashare-bot starting");

    let provider = Arc::new(config.market_data.build_provider());
    let engine = || PaperTradingEngine::new(config.paper_trading.clone(), provider.clone());

    match cli.command {
        Commands::Klines { symbol, interval, limit } => {
            let (klines, source) = provider.get_klines(&symbol, &interval, limit).await?;
            info!(symbol = %symbol, source = %source, count = klines.len(), "klines");
            print_json(&klines)?;
        }
        Commands::Snapshot { symbol } => {
            let (snapshot, source) = provider.get_snapshot(&symbol).await?;
            info!(symbol = %snapshot.symbol, source = %source, "snapshot");
            print_json(&snapshot)?;
        }
        Commands::Symbols { scope, index } => {
            let (symbols, source) = provider.get_symbols(&scope, &index).await?;
            info!(scope = %scope, source = %source, count = symbols.len(), "symbols");
            print_json(&symbols)?;
        }
        Commands::Range { symbol, timeframe, start, end } => {
            let start = parse_local_time(&start)?;
            let end = parse_local_time(&end)?;
            let klines = provider.get_klines_range(&symbol, &timeframe, start, end).await?;
            print_json(&klines)?;
        }
        Commands::Balance => print_json(&engine().get_balance().await?)?,
        Commands::Positions => print_json(&engine().get_positions().await?)?,
        Commands::Buy { symbol, quantity } => {
            print_json(&engine().open_long(&symbol, quantity, 1).await?)?
        }
        Commands::Sell { symbol, quantity } => {
            print_json(&engine().close_long(&symbol, quantity).await?)?
        }
        Commands::Orders => {
            let orders: std::collections::BTreeMap<_, _> =
                engine().orders().await.into_iter().collect();
            print_json(&orders)?;
        }
    }

    Ok(())
}
