//! ashare-bot library
//!
//! A-share market data with Tushare/Eastmoney fallback, and a T+1 paper
//! trading account priced from live snapshots.

pub mod config;
pub mod error;
pub mod paper_trading;
pub mod provider;
pub mod symbol;
pub mod types;

pub use error::{MarketDataError, TradeError};
pub use paper_trading::PaperTradingEngine;
pub use provider::{MarketDataProvider, SnapshotSource};
