//! Core types used throughout the crate
//!
//! Defines candles, snapshots, intervals and the tags that describe where a
//! piece of market data came from.

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Market-local timezone for sessions, settlement dates and upstream timestamps
pub const MARKET_TZ: Tz = chrono_tz::Asia::Shanghai;

/// Default market label
pub const DEFAULT_MARKET: &str = "CN-A";

/// OHLCV bar.
///
/// `close_time` is inclusive: `open_time + interval duration - 1ms`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Shares traded
    pub volume: f64,
    /// Notional traded (CNY)
    pub quote_volume: f64,
}

/// Live quote for one symbol.
///
/// `upper_limit` / `lower_limit` are ±10% of `pre_close`, or 0 when the
/// previous close is unknown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub symbol: String,
    pub last_price: f64,
    pub high: f64,
    pub low: f64,
    pub pre_close: f64,
    pub upper_limit: f64,
    pub lower_limit: f64,
    pub update_time: i64,
}

impl Snapshot {
    /// Daily price-limit band ratio
    pub const LIMIT_RATIO: f64 = 0.10;

    /// Build a snapshot and derive the price-limit band from `pre_close`.
    pub fn with_limits(
        symbol: String,
        last_price: f64,
        high: f64,
        low: f64,
        pre_close: f64,
        update_time: i64,
    ) -> Self {
        let (upper_limit, lower_limit) = if pre_close > 0.0 {
            (
                pre_close * (1.0 + Self::LIMIT_RATIO),
                pre_close * (1.0 - Self::LIMIT_RATIO),
            )
        } else {
            (0.0, 0.0)
        };
        Self {
            symbol,
            last_price,
            high,
            low,
            pre_close,
            upper_limit,
            lower_limit,
            update_time,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.last_price > 0.0
    }
}

/// Supported candle intervals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Min1,
    #[default]
    #[serde(rename = "5m")]
    Min5,
    #[serde(rename = "15m")]
    Min15,
    #[serde(rename = "30m")]
    Min30,
    #[serde(rename = "1d")]
    Day1,
}

impl Interval {
    /// Parse an interval token. Unknown tokens fall back to 5m.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "1m" => Interval::Min1,
            "5m" => Interval::Min5,
            "15m" => Interval::Min15,
            "30m" => Interval::Min30,
            "1d" => Interval::Day1,
            _ => Interval::Min5,
        }
    }

    /// Map a general timeframe token onto the nearest supported interval.
    ///
    /// Coarser intraday frames collapse to 30m, weekly to daily.
    pub fn from_timeframe(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "3m" => Interval::Min5,
            "1h" | "2h" | "4h" | "6h" | "8h" | "12h" => Interval::Min30,
            "1w" => Interval::Day1,
            other => Interval::parse(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Interval::Min1 => "1m",
            Interval::Min5 => "5m",
            Interval::Min15 => "15m",
            Interval::Min30 => "30m",
            Interval::Day1 => "1d",
        }
    }

    pub fn minutes(&self) -> i64 {
        match self {
            Interval::Min1 => 1,
            Interval::Min5 => 5,
            Interval::Min15 => 15,
            Interval::Min30 => 30,
            Interval::Day1 => 24 * 60,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.minutes() * 60 * 1000
    }

    pub fn is_daily(&self) -> bool {
        matches!(self, Interval::Day1)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which upstream produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    /// Token-gated primary source
    Tushare,
    /// Free public source used when the primary is disabled or failing
    Fallback,
    /// The configured watchlist
    Watchlist,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Tushare => "tushare",
            DataSource::Fallback => "fallback",
            DataSource::Watchlist => "watchlist",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How aggressively the provider prefers the metered primary source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataMode {
    #[default]
    TushareThenFallback,
    TushareOnly,
    FallbackOnly,
}

impl DataMode {
    /// Lenient parse: anything unrecognized selects the default mode.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "tushare_only" => DataMode::TushareOnly,
            "fallback_only" => DataMode::FallbackOnly,
            _ => DataMode::TushareThenFallback,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataMode::TushareThenFallback => "tushare_then_fallback",
            DataMode::TushareOnly => "tushare_only",
            DataMode::FallbackOnly => "fallback_only",
        }
    }
}

impl fmt::Display for DataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
