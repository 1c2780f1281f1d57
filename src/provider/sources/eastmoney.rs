//! Eastmoney public quote API client
//!
//! Free, unauthenticated source used as the fallback. Prices in the quote
//! endpoint are integers scaled by 100; candle rows are comma-delimited
//! strings `time,open,close,high,low,volume,amount,...`.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::debug;

use super::fetch_body;
use crate::error::MarketDataError;
use crate::provider::parse::{finalize_candles, parse_datetime, value_f64, value_i64, value_string};
use crate::symbol::{is_six_digit_code, normalize_symbol, to_secid, Exchange};
use crate::types::{Candle, Interval, Snapshot};

pub const DEFAULT_KLINE_URL: &str = "https://push2his.eastmoney.com/api/qt/stock/kline/get";
pub const DEFAULT_SNAPSHOT_URL: &str = "https://push2.eastmoney.com/api/qt/stock/get";
pub const DEFAULT_SYMBOLS_URL: &str = "https://push2.eastmoney.com/api/qt/clist/get";
pub const DEFAULT_TIMEOUT_SECS: u64 = 12;

/// Index used when none is named
pub const DEFAULT_INDEX: &str = "hs300";

const MAX_SCAN: usize = 5000;
const DEFAULT_SCAN: usize = 2000;

// Static baskets, not live constituents.
const HS300: &[&str] = &[
    "600519.SH", "000858.SZ", "601318.SH", "600036.SH", "000333.SZ", "300750.SZ", "601888.SH",
    "002594.SZ", "002415.SZ", "000651.SZ", "601166.SH", "600900.SH", "601899.SH", "600276.SH",
    "601012.SH", "600030.SH", "000725.SZ", "600309.SH", "601688.SH", "600887.SH",
];
const ZZ500: &[&str] = &[
    "000625.SZ", "000738.SZ", "000768.SZ", "000783.SZ", "000997.SZ", "002001.SZ", "002241.SZ",
    "002271.SZ", "002739.SZ", "300003.SZ", "300122.SZ", "300124.SZ", "300142.SZ", "300223.SZ",
    "300274.SZ", "600219.SH", "600299.SH", "600406.SH", "600482.SH", "600516.SH",
];
const ZZ1000: &[&str] = &[
    "000006.SZ", "000021.SZ", "000028.SZ", "000049.SZ", "000050.SZ", "000089.SZ", "000155.SZ",
    "000156.SZ", "000338.SZ", "000400.SZ", "000426.SZ", "000528.SZ", "000538.SZ", "000559.SZ",
    "000596.SZ", "600008.SH", "600021.SH", "600096.SH", "600126.SH", "600183.SH",
];

#[derive(Debug, Deserialize)]
struct KlineResponse {
    #[serde(default)]
    rc: i64,
    #[serde(default)]
    msg: String,
    data: Option<KlineData>,
}

#[derive(Debug, Deserialize)]
struct KlineData {
    #[serde(default)]
    klines: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SnapshotResponse {
    #[serde(default)]
    rc: i64,
    #[serde(default)]
    msg: String,
    data: Option<Map<String, Value>>,
}

#[derive(Debug, Deserialize)]
struct SymbolsResponse {
    data: Option<SymbolsData>,
}

#[derive(Debug, Deserialize)]
struct SymbolsData {
    #[serde(default)]
    diff: Vec<Map<String, Value>>,
}

/// Eastmoney interval code (`klt`)
fn kline_type(interval: Interval) -> &'static str {
    match interval {
        Interval::Min1 => "1",
        Interval::Min5 => "5",
        Interval::Min15 => "15",
        Interval::Min30 => "30",
        Interval::Day1 => "101",
    }
}

/// Quote prices are sent as integer hundredths.
fn scaled_price(v: Option<&Value>) -> f64 {
    let raw = value_f64(v);
    if raw == 0.0 {
        return 0.0;
    }
    raw / 100.0
}

fn parse_kline_row(raw: &str, duration_ms: i64) -> Option<Candle> {
    let parts: Vec<&str> = raw.split(',').collect();
    if parts.len() < 7 {
        return None;
    }
    let open_time = parse_datetime(parts[0])?;
    let num = |i: usize| parts[i].trim().parse::<f64>().unwrap_or(0.0);
    Some(Candle {
        open_time,
        close_time: open_time + duration_ms - 1,
        open: num(1),
        close: num(2),
        high: num(3),
        low: num(4),
        volume: num(5),
        quote_volume: num(6),
    })
}

#[derive(Debug, Clone)]
pub struct EastmoneyClient {
    client: Client,
    kline_url: String,
    snapshot_url: String,
    symbols_url: String,
}

impl Default for EastmoneyClient {
    fn default() -> Self {
        Self::new()
    }
}

impl EastmoneyClient {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            kline_url: DEFAULT_KLINE_URL.to_string(),
            snapshot_url: DEFAULT_SNAPSHOT_URL.to_string(),
            symbols_url: DEFAULT_SYMBOLS_URL.to_string(),
        }
    }

    /// Override endpoints. Blank values keep the current endpoint.
    pub fn with_endpoints(
        mut self,
        kline_url: &str,
        snapshot_url: &str,
        symbols_url: &str,
    ) -> Self {
        if !kline_url.trim().is_empty() {
            self.kline_url = kline_url.trim().to_string();
        }
        if !snapshot_url.trim().is_empty() {
            self.snapshot_url = snapshot_url.trim().to_string();
        }
        if !symbols_url.trim().is_empty() {
            self.symbols_url = symbols_url.trim().to_string();
        }
        self
    }

    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        let secid = to_secid(symbol)?;
        let limit = limit.to_string();

        let request = self.client.get(&self.kline_url).query(&[
            ("secid", secid.as_str()),
            ("klt", kline_type(interval)),
            ("fqt", "1"),
            ("lmt", limit.as_str()),
            ("end", "20500101"),
            ("fields1", "f1,f2,f3,f4,f5,f6"),
            ("fields2", "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61"),
        ]);
        let body = fetch_body(request).await?;

        let decoded: KlineResponse = serde_json::from_str(&body)?;
        if decoded.rc != 0 {
            return Err(MarketDataError::Upstream {
                code: decoded.rc,
                msg: decoded.msg,
            });
        }
        let rows = decoded.data.map(|d| d.klines).unwrap_or_default();
        if rows.is_empty() {
            return Err(MarketDataError::Empty("fallback kline data".into()));
        }

        let duration_ms = interval.duration_ms();
        let candles: Vec<Candle> = rows
            .iter()
            .filter_map(|row| parse_kline_row(row, duration_ms))
            .collect();
        if candles.is_empty() {
            return Err(MarketDataError::Empty("no valid fallback kline entries".into()));
        }

        debug!(symbol = %symbol, interval = %interval, rows = rows.len(), parsed = candles.len(), "eastmoney klines");
        Ok(finalize_candles(candles))
    }

    pub async fn get_snapshot(&self, symbol: &str) -> Result<Snapshot, MarketDataError> {
        let secid = to_secid(symbol)?;

        let request = self.client.get(&self.snapshot_url).query(&[
            ("secid", secid.as_str()),
            ("fields", "f43,f44,f45,f46,f47,f57,f58,f60,f170"),
        ]);
        let body = fetch_body(request).await?;

        let decoded: SnapshotResponse = serde_json::from_str(&body)?;
        if decoded.rc != 0 {
            return Err(MarketDataError::Upstream {
                code: decoded.rc,
                msg: decoded.msg,
            });
        }
        let data = match decoded.data {
            Some(data) if !data.is_empty() => data,
            _ => return Err(MarketDataError::Empty("fallback snapshot data".into())),
        };

        let last = scaled_price(data.get("f43"));
        let high = scaled_price(data.get("f44"));
        let low = scaled_price(data.get("f45"));
        if last <= 0.0 {
            return Err(MarketDataError::InvalidPrice(symbol.to_string()));
        }
        let mut pre_close = scaled_price(data.get("f60"));
        if pre_close <= 0.0 {
            pre_close = scaled_price(data.get("f46"));
        }

        Ok(Snapshot::with_limits(
            normalize_symbol(symbol),
            last,
            high,
            low,
            pre_close,
            chrono::Utc::now().timestamp_millis(),
        ))
    }

    /// Market-wide scan of Shanghai/Shenzhen A-shares.
    ///
    /// `limit` 0 scans the default page size; larger requests cap at 5000.
    pub async fn get_all_symbols(&self, limit: usize) -> Result<Vec<String>, MarketDataError> {
        let limit = match limit {
            0 => DEFAULT_SCAN,
            n => n.min(MAX_SCAN),
        }
        .to_string();

        let request = self.client.get(&self.symbols_url).query(&[
            ("pn", "1"),
            ("pz", limit.as_str()),
            ("po", "1"),
            ("np", "1"),
            ("fltt", "2"),
            ("invt", "2"),
            ("fid", "f3"),
            ("fs", "m:0+t:6,m:0+t:80,m:1+t:2,m:1+t:23"),
            ("fields", "f12,f13,f14"),
        ]);
        let body = fetch_body(request).await?;

        let decoded: SymbolsResponse = serde_json::from_str(&body)?;
        let items = decoded.data.map(|d| d.diff).unwrap_or_default();
        if items.is_empty() {
            return Err(MarketDataError::Empty("fallback symbols response".into()));
        }

        let symbols: BTreeSet<String> = items
            .iter()
            .filter_map(|item| {
                let code = value_string(item.get("f12"));
                if !is_six_digit_code(&code) {
                    return None;
                }
                let exchange = if value_i64(item.get("f13")) == 1 {
                    Exchange::Shanghai
                } else {
                    Exchange::Shenzhen
                };
                Some(format!("{}.{}", code, exchange.tag()))
            })
            .collect();

        Ok(symbols.into_iter().collect())
    }

    /// Fixed basket for `hs300`, `zz500` or `zz1000`.
    pub fn get_index_symbols(&self, index: &str) -> Result<Vec<String>, MarketDataError> {
        let index = index.trim().to_lowercase();
        let index = if index.is_empty() { DEFAULT_INDEX.to_string() } else { index };
        let preset = match index.as_str() {
            "hs300" => HS300,
            "zz500" => ZZ500,
            "zz1000" => ZZ1000,
            _ => return Err(MarketDataError::UnsupportedIndex(index)),
        };
        let mut symbols: Vec<String> = preset.iter().map(|s| s.to_string()).collect();
        symbols.sort();
        Ok(symbols)
    }
}
