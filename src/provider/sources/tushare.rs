//! Tushare Pro client
//!
//! Token-gated RPC endpoint. Every call is a POST of
//! `{api_name, token, params, fields}`; the reply carries a column list and
//! row arrays under `data`. Without a token the client is disabled and every
//! method fails with `TokenEmpty`.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use tracing::debug;

use super::fetch_body;
use crate::error::MarketDataError;
use crate::provider::parse::{finalize_candles, parse_datetime, value_f64, value_string};
use crate::symbol::normalize_symbol;
use crate::types::{Candle, Interval, Snapshot};

pub const DEFAULT_BASE_URL: &str = "https://api.tushare.pro";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

const KLINE_FIELDS: &str = "ts_code,trade_time,trade_date,open,high,low,close,vol,amount";
const QUOTE_FIELDS: &str = "ts_code,trade_time,price,pre_close,high,low";

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    api_name: &'a str,
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(skip_serializing_if = "str::is_empty")]
    fields: &'a str,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<RpcTable>,
}

#[derive(Debug, Default, Deserialize)]
struct RpcTable {
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    items: Vec<Vec<Value>>,
}

impl RpcTable {
    fn column_index(&self) -> HashMap<&str, usize> {
        self.fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.as_str(), i))
            .collect()
    }
}

/// Row accessor by column name
struct Row<'a> {
    index: &'a HashMap<&'a str, usize>,
    item: &'a [Value],
}

impl<'a> Row<'a> {
    fn get(&self, key: &str) -> Option<&'a Value> {
        self.index.get(key).and_then(|&i| self.item.get(i))
    }

    fn f64(&self, key: &str) -> f64 {
        value_f64(self.get(key))
    }

    fn string(&self, key: &str) -> String {
        value_string(self.get(key))
    }
}

/// Tushare `freq` code
fn frequency(interval: Interval) -> &'static str {
    match interval {
        Interval::Min1 => "1min",
        Interval::Min5 => "5min",
        Interval::Min15 => "15min",
        Interval::Min30 => "30min",
        Interval::Day1 => "D",
    }
}

#[derive(Debug, Clone)]
pub struct TushareClient {
    token: String,
    base_url: String,
    client: Client,
}

impl TushareClient {
    pub fn new(token: &str) -> Self {
        Self::with_timeout(token, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(token: &str, timeout: Duration) -> Self {
        Self {
            token: token.trim().to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Override the endpoint. Blank values are ignored.
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        let base_url = base_url.trim();
        if !base_url.is_empty() {
            self.base_url = base_url.trim_end_matches('/').to_string();
        }
        self
    }

    pub fn enabled(&self) -> bool {
        !self.token.is_empty()
    }

    fn ensure_enabled(&self) -> Result<(), MarketDataError> {
        if self.enabled() {
            Ok(())
        } else {
            Err(MarketDataError::TokenEmpty)
        }
    }

    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: usize,
    ) -> Result<Vec<Candle>, MarketDataError> {
        self.ensure_enabled()?;

        let params = json!({
            "ts_code": normalize_symbol(symbol),
            "freq": frequency(interval),
            "limit": limit,
        });
        let table = self.post("pro_bar", Some(params), KLINE_FIELDS).await?;
        if table.items.is_empty() {
            return Err(MarketDataError::Empty("tushare kline response".into()));
        }

        let index = table.column_index();
        let duration_ms = interval.duration_ms();
        let candles: Vec<Candle> = table
            .items
            .iter()
            .filter_map(|item| {
                let row = Row { index: &index, item };
                let mut ts = row.string("trade_time");
                if ts.is_empty() {
                    ts = row.string("trade_date");
                }
                let open_time = parse_datetime(&ts)?;
                Some(Candle {
                    open_time,
                    close_time: open_time + duration_ms - 1,
                    open: row.f64("open"),
                    high: row.f64("high"),
                    low: row.f64("low"),
                    close: row.f64("close"),
                    volume: row.f64("vol"),
                    quote_volume: row.f64("amount"),
                })
            })
            .collect();

        if candles.is_empty() {
            return Err(MarketDataError::Empty("no valid klines parsed from tushare".into()));
        }
        debug!(symbol = %symbol, interval = %interval, count = candles.len(), "tushare klines");
        Ok(finalize_candles(candles))
    }

    /// All listed A-share symbols, canonical, sorted.
    pub async fn get_symbols(&self) -> Result<Vec<String>, MarketDataError> {
        self.ensure_enabled()?;

        let table = self
            .post("stock_basic", Some(json!({ "list_status": "L" })), "ts_code")
            .await?;
        if table.items.is_empty() {
            return Err(MarketDataError::Empty("tushare symbols response".into()));
        }

        let idx = table.fields.iter().position(|f| f == "ts_code").unwrap_or(0);
        let symbols: BTreeSet<String> = table
            .items
            .iter()
            .filter_map(|item| item.get(idx))
            .map(|v| normalize_symbol(&value_string(Some(v))))
            .filter(|s| !s.is_empty())
            .collect();
        Ok(symbols.into_iter().collect())
    }

    pub async fn get_snapshot(&self, symbol: &str) -> Result<Snapshot, MarketDataError> {
        self.ensure_enabled()?;

        let norm = normalize_symbol(symbol);
        let table = self
            .post("realtime_quote", Some(json!({ "ts_code": norm })), QUOTE_FIELDS)
            .await?;
        let index = table.column_index();
        let item = match table.items.first() {
            Some(item) => item,
            None => return Err(MarketDataError::Empty("tushare snapshot response".into())),
        };
        let row = Row { index: &index, item };

        let last = row.f64("price");
        if last <= 0.0 {
            return Err(MarketDataError::InvalidPrice(norm));
        }
        let update_time = parse_datetime(&row.string("trade_time"))
            .unwrap_or_else(|| chrono::Utc::now().timestamp_millis());

        Ok(Snapshot::with_limits(
            norm,
            last,
            row.f64("high"),
            row.f64("low"),
            row.f64("pre_close"),
            update_time,
        ))
    }

    async fn post(
        &self,
        api_name: &str,
        params: Option<Value>,
        fields: &str,
    ) -> Result<RpcTable, MarketDataError> {
        let payload = RpcRequest {
            api_name,
            token: &self.token,
            params,
            fields,
        };
        let request = self.client.post(&self.base_url).json(&payload);
        let body = fetch_body(request).await?;

        let decoded: RpcResponse = serde_json::from_str(&body)?;
        if decoded.code != 0 {
            return Err(MarketDataError::Upstream {
                code: decoded.code,
                msg: decoded.msg,
            });
        }
        Ok(decoded.data.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn disabled_without_token() {
        let client = TushareClient::new("   ");
        assert!(!client.enabled());
        assert!(matches!(
            client.get_klines("600519", Interval::Min5, 10).await,
            Err(MarketDataError::TokenEmpty)
        ));
        assert!(matches!(client.get_symbols().await, Err(MarketDataError::TokenEmpty)));
        assert!(matches!(
            client.get_snapshot("600519").await,
            Err(MarketDataError::TokenEmpty)
        ));
    }

    #[tokio::test]
    async fn klines_request_envelope_and_row_parsing() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({
                "api_name": "pro_bar",
                "token": "demo-token",
                "params": {"ts_code": "600519.SH", "freq": "5min", "limit": 100}
            })))
            .with_body(
                r#"{"code":0,"msg":"","data":{
                    "fields":["ts_code","trade_time","trade_date","open","high","low","close","vol","amount"],
                    "items":[
                        ["600519.SH","2026-01-01 09:35:00",null,100.5,102,100,101.2,1300,130000],
                        ["600519.SH",null,"20260101",100,101,99,100.5,1200,120000],
                        ["600519.SH","garbage",null,1,1,1,1,1,1]
                    ]}}"#,
            )
            .create_async()
            .await;

        let client = TushareClient::new("demo-token").with_base_url(&format!("{}/", server.url()));
        let candles = client.get_klines("sh600519", Interval::Min5, 100).await.unwrap();
        mock.assert_async().await;

        assert_eq!(candles.len(), 2);
        assert!(candles[0].open_time < candles[1].open_time);
        assert_eq!(candles[0].open, 100.0);
        assert_eq!(candles[1].close, 101.2);
        assert_eq!(candles[1].close_time, candles[1].open_time + 5 * 60 * 1000 - 1);
    }

    #[tokio::test]
    async fn application_error_code_is_a_failure() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .with_body(r#"{"code":-2001,"msg":"rate limit","data":null}"#)
            .create_async()
            .await;

        let client = TushareClient::new("demo-token").with_base_url(&server.url());
        let err = client.get_klines("600519", Interval::Day1, 10).await.unwrap_err();
        assert!(matches!(err, MarketDataError::Upstream { code: -2001, .. }));
    }

    #[tokio::test]
    async fn snapshot_falls_back_to_now_when_trade_time_is_unparsable() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"api_name": "realtime_quote"})))
            .with_body(
                r#"{"code":0,"data":{
                    "fields":["ts_code","trade_time","price","pre_close","high","low"],
                    "items":[["000001.SZ","n/a","11.0","10.0",11.2,10.4]]}}"#,
            )
            .create_async()
            .await;

        let before = chrono::Utc::now().timestamp_millis();
        let client = TushareClient::new("demo-token").with_base_url(&server.url());
        let snap = client.get_snapshot("000001").await.unwrap();
        assert_eq!(snap.symbol, "000001.SZ");
        assert_eq!(snap.last_price, 11.0);
        assert!((snap.upper_limit - 11.0).abs() < 1e-9);
        assert!((snap.lower_limit - 9.0).abs() < 1e-9);
        assert!(snap.update_time >= before);
    }

    #[tokio::test]
    async fn symbols_are_normalized_and_deduped() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/")
            .match_body(Matcher::PartialJson(json!({"api_name": "stock_basic"})))
            .with_body(
                r#"{"code":0,"data":{"fields":["ts_code"],
                    "items":[["600519.SH"],["000001.SZ"],["600519.sh"]]}}"#,
            )
            .create_async()
            .await;

        let client = TushareClient::new("demo-token").with_base_url(&server.url());
        assert_eq!(
            client.get_symbols().await.unwrap(),
            vec!["000001.SZ", "600519.SH"]
        );
    }
}
