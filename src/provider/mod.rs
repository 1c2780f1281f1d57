//! Market data provider
//!
//! Single query surface for candles, snapshots and symbol lists. Chooses
//! between the token-gated Tushare source and the free Eastmoney fallback
//! according to [`DataMode`], and caches candle queries per
//! `(symbol, interval, limit)` for a short TTL.

pub mod cache;
pub(crate) mod parse;
pub mod sources;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::error::MarketDataError;
use crate::symbol;
use crate::types::{Candle, DataMode, DataSource, Interval, Snapshot};
use cache::{cache_key, ttl_for, KlineCache};
use sources::defaults::DEFAULT_INDEX;
pub use sources::{EastmoneyClient, TushareClient};

pub const DEFAULT_LIMIT: usize = 500;
pub const MAX_LIMIT: usize = 5000;

const MIN_RANGE_BARS: i64 = 200;
const RANGE_PADDING_BARS: i64 = 64;

/// Anything that can price a symbol.
///
/// The paper-trading engine depends on this rather than on the provider so it
/// can run against a fixed price source.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn get_snapshot(&self, symbol: &str) -> Result<(Snapshot, DataSource), MarketDataError>;
}

pub struct MarketDataProvider {
    tushare: TushareClient,
    fallback: EastmoneyClient,
    mode: DataMode,
    watchlist: Vec<String>,
    cache: KlineCache,
}

impl MarketDataProvider {
    /// Provider with default endpoints. A blank token disables Tushare.
    pub fn new(tushare_token: &str, mode: DataMode, watchlist_raw: &str) -> Self {
        Self::with_clients(
            TushareClient::new(tushare_token),
            EastmoneyClient::new(),
            mode,
            watchlist_raw,
        )
    }

    pub fn with_clients(
        tushare: TushareClient,
        fallback: EastmoneyClient,
        mode: DataMode,
        watchlist_raw: &str,
    ) -> Self {
        Self {
            tushare,
            fallback,
            mode,
            watchlist: parse_watchlist(watchlist_raw),
            cache: KlineCache::new(),
        }
    }

    pub fn mode(&self) -> DataMode {
        self.mode
    }

    pub fn watchlist(&self) -> &[String] {
        &self.watchlist
    }

    pub fn normalize_symbol(&self, symbol: &str) -> String {
        symbol::normalize_symbol(symbol)
    }

    fn should_try_tushare(&self) -> bool {
        self.mode != DataMode::FallbackOnly && self.tushare.enabled()
    }

    /// Candles for `symbol`, oldest first.
    ///
    /// Unknown intervals read as 5m; `limit <= 0` means 500 and larger
    /// requests cap at 5000.
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: i64,
    ) -> Result<(Vec<Candle>, DataSource), MarketDataError> {
        let symbol = symbol::normalize_symbol(symbol);
        let interval = Interval::parse(interval);
        let limit = clamp_limit(limit);
        let key = cache_key(&symbol, interval, limit);

        if let Some(hit) = self.cache.get(&key) {
            debug!(key = %key, source = %hit.1, "kline cache hit");
            return Ok(hit);
        }

        if self.should_try_tushare() {
            match self.tushare.get_klines(&symbol, interval, limit).await {
                Ok(klines) if !klines.is_empty() => {
                    self.cache.insert(key, &klines, DataSource::Tushare, ttl_for(interval));
                    return Ok((klines, DataSource::Tushare));
                }
                result => {
                    let err = result
                        .err()
                        .unwrap_or_else(|| MarketDataError::Empty("tushare klines".into()));
                    if self.mode == DataMode::TushareOnly {
                        return Err(err.context("tushare provider"));
                    }
                    warn!(symbol = %symbol, interval = %interval, error = %err, "tushare klines failed, using fallback");
                }
            }
        }

        let klines = self
            .fallback
            .get_klines(&symbol, interval, limit)
            .await
            .map_err(|e| e.context("fallback provider"))?;
        self.cache.insert(key, &klines, DataSource::Fallback, ttl_for(interval));
        Ok((klines, DataSource::Fallback))
    }

    /// Live quote. Never cached.
    pub async fn get_snapshot(
        &self,
        symbol: &str,
    ) -> Result<(Snapshot, DataSource), MarketDataError> {
        let symbol = symbol::normalize_symbol(symbol);

        if self.should_try_tushare() {
            match self.tushare.get_snapshot(&symbol).await {
                Ok(snap) if snap.is_valid() => return Ok((snap, DataSource::Tushare)),
                result => {
                    let err = match result {
                        Err(e) => e,
                        Ok(_) => MarketDataError::InvalidPrice(symbol.clone()),
                    };
                    if self.mode == DataMode::TushareOnly {
                        return Err(err.context("tushare provider"));
                    }
                    warn!(symbol = %symbol, error = %err, "tushare snapshot failed, using fallback");
                }
            }
        }

        let snap = self
            .fallback
            .get_snapshot(&symbol)
            .await
            .map_err(|e| e.context("fallback provider"))?;
        Ok((snap, DataSource::Fallback))
    }

    /// Symbol universe for `scope` (`watchlist`, `index` or `all`).
    ///
    /// A blank scope means `watchlist`; a blank index means `hs300`.
    pub async fn get_symbols(
        &self,
        scope: &str,
        index: &str,
    ) -> Result<(Vec<String>, DataSource), MarketDataError> {
        let scope = scope.trim().to_lowercase();
        let index = match index.trim().to_lowercase() {
            s if s.is_empty() => DEFAULT_INDEX.to_string(),
            s => s,
        };

        match scope.as_str() {
            "" | "watchlist" => {
                if !self.watchlist.is_empty() {
                    return Ok((self.watchlist.clone(), DataSource::Watchlist));
                }
                debug!(index = %index, "watchlist empty, using index basket");
                let symbols = self
                    .fallback
                    .get_index_symbols(&index)
                    .map_err(|e| e.context("watchlist is empty and index fallback"))?;
                Ok((symbols, DataSource::Fallback))
            }
            "index" => {
                let symbols = self.fallback.get_index_symbols(&index)?;
                Ok((symbols, DataSource::Fallback))
            }
            "all" => {
                if self.should_try_tushare() {
                    match self.tushare.get_symbols().await {
                        Ok(symbols) if !symbols.is_empty() => {
                            return Ok((symbols, DataSource::Tushare))
                        }
                        result => {
                            let err = result.err().unwrap_or_else(|| {
                                MarketDataError::Empty("tushare symbols".into())
                            });
                            if self.mode == DataMode::TushareOnly {
                                return Err(err.context("tushare provider"));
                            }
                            warn!(error = %err, "tushare symbols failed, using fallback");
                        }
                    }
                }
                let symbols = self.fallback.get_all_symbols(MAX_LIMIT).await?;
                Ok((symbols, DataSource::Fallback))
            }
            _ => Err(MarketDataError::UnsupportedScope(scope)),
        }
    }

    /// Candles overlapping `[start, end]` for a general timeframe token.
    ///
    /// Fetches through [`get_klines`](Self::get_klines), so caching and
    /// fallback apply.
    pub async fn get_klines_range(
        &self,
        symbol: &str,
        timeframe: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, MarketDataError> {
        if end <= start {
            return Err(MarketDataError::InvalidRange);
        }
        let interval = Interval::from_timeframe(timeframe);
        let span_ms = (end - start).num_milliseconds();
        let bars = (span_ms / interval.duration_ms() + RANGE_PADDING_BARS)
            .clamp(MIN_RANGE_BARS, MAX_LIMIT as i64);

        let (series, source) = self.get_klines(symbol, interval.as_str(), bars).await?;
        let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());
        let candles: Vec<Candle> = series
            .into_iter()
            .filter(|c| c.close_time >= start_ms && c.open_time <= end_ms)
            .collect();
        debug!(symbol = %symbol, interval = %interval, bars, kept = candles.len(), source = %source, "kline range");
        Ok(candles)
    }
}

#[async_trait]
impl SnapshotSource for MarketDataProvider {
    async fn get_snapshot(&self, symbol: &str) -> Result<(Snapshot, DataSource), MarketDataError> {
        MarketDataProvider::get_snapshot(self, symbol).await
    }
}

pub fn clamp_limit(limit: i64) -> usize {
    if limit <= 0 {
        DEFAULT_LIMIT
    } else {
        (limit as usize).min(MAX_LIMIT)
    }
}

/// Parse a watchlist given as a JSON array or a delimited string.
///
/// Entries are normalized, deduplicated and sorted.
pub fn parse_watchlist(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }

    let mut parts: Vec<String> = if raw.starts_with('[') {
        serde_json::from_str(raw).unwrap_or_default()
    } else {
        Vec::new()
    };
    if parts.is_empty() {
        parts = raw
            .split(|c: char| matches!(c, ',' | ';' | '\n' | '\t' | ' '))
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect();
    }

    parts
        .iter()
        .map(|p| symbol::normalize_symbol(p))
        .filter(|s| !s.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_clamping() {
        assert_eq!(clamp_limit(0), 500);
        assert_eq!(clamp_limit(-3), 500);
        assert_eq!(clamp_limit(1), 1);
        assert_eq!(clamp_limit(120), 120);
        assert_eq!(clamp_limit(9000), 5000);
    }

    #[test]
    fn watchlist_from_delimited_string() {
        let list = parse_watchlist(" sh600519, 000001;600519.SH\n300750\tSZ000858 ");
        assert_eq!(list, vec!["000001.SZ", "000858.SZ", "300750.SZ", "600519.SH"]);
    }

    #[test]
    fn watchlist_from_json_array() {
        let list = parse_watchlist(r#"["600036", "sz000001", "600036.SH"]"#);
        assert_eq!(list, vec!["000001.SZ", "600036.SH"]);
    }

    #[test]
    fn malformed_json_watchlist_is_split_instead() {
        let list = parse_watchlist("[600519, 000001");
        assert_eq!(list, vec!["000001.SZ", "[600519"]);
        assert!(parse_watchlist("   ").is_empty());
    }

    #[test]
    fn tushare_gate_requires_token_and_mode() {
        let disabled = MarketDataProvider::new("", DataMode::TushareThenFallback, "");
        assert!(!disabled.should_try_tushare());

        let enabled = MarketDataProvider::new("token", DataMode::TushareOnly, "");
        assert!(enabled.should_try_tushare());

        let skipped = MarketDataProvider::new("token", DataMode::FallbackOnly, "");
        assert!(!skipped.should_try_tushare());
    }

    #[tokio::test]
    async fn symbols_scopes_without_network() {
        let provider = MarketDataProvider::new("", DataMode::default(), "600519,000001");
        let (list, source) = provider.get_symbols("", "").await.unwrap();
        assert_eq!(source, DataSource::Watchlist);
        assert_eq!(list, vec!["000001.SZ", "600519.SH"]);

        let empty = MarketDataProvider::new("", DataMode::default(), "");
        let (basket, source) = empty.get_symbols("watchlist", "").await.unwrap();
        assert_eq!(source, DataSource::Fallback);
        assert_eq!(basket.len(), 20);

        let (zz500, _) = empty.get_symbols("INDEX", "ZZ500").await.unwrap();
        assert_eq!(zz500.len(), 20);

        let err = empty.get_symbols("watchlist", "sse50").await.unwrap_err();
        assert!(err.to_string().starts_with("watchlist is empty and index fallback failed"));

        assert!(matches!(
            empty.get_symbols("index", "sse50").await,
            Err(MarketDataError::UnsupportedIndex(_))
        ));
        assert!(matches!(
            empty.get_symbols("sector", "").await,
            Err(MarketDataError::UnsupportedScope(_))
        ));
    }

    #[tokio::test]
    async fn range_rejects_inverted_window() {
        let provider = MarketDataProvider::new("", DataMode::FallbackOnly, "");
        let now = Utc::now();
        assert!(matches!(
            provider.get_klines_range("600519", "1h", now, now).await,
            Err(MarketDataError::InvalidRange)
        ));
    }
}
