//! TTL cache for candle queries
//!
//! Entries are replaced wholesale and never evicted; an expired entry is a
//! miss and gets overwritten by the next successful fetch. Reads and writes
//! both clone the candle vector so callers never share cached state.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::types::{Candle, DataSource, Interval};

/// Daily bars change slowly
pub const DAILY_TTL: Duration = Duration::from_secs(60);
pub const INTRADAY_TTL: Duration = Duration::from_secs(20);
/// Substituted for a zero TTL
pub const MIN_TTL: Duration = Duration::from_secs(15);

pub fn ttl_for(interval: Interval) -> Duration {
    if interval.is_daily() {
        DAILY_TTL
    } else {
        INTRADAY_TTL
    }
}

pub fn cache_key(symbol: &str, interval: Interval, limit: usize) -> String {
    format!("{}|{}|{}", symbol, interval, limit)
}

#[derive(Debug, Clone)]
struct CacheEntry {
    expire_at: Instant,
    source: DataSource,
    klines: Vec<Candle>,
}

#[derive(Debug, Default)]
pub struct KlineCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl KlineCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live entry for `key`, if any.
    pub fn get(&self, key: &str) -> Option<(Vec<Candle>, DataSource)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let entry = entries.get(key)?;
        if Instant::now() >= entry.expire_at {
            return None;
        }
        Some((entry.klines.clone(), entry.source))
    }

    pub fn insert(&self, key: String, klines: &[Candle], source: DataSource, ttl: Duration) {
        let ttl = if ttl.is_zero() { MIN_TTL } else { ttl };
        let entry = CacheEntry {
            expire_at: Instant::now() + ttl,
            source,
            klines: klines.to_vec(),
        };
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
