//! Account state persistence
//!
//! One pretty-printed JSON document per account:
//! `{cash, positions: {symbol: PositionRecord}, orders: {id: OrderRecord}}`.
//! Writes go through a temp file and a rename so a crash never leaves a
//! half-written document behind.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Held shares for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub symbol: String,
    pub quantity: i64,
    pub average_price: f64,
    /// Bought on `last_buy_date`, not yet sellable
    #[serde(default)]
    pub today_buy_qty: i64,
    /// `YYYY-MM-DD`, market-local
    #[serde(default)]
    pub last_buy_date: String,
}

impl PositionRecord {
    pub fn new(symbol: String) -> Self {
        Self {
            symbol,
            quantity: 0,
            average_price: 0.0,
            today_buy_qty: 0,
            last_buy_date: String::new(),
        }
    }

    pub fn sellable(&self) -> i64 {
        (self.quantity - self.today_buy_qty).max(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Filled,
    /// Close request with nothing held
    NoPosition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

/// Every simulated order fills immediately and completely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub symbol: String,
    pub status: OrderStatus,
    #[serde(default = "default_side")]
    pub side: OrderSide,
    pub executed_qty: f64,
    pub avg_price: f64,
    pub commission: f64,
    #[serde(default)]
    pub update_time: i64,
}

fn default_side() -> OrderSide {
    OrderSide::Buy
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default)]
    pub cash: f64,
    #[serde(default)]
    pub positions: HashMap<String, PositionRecord>,
    #[serde(default)]
    pub orders: HashMap<String, OrderRecord>,
}

/// `<dir>/ashare_paper_<account>.json`, with every character outside
/// `[A-Za-z0-9_-]` in the account id replaced by `_`.
///
/// An empty `dir` means the platform temp directory.
pub fn state_file_path(dir: &Path, account_id: &str) -> PathBuf {
    let account_id = account_id.trim();
    let account_id = if account_id.is_empty() { "default" } else { account_id };
    let safe: String = account_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let dir = if dir.as_os_str().is_empty() {
        std::env::temp_dir()
    } else {
        dir.to_path_buf()
    };
    dir.join(format!("ashare_paper_{}.json", safe))
}

/// Prior state if the file exists and parses.
///
/// Missing, unreadable and corrupt files all mean "no prior state".
pub fn try_load(path: &Path) -> Option<PersistedState> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(_) => {
            info!(path = %path.display(), "💾 [PAPER] No state file found, starting fresh");
            return None;
        }
    };
    match serde_json::from_str::<PersistedState>(&json) {
        Ok(state) => {
            info!(
                path = %path.display(),
                cash = %format!("{:.2}", state.cash),
                positions = state.positions.len(),
                orders = state.orders.len(),
                "💾 [PAPER] State loaded"
            );
            Some(state)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "💾 [PAPER] Unreadable state file, starting fresh");
            None
        }
    }
}

pub fn save(path: &Path, state: &PersistedState) -> Result<()> {
    let json = serde_json::to_string_pretty(state)?;
    write_atomic(path, json.as_bytes())?;
    debug!(path = %path.display(), "💾 [PAPER] State saved");
    Ok(())
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let temp_path = path.with_extension("json.tmp");
    {
        let mut file = File::create(&temp_path)
            .with_context(|| format!("failed to create {}", temp_path.display()))?;
        file.write_all(bytes)
            .with_context(|| format!("failed to write {}", temp_path.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to sync {}", temp_path.display()))?;
    }

    fs::rename(&temp_path, path).with_context(|| {
        format!("failed to rename {} to {}", temp_path.display(), path.display())
    })?;
    Ok(())
}
