//! Configuration management
//!
//! Defaults, then optional `config/default.*` and `config/local.*` files,
//! then `ASHARE__*` environment variables (loaded via .env).

use anyhow::{Context, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;
use std::time::Duration;

use crate::paper_trading::PaperTradingConfig;
use crate::provider::sources::defaults;
use crate::provider::{EastmoneyClient, MarketDataProvider, TushareClient};
use crate::types::{DataMode, DEFAULT_MARKET};

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub market_data: MarketDataConfig,
    pub paper_trading: PaperTradingConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MarketDataConfig {
    /// Tushare Pro token; empty disables the primary source
    #[serde(default)]
    pub tushare_token: String,
    /// `tushare_then_fallback`, `tushare_only` or `fallback_only`
    pub data_mode: String,
    /// JSON array or comma/space separated symbols
    #[serde(default)]
    pub watchlist: String,
    pub tushare_base_url: String,
    pub eastmoney_kline_url: String,
    pub eastmoney_snapshot_url: String,
    pub eastmoney_symbols_url: String,
    pub tushare_timeout_secs: u64,
    pub eastmoney_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl MarketDataConfig {
    pub fn mode(&self) -> DataMode {
        DataMode::parse(&self.data_mode)
    }

    /// Configured token, or `TUSHARE_TOKEN` from the environment.
    pub fn resolved_token(&self) -> String {
        resolve_env(&self.tushare_token, "TUSHARE_TOKEN")
    }

    pub fn build_provider(&self) -> MarketDataProvider {
        let tushare = TushareClient::with_timeout(
            &self.resolved_token(),
            Duration::from_secs(self.tushare_timeout_secs),
        )
        .with_base_url(&self.tushare_base_url);
        let fallback =
            EastmoneyClient::with_timeout(Duration::from_secs(self.eastmoney_timeout_secs))
                .with_endpoints(
                    &self.eastmoney_kline_url,
                    &self.eastmoney_snapshot_url,
                    &self.eastmoney_symbols_url,
                );
        MarketDataProvider::with_clients(tushare, fallback, self.mode(), &self.watchlist)
    }
}

fn resolve_env(value: &str, env_key: &str) -> String {
    let value = value.trim();
    if !value.is_empty() {
        return value.to_string();
    }
    std::env::var(env_key)
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn with_defaults(builder: ConfigBuilder<DefaultState>) -> Result<ConfigBuilder<DefaultState>> {
    let paper = PaperTradingConfig::default();
    Ok(builder
        // Market data defaults
        .set_default("market_data.tushare_token", "")?
        .set_default("market_data.data_mode", DataMode::default().as_str())?
        .set_default("market_data.watchlist", "")?
        .set_default("market_data.tushare_base_url", defaults::DEFAULT_BASE_URL)?
        .set_default("market_data.eastmoney_kline_url", defaults::DEFAULT_KLINE_URL)?
        .set_default("market_data.eastmoney_snapshot_url", defaults::DEFAULT_SNAPSHOT_URL)?
        .set_default("market_data.eastmoney_symbols_url", defaults::DEFAULT_SYMBOLS_URL)?
        .set_default("market_data.tushare_timeout_secs", defaults::TUSHARE_TIMEOUT_SECS as i64)?
        .set_default("market_data.eastmoney_timeout_secs", defaults::EASTMONEY_TIMEOUT_SECS as i64)?
        // Paper trading defaults
        .set_default("paper_trading.account_id", paper.account_id)?
        .set_default("paper_trading.market", DEFAULT_MARKET)?
        .set_default("paper_trading.initial_cash", paper.initial_cash)?
        .set_default("paper_trading.commission_rate", paper.commission_rate)?
        .set_default("paper_trading.state_dir", "")?
        // Logging defaults
        .set_default("logging.json", false)?)
}

impl AppConfig {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = with_defaults(Config::builder())?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            // Override with environment variables (ASHARE__*)
            .add_source(Environment::with_prefix("ASHARE").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Generate a digest of the config (without secrets) for logging
    pub fn digest(&self) -> String {
        format!(
            "mode={} tushare={} watchlist={} account={} market={} cash={:.2}",
            self.market_data.mode(),
            if self.market_data.resolved_token().is_empty() { "disabled" } else { "enabled" },
            crate::provider::parse_watchlist(&self.market_data.watchlist).len(),
            self.paper_trading.account_id,
            self.paper_trading.market,
            self.paper_trading.initial_cash,
        )
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.digest())
    }
}
