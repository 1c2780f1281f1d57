//! Error types for market data resolution and simulated trading

use thiserror::Error;

/// Broad class of a market data failure.
///
/// The provider treats `Transport` and `SemanticEmpty` alike when deciding
/// whether to fall back; `Policy` errors are returned as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP failure, non-200 status, undecodable body, non-zero upstream code
    Transport,
    /// Upstream answered but the data is unusable (no rows, zero price)
    SemanticEmpty,
    /// Request can never succeed as asked
    Policy,
}

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("decode failed: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("upstream code={code} msg={msg}")]
    Upstream { code: i64, msg: String },

    #[error("empty response: {0}")]
    Empty(String),

    #[error("invalid market price for {0}")]
    InvalidPrice(String),

    #[error("tushare token is empty")]
    TokenEmpty,

    #[error("invalid symbol format: {0}")]
    InvalidSymbol(String),

    #[error("unsupported index scope: {0}")]
    UnsupportedIndex(String),

    #[error("unsupported scope: {0}")]
    UnsupportedScope(String),

    #[error("end time must be after start time")]
    InvalidRange,

    #[error("{context} failed: {source}")]
    Source {
        context: String,
        #[source]
        source: Box<MarketDataError>,
    },
}

impl MarketDataError {
    /// Wrap with a context string, e.g. `"tushare provider"`.
    pub fn context(self, context: impl Into<String>) -> Self {
        MarketDataError::Source {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify, looking through any context wrappers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketDataError::Http(_)
            | MarketDataError::Status { .. }
            | MarketDataError::Decode(_)
            | MarketDataError::Upstream { .. }
            | MarketDataError::TokenEmpty => ErrorKind::Transport,
            MarketDataError::Empty(_) | MarketDataError::InvalidPrice(_) => {
                ErrorKind::SemanticEmpty
            }
            MarketDataError::InvalidSymbol(_)
            | MarketDataError::UnsupportedIndex(_)
            | MarketDataError::UnsupportedScope(_)
            | MarketDataError::InvalidRange => ErrorKind::Policy,
            MarketDataError::Source { source, .. } => source.kind(),
        }
    }

    /// Innermost error of a context chain.
    pub fn root(&self) -> &MarketDataError {
        match self {
            MarketDataError::Source { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Which side of the daily band was hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceLimit {
    LimitUp,
    LimitDown,
}

impl std::fmt::Display for PriceLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceLimit::LimitUp => f.write_str("limit-up"),
            PriceLimit::LimitDown => f.write_str("limit-down"),
        }
    }
}

/// Business-rule rejections from the paper-trading engine
#[derive(Debug, Error)]
pub enum TradeError {
    #[error("outside ashare trading session")]
    OutsideTradingSession,

    #[error("invalid lot size, minimum tradable lot is 100 shares")]
    InvalidLotSize,

    #[error("t+1 restriction: shares bought today are not sellable: {0}")]
    TPlusOneRestricted(String),

    #[error("price limit reached ({limit}): {symbol}")]
    PriceLimitReached { limit: PriceLimit, symbol: String },

    #[error("insufficient cash: need {need:.2}, available {available:.2}")]
    InsufficientCash { need: f64, available: f64 },

    #[error("unsupported for cash account: {0}")]
    UnsupportedForCashAccount(&'static str),

    #[error("order not found: {0}")]
    OrderNotFound(String),

    #[error("invalid market price for {0}")]
    InvalidPrice(String),

    #[error(transparent)]
    MarketData(#[from] MarketDataError),
}
