//! Upstream market data sources (Tushare, Eastmoney)

mod eastmoney;
mod tushare;

pub use eastmoney::EastmoneyClient;
pub use tushare::TushareClient;

pub mod defaults {
    pub use super::eastmoney::{
        DEFAULT_INDEX, DEFAULT_KLINE_URL, DEFAULT_SNAPSHOT_URL, DEFAULT_SYMBOLS_URL,
        DEFAULT_TIMEOUT_SECS as EASTMONEY_TIMEOUT_SECS,
    };
    pub use super::tushare::{DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECS as TUSHARE_TIMEOUT_SECS};
}

use reqwest::{RequestBuilder, StatusCode};

use crate::error::MarketDataError;

/// Send a request and return the body of a 200 response.
///
/// No retries: a failure goes straight back to the provider's fallback logic.
async fn fetch_body(request: RequestBuilder) -> Result<String, MarketDataError> {
    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await?;
    if status != StatusCode::OK {
        return Err(MarketDataError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}
