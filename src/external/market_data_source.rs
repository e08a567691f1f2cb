use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use thiserror::Error;

/// Latest known price for a symbol, with the date it was observed. `stale`
/// is set when the quote is served from cache and older than the requested
/// calculation date.
#[derive(Debug, Clone)]
pub struct Quote {
    pub price: BigDecimal,
    pub as_of: NaiveDate,
    pub stale: bool,
}

/// One day of history for a symbol.
#[derive(Debug, Clone)]
pub struct Bar {
    pub date: NaiveDate,
    pub close: BigDecimal,
    pub volume: Option<i64>,
}

#[derive(Debug, Error)]
pub enum MarketDataError {
    #[error("network error: {0}")]
    Network(String),

    #[error("bad response: {0}")]
    BadResponse(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("rate limited")]
    RateLimited,

    #[error("symbol not found")]
    NotFound,
}

/// The capability every engine consumes for prices, yields and rates.
/// Implementations must never fabricate values: unknown symbol or missing
/// data is `Ok(None)` / `Ok(empty)`, not a guess.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    async fn latest_price(&self, symbol: &str) -> Result<Option<Quote>, MarketDataError>;

    /// Ordered ascending by date.
    async fn price_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, MarketDataError>;

    /// Annual dividend yield as a fraction, when the provider knows it.
    async fn dividend_yield(&self, symbol: &str) -> Result<Option<f64>, MarketDataError>;

    /// Annual risk-free rate as a fraction for the given date.
    async fn risk_free_rate(&self, date: NaiveDate) -> Result<Option<f64>, MarketDataError>;
}
