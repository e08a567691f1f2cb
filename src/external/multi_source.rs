use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::external::market_data_source::{Bar, MarketDataError, MarketDataSource, Quote};

/// Routes every call across an ordered list of sources, falling through on
/// failure. Which concrete providers sit behind it is configuration; the
/// engines only ever see this one capability.
pub struct MultiSource {
    sources: Vec<Box<dyn MarketDataSource>>,
}

impl MultiSource {
    pub fn new(sources: Vec<Box<dyn MarketDataSource>>) -> Self {
        Self { sources }
    }

    fn should_fall_through(err: &MarketDataError) -> bool {
        // NotFound may be a coverage gap of one provider; rate limits and
        // network failures propagate so the caller can back off.
        matches!(
            err,
            MarketDataError::NotFound | MarketDataError::BadResponse(_)
        )
    }
}

#[async_trait]
impl MarketDataSource for MultiSource {
    async fn latest_price(&self, symbol: &str) -> Result<Option<Quote>, MarketDataError> {
        let mut last_err: Option<MarketDataError> = None;
        for (i, source) in self.sources.iter().enumerate() {
            match source.latest_price(symbol).await {
                Ok(Some(quote)) => {
                    if i > 0 {
                        info!("Resolved {} via fallback source #{}", symbol, i + 1);
                    }
                    return Ok(Some(quote));
                }
                Ok(None) => continue,
                Err(e) if Self::should_fall_through(&e) => {
                    warn!("Source #{} failed for {}: {}", i + 1, symbol, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        match last_err {
            Some(MarketDataError::NotFound) | None => Ok(None),
            Some(e) => Err(e),
        }
    }

    async fn price_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, MarketDataError> {
        let mut last_err: Option<MarketDataError> = None;
        for (i, source) in self.sources.iter().enumerate() {
            match source.price_history(symbol, start, end).await {
                Ok(bars) if !bars.is_empty() => return Ok(bars),
                Ok(_) => continue,
                Err(e) if Self::should_fall_through(&e) => {
                    warn!("Source #{} history failed for {}: {}", i + 1, symbol, e);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        match last_err {
            Some(MarketDataError::NotFound) | None => Ok(Vec::new()),
            Some(e) => Err(e),
        }
    }

    async fn dividend_yield(&self, symbol: &str) -> Result<Option<f64>, MarketDataError> {
        for source in &self.sources {
            if let Ok(Some(y)) = source.dividend_yield(symbol).await {
                return Ok(Some(y));
            }
        }
        Ok(None)
    }

    async fn risk_free_rate(&self, date: NaiveDate) -> Result<Option<f64>, MarketDataError> {
        for source in &self.sources {
            if let Ok(Some(r)) = source.risk_free_rate(date).await {
                return Ok(Some(r));
            }
        }
        Ok(None)
    }
}
