use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::external::market_data_source::{Bar, MarketDataError, MarketDataSource, Quote};

/// Alpha Vantage client. Free-tier friendly: the caller is expected to sit
/// behind the shared rate limiter.
pub struct AlphaVantageSource {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl AlphaVantageSource {
    pub fn from_env() -> Result<Self, MarketDataError> {
        let api_key = std::env::var("ALPHAVANTAGE_API_KEY")
            .map_err(|_| MarketDataError::BadResponse("ALPHAVANTAGE_API_KEY not set".into()))?;

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: "https://www.alphavantage.co/query".to_string(),
        })
    }

    async fn fetch_daily(&self, symbol: &str, full: bool) -> Result<Vec<Bar>, MarketDataError> {
        let outputsize = if full { "full" } else { "compact" };

        let resp = self
            .client
            .get(&self.base_url)
            .query(&[
                ("function", "TIME_SERIES_DAILY"),
                ("symbol", symbol),
                ("outputsize", outputsize),
                ("apikey", self.api_key.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MarketDataError::Network(e.to_string()))?;

        let body = resp
            .json::<AvDailyResponse>()
            .await
            .map_err(|e| MarketDataError::Parse(e.to_string()))?;

        if body.note.is_some() {
            // Throttle response: the body is a polite note instead of data
            return Err(MarketDataError::RateLimited);
        }

        if let Some(msg) = body.error_message {
            if msg.contains("Invalid API call") {
                return Err(MarketDataError::NotFound);
            }
            return Err(MarketDataError::BadResponse(msg));
        }

        let series = body
            .time_series
            .ok_or_else(|| MarketDataError::BadResponse("missing time series".into()))?;

        // BTreeMap keys are "YYYY-MM-DD", so iteration is already ascending
        series
            .into_iter()
            .map(|(date_str, bar)| {
                let date = NaiveDate::parse_from_str(&date_str, "%Y-%m-%d")
                    .map_err(|e| MarketDataError::Parse(e.to_string()))?;
                let close = BigDecimal::from_str(&bar.close)
                    .map_err(|e| MarketDataError::Parse(e.to_string()))?;
                let volume = bar.volume.and_then(|v| v.parse::<i64>().ok());
                Ok(Bar {
                    date,
                    close,
                    volume,
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct AvDailyResponse {
    #[serde(rename = "Time Series (Daily)")]
    time_series: Option<BTreeMap<String, AvDailyBar>>,

    // Rate-limit responses carry only:
    // { "Note": "Thank you for using Alpha Vantage! ... 5 calls per minute ..." }
    #[serde(rename = "Note")]
    note: Option<String>,

    // { "Error Message": "Invalid API call. ..." }
    #[serde(rename = "Error Message")]
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AvDailyBar {
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: Option<String>,
}

#[async_trait]
impl MarketDataSource for AlphaVantageSource {
    async fn latest_price(&self, symbol: &str) -> Result<Option<Quote>, MarketDataError> {
        let bars = self.fetch_daily(symbol, false).await?;
        Ok(bars.last().map(|b| Quote {
            price: b.close.clone(),
            as_of: b.date,
            stale: false,
        }))
    }

    async fn price_history(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Bar>, MarketDataError> {
        // compact covers ~100 sessions; anything longer needs the full dump
        let full = (end - start).num_days() > 120;
        let mut bars = self.fetch_daily(symbol, full).await?;
        bars.retain(|b| b.date >= start && b.date <= end);
        Ok(bars)
    }

    async fn dividend_yield(&self, _symbol: &str) -> Result<Option<f64>, MarketDataError> {
        // Not available on the free daily endpoint
        Ok(None)
    }

    async fn risk_free_rate(&self, _date: NaiveDate) -> Result<Option<f64>, MarketDataError> {
        Ok(None)
    }
}
