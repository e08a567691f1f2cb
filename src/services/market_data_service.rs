use chrono::{Duration as ChronoDuration, NaiveDate};
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::db::market_data_queries;
use crate::errors::AppError;
use crate::external::market_data_source::MarketDataError;
use crate::models::FactorType;
use crate::numeric;
use crate::services::failure_cache::FailureType;
use crate::state::EngineContext;

/// Per-symbol inputs handed to the Greeks engine. Missing spot means the
/// snapshot could not be built; the documented fallbacks cover the rest.
#[derive(Debug, Clone)]
pub struct SymbolSnapshot {
    pub symbol: String,
    pub spot: f64,
    pub as_of: NaiveDate,
    pub stale: bool,
    pub implied_volatility: f64,
    pub risk_free_rate: f64,
    pub dividend_yield: f64,
}

pub const DEFAULT_IMPLIED_VOL: f64 = 0.25;
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.05;

const MAX_FETCH_RETRIES: u32 = 3;

#[derive(Debug, Default)]
pub struct RefreshOutcome {
    pub refreshed: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

/// Engine A: pull history for every symbol the portfolio touches (plus the
/// factor proxies downstream engines regress against) into the shared
/// market_data_points cache.
pub async fn refresh_portfolio_data(
    ctx: &EngineContext,
    symbols: &[String],
    date: NaiveDate,
) -> Result<RefreshOutcome, AppError> {
    let mut all: Vec<String> = symbols.to_vec();
    for factor in FactorType::all() {
        let proxy = factor.proxy_symbol().to_string();
        if !all.contains(&proxy) {
            all.push(proxy);
        }
    }

    let mut outcome = RefreshOutcome::default();

    for symbol in &all {
        match refresh_symbol(ctx, symbol, date).await {
            Ok(true) => outcome.refreshed += 1,
            Ok(false) => outcome.skipped += 1,
            Err(e) => {
                warn!("Market data refresh failed for {}: {}", symbol, e);
                outcome
                    .warnings
                    .push(format!("market data unavailable for {}: {}", symbol, e));
            }
        }
    }

    Ok(outcome)
}

/// Returns Ok(true) when fresh bars were written, Ok(false) when the cache
/// was already current or the symbol is in the failure cache.
async fn refresh_symbol(
    ctx: &EngineContext,
    symbol: &str,
    date: NaiveDate,
) -> Result<bool, AppError> {
    if let Some(failure) = ctx.failure_cache.is_failed(symbol) {
        info!(
            "⊘ Skipping fetch for {} - recent {:?} failure cached",
            symbol, failure.error_type
        );
        return Ok(false);
    }

    // Cache already has a close at or after the calculation date: nothing to do
    if let Some(latest) = market_data_queries::fetch_latest(&ctx.pool, symbol).await? {
        if latest.date >= date {
            return Ok(false);
        }
    }

    let start = date - ChronoDuration::days(ctx.config.rolling_window_days * 2);
    let mut retry_count = 0;

    loop {
        let _guard = ctx.rate_limiter.acquire().await;

        match ctx.source.price_history(symbol, start, date).await {
            Ok(bars) if bars.is_empty() => {
                // Symbol unsupported by every source: cached-null for the day
                ctx.failure_cache.record_failure(symbol, FailureType::NotFound);
                return Err(AppError::MissingData(format!(
                    "no price history for {}",
                    symbol
                )));
            }
            Ok(bars) => {
                market_data_queries::upsert_bars(&ctx.pool, symbol, &bars).await?;
                ctx.failure_cache.clear(symbol);
                info!("✓ Refreshed {} bars for {}", bars.len(), symbol);
                return Ok(true);
            }
            Err(MarketDataError::RateLimited) if retry_count < MAX_FETCH_RETRIES => {
                retry_count += 1;
                let delay = Duration::from_secs(5 * retry_count as u64); // 5, 10, 15 seconds
                warn!(
                    "Rate limited for {}, retrying in {}s (attempt {}/{})",
                    symbol,
                    delay.as_secs(),
                    retry_count,
                    MAX_FETCH_RETRIES
                );
                sleep(delay).await;
            }
            Err(MarketDataError::RateLimited) => {
                ctx.failure_cache
                    .record_failure(symbol, FailureType::RateLimited);
                return Err(AppError::RateLimited);
            }
            Err(MarketDataError::NotFound) => {
                ctx.failure_cache.record_failure(symbol, FailureType::NotFound);
                return Err(AppError::MissingData(format!("symbol {} not found", symbol)));
            }
            Err(e) => {
                ctx.failure_cache.record_failure(symbol, FailureType::ApiError);
                return Err(AppError::External(e.to_string()));
            }
        }
    }
}

/// Latest close at or before `date` from the shared cache, flagged stale
/// when older than the calculation date. Never fabricates a price.
pub async fn latest_close(
    ctx: &EngineContext,
    symbol: &str,
    date: NaiveDate,
) -> Result<Option<(f64, NaiveDate, bool)>, AppError> {
    let point = market_data_queries::fetch_latest_on_or_before(&ctx.pool, symbol, date).await?;
    Ok(point.map(|p| {
        let price = numeric::to_f64(&p.close);
        (price, p.date, p.date < date)
    }))
}

/// Build the Greeks-engine snapshot for one symbol. `None` when no spot is
/// available at all.
pub async fn symbol_snapshot(
    ctx: &EngineContext,
    symbol: &str,
    date: NaiveDate,
) -> Result<Option<SymbolSnapshot>, AppError> {
    let Some((spot, as_of, stale)) = latest_close(ctx, symbol, date).await? else {
        return Ok(None);
    };

    let risk_free_rate = ctx
        .source
        .risk_free_rate(date)
        .await
        .ok()
        .flatten()
        .unwrap_or(DEFAULT_RISK_FREE_RATE);

    let dividend_yield = ctx
        .source
        .dividend_yield(symbol)
        .await
        .ok()
        .flatten()
        .unwrap_or(0.0);

    Ok(Some(SymbolSnapshot {
        symbol: symbol.to_string(),
        spot,
        as_of,
        stale,
        implied_volatility: DEFAULT_IMPLIED_VOL,
        risk_free_rate,
        dividend_yield,
    }))
}
