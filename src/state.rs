use sqlx::PgPool;
use std::sync::Arc;

use crate::config::BatchConfig;
use crate::external::market_data_source::MarketDataSource;
use crate::services::calendar::TradingCalendar;
use crate::services::failure_cache::FailureCache;
use crate::services::rate_limiter::RateLimiter;

/// Everything an engine invocation needs. One of these is built at startup
/// and cloned per job; swapping the market-data source or the calendar is a
/// construction-time decision, never a code change in the engines.
#[derive(Clone)]
pub struct EngineContext {
    pub pool: PgPool,
    pub source: Arc<dyn MarketDataSource>,
    pub calendar: Arc<dyn TradingCalendar>,
    pub failure_cache: Arc<FailureCache>,
    pub rate_limiter: Arc<RateLimiter>,
    pub config: BatchConfig,
}
