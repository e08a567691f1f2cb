pub mod aggregation_service;
pub mod calendar;
pub mod correlation_service;
pub mod factor_service;
pub mod failure_cache;
pub mod greeks_service;
pub mod market_data_service;
pub mod market_risk_service;
pub mod rate_limiter;
pub mod snapshot_service;
pub mod stress_service;
pub mod valuation_service;
