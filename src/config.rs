use chrono::Weekday;

/// How option delta weights exposure in the delta-adjusted view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaAdjustMode {
    /// |delta| — magnitude view.
    Absolute,
    /// signed delta — directional view.
    Directional,
}

#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Annual risk-free rate used for Sharpe and as the Greeks fallback.
    pub risk_free_rate: f64,
    /// Max retries for transient engine failures.
    pub max_retries: u32,
    /// Base of the exponential backoff in seconds (2 -> 2/4/8s).
    pub retry_base_secs: u64,
    /// Soft per-engine timeout; exceeding it counts as transient.
    pub engine_timeout_secs: u64,
    /// Overall budget for one daily batch; stops scheduling new portfolios.
    pub batch_timeout_secs: u64,
    /// Day of week the correlation engine actually runs.
    pub correlation_weekday: Weekday,
    pub delta_adjust_mode: DeltaAdjustMode,
    /// Rolling lookback for regressions, risk and correlations.
    pub rolling_window_days: i64,
    /// Below this many return observations, regressions return empty.
    pub min_regression_points: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.045,
            max_retries: 3,
            retry_base_secs: 2,
            engine_timeout_secs: 120,
            batch_timeout_secs: 3600,
            correlation_weekday: Weekday::Tue,
            delta_adjust_mode: DeltaAdjustMode::Absolute,
            rolling_window_days: 252,
            min_regression_points: 60,
        }
    }
}

impl BatchConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            risk_free_rate: env_parse("RISK_FREE_RATE", defaults.risk_free_rate),
            max_retries: env_parse("BATCH_MAX_RETRIES", defaults.max_retries),
            retry_base_secs: env_parse("BATCH_RETRY_BASE_SECS", defaults.retry_base_secs),
            engine_timeout_secs: env_parse("ENGINE_TIMEOUT_SECS", defaults.engine_timeout_secs),
            batch_timeout_secs: env_parse("BATCH_TIMEOUT_SECS", defaults.batch_timeout_secs),
            correlation_weekday: std::env::var("CORRELATION_WEEKDAY")
                .ok()
                .and_then(|v| parse_weekday(&v))
                .unwrap_or(defaults.correlation_weekday),
            delta_adjust_mode: match std::env::var("DELTA_ADJUSTED_ABS").as_deref() {
                Ok("false") | Ok("0") => DeltaAdjustMode::Directional,
                _ => DeltaAdjustMode::Absolute,
            },
            rolling_window_days: env_parse("ROLLING_WINDOW_DAYS", defaults.rolling_window_days),
            min_regression_points: env_parse(
                "MIN_REGRESSION_POINTS",
                defaults.min_regression_points,
            ),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_weekday(value: &str) -> Option<Weekday> {
    match value.to_ascii_lowercase().as_str() {
        "mon" | "monday" => Some(Weekday::Mon),
        "tue" | "tuesday" => Some(Weekday::Tue),
        "wed" | "wednesday" => Some(Weekday::Wed),
        "thu" | "thursday" => Some(Weekday::Thu),
        "fri" | "friday" => Some(Weekday::Fri),
        "sat" | "saturday" => Some(Weekday::Sat),
        "sun" | "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}
