use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// Information about a failed market-data fetch for a symbol
#[derive(Debug, Clone)]
pub struct FailureInfo {
    pub failed_at: DateTime<Utc>,
    pub error_type: FailureType,
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FailureType {
    /// Symbol doesn't exist or is not covered by any configured source;
    /// also the cached-null marker for permanent 4xx responses.
    NotFound,
    /// Temporary rate limit
    RateLimited,
    /// Other provider errors
    ApiError,
}

/// Thread-safe cache of symbols whose fetches recently failed, so the daily
/// batch does not hammer providers with calls that are known to fail.
#[derive(Clone, Default)]
pub struct FailureCache {
    cache: Arc<DashMap<String, FailureInfo>>,
}

impl FailureCache {
    pub fn new() -> Self {
        Self {
            cache: Arc::new(DashMap::new()),
        }
    }

    /// Check if a symbol is in the failure cache and the failure is still valid
    pub fn is_failed(&self, symbol: &str) -> Option<FailureInfo> {
        if let Some(entry) = self.cache.get(symbol) {
            let info = entry.value().clone();
            let now = Utc::now();
            let expiry = info.failed_at + Duration::hours(info.ttl_hours);

            if now < expiry {
                return Some(info);
            } else {
                drop(entry); // Release the read lock
                self.cache.remove(symbol);
            }
        }
        None
    }

    pub fn record_failure(&self, symbol: &str, error_type: FailureType) {
        let ttl_hours = match error_type {
            FailureType::NotFound => 24,
            FailureType::RateLimited => 1,
            FailureType::ApiError => 6,
        };

        let info = FailureInfo {
            failed_at: Utc::now(),
            error_type,
            ttl_hours,
        };

        self.cache.insert(symbol.to_string(), info);
    }

    /// Clear a symbol from the failure cache (e.g., after a successful fetch)
    pub fn clear(&self, symbol: &str) {
        self.cache.remove(symbol);
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_retrieves_failures() {
        let cache = FailureCache::new();

        cache.record_failure("INVALID", FailureType::NotFound);

        let result = cache.is_failed("INVALID");
        assert!(result.is_some());
        assert_eq!(result.unwrap().error_type, FailureType::NotFound);
    }

    #[test]
    fn clears_symbol() {
        let cache = FailureCache::new();

        cache.record_failure("TEST", FailureType::NotFound);
        assert!(cache.is_failed("TEST").is_some());

        cache.clear("TEST");
        assert!(cache.is_failed("TEST").is_none());
    }

    #[test]
    fn ttl_depends_on_failure_type() {
        let cache = FailureCache::new();

        cache.record_failure("GONE", FailureType::NotFound);
        cache.record_failure("BUSY", FailureType::RateLimited);

        assert_eq!(cache.is_failed("GONE").unwrap().ttl_hours, 24);
        assert_eq!(cache.is_failed("BUSY").unwrap().ttl_hours, 1);
    }
}
