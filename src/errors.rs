use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Rate limited by external provider")]
    RateLimited,
    #[error("External error: {0}")]
    External(String),
    #[error("Missing market data: {0}")]
    MissingData(String),
    #[error("Insufficient history: {0}")]
    InsufficientHistory(String),
    #[error("Engine timed out after {0}s")]
    Timeout(u64),
    #[error("Cancelled")]
    Cancelled,
}

/// How the orchestrator should react to a failed engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth retrying with backoff: network hiccups, rate limits, timeouts,
    /// serialization failures and deadlocks in the store.
    Transient,
    /// Retrying will not help: validation errors, missing schema, bad input.
    Permanent,
}

impl AppError {
    pub fn classification(&self) -> ErrorClass {
        match self {
            AppError::RateLimited | AppError::Timeout(_) => ErrorClass::Transient,
            AppError::Db(e) => classify_db(e),
            AppError::External(msg) => {
                if is_transient_external(msg) {
                    ErrorClass::Transient
                } else {
                    ErrorClass::Permanent
                }
            }
            AppError::Validation(_)
            | AppError::NotFound(_)
            | AppError::MissingData(_)
            | AppError::InsufficientHistory(_)
            | AppError::Cancelled => ErrorClass::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.classification() == ErrorClass::Transient
    }
}

fn classify_db(err: &sqlx::Error) -> ErrorClass {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed => {
            ErrorClass::Transient
        }
        sqlx::Error::Database(db) => {
            // 40001 serialization_failure, 40P01 deadlock_detected
            match db.code().as_deref() {
                Some("40001") | Some("40P01") => ErrorClass::Transient,
                _ => ErrorClass::Permanent,
            }
        }
        _ => ErrorClass::Permanent,
    }
}

fn is_transient_external(msg: &str) -> bool {
    let msg = msg.to_ascii_lowercase();
    msg.contains("timeout")
        || msg.contains("timed out")
        || msg.contains("connection")
        || msg.contains("network")
        || msg.contains("503")
        || msg.contains("502")
        || msg.contains("500")
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        AppError::Validation(value)
    }
}
