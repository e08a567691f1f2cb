use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The calculation stages the orchestrator runs, in execution order.
/// Exposures is the pre-Greeks aggregation pass; Aggregation the post-Greeks
/// pass that adds Greek sums and the delta-adjusted view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    MarketData,
    Valuation,
    Exposures,
    Greeks,
    Aggregation,
    Factors,
    MarketRisk,
    StressTests,
    Correlations,
    Snapshot,
}

impl EngineKind {
    pub fn all() -> [EngineKind; 10] {
        [
            EngineKind::MarketData,
            EngineKind::Valuation,
            EngineKind::Exposures,
            EngineKind::Greeks,
            EngineKind::Aggregation,
            EngineKind::Factors,
            EngineKind::MarketRisk,
            EngineKind::StressTests,
            EngineKind::Correlations,
            EngineKind::Snapshot,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineKind::MarketData => "market_data",
            EngineKind::Valuation => "valuation",
            EngineKind::Exposures => "exposures",
            EngineKind::Greeks => "greeks",
            EngineKind::Aggregation => "aggregation",
            EngineKind::Factors => "factors",
            EngineKind::MarketRisk => "market_risk",
            EngineKind::StressTests => "stress_tests",
            EngineKind::Correlations => "correlations",
            EngineKind::Snapshot => "snapshot",
        }
    }

    pub fn parse(code: &str) -> Option<Self> {
        Self::all()
            .into_iter()
            .find(|e| e.as_str() == code.trim().to_ascii_lowercase())
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// queued -> running -> {completed | failed | skipped}; terminal states are
/// absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Skipped
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audit row for one engine run against one portfolio on one date.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct BatchJob {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub calculation_date: NaiveDate,
    pub engine: String,
    pub status: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<f64>,
    pub error: Option<String>,
    pub retries: i32,
    pub created_at: DateTime<Utc>,
}

/// What run_daily_batch returns per job; no error ever escapes as a panic or
/// a propagated Err past the orchestrator.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub portfolio_id: Uuid,
    pub engine: EngineKind,
    pub status: JobStatus,
    pub duration_seconds: f64,
    pub error: Option<String>,
    pub warnings: Vec<String>,
    pub retries: u32,
}
