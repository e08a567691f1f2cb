use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Dated portfolio state, written once per trading day per portfolio.
/// Aggregated Greeks are stored at monetary scale. Rho is computed upstream
/// but never persisted on snapshots; it stays available at position level.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PortfolioSnapshot {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub snapshot_date: NaiveDate,
    pub total_value: BigDecimal,
    pub gross_exposure: BigDecimal,
    pub net_exposure: BigDecimal,
    pub long_exposure: BigDecimal,
    pub short_exposure: BigDecimal,
    pub long_count: i32,
    pub short_count: i32,
    pub delta_adjusted_exposure: Option<BigDecimal>,
    pub portfolio_delta: Option<BigDecimal>,
    pub portfolio_gamma: Option<BigDecimal>,
    pub portfolio_theta: Option<BigDecimal>,
    pub portfolio_vega: Option<BigDecimal>,
    pub daily_pnl: BigDecimal,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
