use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Daily parametric market-risk measures for one portfolio.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MarketRisk {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub calculation_date: NaiveDate,
    /// One-day 99% value at risk, positive dollars.
    pub var_1d_99: BigDecimal,
    /// One-day 99% expected shortfall, positive dollars.
    pub es_1d_99: BigDecimal,
    /// Stdev of daily returns x sqrt(252), as a fraction.
    pub annualized_volatility: BigDecimal,
    pub beta: Option<BigDecimal>,
    pub sharpe: Option<BigDecimal>,
    /// Most negative peak-to-trough move over the window, as a fraction.
    pub max_drawdown: BigDecimal,
    pub data_points: i32,
    pub created_at: DateTime<Utc>,
}
