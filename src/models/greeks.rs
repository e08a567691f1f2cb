use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// First/second-order sensitivities as produced by the pricing model,
/// already scaled by signed contracts x 100 for options. Theta is per day,
/// vega and rho per 1% move.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GreeksValues {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

impl GreeksValues {
    pub const ZERO: GreeksValues = GreeksValues {
        delta: 0.0,
        gamma: 0.0,
        theta: 0.0,
        vega: 0.0,
        rho: 0.0,
    };

    pub fn is_finite(&self) -> bool {
        self.delta.is_finite()
            && self.gamma.is_finite()
            && self.theta.is_finite()
            && self.vega.is_finite()
            && self.rho.is_finite()
    }
}

/// Daily per-position Greeks row. A row with all-null Greeks is a recorded
/// calculation failure; aggregators skip it and count a warning.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PositionGreeks {
    pub id: Uuid,
    pub position_id: Uuid,
    pub calculation_date: NaiveDate,
    pub delta: Option<BigDecimal>,
    pub gamma: Option<BigDecimal>,
    pub theta: Option<BigDecimal>,
    pub vega: Option<BigDecimal>,
    pub rho: Option<BigDecimal>,
    pub dollar_delta: Option<BigDecimal>,
    pub dollar_gamma: Option<BigDecimal>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of a chunked bulk upsert of Greeks rows.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkGreeksOutcome {
    pub updated: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}
