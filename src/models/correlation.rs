use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationPair {
    pub symbol1: String,
    pub symbol2: String,
    pub correlation: f64,
}

/// Symmetric correlation matrix with unit diagonal, plus the upper-triangle
/// pairs it was assembled from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub symbols: Vec<String>,
    pub pairs: Vec<CorrelationPair>,
    pub matrix_2d: Vec<Vec<f64>>,
}

/// JSON payload persisted per (portfolio, date): the cross-position matrix
/// and the factor-proxy matrix side by side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorrelationPayload {
    pub positions: CorrelationMatrix,
    pub factors: Option<CorrelationMatrix>,
    pub window_days: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CorrelationCalculation {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub calculation_date: NaiveDate,
    pub window_days: i32,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
