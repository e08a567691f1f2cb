use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// One daily bar for one symbol. Insert-only, globally shared, unique on
/// (symbol, date).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct MarketDataPoint {
    pub id: Uuid,
    pub symbol: String,
    pub date: NaiveDate,
    pub open: Option<BigDecimal>,
    pub high: Option<BigDecimal>,
    pub low: Option<BigDecimal>,
    pub close: BigDecimal,
    pub volume: Option<i64>,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub created_at: DateTime<Utc>,
}
