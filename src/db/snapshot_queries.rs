use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::PortfolioSnapshot;

const SNAPSHOT_COLUMNS: &str = "id, portfolio_id, snapshot_date, total_value, gross_exposure, \
     net_exposure, long_exposure, short_exposure, long_count, short_count, \
     delta_adjusted_exposure, portfolio_delta, portfolio_gamma, portfolio_theta, \
     portfolio_vega, daily_pnl, metadata, created_at";

/// Everything a snapshot row carries. No rho column exists on this table.
#[derive(Debug, Clone)]
pub struct SnapshotUpsert {
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
}

pub async fn upsert(pool: &PgPool, row: &SnapshotUpsert) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO portfolio_snapshots
             (id, portfolio_id, snapshot_date, total_value, gross_exposure, net_exposure,
              long_exposure, short_exposure, long_count, short_count,
              delta_adjusted_exposure, portfolio_delta, portfolio_gamma, portfolio_theta,
              portfolio_vega, daily_pnl, metadata)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
         ON CONFLICT (portfolio_id, snapshot_date)
         DO UPDATE SET total_value = EXCLUDED.total_value,
             gross_exposure = EXCLUDED.gross_exposure, net_exposure = EXCLUDED.net_exposure,
             long_exposure = EXCLUDED.long_exposure, short_exposure = EXCLUDED.short_exposure,
             long_count = EXCLUDED.long_count, short_count = EXCLUDED.short_count,
             delta_adjusted_exposure = EXCLUDED.delta_adjusted_exposure,
             portfolio_delta = EXCLUDED.portfolio_delta,
             portfolio_gamma = EXCLUDED.portfolio_gamma,
             portfolio_theta = EXCLUDED.portfolio_theta,
             portfolio_vega = EXCLUDED.portfolio_vega,
             daily_pnl = EXCLUDED.daily_pnl, metadata = EXCLUDED.metadata",
    )
    .bind(Uuid::new_v4())
    .bind(row.portfolio_id)
    .bind(row.snapshot_date)
    .bind(&row.total_value)
    .bind(&row.gross_exposure)
    .bind(&row.net_exposure)
    .bind(&row.long_exposure)
    .bind(&row.short_exposure)
    .bind(row.long_count)
    .bind(row.short_count)
    .bind(&row.delta_adjusted_exposure)
    .bind(&row.portfolio_delta)
    .bind(&row.portfolio_gamma)
    .bind(&row.portfolio_theta)
    .bind(&row.portfolio_vega)
    .bind(&row.daily_pnl)
    .bind(&row.metadata)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_for_date(
    pool: &PgPool,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Option<PortfolioSnapshot>, sqlx::Error> {
    sqlx::query_as::<_, PortfolioSnapshot>(&format!(
        "SELECT {SNAPSHOT_COLUMNS}
         FROM portfolio_snapshots
         WHERE portfolio_id = $1 AND snapshot_date = $2"
    ))
    .bind(portfolio_id)
    .bind(date)
    .fetch_optional(pool)
    .await
}

/// Most recent snapshot strictly before the given date; anchors daily P&L.
pub async fn fetch_previous(
    pool: &PgPool,
    portfolio_id: Uuid,
    before: NaiveDate,
) -> Result<Option<PortfolioSnapshot>, sqlx::Error> {
    sqlx::query_as::<_, PortfolioSnapshot>(&format!(
        "SELECT {SNAPSHOT_COLUMNS}
         FROM portfolio_snapshots
         WHERE portfolio_id = $1 AND snapshot_date < $2
         ORDER BY snapshot_date DESC
         LIMIT 1"
    ))
    .bind(portfolio_id)
    .bind(before)
    .fetch_optional(pool)
    .await
}

pub async fn fetch_history(
    pool: &PgPool,
    portfolio_id: Uuid,
    limit: i64,
) -> Result<Vec<PortfolioSnapshot>, sqlx::Error> {
    sqlx::query_as::<_, PortfolioSnapshot>(&format!(
        "SELECT {SNAPSHOT_COLUMNS}
         FROM portfolio_snapshots
         WHERE portfolio_id = $1
         ORDER BY snapshot_date DESC
         LIMIT $2"
    ))
    .bind(portfolio_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map(|mut rows| {
        rows.reverse();
        rows
    })
}
