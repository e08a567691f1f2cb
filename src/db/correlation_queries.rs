use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::CorrelationCalculation;

pub async fn upsert(
    pool: &PgPool,
    portfolio_id: Uuid,
    date: NaiveDate,
    window_days: i32,
    payload: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO correlation_calculations
             (id, portfolio_id, calculation_date, window_days, payload)
         VALUES ($1, $2, $3, $4, $5)
         ON CONFLICT (portfolio_id, calculation_date)
         DO UPDATE SET window_days = EXCLUDED.window_days, payload = EXCLUDED.payload",
    )
    .bind(Uuid::new_v4())
    .bind(portfolio_id)
    .bind(date)
    .bind(window_days)
    .bind(payload)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_for_date(
    pool: &PgPool,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Option<CorrelationCalculation>, sqlx::Error> {
    sqlx::query_as::<_, CorrelationCalculation>(
        "SELECT id, portfolio_id, calculation_date, window_days, payload, created_at
         FROM correlation_calculations
         WHERE portfolio_id = $1 AND calculation_date = $2",
    )
    .bind(portfolio_id)
    .bind(date)
    .fetch_optional(pool)
    .await
}
