use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::PositionFactorExposure;
use crate::numeric;

pub async fn upsert_exposure(
    pool: &PgPool,
    position_id: Uuid,
    factor: &str,
    date: NaiveDate,
    beta: f64,
    r_squared: Option<f64>,
    data_points: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO position_factor_exposures
             (id, position_id, factor, calculation_date, beta, r_squared, data_points)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         ON CONFLICT (position_id, factor, calculation_date)
         DO UPDATE SET beta = EXCLUDED.beta, r_squared = EXCLUDED.r_squared,
             data_points = EXCLUDED.data_points",
    )
    .bind(Uuid::new_v4())
    .bind(position_id)
    .bind(factor)
    .bind(date)
    .bind(numeric::greek(beta))
    .bind(r_squared.map(numeric::greek))
    .bind(data_points)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_for_portfolio_date(
    pool: &PgPool,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<PositionFactorExposure>, sqlx::Error> {
    sqlx::query_as::<_, PositionFactorExposure>(
        "SELECT f.id, f.position_id, f.factor, f.calculation_date, f.beta, f.r_squared,
                f.data_points, f.created_at
         FROM position_factor_exposures f
         INNER JOIN positions p ON p.id = f.position_id
         WHERE p.portfolio_id = $1 AND f.calculation_date = $2
         ORDER BY f.position_id, f.factor",
    )
    .bind(portfolio_id)
    .bind(date)
    .fetch_all(pool)
    .await
}

/// Latest stored market-beta per position at or before the date; stress
/// scenarios shock equities through it.
pub async fn fetch_latest_market_betas(
    pool: &PgPool,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<(Uuid, f64)>, sqlx::Error> {
    let rows = sqlx::query_as::<_, (Uuid, bigdecimal::BigDecimal)>(
        "SELECT DISTINCT ON (f.position_id) f.position_id, f.beta
         FROM position_factor_exposures f
         INNER JOIN positions p ON p.id = f.position_id
         WHERE p.portfolio_id = $1 AND f.factor = 'market_beta' AND f.calculation_date <= $2
         ORDER BY f.position_id, f.calculation_date DESC",
    )
    .bind(portfolio_id)
    .bind(date)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, beta)| (id, numeric::to_f64(&beta)))
        .collect())
}
