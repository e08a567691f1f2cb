use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::PositionGreeks;
use crate::numeric;

/// One pending Greeks row; None values mean the calculation failed and the
/// all-null row must still be written.
#[derive(Debug, Clone)]
pub struct GreeksUpsert {
    pub position_id: Uuid,
    pub calculation_date: NaiveDate,
    pub delta: Option<f64>,
    pub gamma: Option<f64>,
    pub theta: Option<f64>,
    pub vega: Option<f64>,
    pub rho: Option<f64>,
    pub dollar_delta: Option<f64>,
    pub dollar_gamma: Option<f64>,
}

pub async fn fetch_for_portfolio_date(
    pool: &PgPool,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<PositionGreeks>, sqlx::Error> {
    sqlx::query_as::<_, PositionGreeks>(
        "SELECT g.id, g.position_id, g.calculation_date, g.delta, g.gamma, g.theta,
                g.vega, g.rho, g.dollar_delta, g.dollar_gamma, g.created_at
         FROM position_greeks g
         INNER JOIN positions p ON p.id = g.position_id
         WHERE p.portfolio_id = $1 AND g.calculation_date = $2
         ORDER BY g.position_id",
    )
    .bind(portfolio_id)
    .bind(date)
    .fetch_all(pool)
    .await
}

pub async fn upsert_chunk(pool: &PgPool, rows: &[GreeksUpsert]) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;
    let mut written = 0;

    for row in rows {
        sqlx::query(
            "INSERT INTO position_greeks
                 (id, position_id, calculation_date, delta, gamma, theta, vega, rho,
                  dollar_delta, dollar_gamma)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (position_id, calculation_date)
             DO UPDATE SET delta = EXCLUDED.delta, gamma = EXCLUDED.gamma,
                 theta = EXCLUDED.theta, vega = EXCLUDED.vega, rho = EXCLUDED.rho,
                 dollar_delta = EXCLUDED.dollar_delta, dollar_gamma = EXCLUDED.dollar_gamma",
        )
        .bind(Uuid::new_v4())
        .bind(row.position_id)
        .bind(row.calculation_date)
        .bind(row.delta.map(numeric::greek))
        .bind(row.gamma.map(numeric::greek))
        .bind(row.theta.map(numeric::greek))
        .bind(row.vega.map(numeric::greek))
        .bind(row.rho.map(numeric::greek))
        .bind(row.dollar_delta.map(numeric::money))
        .bind(row.dollar_gamma.map(numeric::money))
        .execute(&mut *tx)
        .await?;
        written += 1;
    }

    tx.commit().await?;
    Ok(written)
}
