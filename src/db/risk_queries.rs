use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::MarketRisk;
use crate::numeric;

#[derive(Debug, Clone)]
pub struct MarketRiskUpsert {
    pub portfolio_id: Uuid,
    pub calculation_date: NaiveDate,
    pub var_1d_99: f64,
    pub es_1d_99: f64,
    pub annualized_volatility: f64,
    pub beta: Option<f64>,
    pub sharpe: Option<f64>,
    pub max_drawdown: f64,
    pub data_points: i32,
}

pub async fn upsert(pool: &PgPool, row: &MarketRiskUpsert) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO market_risk
             (id, portfolio_id, calculation_date, var_1d_99, es_1d_99,
              annualized_volatility, beta, sharpe, max_drawdown, data_points)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
         ON CONFLICT (portfolio_id, calculation_date)
         DO UPDATE SET var_1d_99 = EXCLUDED.var_1d_99, es_1d_99 = EXCLUDED.es_1d_99,
             annualized_volatility = EXCLUDED.annualized_volatility,
             beta = EXCLUDED.beta, sharpe = EXCLUDED.sharpe,
             max_drawdown = EXCLUDED.max_drawdown, data_points = EXCLUDED.data_points",
    )
    .bind(Uuid::new_v4())
    .bind(row.portfolio_id)
    .bind(row.calculation_date)
    .bind(numeric::money(row.var_1d_99))
    .bind(numeric::money(row.es_1d_99))
    .bind(numeric::greek(row.annualized_volatility))
    .bind(row.beta.map(numeric::greek))
    .bind(row.sharpe.map(numeric::greek))
    .bind(numeric::greek(row.max_drawdown))
    .bind(row.data_points)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_for_date(
    pool: &PgPool,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Option<MarketRisk>, sqlx::Error> {
    sqlx::query_as::<_, MarketRisk>(
        "SELECT id, portfolio_id, calculation_date, var_1d_99, es_1d_99,
                annualized_volatility, beta, sharpe, max_drawdown, data_points, created_at
         FROM market_risk
         WHERE portfolio_id = $1 AND calculation_date = $2",
    )
    .bind(portfolio_id)
    .bind(date)
    .fetch_optional(pool)
    .await
}
