use chrono::NaiveDate;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::StressTestResult;
use crate::numeric;

pub async fn upsert_result(
    pool: &PgPool,
    portfolio_id: Uuid,
    scenario_name: &str,
    date: NaiveDate,
    portfolio_value: f64,
    pnl: f64,
    pnl_percent: f64,
    attribution: &serde_json::Value,
    parameters: &serde_json::Value,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "INSERT INTO stress_test_results
             (id, portfolio_id, scenario_name, calculation_date, portfolio_value,
              pnl, pnl_percent, attribution, parameters)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (portfolio_id, scenario_name, calculation_date)
         DO UPDATE SET portfolio_value = EXCLUDED.portfolio_value, pnl = EXCLUDED.pnl,
             pnl_percent = EXCLUDED.pnl_percent, attribution = EXCLUDED.attribution,
             parameters = EXCLUDED.parameters",
    )
    .bind(Uuid::new_v4())
    .bind(portfolio_id)
    .bind(scenario_name)
    .bind(date)
    .bind(numeric::money(portfolio_value))
    .bind(numeric::money(pnl))
    .bind(numeric::greek(pnl_percent))
    .bind(attribution)
    .bind(parameters)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_for_date(
    pool: &PgPool,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<StressTestResult>, sqlx::Error> {
    sqlx::query_as::<_, StressTestResult>(
        "SELECT id, portfolio_id, scenario_name, calculation_date, portfolio_value,
                pnl, pnl_percent, attribution, parameters, created_at
         FROM stress_test_results
         WHERE portfolio_id = $1 AND calculation_date = $2
         ORDER BY scenario_name",
    )
    .bind(portfolio_id)
    .bind(date)
    .fetch_all(pool)
    .await
}
