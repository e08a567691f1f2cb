use bigdecimal::BigDecimal;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Position;

const POSITION_COLUMNS: &str = "id, portfolio_id, symbol, position_type, quantity, entry_price, \
     entry_date, underlying_symbol, strike, expiration_date, tags, last_price, market_value, \
     exposure, daily_pnl, created_at";

pub async fn fetch_for_portfolio(
    pool: &PgPool,
    portfolio_id: Uuid,
) -> Result<Vec<Position>, sqlx::Error> {
    sqlx::query_as::<_, Position>(&format!(
        "SELECT {POSITION_COLUMNS}
         FROM positions
         WHERE portfolio_id = $1
         ORDER BY symbol, id"
    ))
    .bind(portfolio_id)
    .fetch_all(pool)
    .await
}

pub async fn count_for_portfolio(pool: &PgPool, portfolio_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM positions WHERE portfolio_id = $1")
        .bind(portfolio_id)
        .fetch_one(pool)
        .await
}

/// Distinct symbols the portfolio touches, including option underlyings.
pub async fn fetch_symbols(pool: &PgPool, portfolio_id: Uuid) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT DISTINCT COALESCE(underlying_symbol, symbol)
         FROM positions
         WHERE portfolio_id = $1
         ORDER BY 1",
    )
    .bind(portfolio_id)
    .fetch_all(pool)
    .await
}

/// The only position columns the batch engine is allowed to write.
pub async fn update_valuation(
    pool: &PgPool,
    position_id: Uuid,
    last_price: &BigDecimal,
    market_value: &BigDecimal,
    exposure: &BigDecimal,
    daily_pnl: &BigDecimal,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE positions
         SET last_price = $2, market_value = $3, exposure = $4, daily_pnl = $5
         WHERE id = $1",
    )
    .bind(position_id)
    .bind(last_price)
    .bind(market_value)
    .bind(exposure)
    .bind(daily_pnl)
    .execute(pool)
    .await?;
    Ok(())
}
