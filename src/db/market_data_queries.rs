use chrono::NaiveDate;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::error;
use uuid::Uuid;

use crate::external::market_data_source::Bar;
use crate::models::MarketDataPoint;

const POINT_COLUMNS: &str =
    "id, symbol, date, open, high, low, close, volume, sector, industry, created_at";

pub async fn fetch_latest(
    pool: &PgPool,
    symbol: &str,
) -> Result<Option<MarketDataPoint>, sqlx::Error> {
    sqlx::query_as::<_, MarketDataPoint>(&format!(
        "SELECT {POINT_COLUMNS}
         FROM market_data_points
         WHERE symbol = $1
         ORDER BY date DESC
         LIMIT 1"
    ))
    .bind(symbol)
    .fetch_optional(pool)
    .await
}

/// Latest close at or before the given date.
pub async fn fetch_latest_on_or_before(
    pool: &PgPool,
    symbol: &str,
    date: NaiveDate,
) -> Result<Option<MarketDataPoint>, sqlx::Error> {
    sqlx::query_as::<_, MarketDataPoint>(&format!(
        "SELECT {POINT_COLUMNS}
         FROM market_data_points
         WHERE symbol = $1 AND date <= $2
         ORDER BY date DESC
         LIMIT 1"
    ))
    .bind(symbol)
    .bind(date)
    .fetch_optional(pool)
    .await
}

/// Most recent N days for a symbol, ascending (oldest first).
pub async fn fetch_window(
    pool: &PgPool,
    symbol: &str,
    days: i64,
) -> Result<Vec<MarketDataPoint>, sqlx::Error> {
    sqlx::query_as::<_, MarketDataPoint>(&format!(
        "SELECT {POINT_COLUMNS}
         FROM market_data_points
         WHERE symbol = $1
         ORDER BY date DESC
         LIMIT $2"
    ))
    .bind(symbol)
    .bind(days)
    .fetch_all(pool)
    .await
    .map(|mut points| {
        points.reverse();
        points
    })
}

/// Most recent N days for many symbols in one round trip; map values are
/// ascending by date.
pub async fn fetch_window_batch(
    pool: &PgPool,
    symbols: &[String],
    days: i64,
) -> Result<HashMap<String, Vec<MarketDataPoint>>, sqlx::Error> {
    if symbols.is_empty() {
        return Ok(HashMap::new());
    }

    let points = sqlx::query_as::<_, MarketDataPoint>(&format!(
        "SELECT {POINT_COLUMNS}
         FROM market_data_points
         WHERE symbol = ANY($1)
         ORDER BY symbol, date DESC"
    ))
    .bind(symbols)
    .fetch_all(pool)
    .await?;

    let mut result: HashMap<String, Vec<MarketDataPoint>> = HashMap::new();
    for point in points {
        result.entry(point.symbol.clone()).or_default().push(point);
    }

    for points in result.values_mut() {
        points.truncate(days as usize);
        points.reverse();
    }

    Ok(result)
}

pub async fn upsert_bars(pool: &PgPool, symbol: &str, bars: &[Bar]) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await.map_err(|e| {
        error!("Failed to begin transaction for symbol {}: {}", symbol, e);
        e
    })?;

    for bar in bars {
        sqlx::query(
            "INSERT INTO market_data_points (id, symbol, date, close, volume)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (symbol, date)
             DO UPDATE SET close = EXCLUDED.close, volume = EXCLUDED.volume",
        )
        .bind(Uuid::new_v4())
        .bind(symbol)
        .bind(bar.date)
        .bind(&bar.close)
        .bind(bar.volume)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await.map_err(|e| {
        error!("Failed to commit bars for symbol {}: {}", symbol, e);
        e
    })?;
    Ok(())
}

/// Latest known sector tag per symbol.
pub async fn fetch_sectors(
    pool: &PgPool,
    symbols: &[String],
) -> Result<HashMap<String, String>, sqlx::Error> {
    if symbols.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query_as::<_, (String, Option<String>)>(
        "SELECT DISTINCT ON (symbol) symbol, sector
         FROM market_data_points
         WHERE symbol = ANY($1)
         ORDER BY symbol, date DESC",
    )
    .bind(symbols)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(symbol, sector)| sector.map(|s| (symbol, s)))
        .collect())
}
