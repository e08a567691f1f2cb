use chrono::NaiveDate;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{greeks_queries, position_queries};
use crate::errors::AppError;
use crate::models::{GreeksValues, Position, PositionType, PositionView};
use crate::numeric::{self, money};
use crate::services::aggregation_service;
use crate::services::market_data_service;
use crate::state::EngineContext;

#[derive(Debug, Default)]
pub struct ValuationOutcome {
    pub updated: usize,
    pub warnings: Vec<String>,
}

/// Today's mark plus the derived columns the engine persists.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkedPosition {
    pub market_value: f64,
    pub exposure: f64,
    pub daily_pnl: f64,
}

/// Engine B: mark every position to market. Prices resolve from the shared
/// market-data cache; a missing price keeps the prior stored values and adds
/// a warning instead of inventing a quote. Daily P&L anchors on the prior
/// trading day's close, which the immutable price series pins regardless of
/// how many times the date is re-run.
pub async fn revalue_portfolio(
    ctx: &EngineContext,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<ValuationOutcome, AppError> {
    let positions = position_queries::fetch_for_portfolio(&ctx.pool, portfolio_id).await?;
    let mut outcome = ValuationOutcome::default();

    let prior_day = ctx.calendar.previous_trading_day(date);

    for position in &positions {
        let Some(kind) = position.kind() else {
            outcome.warnings.push(format!(
                "position {} has unknown type '{}', not revalued",
                position.id, position.position_type
            ));
            continue;
        };

        let (price, stale) = match market_data_service::latest_close(ctx, &position.symbol, date)
            .await?
        {
            Some((price, _, stale)) => (price, stale),
            None => {
                // Options rarely have their own quote; fall back to the last
                // mark, then to the entry premium.
                let fallback = position
                    .last_price
                    .as_ref()
                    .map(numeric::to_f64)
                    .unwrap_or_else(|| numeric::to_f64(&position.entry_price));
                warn!(
                    "No market price for {} on {}, valuing at prior mark {}",
                    position.symbol, date, fallback
                );
                outcome.warnings.push(format!(
                    "no market price for {}, valued at prior mark",
                    position.symbol
                ));
                (fallback, true)
            }
        };
        if stale && !kind.is_option() {
            outcome
                .warnings
                .push(format!("stale price for {} as of {}", position.symbol, date));
        }

        // Close as of the prior trading day; strictly before today's mark so
        // a same-date re-run sees the same anchor
        let prior_close = market_data_service::latest_close(ctx, &position.symbol, prior_day)
            .await?
            .map(|(prior_price, _, _)| prior_price);

        let marked = mark_position(position, kind, price, prior_close);

        position_queries::update_valuation(
            &ctx.pool,
            position.id,
            &money(price),
            &money(marked.market_value),
            &money(marked.exposure),
            &money(marked.daily_pnl),
        )
        .await?;
        outcome.updated += 1;
    }

    // Valuation mutates positions; cached aggregations are now invalid
    aggregation_service::clear_cache();

    info!(
        "Revalued {}/{} positions for portfolio {}",
        outcome.updated,
        positions.len(),
        portfolio_id
    );

    Ok(outcome)
}

/// Assemble the per-position dictionaries the aggregation functions consume:
/// stored valuation plus the day's Greeks rows (null Greeks stay `None`).
pub async fn load_position_views(
    ctx: &EngineContext,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<PositionView>, AppError> {
    let positions = position_queries::fetch_for_portfolio(&ctx.pool, portfolio_id).await?;
    let greeks_rows =
        greeks_queries::fetch_for_portfolio_date(&ctx.pool, portfolio_id, date).await?;

    let views = positions
        .iter()
        .map(|position| {
            let greeks = greeks_rows
                .iter()
                .find(|g| g.position_id == position.id)
                .and_then(row_to_values);
            view_from_position(position, greeks)
        })
        .collect();

    Ok(views)
}

/// Pure mark-to-market for one position: value at today's price, sign the
/// exposure by type, and book P&L against the prior trading day's close.
/// Reads nothing the engine itself overwrites, so re-running a date yields
/// identical rows.
pub fn mark_position(
    position: &Position,
    kind: PositionType,
    price: f64,
    prior_close: Option<f64>,
) -> MarkedPosition {
    let quantity = numeric::to_f64(&position.quantity);
    let multiplier = kind.multiplier();

    let market_value = quantity.abs() * price * multiplier;
    let exposure = if kind.is_option() {
        kind.sign() * market_value
    } else {
        quantity.signum() * market_value
    };

    // No prior trading-day close means no P&L reference: book zero
    let daily_pnl = prior_close
        .map(|prior| market_value - quantity.abs() * prior * multiplier)
        .unwrap_or(0.0);

    MarkedPosition {
        market_value,
        exposure,
        daily_pnl,
    }
}

fn row_to_values(row: &crate::models::PositionGreeks) -> Option<GreeksValues> {
    Some(GreeksValues {
        delta: numeric::to_f64(row.delta.as_ref()?),
        gamma: numeric::to_f64(row.gamma.as_ref()?),
        theta: numeric::to_f64(row.theta.as_ref()?),
        vega: numeric::to_f64(row.vega.as_ref()?),
        rho: numeric::to_f64(row.rho.as_ref()?),
    })
}

fn view_from_position(position: &Position, greeks: Option<GreeksValues>) -> PositionView {
    PositionView {
        position_id: position.id,
        symbol: position.symbol.clone(),
        position_type: position.position_type.clone(),
        quantity: Some(numeric::to_f64(&position.quantity)),
        market_value: position.market_value.as_ref().map(numeric::to_f64),
        exposure: position.exposure.as_ref().map(numeric::to_f64),
        greeks,
        tags: position.tags.clone().unwrap_or_default(),
        underlying_symbol: position.underlying_symbol.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::{BigDecimal, FromPrimitive};
    use chrono::Utc;

    fn position(position_type: &str, quantity: f64, market_value: Option<f64>) -> Position {
        Position {
            id: Uuid::new_v4(),
            portfolio_id: Uuid::new_v4(),
            symbol: "AAPL".to_string(),
            position_type: position_type.to_string(),
            quantity: BigDecimal::from_f64(quantity).unwrap(),
            entry_price: BigDecimal::from_f64(100.0).unwrap(),
            entry_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            underlying_symbol: None,
            strike: None,
            expiration_date: None,
            tags: Some(vec!["core".to_string()]),
            last_price: None,
            market_value: market_value.and_then(BigDecimal::from_f64),
            exposure: market_value.and_then(BigDecimal::from_f64),
            daily_pnl: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn marking_values_long_stock_against_prior_close() {
        let p = position("LONG", 100.0, None);
        let marked = mark_position(&p, PositionType::Long, 150.0, Some(148.0));
        assert_eq!(marked.market_value, 15_000.0);
        assert_eq!(marked.exposure, 15_000.0);
        assert_eq!(marked.daily_pnl, 200.0);
    }

    #[test]
    fn marking_without_prior_close_books_zero_pnl() {
        let p = position("LONG", 100.0, None);
        let marked = mark_position(&p, PositionType::Long, 150.0, None);
        assert_eq!(marked.daily_pnl, 0.0);
    }

    #[test]
    fn short_option_exposure_is_negative_with_positive_value() {
        let p = position("SC", 10.0, None);
        let marked = mark_position(&p, PositionType::ShortCall, 5.0, Some(4.0));
        assert_eq!(marked.market_value, 5_000.0);
        assert_eq!(marked.exposure, -5_000.0);
        assert_eq!(marked.daily_pnl, 1_000.0);
    }

    #[test]
    fn rerunning_a_date_leaves_daily_pnl_unchanged() {
        // Run 1: mark against the prior trading day's close
        let mut p = position("LONG", 100.0, None);
        let first = mark_position(&p, PositionType::Long, 150.0, Some(148.0));
        assert_eq!(first.daily_pnl, 200.0);

        // Persist run 1's outputs the way update_valuation would
        p.last_price = BigDecimal::from_f64(150.0);
        p.market_value = BigDecimal::from_f64(first.market_value);
        p.exposure = BigDecimal::from_f64(first.exposure);
        p.daily_pnl = BigDecimal::from_f64(first.daily_pnl);

        // Run 2, same date: same price inputs, prior close unchanged because
        // the price series is keyed by date, not by run
        let second = mark_position(&p, PositionType::Long, 150.0, Some(148.0));
        assert_eq!(second, first);
        assert_eq!(second.daily_pnl, 200.0);
    }

    #[test]
    fn view_carries_valuation_and_tags() {
        let p = position("LONG", 100.0, Some(15_000.0));
        let view = view_from_position(&p, None);
        assert_eq!(view.market_value, Some(15_000.0));
        assert_eq!(view.tags, vec!["core".to_string()]);
        assert!(view.greeks.is_none());
    }

    #[test]
    fn null_greeks_row_maps_to_none() {
        let row = crate::models::PositionGreeks {
            id: Uuid::new_v4(),
            position_id: Uuid::new_v4(),
            calculation_date: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            delta: None,
            gamma: None,
            theta: None,
            vega: None,
            rho: None,
            dollar_delta: None,
            dollar_gamma: None,
            created_at: Utc::now(),
        };
        assert!(row_to_values(&row).is_none());
    }
}
