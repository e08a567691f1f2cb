use chrono::NaiveDate;
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::db::snapshot_queries::{self, SnapshotUpsert};
use crate::errors::AppError;
use crate::models::PositionView;
use crate::numeric::{money, snapshot_greek};
use crate::services::aggregation_service;
use crate::services::valuation_service;
use crate::state::EngineContext;

/// What the snapshot engine reports back to the orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum SnapshotResult {
    /// Non-trading day; nothing was written.
    Skipped,
    /// Row upserted with this total value and daily P&L.
    Written { total_value: f64, daily_pnl: f64 },
}

/// Engine I: one dated row per portfolio per trading day, upserted so a
/// re-run overwrites. Aggregated Greeks are persisted at monetary scale and
/// rho is dropped here; it stays available at position level. Warnings from
/// the day's earlier engines ride along in the metadata.
pub async fn run_snapshot_engine(
    ctx: &EngineContext,
    portfolio_id: Uuid,
    date: NaiveDate,
    engine_warnings: &[String],
) -> Result<(SnapshotResult, Vec<String>), AppError> {
    if !ctx.calendar.is_trading_day(date) {
        info!(
            "{} is not a trading day, skipping snapshot for portfolio {}",
            date, portfolio_id
        );
        return Ok((SnapshotResult::Skipped, Vec::new()));
    }

    let views = valuation_service::load_position_views(ctx, portfolio_id, date).await?;
    let (exposures, greeks, delta_adjusted) = aggregation_service::aggregate_cached(
        portfolio_id,
        date,
        &views,
        ctx.config.delta_adjust_mode,
    );

    let total_value = total_value(&views);

    let previous = snapshot_queries::fetch_previous(&ctx.pool, portfolio_id, date).await?;
    let daily_pnl = previous
        .as_ref()
        .map(|prev| total_value - crate::numeric::to_f64(&prev.total_value))
        .unwrap_or(0.0);

    let mut warnings: Vec<String> = engine_warnings.to_vec();
    warnings.extend(exposures.metadata.warnings.iter().cloned());
    warnings.extend(greeks.metadata.warnings.iter().cloned());

    let metadata = json!({
        "warnings": warnings,
        "excluded_positions": exposures.metadata.excluded_positions,
        "skipped_greeks": greeks.metadata.skipped_greeks,
        "position_count": views.len(),
    });

    let has_greeks = views.iter().any(|v| v.greeks.is_some());

    snapshot_queries::upsert(
        &ctx.pool,
        &SnapshotUpsert {
            portfolio_id,
            snapshot_date: date,
            total_value: money(total_value),
            gross_exposure: money(exposures.gross),
            net_exposure: money(exposures.net),
            long_exposure: money(exposures.long),
            short_exposure: money(exposures.short),
            long_count: exposures.long_count as i32,
            short_count: exposures.short_count as i32,
            delta_adjusted_exposure: Some(money(delta_adjusted.delta_adjusted_exposure)),
            portfolio_delta: has_greeks.then(|| snapshot_greek(greeks.delta)),
            portfolio_gamma: has_greeks.then(|| snapshot_greek(greeks.gamma)),
            portfolio_theta: has_greeks.then(|| snapshot_greek(greeks.theta)),
            portfolio_vega: has_greeks.then(|| snapshot_greek(greeks.vega)),
            daily_pnl: money(daily_pnl),
            metadata,
        },
    )
    .await?;

    info!(
        "Snapshot written for portfolio {} on {}: value {:.2}, pnl {:.2}",
        portfolio_id, date, total_value, daily_pnl
    );

    Ok((
        SnapshotResult::Written {
            total_value,
            daily_pnl,
        },
        warnings,
    ))
}

fn total_value(views: &[PositionView]) -> f64 {
    views.iter().filter_map(|v| v.market_value).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_value_sums_present_market_values() {
        let mut a = PositionView {
            position_id: Uuid::new_v4(),
            symbol: "A".to_string(),
            position_type: "LONG".to_string(),
            quantity: Some(100.0),
            market_value: Some(15_000.0),
            exposure: Some(15_000.0),
            greeks: None,
            tags: vec![],
            underlying_symbol: None,
        };
        let b = PositionView {
            market_value: Some(10_000.0),
            ..a.clone()
        };
        a.market_value = Some(15_000.0);
        let c = PositionView {
            market_value: None,
            ..a.clone()
        };

        assert_eq!(total_value(&[a, b, c]), 25_000.0);
    }
}
