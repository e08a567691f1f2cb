use chrono::NaiveDate;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::risk_queries::{self, MarketRiskUpsert};
use crate::db::{market_data_queries, position_queries, snapshot_queries};
use crate::errors::AppError;
use crate::models::FactorType;
use crate::numeric;
use crate::services::factor_service;
use crate::state::EngineContext;

const TRADING_DAYS: f64 = 252.0;
const CONFIDENCE: f64 = 0.99;

#[derive(Debug, Clone, Default)]
pub struct RiskMeasures {
    pub var_1d_99: f64,
    pub es_1d_99: f64,
    pub annualized_volatility: f64,
    pub beta: Option<f64>,
    pub sharpe: Option<f64>,
    pub max_drawdown: f64,
    pub data_points: usize,
}

/// Engine F: parametric one-day VaR and expected shortfall at 99%, plus
/// volatility, market beta, Sharpe and max drawdown over the rolling window.
/// Return history prefers stored snapshots and falls back to a series
/// synthesized from position weights.
pub async fn run_market_risk_engine(
    ctx: &EngineContext,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<(RiskMeasures, Vec<String>), AppError> {
    let mut warnings = Vec::new();

    let positions = position_queries::fetch_for_portfolio(&ctx.pool, portfolio_id).await?;
    let total_value: f64 = positions
        .iter()
        .filter_map(|p| p.market_value.as_ref())
        .map(numeric::to_f64)
        .sum();

    if total_value <= 0.0 {
        warnings.push("portfolio has no valued positions, market risk skipped".to_string());
        return Ok((RiskMeasures::default(), warnings));
    }

    let returns = portfolio_returns(ctx, portfolio_id, &positions).await?;
    if returns.len() < 2 {
        warnings.push(format!(
            "insufficient return history for market risk ({} points)",
            returns.len()
        ));
        return Ok((RiskMeasures::default(), warnings));
    }

    let mut measures = compute_measures(&returns, total_value, ctx.config.risk_free_rate);

    // Beta against the market proxy
    let market_window = market_data_queries::fetch_window(
        &ctx.pool,
        FactorType::MarketBeta.proxy_symbol(),
        ctx.config.rolling_window_days,
    )
    .await?;
    if market_window.len() >= 2 {
        let market_returns = factor_service::returns_from_window(&market_window);
        let n = returns.len().min(market_returns.len());
        if n >= 2 {
            measures.beta = factor_service::ols_beta(
                &returns[returns.len() - n..],
                &market_returns[market_returns.len() - n..],
            )
            .map(|(beta, _)| beta);
        }
    } else {
        warn!("No market proxy window, beta unavailable for {}", portfolio_id);
        warnings.push("market proxy series unavailable, beta omitted".to_string());
    }

    risk_queries::upsert(
        &ctx.pool,
        &MarketRiskUpsert {
            portfolio_id,
            calculation_date: date,
            var_1d_99: measures.var_1d_99,
            es_1d_99: measures.es_1d_99,
            annualized_volatility: measures.annualized_volatility,
            beta: measures.beta,
            sharpe: measures.sharpe,
            max_drawdown: measures.max_drawdown,
            data_points: measures.data_points as i32,
        },
    )
    .await?;

    info!(
        "Market risk for {}: VaR99 {:.2}, vol {:.4}, {} points",
        portfolio_id, measures.var_1d_99, measures.annualized_volatility, measures.data_points
    );

    Ok((measures, warnings))
}

/// Daily portfolio returns: snapshot value history when at least a handful
/// of snapshots exist, otherwise weight-combined underlying returns.
async fn portfolio_returns(
    ctx: &EngineContext,
    portfolio_id: Uuid,
    positions: &[crate::models::Position],
) -> Result<Vec<f64>, AppError> {
    let snapshots = snapshot_queries::fetch_history(
        &ctx.pool,
        portfolio_id,
        ctx.config.rolling_window_days,
    )
    .await?;

    if snapshots.len() >= 5 {
        let values: Vec<f64> = snapshots
            .iter()
            .map(|s| numeric::to_f64(&s.total_value))
            .collect();
        return Ok(values
            .windows(2)
            .filter(|w| w[0] > 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect());
    }

    let mut symbols: Vec<String> = positions
        .iter()
        .map(|p| p.underlying().to_string())
        .collect();
    symbols.sort();
    symbols.dedup();

    let windows =
        market_data_queries::fetch_window_batch(&ctx.pool, &symbols, ctx.config.rolling_window_days)
            .await?;

    let gross: f64 = positions
        .iter()
        .filter_map(|p| p.exposure.as_ref())
        .map(|e| numeric::to_f64(e).abs())
        .sum();
    if gross <= 0.0 {
        return Ok(Vec::new());
    }

    Ok(factor_service::synthesized_returns(positions, &windows, gross))
}

/// Pure computation over a daily return series and the current value.
pub fn compute_measures(returns: &[f64], value: f64, risk_free_rate: f64) -> RiskMeasures {
    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    let daily_vol = variance.sqrt();

    let normal = Normal::new(0.0, 1.0).expect("unit normal");
    let z = normal.inverse_cdf(CONFIDENCE);

    let var_1d_99 = value * z * daily_vol;
    let es_1d_99 = value * daily_vol * normal.pdf(z) / (1.0 - CONFIDENCE);

    let annualized_vol = daily_vol * TRADING_DAYS.sqrt();
    let sharpe = if daily_vol > f64::EPSILON {
        Some((mean * TRADING_DAYS - risk_free_rate) / annualized_vol)
    } else {
        None
    };

    // Compound the returns into a value path for drawdown
    let mut path = vec![1.0_f64];
    for r in returns {
        let prev = *path.last().unwrap_or(&1.0);
        path.push(prev * (1.0 + r));
    }
    let mut peak = path[0];
    let mut max_dd = 0.0_f64;
    for &v in &path {
        if v > peak {
            peak = v;
        }
        let dd = (v - peak) / peak;
        if dd < max_dd {
            max_dd = dd;
        }
    }

    RiskMeasures {
        var_1d_99,
        es_1d_99,
        annualized_volatility: annualized_vol,
        beta: None,
        sharpe,
        max_drawdown: max_dd,
        data_points: returns.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn var_scales_with_value_and_vol() {
        let returns = vec![0.01, -0.01, 0.02, -0.02, 0.01, -0.01, 0.015, -0.015];
        let small = compute_measures(&returns, 100_000.0, 0.045);
        let large = compute_measures(&returns, 200_000.0, 0.045);
        assert!((large.var_1d_99 / small.var_1d_99 - 2.0).abs() < 1e-9);
        assert!(small.var_1d_99 > 0.0);
    }

    #[test]
    fn es_exceeds_var() {
        let returns = vec![0.01, -0.02, 0.005, -0.01, 0.02, -0.005, 0.01, -0.015];
        let m = compute_measures(&returns, 100_000.0, 0.045);
        assert!(m.es_1d_99 > m.var_1d_99);
    }

    #[test]
    fn flat_returns_have_zero_risk() {
        let returns = vec![0.0; 20];
        let m = compute_measures(&returns, 100_000.0, 0.045);
        assert_eq!(m.var_1d_99, 0.0);
        assert_eq!(m.annualized_volatility, 0.0);
        assert_eq!(m.max_drawdown, 0.0);
        assert!(m.sharpe.is_none());
    }

    #[test]
    fn drawdown_captures_decline() {
        // Straight 10-step decline of 1% each
        let returns = vec![-0.01; 10];
        let m = compute_measures(&returns, 100_000.0, 0.045);
        assert!(m.max_drawdown < -0.09);
        assert!(m.max_drawdown > -0.11);
    }

    #[test]
    fn z_score_matches_99_percent() {
        let normal = Normal::new(0.0, 1.0).unwrap();
        let z = normal.inverse_cdf(0.99);
        assert!((z - 2.3263).abs() < 1e-3);
    }
}
