use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{factor_queries, market_data_queries, position_queries};
use crate::errors::AppError;
use crate::models::{FactorType, MarketDataPoint};
use crate::numeric;
use crate::state::EngineContext;

#[derive(Debug, Default)]
pub struct FactorOutcome {
    pub exposures_written: usize,
    /// Exposure-weighted portfolio beta per factor; None when the proxy
    /// series was unavailable.
    pub portfolio_betas: HashMap<&'static str, Option<f64>>,
    pub r_squared: Option<f64>,
    pub tracking_error: Option<f64>,
    pub data_points: usize,
    pub warnings: Vec<String>,
}

/// Engine E: univariate OLS of each position's returns on each of the seven
/// style-factor proxy series, then an exposure-weighted combine. A missing
/// proxy nulls that factor and the engine moves on; thin history empties the
/// result without failing the batch.
pub async fn run_factor_engine(
    ctx: &EngineContext,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<FactorOutcome, AppError> {
    let positions = position_queries::fetch_for_portfolio(&ctx.pool, portfolio_id).await?;
    let mut outcome = FactorOutcome::default();

    // Price windows for every underlying plus every proxy, one round trip
    let mut symbols: Vec<String> = positions
        .iter()
        .map(|p| p.underlying().to_string())
        .collect();
    symbols.extend(FactorType::all().iter().map(|f| f.proxy_symbol().to_string()));
    symbols.sort();
    symbols.dedup();

    let windows =
        market_data_queries::fetch_window_batch(&ctx.pool, &symbols, ctx.config.rolling_window_days)
            .await?;

    // Signed exposure weights over gross
    let gross: f64 = positions
        .iter()
        .filter_map(|p| p.exposure.as_ref())
        .map(|e| numeric::to_f64(e).abs())
        .sum();
    if gross <= 0.0 {
        outcome
            .warnings
            .push("portfolio has no valued exposure, factor analysis skipped".to_string());
        return Ok(outcome);
    }

    let mut weighted_betas: HashMap<FactorType, f64> = HashMap::new();
    let mut weighted_any: HashMap<FactorType, bool> = HashMap::new();
    let mut usable_points = 0usize;

    for factor in FactorType::all() {
        let proxy = factor.proxy_symbol();
        let Some(proxy_window) = windows.get(proxy).filter(|w| w.len() >= 2) else {
            warn!("Factor proxy series missing for {} ({})", factor, proxy);
            outcome.warnings.push(format!(
                "factor {} unavailable: no proxy series for {}",
                factor.code(),
                proxy
            ));
            outcome.portfolio_betas.insert(factor.code(), None);
            continue;
        };

        for position in &positions {
            let Some(window) = windows.get(position.underlying()) else {
                continue;
            };
            let (asset_returns, factor_returns) = aligned_returns(window, proxy_window);

            if asset_returns.len() < ctx.config.min_regression_points {
                continue;
            }

            if let Some((beta, r_squared)) = ols_beta(&asset_returns, &factor_returns) {
                factor_queries::upsert_exposure(
                    &ctx.pool,
                    position.id,
                    factor.code(),
                    date,
                    beta,
                    Some(r_squared),
                    asset_returns.len() as i32,
                )
                .await?;
                outcome.exposures_written += 1;
                usable_points = usable_points.max(asset_returns.len());

                let weight = position
                    .exposure
                    .as_ref()
                    .map(|e| numeric::to_f64(e) / gross)
                    .unwrap_or(0.0);
                *weighted_betas.entry(factor).or_insert(0.0) += weight * beta;
                weighted_any.insert(factor, true);
            }
        }

        outcome
            .portfolio_betas
            .insert(factor.code(), weighted_any.get(&factor).map(|_| weighted_betas[&factor]));
    }

    if outcome.exposures_written == 0 {
        outcome.warnings.push(format!(
            "insufficient return history (< {} points) for factor regression",
            ctx.config.min_regression_points
        ));
        return Ok(outcome);
    }

    outcome.data_points = usable_points;

    // Portfolio-level fit against the market proxy
    if let Some(market_window) = windows.get(FactorType::MarketBeta.proxy_symbol()) {
        let portfolio_returns = synthesized_returns(&positions, &windows, gross);
        if portfolio_returns.len() >= 2 && market_window.len() >= 2 {
            let market_returns = returns_from_window(market_window);
            let n = portfolio_returns.len().min(market_returns.len());
            let p = &portfolio_returns[portfolio_returns.len() - n..];
            let m = &market_returns[market_returns.len() - n..];
            if let Some((_, r_squared)) = ols_beta(p, m) {
                outcome.r_squared = Some(r_squared);
            }
            outcome.tracking_error = tracking_error(p, m);
        }
    }

    info!(
        "Factor engine wrote {} exposures for portfolio {} over {} factors",
        outcome.exposures_written,
        portfolio_id,
        outcome.portfolio_betas.len()
    );

    Ok(outcome)
}

/// Daily returns of close prices, oldest first.
pub fn returns_from_window(window: &[MarketDataPoint]) -> Vec<f64> {
    let closes: Vec<f64> = window.iter().map(|p| numeric::to_f64(&p.close)).collect();
    closes
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect()
}

/// Intersect two windows on date, then compute same-day return pairs.
pub fn aligned_returns(
    asset: &[MarketDataPoint],
    factor: &[MarketDataPoint],
) -> (Vec<f64>, Vec<f64>) {
    let factor_by_date: BTreeMap<NaiveDate, f64> = factor
        .iter()
        .map(|p| (p.date, numeric::to_f64(&p.close)))
        .collect();

    let common: Vec<(f64, f64)> = asset
        .iter()
        .filter_map(|p| {
            factor_by_date
                .get(&p.date)
                .map(|f| (numeric::to_f64(&p.close), *f))
        })
        .collect();

    let mut asset_returns = Vec::new();
    let mut factor_returns = Vec::new();
    for pair in common.windows(2) {
        let (a0, f0) = pair[0];
        let (a1, f1) = pair[1];
        if a0 > 0.0 && f0 > 0.0 {
            asset_returns.push((a1 - a0) / a0);
            factor_returns.push((f1 - f0) / f0);
        }
    }
    (asset_returns, factor_returns)
}

/// Univariate OLS of y on x. Returns (beta, r_squared), or None when the
/// regressor has no variance.
pub fn ols_beta(y: &[f64], x: &[f64]) -> Option<(f64, f64)> {
    if y.len() != x.len() || y.len() < 2 {
        return None;
    }

    let n = y.len() as f64;
    let mean_y = y.iter().sum::<f64>() / n;
    let mean_x = x.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (yi, xi) in y.iter().zip(x.iter()) {
        let dy = yi - mean_y;
        let dx = xi - mean_x;
        cov += dy * dx;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x.abs() < f64::EPSILON {
        return None;
    }

    let beta = cov / var_x;
    let r_squared = if var_y.abs() < f64::EPSILON {
        0.0
    } else {
        (cov * cov) / (var_x * var_y)
    };

    Some((beta, r_squared))
}

/// Annualized stdev of the return difference vs the benchmark.
pub fn tracking_error(portfolio: &[f64], benchmark: &[f64]) -> Option<f64> {
    if portfolio.len() != benchmark.len() || portfolio.len() < 2 {
        return None;
    }
    let diffs: Vec<f64> = portfolio
        .iter()
        .zip(benchmark.iter())
        .map(|(p, b)| p - b)
        .collect();
    let mean = diffs.iter().sum::<f64>() / diffs.len() as f64;
    let var = diffs.iter().map(|d| (d - mean).powi(2)).sum::<f64>() / (diffs.len() as f64 - 1.0);
    Some(var.sqrt() * (252.0_f64).sqrt())
}

/// Exposure-weighted sum of per-underlying returns, a stand-in for portfolio
/// P&L history when no snapshot history exists yet.
pub(crate) fn synthesized_returns(
    positions: &[crate::models::Position],
    windows: &HashMap<String, Vec<MarketDataPoint>>,
    gross: f64,
) -> Vec<f64> {
    let mut combined: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for position in positions {
        let Some(window) = windows.get(position.underlying()) else {
            continue;
        };
        let weight = position
            .exposure
            .as_ref()
            .map(|e| numeric::to_f64(e) / gross)
            .unwrap_or(0.0);
        if weight == 0.0 {
            continue;
        }

        let closes: Vec<(NaiveDate, f64)> = window
            .iter()
            .map(|p| (p.date, numeric::to_f64(&p.close)))
            .collect();
        for pair in closes.windows(2) {
            let (_, c0) = pair[0];
            let (d1, c1) = pair[1];
            if c0 > 0.0 {
                *combined.entry(d1).or_insert(0.0) += weight * (c1 - c0) / c0;
            }
        }
    }

    combined.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::{BigDecimal, FromPrimitive};
    use chrono::{Duration, Utc};

    fn window(symbol: &str, closes: &[f64]) -> Vec<MarketDataPoint> {
        let start = NaiveDate::from_ymd_opt(2025, 1, 6).unwrap();
        closes
            .iter()
            .enumerate()
            .map(|(i, c)| MarketDataPoint {
                id: Uuid::new_v4(),
                symbol: symbol.to_string(),
                date: start + Duration::days(i as i64),
                open: None,
                high: None,
                low: None,
                close: BigDecimal::from_f64(*c).unwrap(),
                volume: None,
                sector: None,
                industry: None,
                created_at: Utc::now(),
            })
            .collect()
    }

    #[test]
    fn beta_of_series_against_itself_is_one() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + (i as f64).sin() * 5.0).collect();
        let w = window("SPY", &closes);
        let returns = returns_from_window(&w);
        let (beta, r_squared) = ols_beta(&returns, &returns).unwrap();
        assert!((beta - 1.0).abs() < 1e-9);
        assert!((r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn scaled_series_has_scaled_beta() {
        let factor: Vec<f64> = (0..50)
            .map(|i| 0.01 * ((i % 5) as f64 - 2.0))
            .collect();
        let asset: Vec<f64> = factor.iter().map(|r| 2.0 * r).collect();
        let (beta, r_squared) = ols_beta(&asset, &factor).unwrap();
        assert!((beta - 2.0).abs() < 1e-9);
        assert!((r_squared - 1.0).abs() < 1e-9);
    }

    #[test]
    fn flat_factor_yields_no_beta() {
        let asset = vec![0.01, -0.02, 0.005];
        let factor = vec![0.0, 0.0, 0.0];
        assert!(ols_beta(&asset, &factor).is_none());
    }

    #[test]
    fn aligned_returns_intersects_dates() {
        let a = window("AAPL", &[100.0, 101.0, 102.0, 103.0]);
        let mut f = window("SPY", &[400.0, 404.0, 408.0, 412.0]);
        f.remove(1); // SPY missing one session

        let (asset_returns, factor_returns) = aligned_returns(&a, &f);
        assert_eq!(asset_returns.len(), factor_returns.len());
        assert_eq!(asset_returns.len(), 2);
    }

    #[test]
    fn tracking_error_of_identical_series_is_zero() {
        let returns = vec![0.01, -0.005, 0.003, 0.007];
        let te = tracking_error(&returns, &returns).unwrap();
        assert!(te.abs() < 1e-12);
    }
}
