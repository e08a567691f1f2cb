use chrono::NaiveDate;
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::db::{factor_queries, greeks_queries, market_data_queries, position_queries, stress_queries};
use crate::errors::AppError;
use crate::models::{ScenarioImpact, ShockAttribution, StressScenario};
use crate::numeric;
use crate::state::EngineContext;

/// Everything a scenario needs to know about one position.
#[derive(Debug, Clone)]
pub struct StressPosition {
    pub symbol: String,
    pub exposure: f64,
    pub is_option: bool,
    /// Market beta of the position (or its underlying); 1.0 when unknown.
    pub beta: f64,
    pub sector: Option<String>,
    pub dollar_delta: f64,
    /// Engine vega, already per 1 vol point.
    pub vega: f64,
    /// Engine rho, already per 1% rate move.
    pub rho: f64,
}

#[derive(Debug, Default)]
pub struct StressOutcome {
    pub impacts: Vec<ScenarioImpact>,
    pub warnings: Vec<String>,
}

/// Engine G: evaluate the fixed scenario library (plus any custom scenarios)
/// against the current book and persist one result row per scenario.
pub async fn run_stress_engine(
    ctx: &EngineContext,
    portfolio_id: Uuid,
    date: NaiveDate,
    custom_scenarios: &[StressScenario],
) -> Result<StressOutcome, AppError> {
    let stress_positions = load_stress_positions(ctx, portfolio_id, date).await?;
    let mut outcome = StressOutcome::default();

    if stress_positions.is_empty() {
        outcome
            .warnings
            .push("no valued positions, stress testing skipped".to_string());
        return Ok(outcome);
    }

    let portfolio_value: f64 = stress_positions.iter().map(|p| p.exposure.abs()).sum();

    let mut scenarios = StressScenario::fixed_library();
    scenarios.extend_from_slice(custom_scenarios);

    for scenario in &scenarios {
        let impact = apply_scenario(&stress_positions, portfolio_value, scenario);

        let attribution = serde_json::to_value(&impact.attribution)
            .map_err(|e| AppError::External(format!("attribution serialization: {}", e)))?;
        let parameters = serde_json::to_value(scenario)
            .map_err(|e| AppError::External(format!("scenario serialization: {}", e)))?;

        stress_queries::upsert_result(
            &ctx.pool,
            portfolio_id,
            &scenario.name,
            date,
            impact.portfolio_value,
            impact.pnl,
            impact.pnl_percent,
            &attribution,
            &parameters,
        )
        .await?;

        outcome.impacts.push(impact);
    }

    info!(
        "Stress engine evaluated {} scenarios for portfolio {}",
        scenarios.len(),
        portfolio_id
    );

    Ok(outcome)
}

/// Project one scenario onto the book. Equities move with beta x market
/// shock plus their sector shock; options move through dollar delta, vega
/// and rho. The P&L is not capped; correlated shock cascades can and do
/// produce extreme figures.
pub fn apply_scenario(
    positions: &[StressPosition],
    portfolio_value: f64,
    scenario: &StressScenario,
) -> ScenarioImpact {
    let market_shock = scenario
        .factor_shocks
        .get("market_beta")
        .copied()
        .unwrap_or(0.0);
    let rate_shock_pct = scenario.rate_shock_bp.map(|bp| bp / 100.0).unwrap_or(0.0);
    let vol_shock = scenario.vol_shock_pts.unwrap_or(0.0);

    let mut attribution = ShockAttribution::default();

    for position in positions {
        let sector_shock = position
            .sector
            .as_ref()
            .and_then(|s| scenario.sector_shocks.get(s))
            .copied()
            .unwrap_or(0.0);
        let underlying_move = position.beta * market_shock;

        if position.is_option {
            attribution.market += position.dollar_delta * underlying_move;
            attribution.sector += position.dollar_delta * sector_shock;
            attribution.volatility += position.vega * vol_shock;
            attribution.rates += position.rho * rate_shock_pct;
        } else {
            attribution.market += position.exposure * underlying_move;
            attribution.sector += position.exposure * sector_shock;
        }
    }

    let pnl = attribution.market + attribution.sector + attribution.rates + attribution.volatility;
    let pnl_percent = if portfolio_value.abs() > f64::EPSILON {
        pnl / portfolio_value * 100.0
    } else {
        0.0
    };

    ScenarioImpact {
        scenario_name: scenario.name.clone(),
        portfolio_value: numeric::round_to(portfolio_value + pnl, 2),
        pnl: numeric::round_to(pnl, 2),
        pnl_percent: numeric::round_to(pnl_percent, 4),
        attribution,
    }
}

async fn load_stress_positions(
    ctx: &EngineContext,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<StressPosition>, AppError> {
    let positions = position_queries::fetch_for_portfolio(&ctx.pool, portfolio_id).await?;
    let greeks_rows =
        greeks_queries::fetch_for_portfolio_date(&ctx.pool, portfolio_id, date).await?;
    let betas: HashMap<Uuid, f64> =
        factor_queries::fetch_latest_market_betas(&ctx.pool, portfolio_id, date)
            .await?
            .into_iter()
            .collect();

    let symbols: Vec<String> = positions
        .iter()
        .map(|p| p.underlying().to_string())
        .collect();
    let sectors = market_data_queries::fetch_sectors(&ctx.pool, &symbols).await?;

    let stress_positions = positions
        .iter()
        .filter_map(|position| {
            let kind = position.kind()?;
            let exposure = position.exposure.as_ref().map(numeric::to_f64)?;
            let greeks = greeks_rows.iter().find(|g| g.position_id == position.id);

            Some(StressPosition {
                symbol: position.symbol.clone(),
                exposure,
                is_option: kind.is_option(),
                beta: betas.get(&position.id).copied().unwrap_or(1.0),
                sector: sectors.get(position.underlying()).cloned(),
                dollar_delta: greeks
                    .and_then(|g| g.dollar_delta.as_ref())
                    .map(numeric::to_f64)
                    .unwrap_or(0.0),
                vega: greeks
                    .and_then(|g| g.vega.as_ref())
                    .map(numeric::to_f64)
                    .unwrap_or(0.0),
                rho: greeks
                    .and_then(|g| g.rho.as_ref())
                    .map(numeric::to_f64)
                    .unwrap_or(0.0),
            })
        })
        .collect();

    Ok(stress_positions)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stock(exposure: f64, beta: f64, sector: Option<&str>) -> StressPosition {
        StressPosition {
            symbol: "TEST".to_string(),
            exposure,
            is_option: false,
            beta,
            sector: sector.map(String::from),
            dollar_delta: exposure,
            vega: 0.0,
            rho: 0.0,
        }
    }

    fn option(dollar_delta: f64, vega: f64, rho: f64) -> StressPosition {
        StressPosition {
            symbol: "TEST260116C00100000".to_string(),
            exposure: 5_000.0,
            is_option: true,
            beta: 1.0,
            sector: None,
            dollar_delta,
            vega,
            rho,
        }
    }

    fn market_down(pct: f64) -> StressScenario {
        StressScenario {
            name: "down".to_string(),
            description: String::new(),
            probability: None,
            factor_shocks: HashMap::from([("market_beta".to_string(), -pct)]),
            sector_shocks: HashMap::new(),
            rate_shock_bp: None,
            vol_shock_pts: None,
        }
    }

    #[test]
    fn beta_one_stock_tracks_market_shock() {
        let book = vec![stock(100_000.0, 1.0, None)];
        let impact = apply_scenario(&book, 100_000.0, &market_down(0.10));
        assert!((impact.pnl + 10_000.0).abs() < 1e-6);
        assert!((impact.pnl_percent + 10.0).abs() < 1e-6);
        assert_eq!(impact.portfolio_value, 90_000.0);
    }

    #[test]
    fn short_position_gains_in_selloff() {
        let book = vec![stock(-50_000.0, 1.0, None)];
        let impact = apply_scenario(&book, 50_000.0, &market_down(0.10));
        assert!((impact.pnl - 5_000.0).abs() < 1e-6);
    }

    #[test]
    fn high_beta_amplifies() {
        let book = vec![stock(100_000.0, 2.0, None)];
        let impact = apply_scenario(&book, 100_000.0, &market_down(0.10));
        assert!((impact.pnl + 20_000.0).abs() < 1e-6);
    }

    #[test]
    fn sector_shock_hits_only_tagged_positions() {
        let scenario = StressScenario {
            name: "tech".to_string(),
            description: String::new(),
            probability: None,
            factor_shocks: HashMap::new(),
            sector_shocks: HashMap::from([("Technology".to_string(), -0.15)]),
            rate_shock_bp: None,
            vol_shock_pts: None,
        };
        let book = vec![
            stock(10_000.0, 1.0, Some("Technology")),
            stock(10_000.0, 1.0, Some("Utilities")),
        ];
        let impact = apply_scenario(&book, 20_000.0, &scenario);
        assert!((impact.pnl + 1_500.0).abs() < 1e-6);
        assert!((impact.attribution.sector + 1_500.0).abs() < 1e-6);
        assert_eq!(impact.attribution.market, 0.0);
    }

    #[test]
    fn option_responds_through_delta_and_vega() {
        let scenario = StressScenario {
            name: "down_vol_up".to_string(),
            description: String::new(),
            probability: None,
            factor_shocks: HashMap::from([("market_beta".to_string(), -0.10)]),
            sector_shocks: HashMap::new(),
            rate_shock_bp: None,
            vol_shock_pts: Some(10.0),
        };
        // dollar delta 65_000, vega 375 per point
        let book = vec![option(65_000.0, 375.0, 50.0)];
        let impact = apply_scenario(&book, 5_000.0, &scenario);
        // delta leg: -6500, vega leg: +3750
        assert!((impact.attribution.market + 6_500.0).abs() < 1e-6);
        assert!((impact.attribution.volatility - 3_750.0).abs() < 1e-6);
        assert!((impact.pnl + 2_750.0).abs() < 1e-6);
    }

    #[test]
    fn rate_shock_flows_through_rho() {
        let scenario = StressScenario {
            name: "rates".to_string(),
            description: String::new(),
            probability: None,
            factor_shocks: HashMap::new(),
            sector_shocks: HashMap::new(),
            rate_shock_bp: Some(100.0),
            vol_shock_pts: None,
        };
        let book = vec![option(0.0, 0.0, 53.0)];
        let impact = apply_scenario(&book, 5_000.0, &scenario);
        assert!((impact.attribution.rates - 53.0).abs() < 1e-6);
    }

    #[test]
    fn probability_never_scales_pnl() {
        let mut with_prob = market_down(0.10);
        with_prob.probability = Some(0.01);
        let without_prob = market_down(0.10);

        let book = vec![stock(100_000.0, 1.0, None)];
        let a = apply_scenario(&book, 100_000.0, &with_prob);
        let b = apply_scenario(&book, 100_000.0, &without_prob);
        assert_eq!(a.pnl, b.pnl);
    }

    #[test]
    fn scenario_pnl_is_unbounded() {
        let book = vec![stock(100_000.0, 3.0, None)];
        let impact = apply_scenario(&book, 100_000.0, &market_down(0.50));
        // 3x beta against a 50% crash overshoots the portfolio value
        assert!(impact.pnl < -100_000.0);
    }
}
