use chrono::NaiveDate;
use regex::Regex;
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use std::collections::HashMap;
use std::sync::OnceLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::greeks_queries::{self, GreeksUpsert};
use crate::db::position_queries;
use crate::errors::AppError;
use crate::models::{BulkGreeksOutcome, GreeksValues, Position};
use crate::numeric;
use crate::services::market_data_service::{self, SymbolSnapshot};
use crate::state::EngineContext;

const DAYS_PER_YEAR: f64 = 365.0;
const UPSERT_CHUNK_SIZE: usize = 100;

/// Greeks plus the dollar sensitivities persisted alongside them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionGreeksResult {
    pub greeks: GreeksValues,
    pub dollar_delta: f64,
    pub dollar_gamma: f64,
}

/// Engine C: compute and persist Greeks for every position in the portfolio.
/// Failures are recorded as all-null rows; nothing is ever fabricated.
pub async fn run_greeks_engine(
    ctx: &EngineContext,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<BulkGreeksOutcome, AppError> {
    let positions = position_queries::fetch_for_portfolio(&ctx.pool, portfolio_id).await?;

    // One market snapshot per distinct underlying
    let mut snapshots: HashMap<String, Option<SymbolSnapshot>> = HashMap::new();
    for position in &positions {
        let underlying = position.underlying().to_string();
        if !snapshots.contains_key(&underlying) {
            let snap = market_data_service::symbol_snapshot(ctx, &underlying, date).await?;
            snapshots.insert(underlying, snap);
        }
    }

    let mut outcome = BulkGreeksOutcome::default();
    let mut pending: Vec<GreeksUpsert> = Vec::with_capacity(positions.len());
    let mut computed = 0usize;

    for position in &positions {
        let snapshot = snapshots.get(position.underlying()).and_then(|s| s.as_ref());
        match compute_position_greeks(position, snapshot, date) {
            Some(result) => {
                computed += 1;
                pending.push(GreeksUpsert {
                    position_id: position.id,
                    calculation_date: date,
                    delta: Some(result.greeks.delta),
                    gamma: Some(result.greeks.gamma),
                    theta: Some(result.greeks.theta),
                    vega: Some(result.greeks.vega),
                    rho: Some(result.greeks.rho),
                    dollar_delta: Some(result.dollar_delta),
                    dollar_gamma: Some(result.dollar_gamma),
                })
            }
            None => {
                outcome.failed += 1;
                outcome.errors.push(format!(
                    "greeks unavailable for position {} ({})",
                    position.id, position.symbol
                ));
                // The all-null row still goes in so downstream readers see
                // the attempt rather than a hole.
                pending.push(GreeksUpsert {
                    position_id: position.id,
                    calculation_date: date,
                    delta: None,
                    gamma: None,
                    theta: None,
                    vega: None,
                    rho: None,
                    dollar_delta: None,
                    dollar_gamma: None,
                });
            }
        }
    }

    for chunk in pending.chunks(UPSERT_CHUNK_SIZE) {
        greeks_queries::upsert_chunk(&ctx.pool, chunk).await?;
    }
    outcome.updated = computed;

    // Greeks rows changed; cached aggregations no longer reflect them
    crate::services::aggregation_service::clear_cache();

    info!(
        "Greeks engine wrote {} rows for portfolio {} ({} failed)",
        outcome.updated + outcome.failed,
        portfolio_id,
        outcome.failed
    );

    Ok(outcome)
}

/// Null-on-error entry point for a single position. Stocks never touch the
/// model; expired options are all zeros by contract.
pub fn compute_position_greeks(
    position: &Position,
    snapshot: Option<&SymbolSnapshot>,
    date: NaiveDate,
) -> Option<PositionGreeksResult> {
    let Some(kind) = position.kind() else {
        warn!(
            "Unknown position type '{}' for {}",
            position.position_type, position.id
        );
        return None;
    };

    let quantity = numeric::to_f64(&position.quantity);

    if kind.is_stock() {
        let spot = snapshot.map(|s| s.spot).unwrap_or(0.0);
        return Some(PositionGreeksResult {
            greeks: GreeksValues {
                delta: quantity.signum(),
                gamma: 0.0,
                theta: 0.0,
                vega: 0.0,
                rho: 0.0,
            },
            dollar_delta: quantity * spot,
            dollar_gamma: 0.0,
        });
    }

    let (strike, expiration) = option_terms(position)?;

    // Expired options carry zero sensitivities, not nulls
    if expiration < date {
        return Some(PositionGreeksResult {
            greeks: GreeksValues::ZERO,
            dollar_delta: 0.0,
            dollar_gamma: 0.0,
        });
    }

    let Some(snapshot) = snapshot else {
        warn!(
            "No market data for underlying {} of position {}",
            position.underlying(),
            position.id
        );
        return None;
    };

    let t_years = (expiration - date).num_days() as f64 / DAYS_PER_YEAR;
    let per_share = black_scholes(
        kind.is_call(),
        snapshot.spot,
        strike,
        t_years,
        snapshot.implied_volatility,
        snapshot.risk_free_rate,
        snapshot.dividend_yield,
    )?;

    let contracts = quantity.abs();
    let scale = kind.sign() * contracts * kind.multiplier();

    let greeks = GreeksValues {
        delta: per_share.delta * scale,
        gamma: per_share.gamma * scale,
        theta: per_share.theta * scale,
        vega: per_share.vega * scale,
        rho: per_share.rho * scale,
    };
    if !greeks.is_finite() {
        warn!("Non-finite Greeks for position {}", position.id);
        return None;
    }

    Some(PositionGreeksResult {
        greeks,
        dollar_delta: per_share.delta * snapshot.spot * scale,
        // Dollar gamma for a 1% underlying move
        dollar_gamma: per_share.gamma * snapshot.spot * snapshot.spot * 0.01 * scale,
    })
}

/// Strike and expiry from the position record, falling back to the OCC
/// symbol encoding (ROOT + YYMMDD + C/P + strike*1000, e.g.
/// AAPL240119C00150000).
fn option_terms(position: &Position) -> Option<(f64, NaiveDate)> {
    if let (Some(strike), Some(expiration)) = (&position.strike, position.expiration_date) {
        return Some((numeric::to_f64(strike), expiration));
    }

    static OCC_SYMBOL: OnceLock<Regex> = OnceLock::new();
    let re = OCC_SYMBOL
        .get_or_init(|| Regex::new(r"^([A-Z]{1,6})(\d{6})([CP])(\d{8})$").expect("static regex"));

    let caps = re.captures(position.symbol.trim()).or_else(|| {
        warn!(
            "Cannot parse option symbol '{}' for position {}",
            position.symbol, position.id
        );
        None
    })?;

    let expiration = NaiveDate::parse_from_str(&caps[2], "%y%m%d").ok()?;
    let strike = caps[4].parse::<f64>().ok()? / 1000.0;
    Some((strike, expiration))
}

#[derive(Debug, Clone, Copy)]
struct PerShareGreeks {
    delta: f64,
    gamma: f64,
    theta: f64,
    vega: f64,
    rho: f64,
}

/// Closed-form Black-Scholes with continuous dividend yield. Theta is
/// returned per calendar day, vega and rho per 1% move. Degenerate inputs
/// (zero time, zero vol, non-positive prices) yield None rather than a
/// made-up number.
fn black_scholes(
    is_call: bool,
    spot: f64,
    strike: f64,
    t_years: f64,
    vol: f64,
    rate: f64,
    dividend_yield: f64,
) -> Option<PerShareGreeks> {
    if spot <= 0.0 || strike <= 0.0 || t_years <= 0.0 || vol <= 0.0 {
        return None;
    }

    let normal = Normal::new(0.0, 1.0).ok()?;
    let sqrt_t = t_years.sqrt();
    let d1 = ((spot / strike).ln() + (rate - dividend_yield + vol * vol / 2.0) * t_years)
        / (vol * sqrt_t);
    let d2 = d1 - vol * sqrt_t;

    if !d1.is_finite() || !d2.is_finite() {
        return None;
    }

    let disc_q = (-dividend_yield * t_years).exp();
    let disc_r = (-rate * t_years).exp();
    let pdf_d1 = normal.pdf(d1);

    let delta = if is_call {
        disc_q * normal.cdf(d1)
    } else {
        disc_q * (normal.cdf(d1) - 1.0)
    };

    let gamma = disc_q * pdf_d1 / (spot * vol * sqrt_t);
    let vega_unit = spot * disc_q * pdf_d1 * sqrt_t;

    let theta_annual = if is_call {
        -spot * disc_q * pdf_d1 * vol / (2.0 * sqrt_t) - rate * strike * disc_r * normal.cdf(d2)
            + dividend_yield * spot * disc_q * normal.cdf(d1)
    } else {
        -spot * disc_q * pdf_d1 * vol / (2.0 * sqrt_t) + rate * strike * disc_r * normal.cdf(-d2)
            - dividend_yield * spot * disc_q * normal.cdf(-d1)
    };

    let rho_unit = if is_call {
        strike * t_years * disc_r * normal.cdf(d2)
    } else {
        -strike * t_years * disc_r * normal.cdf(-d2)
    };

    let result = PerShareGreeks {
        delta,
        gamma,
        theta: theta_annual / DAYS_PER_YEAR,
        vega: vega_unit / 100.0,
        rho: rho_unit / 100.0,
    };

    let finite = result.delta.is_finite()
        && result.gamma.is_finite()
        && result.theta.is_finite()
        && result.vega.is_finite()
        && result.rho.is_finite();
    finite.then_some(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::{BigDecimal, FromPrimitive};
    use chrono::Utc;

    fn test_position(
        position_type: &str,
        quantity: f64,
        symbol: &str,
        strike: Option<f64>,
        expiration: Option<NaiveDate>,
    ) -> Position {
        Position {
            id: Uuid::new_v4(),
            portfolio_id: Uuid::new_v4(),
            symbol: symbol.to_string(),
            position_type: position_type.to_string(),
            quantity: BigDecimal::from_f64(quantity).unwrap(),
            entry_price: BigDecimal::from_f64(100.0).unwrap(),
            entry_date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
            underlying_symbol: strike.map(|_| "AAPL".to_string()),
            strike: strike.and_then(BigDecimal::from_f64),
            expiration_date: expiration,
            tags: None,
            last_price: None,
            market_value: None,
            exposure: None,
            daily_pnl: None,
            created_at: Utc::now(),
        }
    }

    fn snapshot(spot: f64) -> SymbolSnapshot {
        SymbolSnapshot {
            symbol: "AAPL".to_string(),
            spot,
            as_of: NaiveDate::from_ymd_opt(2025, 6, 2).unwrap(),
            stale: false,
            implied_volatility: 0.2,
            risk_free_rate: 0.05,
            dividend_yield: 0.0,
        }
    }

    #[test]
    fn black_scholes_reference_values() {
        // S=100, K=100, T=1y, vol=20%, r=5%, q=0
        let g = black_scholes(true, 100.0, 100.0, 1.0, 0.2, 0.05, 0.0).unwrap();
        assert!((g.delta - 0.6368).abs() < 1e-3);
        assert!((g.gamma - 0.018762).abs() < 1e-4);
        assert!((g.vega - 0.375240).abs() < 1e-4);
        assert!((g.theta - (-0.0175727)).abs() < 1e-4);
        assert!((g.rho - 0.532330).abs() < 1e-4);
    }

    #[test]
    fn put_call_delta_relationship() {
        let call = black_scholes(true, 100.0, 100.0, 1.0, 0.2, 0.05, 0.0).unwrap();
        let put = black_scholes(false, 100.0, 100.0, 1.0, 0.2, 0.05, 0.0).unwrap();
        // With q=0: delta_call - delta_put = 1
        assert!((call.delta - put.delta - 1.0).abs() < 1e-9);
        assert!((call.gamma - put.gamma).abs() < 1e-12);
        assert!((call.vega - put.vega).abs() < 1e-12);
    }

    #[test]
    fn degenerate_inputs_return_none() {
        assert!(black_scholes(true, 0.0, 100.0, 1.0, 0.2, 0.05, 0.0).is_none());
        assert!(black_scholes(true, 100.0, 100.0, 0.0, 0.2, 0.05, 0.0).is_none());
        assert!(black_scholes(true, 100.0, 100.0, 1.0, 0.0, 0.05, 0.0).is_none());
    }

    #[test]
    fn stock_delta_is_sign_of_quantity() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let long = test_position("LONG", 100.0, "AAPL", None, None);
        let short = test_position("SHORT", -50.0, "AAPL", None, None);

        let lg = compute_position_greeks(&long, Some(&snapshot(150.0)), date).unwrap();
        let sg = compute_position_greeks(&short, Some(&snapshot(150.0)), date).unwrap();

        assert_eq!(lg.greeks.delta, 1.0);
        assert_eq!(sg.greeks.delta, -1.0);
        assert_eq!(lg.greeks.gamma, 0.0);
        assert_eq!(sg.greeks.vega, 0.0);
        assert_eq!(lg.dollar_delta, 100.0 * 150.0);
        assert_eq!(sg.dollar_delta, -50.0 * 150.0);
    }

    #[test]
    fn expired_option_is_all_zeros() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let expired = test_position(
            "LC",
            10.0,
            "AAPL250601C00150000",
            Some(150.0),
            NaiveDate::from_ymd_opt(2025, 6, 1),
        );

        let g = compute_position_greeks(&expired, Some(&snapshot(150.0)), date).unwrap();
        assert_eq!(g.greeks, GreeksValues::ZERO);
        assert_eq!(g.dollar_delta, 0.0);
    }

    #[test]
    fn expired_option_needs_no_market_data() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let expired = test_position(
            "LC",
            10.0,
            "AAPL",
            Some(150.0),
            NaiveDate::from_ymd_opt(2025, 5, 1),
        );
        assert!(compute_position_greeks(&expired, None, date).is_some());
    }

    #[test]
    fn missing_market_data_returns_none() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let live = test_position(
            "LC",
            10.0,
            "AAPL",
            Some(150.0),
            NaiveDate::from_ymd_opt(2026, 1, 16),
        );
        assert!(compute_position_greeks(&live, None, date).is_none());
    }

    #[test]
    fn short_call_greeks_are_negated() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2026, 6, 2);
        let long = test_position("LC", 10.0, "AAPL", Some(150.0), expiry);
        let short = test_position("SC", 10.0, "AAPL", Some(150.0), expiry);

        let lg = compute_position_greeks(&long, Some(&snapshot(150.0)), date).unwrap();
        let sg = compute_position_greeks(&short, Some(&snapshot(150.0)), date).unwrap();

        assert!((lg.greeks.delta + sg.greeks.delta).abs() < 1e-9);
        assert!(lg.greeks.delta > 0.0);
        assert!(sg.greeks.delta < 0.0);
    }

    #[test]
    fn greeks_scale_with_contracts_times_100() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2026, 6, 2);
        let one = test_position("LC", 1.0, "AAPL", Some(150.0), expiry);
        let ten = test_position("LC", 10.0, "AAPL", Some(150.0), expiry);

        let g1 = compute_position_greeks(&one, Some(&snapshot(150.0)), date).unwrap();
        let g10 = compute_position_greeks(&ten, Some(&snapshot(150.0)), date).unwrap();

        assert!((g10.greeks.delta - 10.0 * g1.greeks.delta).abs() < 1e-9);
        // one contract's delta is per-share delta x 100
        assert!(g1.greeks.delta > 1.0 && g1.greeks.delta < 100.0);
    }

    #[test]
    fn occ_symbol_parsing_fallback() {
        let position = test_position("LP", 2.0, "MSFT260116P00400000", None, None);
        let (strike, expiration) = option_terms(&position).unwrap();
        assert_eq!(strike, 400.0);
        assert_eq!(expiration, NaiveDate::from_ymd_opt(2026, 1, 16).unwrap());
    }

    #[test]
    fn unparseable_symbol_returns_none() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let bad = test_position("LC", 1.0, "not-an-option", None, None);
        assert!(compute_position_greeks(&bad, Some(&snapshot(150.0)), date).is_none());
    }
}
