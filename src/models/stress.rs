use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// A named market scenario: shocks keyed by factor and sector, plus optional
/// rate and volatility moves. Probability is descriptive metadata and never
/// enters the P&L arithmetic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressScenario {
    pub name: String,
    pub description: String,
    pub probability: Option<f64>,
    /// Fractional shock per factor code, e.g. {"market_beta": -0.20}.
    #[serde(default)]
    pub factor_shocks: HashMap<String, f64>,
    /// Fractional shock per sector name.
    #[serde(default)]
    pub sector_shocks: HashMap<String, f64>,
    /// Parallel rate move in basis points.
    pub rate_shock_bp: Option<f64>,
    /// Implied volatility move in percentage points.
    pub vol_shock_pts: Option<f64>,
}

impl StressScenario {
    /// The fixed scenario library every run evaluates before any custom
    /// scenarios.
    pub fn fixed_library() -> Vec<StressScenario> {
        vec![
            StressScenario {
                name: "market_down_10".to_string(),
                description: "Broad equity selloff of 10%".to_string(),
                probability: Some(0.10),
                factor_shocks: HashMap::from([("market_beta".to_string(), -0.10)]),
                sector_shocks: HashMap::new(),
                rate_shock_bp: None,
                vol_shock_pts: Some(8.0),
            },
            StressScenario {
                name: "market_down_25".to_string(),
                description: "Severe bear market, 25% decline".to_string(),
                probability: Some(0.02),
                factor_shocks: HashMap::from([("market_beta".to_string(), -0.25)]),
                sector_shocks: HashMap::new(),
                rate_shock_bp: None,
                vol_shock_pts: Some(20.0),
            },
            StressScenario {
                name: "market_up_10".to_string(),
                description: "Broad rally of 10%".to_string(),
                probability: Some(0.10),
                factor_shocks: HashMap::from([("market_beta".to_string(), 0.10)]),
                sector_shocks: HashMap::new(),
                rate_shock_bp: None,
                vol_shock_pts: Some(-4.0),
            },
            StressScenario {
                name: "rates_up_100bp".to_string(),
                description: "Parallel rate rise of 100bp".to_string(),
                probability: Some(0.15),
                factor_shocks: HashMap::new(),
                sector_shocks: HashMap::new(),
                rate_shock_bp: Some(100.0),
                vol_shock_pts: None,
            },
            StressScenario {
                name: "vol_spike".to_string(),
                description: "Implied volatility up 15 points, spot unchanged".to_string(),
                probability: Some(0.08),
                factor_shocks: HashMap::new(),
                sector_shocks: HashMap::new(),
                rate_shock_bp: None,
                vol_shock_pts: Some(15.0),
            },
            StressScenario {
                name: "tech_selloff".to_string(),
                description: "Technology sector down 15%, broad market down 5%".to_string(),
                probability: Some(0.05),
                factor_shocks: HashMap::from([("market_beta".to_string(), -0.05)]),
                sector_shocks: HashMap::from([("Technology".to_string(), -0.15)]),
                rate_shock_bp: None,
                vol_shock_pts: Some(6.0),
            },
        ]
    }
}

/// Dollar P&L attributed to each shock channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShockAttribution {
    pub market: f64,
    pub sector: f64,
    pub rates: f64,
    pub volatility: f64,
}

/// Projected effect of one scenario on one portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioImpact {
    pub scenario_name: String,
    pub portfolio_value: f64,
    pub pnl: f64,
    pub pnl_percent: f64,
    pub attribution: ShockAttribution,
}

/// Persisted stress result, one row per (portfolio, scenario, date).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct StressTestResult {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub scenario_name: String,
    pub calculation_date: NaiveDate,
    pub portfolio_value: BigDecimal,
    pub pnl: BigDecimal,
    pub pnl_percent: BigDecimal,
    pub attribution: serde_json::Value,
    pub parameters: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
