use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// The seven style factors the engine regresses against. Each is proxied by
/// a liquid ETF return series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactorType {
    MarketBeta,
    Value,
    Growth,
    Momentum,
    Quality,
    Size,
    LowVolatility,
}

impl FactorType {
    pub fn all() -> [FactorType; 7] {
        [
            FactorType::MarketBeta,
            FactorType::Value,
            FactorType::Growth,
            FactorType::Momentum,
            FactorType::Quality,
            FactorType::Size,
            FactorType::LowVolatility,
        ]
    }

    pub fn code(&self) -> &'static str {
        match self {
            FactorType::MarketBeta => "market_beta",
            FactorType::Value => "value",
            FactorType::Growth => "growth",
            FactorType::Momentum => "momentum",
            FactorType::Quality => "quality",
            FactorType::Size => "size",
            FactorType::LowVolatility => "low_volatility",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            FactorType::MarketBeta => "Market Beta",
            FactorType::Value => "Value",
            FactorType::Growth => "Growth",
            FactorType::Momentum => "Momentum",
            FactorType::Quality => "Quality",
            FactorType::Size => "Size",
            FactorType::LowVolatility => "Low Volatility",
        }
    }

    /// ETF whose return series stands in for the factor.
    pub fn proxy_symbol(&self) -> &'static str {
        match self {
            FactorType::MarketBeta => "SPY",
            FactorType::Value => "VTV",
            FactorType::Growth => "VUG",
            FactorType::Momentum => "MTUM",
            FactorType::Quality => "QUAL",
            FactorType::Size => "IWM",
            FactorType::LowVolatility => "USMV",
        }
    }
}

impl std::fmt::Display for FactorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Regression beta of one position's returns on one factor proxy.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PositionFactorExposure {
    pub id: Uuid,
    pub position_id: Uuid,
    pub factor: String,
    pub calculation_date: NaiveDate,
    pub beta: BigDecimal,
    pub r_squared: Option<BigDecimal>,
    pub data_points: i32,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seven_factors_with_distinct_proxies() {
        let all = FactorType::all();
        assert_eq!(all.len(), 7);
        let mut proxies: Vec<_> = all.iter().map(|f| f.proxy_symbol()).collect();
        proxies.sort();
        proxies.dedup();
        assert_eq!(proxies.len(), 7);
    }

    #[test]
    fn codes_are_snake_case() {
        assert_eq!(FactorType::MarketBeta.code(), "market_beta");
        assert_eq!(FactorType::LowVolatility.code(), "low_volatility");
    }
}
