use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::greeks::GreeksValues;

/// Categorical position label. Authoritative over the sign of quantity:
/// a short option is short because it is SC/SP, whatever the stored quantity
/// says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PositionType {
    Long,
    Short,
    LongCall,
    LongPut,
    ShortCall,
    ShortPut,
}

impl PositionType {
    /// Accepts the wire/store codes in any case. Both the enum and its string
    /// form circulate at the boundary; everything internal normalizes through
    /// here first.
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "LONG" => Some(PositionType::Long),
            "SHORT" => Some(PositionType::Short),
            "LC" => Some(PositionType::LongCall),
            "LP" => Some(PositionType::LongPut),
            "SC" => Some(PositionType::ShortCall),
            "SP" => Some(PositionType::ShortPut),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PositionType::Long => "LONG",
            PositionType::Short => "SHORT",
            PositionType::LongCall => "LC",
            PositionType::LongPut => "LP",
            PositionType::ShortCall => "SC",
            PositionType::ShortPut => "SP",
        }
    }

    pub fn is_option(&self) -> bool {
        matches!(
            self,
            PositionType::LongCall
                | PositionType::LongPut
                | PositionType::ShortCall
                | PositionType::ShortPut
        )
    }

    pub fn is_stock(&self) -> bool {
        matches!(self, PositionType::Long | PositionType::Short)
    }

    pub fn is_call(&self) -> bool {
        matches!(self, PositionType::LongCall | PositionType::ShortCall)
    }

    pub fn is_put(&self) -> bool {
        matches!(self, PositionType::LongPut | PositionType::ShortPut)
    }

    /// Sign of the position's exposure as dictated by the type.
    pub fn sign(&self) -> f64 {
        match self {
            PositionType::Long | PositionType::LongCall | PositionType::LongPut => 1.0,
            PositionType::Short | PositionType::ShortCall | PositionType::ShortPut => -1.0,
        }
    }

    /// 100 for option contracts, 1 for shares.
    pub fn multiplier(&self) -> f64 {
        if self.is_option() {
            100.0
        } else {
            1.0
        }
    }
}

impl std::fmt::Display for PositionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A holding within a portfolio. The entry layer owns the defining fields;
/// the batch engine writes only the valuation columns (last_price,
/// market_value, exposure, daily_pnl).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Position {
    pub id: Uuid,
    pub portfolio_id: Uuid,
    pub symbol: String,
    pub position_type: String,
    pub quantity: BigDecimal,
    pub entry_price: BigDecimal,
    pub entry_date: NaiveDate,
    pub underlying_symbol: Option<String>,
    pub strike: Option<BigDecimal>,
    pub expiration_date: Option<NaiveDate>,
    pub tags: Option<Vec<String>>,
    pub last_price: Option<BigDecimal>,
    pub market_value: Option<BigDecimal>,
    pub exposure: Option<BigDecimal>,
    pub daily_pnl: Option<BigDecimal>,
    pub created_at: DateTime<Utc>,
}

impl Position {
    pub fn kind(&self) -> Option<PositionType> {
        PositionType::parse(&self.position_type)
    }

    /// Underlying for options, the symbol itself for stocks.
    pub fn underlying(&self) -> &str {
        self.underlying_symbol.as_deref().unwrap_or(&self.symbol)
    }
}

/// Flattened per-position input for the aggregation functions: valuation
/// already applied, Greeks attached when the Greeks engine produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionView {
    pub position_id: Uuid,
    pub symbol: String,
    pub position_type: String,
    pub quantity: Option<f64>,
    pub market_value: Option<f64>,
    pub exposure: Option<f64>,
    pub greeks: Option<GreeksValues>,
    pub tags: Vec<String>,
    pub underlying_symbol: Option<String>,
}

impl PositionView {
    pub fn kind(&self) -> Option<PositionType> {
        PositionType::parse(&self.position_type)
    }
}
