mod batch;
mod correlation;
mod factor;
mod greeks;
mod market_data;
mod portfolio;
mod position;
mod risk;
mod snapshot;
mod stress;

pub use batch::{BatchJob, EngineKind, JobResult, JobStatus};
pub use correlation::{CorrelationCalculation, CorrelationMatrix, CorrelationPair, CorrelationPayload};
pub use factor::{FactorType, PositionFactorExposure};
pub use greeks::{BulkGreeksOutcome, GreeksValues, PositionGreeks};
pub use market_data::MarketDataPoint;
pub use portfolio::Portfolio;
pub use position::{Position, PositionType, PositionView};
pub use risk::MarketRisk;
pub use snapshot::PortfolioSnapshot;
pub use stress::{ScenarioImpact, ShockAttribution, StressScenario, StressTestResult};
