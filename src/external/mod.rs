pub mod alphavantage;
pub mod market_data_source;
pub mod multi_source;
pub mod simulated;
