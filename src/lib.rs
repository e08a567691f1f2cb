pub mod config;
pub mod db;
pub mod errors;
pub mod external;
pub mod ids;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod numeric;
pub mod services;
pub mod state;

pub use config::BatchConfig;
pub use errors::AppError;
pub use jobs::orchestrator::BatchRunner;
pub use state::EngineContext;
