use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;

use riskbatch::config::BatchConfig;
use riskbatch::external::alphavantage::AlphaVantageSource;
use riskbatch::external::market_data_source::MarketDataSource;
use riskbatch::external::multi_source::MultiSource;
use riskbatch::external::simulated::SimulatedSource;
use riskbatch::jobs::orchestrator::BatchRunner;
use riskbatch::jobs::scheduler::BatchScheduler;
use riskbatch::logging::{init_logging, LoggingConfig};
use riskbatch::models::{EngineKind, JobStatus};
use riskbatch::services::calendar::UsEquityCalendar;
use riskbatch::services::failure_cache::FailureCache;
use riskbatch::services::rate_limiter::RateLimiter;
use riskbatch::state::EngineContext;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_logging(LoggingConfig::from_env())?;

    let database_url = std::env::var("DATABASE_URL")?;
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;

    let ctx = EngineContext {
        pool,
        source: build_source(),
        calendar: Arc::new(UsEquityCalendar),
        failure_cache: Arc::new(FailureCache::new()),
        rate_limiter: Arc::new(RateLimiter::new(3, 8)),
        config: BatchConfig::from_env(),
    };

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--schedule") {
        let mut scheduler = BatchScheduler::new(ctx).await?;
        scheduler.start().await?;
        tracing::info!("Scheduler running, Ctrl-C to stop");
        tokio::signal::ctrl_c().await?;
        scheduler.stop().await?;
        return Ok(());
    }

    let portfolio_id = flag_value(&args, "--portfolio")
        .map(|v| riskbatch::ids::ensure_id(&v))
        .transpose()?;
    let date = flag_value(&args, "--date")
        .map(|v| NaiveDate::parse_from_str(&v, "%Y-%m-%d"))
        .transpose()?;
    let engine = flag_value(&args, "--engine").and_then(|v| EngineKind::parse(&v));

    let runner = BatchRunner::new(ctx);

    let results = match (portfolio_id, date, engine) {
        (Some(pid), Some(d), Some(e)) => vec![runner.rerun_engine(pid, d, e).await],
        _ => {
            let engines = engine.map(|e| vec![e]);
            runner
                .run_daily_batch(portfolio_id, date, engines.as_deref())
                .await
        }
    };

    let failed = results
        .iter()
        .filter(|r| r.status == JobStatus::Failed)
        .count();
    for result in &results {
        tracing::info!(
            "{} / {} -> {} in {:.2}s{}",
            result.portfolio_id,
            result.engine,
            result.status,
            result.duration_seconds,
            result
                .error
                .as_deref()
                .map(|e| format!(" ({})", e))
                .unwrap_or_default()
        );
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn build_source() -> Arc<dyn MarketDataSource> {
    let mut sources: Vec<Box<dyn MarketDataSource>> = Vec::new();

    if let Ok(provider) = AlphaVantageSource::from_env() {
        sources.push(Box::new(provider));
    }

    let simulated_enabled = std::env::var("SIMULATED_MARKET_DATA")
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false);
    if simulated_enabled || sources.is_empty() {
        tracing::warn!("Using simulated market data source");
        sources.push(Box::new(SimulatedSource::new(20_240_601)));
    }

    Arc::new(MultiSource::new(sources))
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
