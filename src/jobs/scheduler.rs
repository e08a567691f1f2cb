use tokio_cron_scheduler::{Job, JobScheduler};
use tracing::{error, info};

use crate::errors::AppError;
use crate::jobs::orchestrator::BatchRunner;
use crate::state::EngineContext;

/// Cron wiring around the daily batch. The batch itself gates the weekly
/// correlation engine and the trading-day snapshot; this only decides when
/// the whole sequence fires.
pub struct BatchScheduler {
    scheduler: JobScheduler,
    ctx: EngineContext,
}

impl BatchScheduler {
    pub async fn new(ctx: EngineContext) -> Result<Self, AppError> {
        let scheduler = JobScheduler::new()
            .await
            .map_err(|e| AppError::External(format!("Failed to create scheduler: {}", e)))?;

        Ok(Self { scheduler, ctx })
    }

    pub async fn start(&mut self) -> Result<(), AppError> {
        info!("🚀 Starting batch scheduler...");

        // Test mode runs the batch every minute instead of after the close
        let test_mode = std::env::var("BATCH_SCHEDULER_TEST_MODE")
            .unwrap_or_else(|_| "false".to_string())
            .parse::<bool>()
            .unwrap_or(false);

        let schedule = if test_mode { "0 */1 * * * *" } else { "0 10 17 * * *" };
        let description = if test_mode {
            "Every minute (TEST MODE)"
        } else {
            "Daily at 5:10 PM"
        };

        let ctx = self.ctx.clone();
        let job = Job::new_async(schedule, move |_uuid, _lock| {
            let ctx = ctx.clone();
            Box::pin(async move {
                info!("⏰ Scheduled daily batch firing");
                let runner = BatchRunner::new(ctx);
                let results = runner.run_daily_batch(None, None, None).await;
                let failed = results
                    .iter()
                    .filter(|r| r.status == crate::models::JobStatus::Failed)
                    .count();
                if failed > 0 {
                    error!("Scheduled batch finished with {} failed jobs", failed);
                }
            })
        })
        .map_err(|e| AppError::External(format!("Failed to build batch job: {}", e)))?;

        self.scheduler
            .add(job)
            .await
            .map_err(|e| AppError::External(format!("Failed to schedule batch job: {}", e)))?;

        self.scheduler
            .start()
            .await
            .map_err(|e| AppError::External(format!("Failed to start scheduler: {}", e)))?;

        info!("✅ Batch scheduler started ({})", description);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), AppError> {
        info!("🛑 Stopping batch scheduler...");
        self.scheduler
            .shutdown()
            .await
            .map_err(|e| AppError::External(format!("Failed to stop scheduler: {}", e)))?;
        info!("✅ Batch scheduler stopped");
        Ok(())
    }
}
