use chrono::{Datelike, NaiveDate, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, timeout, Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::db::{batch_job_queries, portfolio_queries, position_queries};
use crate::errors::{AppError, ErrorClass};
use crate::models::{EngineKind, JobResult, JobStatus};
use crate::services::snapshot_service::SnapshotResult;
use crate::services::{
    aggregation_service, correlation_service, factor_service, greeks_service,
    market_data_service, market_risk_service, snapshot_service, stress_service,
    valuation_service,
};
use crate::state::EngineContext;

/// Sequential daily-batch driver. One portfolio at a time, engines in a
/// fixed order within it; parallel portfolio processing is off the table
/// because the persistence layer's session lifecycle does not survive
/// concurrent use of a shared pool.
pub struct BatchRunner {
    ctx: EngineContext,
    cancel: Arc<AtomicBool>,
}

struct EngineRun {
    status: JobStatus,
    warnings: Vec<String>,
}

impl BatchRunner {
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flip this to stop the batch at the next job boundary.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// Run the full engine sequence for one portfolio (or every portfolio
    /// with positions) on the given date. Errors never propagate out; each
    /// job lands in the returned results and the batch_jobs audit table.
    pub async fn run_daily_batch(
        &self,
        portfolio_id: Option<Uuid>,
        date: Option<NaiveDate>,
        engines: Option<&[EngineKind]>,
    ) -> Vec<JobResult> {
        let date = date.unwrap_or_else(|| Utc::now().date_naive());
        let selected: Vec<EngineKind> = match engines {
            Some(list) => list.to_vec(),
            None => EngineKind::all().to_vec(),
        };

        let portfolios = match portfolio_id {
            Some(id) => vec![id],
            None => match portfolio_queries::fetch_ids_with_positions(&self.ctx.pool).await {
                Ok(ids) => ids,
                Err(e) => {
                    error!("Cannot enumerate portfolios, batch aborted: {}", e);
                    return Vec::new();
                }
            },
        };

        info!(
            "🚀 Daily batch starting for {} portfolio(s) on {}",
            portfolios.len(),
            date
        );

        let batch_deadline =
            Instant::now() + Duration::from_secs(self.ctx.config.batch_timeout_secs);
        let mut results = Vec::new();

        'portfolios: for pid in portfolios {
            if Instant::now() > batch_deadline {
                warn!("Batch timeout reached, remaining portfolios not scheduled");
                break;
            }

            // Warnings accumulated across this portfolio's engines ride into
            // the snapshot metadata
            let mut portfolio_warnings: Vec<String> = Vec::new();

            for engine in &selected {
                if self.cancel.load(Ordering::SeqCst) {
                    warn!("Batch cancelled before {} for portfolio {}", engine, pid);
                    if let Ok(job_id) =
                        batch_job_queries::insert_queued(&self.ctx.pool, pid, date, *engine).await
                    {
                        let _ = batch_job_queries::mark_finished(
                            &self.ctx.pool,
                            job_id,
                            JobStatus::Failed,
                            0.0,
                            Some("cancelled"),
                            0,
                        )
                        .await;
                    }
                    results.push(JobResult {
                        portfolio_id: pid,
                        engine: *engine,
                        status: JobStatus::Failed,
                        duration_seconds: 0.0,
                        error: Some("cancelled".to_string()),
                        warnings: Vec::new(),
                        retries: 0,
                    });
                    break 'portfolios;
                }

                let result = self
                    .run_job(pid, date, *engine, &portfolio_warnings, false)
                    .await;
                portfolio_warnings.extend(result.warnings.iter().cloned());

                let critical = result
                    .error
                    .as_deref()
                    .map(is_critical_error_text)
                    .unwrap_or(false);
                results.push(result);

                if critical {
                    error!(
                        "Critical failure on {} for portfolio {}, moving to next portfolio",
                        engine, pid
                    );
                    continue 'portfolios;
                }
            }
        }

        let completed = results
            .iter()
            .filter(|r| r.status == JobStatus::Completed)
            .count();
        info!(
            "🏁 Daily batch finished: {}/{} jobs completed",
            completed,
            results.len()
        );

        results
    }

    /// Re-run a single engine for one (portfolio, date), bypassing the
    /// weekday gate on correlations.
    pub async fn rerun_engine(
        &self,
        portfolio_id: Uuid,
        date: NaiveDate,
        engine: EngineKind,
    ) -> JobResult {
        self.run_job(portfolio_id, date, engine, &[], true).await
    }

    async fn run_job(
        &self,
        portfolio_id: Uuid,
        date: NaiveDate,
        engine: EngineKind,
        prior_warnings: &[String],
        force: bool,
    ) -> JobResult {
        let started = Instant::now();
        let mut retries: u32 = 0;

        let mut result = JobResult {
            portfolio_id,
            engine,
            status: JobStatus::Failed,
            duration_seconds: 0.0,
            error: None,
            warnings: Vec::new(),
            retries: 0,
        };

        // Audit row; failing to write it is itself a store problem
        let job_id = match batch_job_queries::insert_queued(&self.ctx.pool, portfolio_id, date, engine)
            .await
        {
            Ok(id) => id,
            Err(e) => {
                result.error = Some(format!("cannot record batch job: {}", e));
                result.duration_seconds = started.elapsed().as_secs_f64();
                return result;
            }
        };

        // Validation: the portfolio must exist and hold at least one position
        match self.validate_portfolio(portfolio_id).await {
            Ok(()) => {}
            Err(e) => {
                let msg = e.to_string();
                error!(
                    "Validation failed for portfolio {} ({}): {}",
                    portfolio_id, engine, msg
                );
                let _ = batch_job_queries::mark_finished(
                    &self.ctx.pool,
                    job_id,
                    JobStatus::Failed,
                    started.elapsed().as_secs_f64(),
                    Some(&msg),
                    0,
                )
                .await;
                result.error = Some(msg);
                result.duration_seconds = started.elapsed().as_secs_f64();
                return result;
            }
        }

        // Weekly gate: correlations only run on the configured weekday
        if engine == EngineKind::Correlations
            && !force
            && date.weekday() != self.ctx.config.correlation_weekday
        {
            info!(
                "Correlations scheduled for {:?}, skipping on {}",
                self.ctx.config.correlation_weekday, date
            );
            let _ = batch_job_queries::mark_finished(
                &self.ctx.pool,
                job_id,
                JobStatus::Skipped,
                started.elapsed().as_secs_f64(),
                Some("not correlation day"),
                0,
            )
            .await;
            result.status = JobStatus::Skipped;
            result.duration_seconds = started.elapsed().as_secs_f64();
            return result;
        }

        if let Err(e) = batch_job_queries::mark_running(&self.ctx.pool, job_id).await {
            warn!("Cannot mark job {} running: {}", job_id, e);
        }

        let soft_timeout = Duration::from_secs(self.ctx.config.engine_timeout_secs);

        loop {
            let attempt = timeout(
                soft_timeout,
                self.invoke_engine(engine, portfolio_id, date, prior_warnings),
            )
            .await
            .unwrap_or(Err(AppError::Timeout(self.ctx.config.engine_timeout_secs)));

            match attempt {
                Ok(run) => {
                    result.status = run.status;
                    result.warnings = run.warnings;
                    if run.status == JobStatus::Skipped && engine == EngineKind::Snapshot {
                        result.error = Some("not a trading day".to_string());
                    }
                    break;
                }
                Err(e) if e.classification() == ErrorClass::Transient
                    && retries < self.ctx.config.max_retries =>
                {
                    retries += 1;
                    let delay = Duration::from_secs(
                        self.ctx.config.retry_base_secs * 2u64.pow(retries - 1),
                    );
                    warn!(
                        "Transient failure on {} for portfolio {} (attempt {}/{}): {}. Retrying in {:?}",
                        engine, portfolio_id, retries, self.ctx.config.max_retries, e, delay
                    );
                    sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        "Engine {} failed for portfolio {} on {}: {}",
                        engine, portfolio_id, date, e
                    );
                    result.status = JobStatus::Failed;
                    result.error = Some(e.to_string());
                    break;
                }
            }
        }

        result.retries = retries;
        result.duration_seconds = started.elapsed().as_secs_f64();

        let _ = batch_job_queries::mark_finished(
            &self.ctx.pool,
            job_id,
            result.status,
            result.duration_seconds,
            result.error.as_deref(),
            retries as i32,
        )
        .await;

        result
    }

    async fn validate_portfolio(&self, portfolio_id: Uuid) -> Result<(), AppError> {
        if !portfolio_queries::exists(&self.ctx.pool, portfolio_id).await? {
            return Err(AppError::NotFound(format!(
                "portfolio {} does not exist",
                portfolio_id
            )));
        }
        let count = position_queries::count_for_portfolio(&self.ctx.pool, portfolio_id).await?;
        if count == 0 {
            return Err(AppError::Validation(format!(
                "portfolio {} has no positions",
                portfolio_id
            )));
        }
        Ok(())
    }

    async fn invoke_engine(
        &self,
        engine: EngineKind,
        portfolio_id: Uuid,
        date: NaiveDate,
        prior_warnings: &[String],
    ) -> Result<EngineRun, AppError> {
        let ctx = &self.ctx;

        match engine {
            EngineKind::MarketData => {
                let symbols = position_queries::fetch_symbols(&ctx.pool, portfolio_id).await?;
                let outcome = market_data_service::refresh_portfolio_data(ctx, &symbols, date).await?;
                Ok(EngineRun {
                    status: JobStatus::Completed,
                    warnings: outcome.warnings,
                })
            }
            EngineKind::Valuation => {
                let outcome = valuation_service::revalue_portfolio(ctx, portfolio_id, date).await?;
                Ok(EngineRun {
                    status: JobStatus::Completed,
                    warnings: outcome.warnings,
                })
            }
            EngineKind::Exposures | EngineKind::Aggregation => {
                let views = valuation_service::load_position_views(ctx, portfolio_id, date).await?;
                let (exposures, greeks, _) = aggregation_service::aggregate_cached(
                    portfolio_id,
                    date,
                    &views,
                    ctx.config.delta_adjust_mode,
                );
                let mut warnings = exposures.metadata.warnings;
                if engine == EngineKind::Aggregation {
                    warnings.extend(greeks.metadata.warnings);
                }
                Ok(EngineRun {
                    status: JobStatus::Completed,
                    warnings,
                })
            }
            EngineKind::Greeks => {
                let outcome = greeks_service::run_greeks_engine(ctx, portfolio_id, date).await?;
                Ok(EngineRun {
                    status: JobStatus::Completed,
                    warnings: outcome.errors,
                })
            }
            EngineKind::Factors => {
                let outcome = factor_service::run_factor_engine(ctx, portfolio_id, date).await?;
                Ok(EngineRun {
                    status: JobStatus::Completed,
                    warnings: outcome.warnings,
                })
            }
            EngineKind::MarketRisk => {
                let (_, warnings) =
                    market_risk_service::run_market_risk_engine(ctx, portfolio_id, date).await?;
                Ok(EngineRun {
                    status: JobStatus::Completed,
                    warnings,
                })
            }
            EngineKind::StressTests => {
                let outcome = stress_service::run_stress_engine(ctx, portfolio_id, date, &[]).await?;
                Ok(EngineRun {
                    status: JobStatus::Completed,
                    warnings: outcome.warnings,
                })
            }
            EngineKind::Correlations => {
                let outcome =
                    correlation_service::run_correlation_engine(ctx, portfolio_id, date).await?;
                Ok(EngineRun {
                    status: JobStatus::Completed,
                    warnings: outcome.warnings,
                })
            }
            EngineKind::Snapshot => {
                let (snapshot, warnings) =
                    snapshot_service::run_snapshot_engine(ctx, portfolio_id, date, prior_warnings)
                        .await?;
                Ok(EngineRun {
                    status: match snapshot {
                        SnapshotResult::Skipped => JobStatus::Skipped,
                        SnapshotResult::Written { .. } => JobStatus::Completed,
                    },
                    warnings,
                })
            }
        }
    }
}

/// Schema-missing and unreachable-store failures abandon the portfolio
/// instead of marching through engines that cannot possibly succeed.
fn is_critical_error_text(error: &str) -> bool {
    let error = error.to_ascii_lowercase();
    (error.contains("relation") && error.contains("does not exist"))
        || error.contains("pool timed out")
        || error.contains("pool closed")
        || error.contains("connection refused")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_error_detection() {
        assert!(is_critical_error_text(
            "error returned from database: relation \"positions\" does not exist"
        ));
        assert!(is_critical_error_text("pool timed out while waiting for an open connection"));
        assert!(!is_critical_error_text("no market price for AAPL"));
    }
}
