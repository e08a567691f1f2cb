use chrono::{NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{BatchJob, EngineKind, JobStatus};

pub async fn insert_queued(
    pool: &PgPool,
    portfolio_id: Uuid,
    date: NaiveDate,
    engine: EngineKind,
) -> Result<Uuid, sqlx::Error> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO batch_jobs (id, portfolio_id, calculation_date, engine, status, retries)
         VALUES ($1, $2, $3, $4, $5, 0)",
    )
    .bind(id)
    .bind(portfolio_id)
    .bind(date)
    .bind(engine.as_str())
    .bind(JobStatus::Queued.as_str())
    .execute(pool)
    .await?;
    Ok(id)
}

pub async fn mark_running(pool: &PgPool, job_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE batch_jobs
         SET status = $2, started_at = $3
         WHERE id = $1 AND status = 'queued'",
    )
    .bind(job_id)
    .bind(JobStatus::Running.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;
    Ok(())
}

/// Terminal transition; the guard keeps terminal states absorbing.
pub async fn mark_finished(
    pool: &PgPool,
    job_id: Uuid,
    status: JobStatus,
    duration_seconds: f64,
    error: Option<&str>,
    retries: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE batch_jobs
         SET status = $2, completed_at = $3, duration_seconds = $4, error = $5, retries = $6
         WHERE id = $1 AND status IN ('queued', 'running')",
    )
    .bind(job_id)
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(duration_seconds)
    .bind(error)
    .bind(retries)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn fetch_for_portfolio_date(
    pool: &PgPool,
    portfolio_id: Uuid,
    date: NaiveDate,
) -> Result<Vec<BatchJob>, sqlx::Error> {
    sqlx::query_as::<_, BatchJob>(
        "SELECT id, portfolio_id, calculation_date, engine, status, started_at,
                completed_at, duration_seconds, error, retries, created_at
         FROM batch_jobs
         WHERE portfolio_id = $1 AND calculation_date = $2
         ORDER BY created_at",
    )
    .bind(portfolio_id)
    .bind(date)
    .fetch_all(pool)
    .await
}
