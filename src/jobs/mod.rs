//! Batch execution layer: the sequential per-portfolio orchestrator and the
//! cron wiring that triggers it after market close.
//!
//! Jobs here are designed to be:
//! - Idempotent: re-running a (portfolio, date) pair overwrites the same rows
//! - Fault-tolerant: every engine failure becomes a JobResult, never a panic
//! - Observable: each engine run leaves a batch_jobs audit row

pub mod orchestrator;
pub mod scheduler;
