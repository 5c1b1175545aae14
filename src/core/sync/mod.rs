//! Sync orchestration.
//!
//! One sync run regenerates every piece of derived content for a user from a
//! single immutable profile snapshot. The orchestrator serializes attempts
//! per user through a conditional update on the identity row, records each
//! attempt as a durable job, drives the module executor, and always releases
//! the lock when the attempt settles.

pub mod executor;
mod progress;
pub mod types;

use std::sync::Arc;
use std::time::Instant;

use anyhow::anyhow;
use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};

use crate::core::context::ContextBuilder;
use crate::core::modules::ModuleRegistry;
use crate::core::store::Store;
use crate::error::{SyncError, SyncResult};
use executor::{ExecutionPlan, ModuleExecutor};
use progress::JobProgressWriter;

pub use progress::{ProgressBus, ProgressSink};
pub use types::{
    JobPage, JobStatus, ModuleResult, ModuleResultMap, ModuleStatus, SyncJob, SyncOptions,
    SyncOutcome, SyncProgress, SyncStatusReport, TriggeredBy,
};

/// Job status state machine: `in_progress` settles exactly once.
pub fn can_transition(from: JobStatus, to: JobStatus) -> bool {
    match from {
        JobStatus::InProgress => matches!(to, JobStatus::Completed | JobStatus::Failed),
        JobStatus::Completed | JobStatus::Failed => false,
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncTuning {
    /// Minimum interval between two completed syncs unless forced.
    pub cooldown_ms: i64,
    /// Age past which an in-progress job is presumed abandoned.
    pub stale_lock_timeout_ms: i64,
    /// How many recent generation summaries a context carries.
    pub recent_generations: usize,
}

impl Default for SyncTuning {
    fn default() -> Self {
        Self {
            cooldown_ms: 5 * 60 * 1000,
            stale_lock_timeout_ms: 60 * 1000,
            recent_generations: 10,
        }
    }
}

pub struct SyncOrchestrator {
    store: Arc<Store>,
    contexts: ContextBuilder,
    executor: ModuleExecutor,
    bus: Arc<ProgressBus>,
    tuning: SyncTuning,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<ModuleRegistry>,
        bus: Arc<ProgressBus>,
        tuning: SyncTuning,
    ) -> Self {
        Self {
            contexts: ContextBuilder::new(store.clone(), tuning.recent_generations),
            executor: ModuleExecutor::new(registry),
            store,
            bus,
            tuning,
        }
    }

    pub fn progress_bus(&self) -> Arc<ProgressBus> {
        self.bus.clone()
    }

    /// Run a full sync for one user. Per-module failures never fail this
    /// call; they land in the job's result map and flip its terminal status
    /// to failed.
    pub async fn trigger_sync_all(
        &self,
        user_id: &str,
        options: SyncOptions,
    ) -> SyncResult<SyncOutcome> {
        self.check_prerequisites(user_id, &options).await?;

        if !self.store.begin_sync(user_id).await? {
            return Err(SyncError::SyncInProgress(user_id.to_string()));
        }

        let run = self.run_locked(user_id, &options).await;

        // Release path runs for every outcome so a thrown error never leaves
        // the user unable to sync again.
        if let Err(e) = self.store.finish_sync(user_id).await {
            warn!(user_id, "failed to release sync lock: {e}");
        }

        run
    }

    async fn check_prerequisites(&self, user_id: &str, options: &SyncOptions) -> SyncResult<()> {
        if let Some(job) = self
            .store
            .newest_job_with_status(user_id, JobStatus::InProgress)
            .await?
        {
            let age_ms = (Utc::now() - job.started_at).num_milliseconds();
            if age_ms < self.tuning.stale_lock_timeout_ms {
                return Err(SyncError::SyncInProgress(user_id.to_string()));
            }
            // Presumed abandoned: fail it and reclaim the lock. Its tasks are
            // not cancelled; the terminal-once guard keeps any late
            // completion from rewriting this job.
            warn!(user_id, job_id = %job.job_id, age_ms, "auto-failing stale sync job");
            self.store
                .finalize_job(
                    &job.job_id,
                    JobStatus::Failed,
                    &job.module_results,
                    Some("sync timed out"),
                )
                .await?;
            self.store.release_sync(user_id).await?;
        }

        if !options.force
            && let Some(last) = self
                .store
                .newest_job_with_status(user_id, JobStatus::Completed)
                .await?
            && let Some(completed_at) = last.completed_at
        {
            let elapsed_ms = (Utc::now() - completed_at).num_milliseconds();
            let remaining_ms = self.tuning.cooldown_ms - elapsed_ms;
            if remaining_ms > 0 {
                return Err(SyncError::CooldownActive {
                    user_id: user_id.to_string(),
                    remaining_ms,
                });
            }
        }

        if self.store.get_identity(user_id).await?.is_none() {
            return Err(SyncError::ProfileNotFound(user_id.to_string()));
        }

        Ok(())
    }

    async fn run_locked(&self, user_id: &str, options: &SyncOptions) -> SyncResult<SyncOutcome> {
        let run_started = Instant::now();
        let plan = ExecutionPlan::select(None, &options.skip_modules);

        let job = self
            .store
            .create_job(user_id, options.triggered_by, plan.modules.len() as u32)
            .await?;
        info!(user_id, job_id = %job.job_id, modules = plan.modules.len(), "sync triggered");

        if let Err(e) = self
            .store
            .log_event(
                user_id,
                "sync_triggered",
                &serde_json::json!({
                    "job_id": job.job_id,
                    "triggered_by": options.triggered_by.as_str(),
                    "modules": plan.modules.iter().map(|m| m.as_str()).collect::<Vec<_>>(),
                }),
            )
            .await
        {
            warn!(user_id, "failed to log sync_triggered event: {e}");
        }

        // The prerequisite check saw a profile, but it may have been deleted
        // in the window since.
        let context = match self.contexts.build(user_id).await? {
            Some(ctx) => Arc::new(ctx),
            None => {
                self.store
                    .finalize_job(
                        &job.job_id,
                        JobStatus::Failed,
                        &ModuleResultMap::new(),
                        Some("identity profile disappeared during sync"),
                    )
                    .await?;
                return Err(SyncError::ProfileNotFound(user_id.to_string()));
            }
        };

        let sink = JobProgressWriter {
            store: self.store.clone(),
            bus: self.bus.clone(),
        };
        let results = self
            .executor
            .run(&job.job_id, user_id, context, &plan.modules, &sink)
            .await;

        let (final_status, error) = settle_status(&results);
        let current = self.store.get_job(&job.job_id).await?;
        if let Some(current) = current
            && can_transition(current.status, final_status)
        {
            self.store
                .finalize_job(&job.job_id, final_status, &results, error.as_deref())
                .await?;
        } else {
            warn!(job_id = %job.job_id, "job already settled, keeping stored terminal state");
        }

        let event = match final_status {
            JobStatus::Failed => "sync_failed",
            _ => "sync_completed",
        };
        if let Err(e) = self
            .store
            .log_event(
                user_id,
                event,
                &serde_json::json!({ "job_id": job.job_id, "status": final_status.as_str() }),
            )
            .await
        {
            warn!(user_id, "failed to log {event} event: {e}");
        }

        let job = self
            .store
            .get_job(&job.job_id)
            .await?
            .ok_or_else(|| anyhow!("sync job disappeared during finalization"))?;
        info!(user_id, job_id = %job.job_id, status = job.status.as_str(), "sync settled");

        Ok(SyncOutcome {
            job,
            results,
            duration_ms: run_started.elapsed().as_millis() as i64,
        })
    }

    /// Pure read; never mutates lock or job state.
    pub async fn get_sync_status(&self, user_id: &str) -> SyncResult<SyncStatusReport> {
        let current_job = self
            .store
            .newest_job_with_status(user_id, JobStatus::InProgress)
            .await?;
        let last_sync = self
            .store
            .newest_job_with_status(user_id, JobStatus::Completed)
            .await?;

        let cooldown_remaining_ms = last_sync
            .as_ref()
            .and_then(|job| job.completed_at)
            .map(|completed_at| {
                (self.tuning.cooldown_ms - (Utc::now() - completed_at).num_milliseconds()).max(0)
            })
            .unwrap_or(0);

        let is_running = current_job.is_some();
        Ok(SyncStatusReport {
            is_running,
            can_sync: !is_running && cooldown_remaining_ms == 0,
            current_job,
            last_sync,
            cooldown_remaining_ms,
        })
    }

    pub async fn get_sync_job(&self, job_id: &str, user_id: &str) -> SyncResult<Option<SyncJob>> {
        Ok(self.store.get_job_for_user(job_id, user_id).await?)
    }

    pub async fn list_sync_jobs(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> SyncResult<JobPage> {
        let (jobs, total) = self.store.list_jobs(user_id, limit, offset).await?;
        Ok(JobPage { jobs, total })
    }

    /// Re-execute only the failed modules of a settled job, in place. The
    /// context is rebuilt fresh so profile edits made since the original run
    /// are picked up. The job never revisits `in_progress` and the per-user
    /// lock is not taken.
    pub async fn retry_sync_job(&self, job_id: &str, user_id: &str) -> SyncResult<SyncOutcome> {
        let run_started = Instant::now();

        let job = self
            .store
            .get_job_for_user(job_id, user_id)
            .await?
            .ok_or_else(|| SyncError::JobNotFound(job_id.to_string()))?;

        if job.status == JobStatus::InProgress {
            return Err(SyncError::InvalidRetry {
                job_id: job_id.to_string(),
                reason: "job is still in progress".to_string(),
            });
        }
        let failed_modules = job
            .module_results
            .values()
            .filter(|r| r.status == ModuleStatus::Failed)
            .count();
        if failed_modules == 0 {
            return Err(SyncError::InvalidRetry {
                job_id: job_id.to_string(),
                reason: "no failed modules".to_string(),
            });
        }

        let context = self
            .contexts
            .build(user_id)
            .await?
            .ok_or_else(|| SyncError::ProfileNotFound(user_id.to_string()))?;

        info!(user_id, job_id, failed_modules, "retrying failed sync modules");
        if let Err(e) = self
            .store
            .log_event(
                user_id,
                "sync_retry_triggered",
                &serde_json::json!({ "job_id": job_id, "failed_modules": failed_modules }),
            )
            .await
        {
            warn!(user_id, "failed to log sync_retry_triggered event: {e}");
        }

        let sink = JobProgressWriter {
            store: self.store.clone(),
            bus: self.bus.clone(),
        };
        let results = self
            .executor
            .retry_failed(job_id, user_id, Arc::new(context), &job.module_results, &sink)
            .await;

        let (status, error) = settle_status(&results);
        self.store
            .update_job_results(job_id, status, &results, error.as_deref())
            .await?;

        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| anyhow!("sync job disappeared during retry"))?;

        Ok(SyncOutcome {
            job,
            results,
            duration_ms: run_started.elapsed().as_millis() as i64,
        })
    }
}

/// Terminal status for a settled result map: failed when any module is.
fn settle_status(results: &ModuleResultMap) -> (JobStatus, Option<String>) {
    let failed = results
        .values()
        .filter(|r| r.status == ModuleStatus::Failed)
        .count();
    if failed > 0 {
        (
            JobStatus::Failed,
            Some(format!("{failed} of {} modules failed", results.len())),
        )
    } else {
        (JobStatus::Completed, None)
    }
}

#[cfg(test)]
mod tests;
