use thiserror::Error;

/// Orchestration-level failures surfaced to callers. Per-module failures are
/// never raised through this type; they are captured inside the job's result
/// map instead.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no identity profile exists for user '{0}'")]
    ProfileNotFound(String),

    #[error("a sync is already in progress for user '{0}'")]
    SyncInProgress(String),

    #[error("sync cooldown active for user '{user_id}', wait {remaining_ms} ms")]
    CooldownActive { user_id: String, remaining_ms: i64 },

    #[error("sync job '{0}' not found")]
    JobNotFound(String),

    #[error("job '{job_id}' cannot be retried: {reason}")]
    InvalidRetry { job_id: String, reason: String },

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
