use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::modules::ModuleName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggeredBy {
    #[default]
    Manual,
    Auto,
    Feedback,
}

impl TriggeredBy {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggeredBy::Manual => "manual",
            TriggeredBy::Auto => "auto",
            TriggeredBy::Feedback => "feedback",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "manual" => Some(TriggeredBy::Manual),
            "auto" => Some(TriggeredBy::Auto),
            "feedback" => Some(TriggeredBy::Feedback),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleStatus {
    Completed,
    Failed,
}

/// Settled outcome of one module within one sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleResult {
    pub module: ModuleName,
    pub status: ModuleStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub items_processed: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ModuleResult {
    pub fn failed_now(module: ModuleName, error: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            module,
            status: ModuleStatus::Failed,
            started_at: now,
            completed_at: now,
            items_processed: 0,
            error: Some(error.into()),
        }
    }
}

pub type ModuleResultMap = BTreeMap<ModuleName, ModuleResult>;

/// Count of results that settled as completed.
pub fn completed_count(results: &ModuleResultMap) -> u32 {
    results
        .values()
        .filter(|r| r.status == ModuleStatus::Completed)
        .count() as u32
}

/// One sync attempt, durably recorded. Rows are never deleted; they form an
/// append-only history per user.
#[derive(Debug, Clone, Serialize)]
pub struct SyncJob {
    pub job_id: String,
    pub user_id: String,
    pub status: JobStatus,
    pub triggered_by: TriggeredBy,
    pub total_modules: u32,
    pub completed_modules: u32,
    pub current_module: Option<ModuleName>,
    pub module_results: ModuleResultMap,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncOptions {
    #[serde(default)]
    pub force: bool,
    #[serde(default)]
    pub triggered_by: TriggeredBy,
    #[serde(default)]
    pub skip_modules: Vec<ModuleName>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncOutcome {
    pub job: SyncJob,
    pub results: ModuleResultMap,
    pub duration_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncStatusReport {
    pub is_running: bool,
    pub current_job: Option<SyncJob>,
    pub last_sync: Option<SyncJob>,
    pub can_sync: bool,
    pub cooldown_remaining_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobPage {
    pub jobs: Vec<SyncJob>,
    pub total: u64,
}

/// Snapshot published after every module start/finish transition. `results`
/// holds settled results only; a running module shows up as
/// `current_module`.
#[derive(Debug, Clone, Serialize)]
pub struct SyncProgress {
    pub job_id: String,
    pub user_id: String,
    pub total_modules: u32,
    pub completed_modules: u32,
    pub current_module: Option<ModuleName>,
    pub results: ModuleResultMap,
}
