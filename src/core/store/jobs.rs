use anyhow::{Context, Result, anyhow};
use rusqlite::{OptionalExtension, params};

use super::{Store, now_ts, parse_opt_ts, parse_ts};
use crate::core::modules::ModuleName;
use crate::core::sync::types::{
    JobStatus, ModuleResultMap, SyncJob, TriggeredBy, completed_count,
};

const JOB_COLUMNS: &str = "job_id, user_id, status, triggered_by, total_modules, \
     completed_modules, current_module, module_results, started_at, completed_at, error";

struct JobRow {
    job_id: String,
    user_id: String,
    status: String,
    triggered_by: String,
    total_modules: i64,
    completed_modules: i64,
    current_module: Option<String>,
    module_results: String,
    started_at: String,
    completed_at: Option<String>,
    error: Option<String>,
}

impl JobRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            job_id: row.get(0)?,
            user_id: row.get(1)?,
            status: row.get(2)?,
            triggered_by: row.get(3)?,
            total_modules: row.get(4)?,
            completed_modules: row.get(5)?,
            current_module: row.get(6)?,
            module_results: row.get(7)?,
            started_at: row.get(8)?,
            completed_at: row.get(9)?,
            error: row.get(10)?,
        })
    }

    fn into_job(self) -> Result<SyncJob> {
        let status = JobStatus::from_status(&self.status)
            .ok_or_else(|| anyhow!("unknown job status '{}'", self.status))?;
        let triggered_by = TriggeredBy::from_name(&self.triggered_by)
            .ok_or_else(|| anyhow!("unknown trigger '{}'", self.triggered_by))?;
        let current_module = self.current_module.as_deref().and_then(ModuleName::from_name);
        let module_results: ModuleResultMap = serde_json::from_str(&self.module_results)
            .with_context(|| format!("parsing module results of job {}", self.job_id))?;
        Ok(SyncJob {
            status,
            triggered_by,
            current_module,
            module_results,
            total_modules: self.total_modules as u32,
            completed_modules: self.completed_modules as u32,
            started_at: parse_ts(&self.started_at)?,
            completed_at: parse_opt_ts(self.completed_at.as_deref())?,
            error: self.error,
            job_id: self.job_id,
            user_id: self.user_id,
        })
    }
}

impl Store {
    pub async fn create_job(
        &self,
        user_id: &str,
        triggered_by: TriggeredBy,
        total_modules: u32,
    ) -> Result<SyncJob> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO sync_jobs (job_id, user_id, status, triggered_by, total_modules,
                                    completed_modules, module_results, started_at)
             VALUES (?1, ?2, 'in_progress', ?3, ?4, 0, '{}', ?5)",
            params![
                job_id,
                user_id,
                triggered_by.as_str(),
                total_modules as i64,
                now_ts()
            ],
        )?;
        let row = db.query_row(
            &format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE job_id = ?1"),
            params![job_id],
            JobRow::from_row,
        )?;
        row.into_job()
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<SyncJob>> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM sync_jobs WHERE job_id = ?1 LIMIT 1"),
                params![job_id],
                JobRow::from_row,
            )
            .optional()?;
        row.map(JobRow::into_job).transpose()
    }

    /// Lookup scoped to the owning user; someone else's job id behaves like a
    /// missing job.
    pub async fn get_job_for_user(&self, job_id: &str, user_id: &str) -> Result<Option<SyncJob>> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM sync_jobs
                     WHERE job_id = ?1 AND user_id = ?2 LIMIT 1"
                ),
                params![job_id, user_id],
                JobRow::from_row,
            )
            .optional()?;
        row.map(JobRow::into_job).transpose()
    }

    pub async fn newest_job_with_status(
        &self,
        user_id: &str,
        status: JobStatus,
    ) -> Result<Option<SyncJob>> {
        let db = self.db.lock().await;
        let row = db
            .query_row(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM sync_jobs
                     WHERE user_id = ?1 AND status = ?2
                     ORDER BY started_at DESC LIMIT 1"
                ),
                params![user_id, status.as_str()],
                JobRow::from_row,
            )
            .optional()?;
        row.map(JobRow::into_job).transpose()
    }

    /// Newest first.
    pub async fn list_jobs(
        &self,
        user_id: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<SyncJob>, u64)> {
        let db = self.db.lock().await;
        let total: i64 = db.query_row(
            "SELECT COUNT(*) FROM sync_jobs WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;

        let mut stmt = db.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM sync_jobs WHERE user_id = ?1
             ORDER BY started_at DESC LIMIT ?2 OFFSET ?3"
        ))?;
        let rows = stmt.query_map(
            params![user_id, limit as i64, offset as i64],
            JobRow::from_row,
        )?;

        let mut jobs = Vec::new();
        for row in rows {
            jobs.push(row?.into_job()?);
        }
        Ok((jobs, total as u64))
    }

    /// Write-through progress update: flushed on every module transition so
    /// polling readers see near-real-time state.
    pub async fn update_job_progress(
        &self,
        job_id: &str,
        completed_modules: u32,
        current_module: Option<ModuleName>,
        results: &ModuleResultMap,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE sync_jobs
             SET completed_modules = ?2, current_module = ?3, module_results = ?4
             WHERE job_id = ?1 AND status = 'in_progress'",
            params![
                job_id,
                completed_modules as i64,
                current_module.map(|m| m.as_str()),
                serde_json::to_string(results)?,
            ],
        )?;
        Ok(rows > 0)
    }

    /// Move an in-progress job to its terminal status. The status guard makes
    /// the terminal transition happen at most once even when a stale-failed
    /// run races its own late completion.
    pub async fn finalize_job(
        &self,
        job_id: &str,
        status: JobStatus,
        results: &ModuleResultMap,
        error: Option<&str>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE sync_jobs
             SET status = ?2, module_results = ?3, completed_modules = ?4,
                 current_module = NULL, completed_at = ?5, error = ?6
             WHERE job_id = ?1 AND status = 'in_progress'",
            params![
                job_id,
                status.as_str(),
                serde_json::to_string(results)?,
                completed_count(results) as i64,
                now_ts(),
                error,
            ],
        )?;
        Ok(rows > 0)
    }

    /// In-place rewrite of a terminal job after a retry. The job does not
    /// revisit `in_progress`; started/completed timestamps stay as the
    /// original run wrote them.
    pub async fn update_job_results(
        &self,
        job_id: &str,
        status: JobStatus,
        results: &ModuleResultMap,
        error: Option<&str>,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE sync_jobs
             SET status = ?2, module_results = ?3, completed_modules = ?4,
                 current_module = NULL, error = ?5
             WHERE job_id = ?1",
            params![
                job_id,
                status.as_str(),
                serde_json::to_string(results)?,
                completed_count(results) as i64,
                error,
            ],
        )?;
        Ok(rows > 0)
    }

    #[cfg(test)]
    pub(crate) async fn set_job_started_at(
        &self,
        job_id: &str,
        started_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE sync_jobs SET started_at = ?2 WHERE job_id = ?1",
            params![job_id, started_at.to_rfc3339()],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) async fn set_job_completed_at(
        &self,
        job_id: &str,
        completed_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "UPDATE sync_jobs SET completed_at = ?2 WHERE job_id = ?1",
            params![job_id, completed_at.to_rfc3339()],
        )?;
        Ok(())
    }
}
