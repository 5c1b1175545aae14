use anyhow::Result;
use rusqlite::params;

use super::{Store, now_ts};

impl Store {
    /// Append one lifecycle event to the audit log. Write-only from the
    /// orchestrator's point of view.
    pub async fn log_event(
        &self,
        user_id: &str,
        event_type: &str,
        payload: &serde_json::Value,
    ) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO events (user_id, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![user_id, event_type, payload.to_string(), now_ts()],
        )?;
        Ok(())
    }
}
