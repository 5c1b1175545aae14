use anyhow::Result;
use rusqlite::params;

use super::types::GenerationSummary;
use super::{Store, now_ts, parse_ts};

impl Store {
    pub async fn add_generated_content(
        &self,
        user_id: &str,
        content_type: &str,
        body: &str,
    ) -> Result<String> {
        let content_id = uuid::Uuid::new_v4().to_string();
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO generated_content (content_id, user_id, content_type, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![content_id, user_id, content_type, body, now_ts()],
        )?;
        Ok(content_id)
    }

    /// Last `limit` generations, newest first, summary fields only.
    pub async fn recent_generation_summaries(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<GenerationSummary>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT content_id, content_type, created_at FROM generated_content
             WHERE user_id = ?1 ORDER BY created_at DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![user_id, limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (content_id, content_type, created_at) = row?;
            out.push(GenerationSummary {
                content_id,
                content_type,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(out)
    }
}
