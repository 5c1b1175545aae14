//! Durable state: identity profiles, personas, photos, generated content,
//! sync jobs, and the audit event log, all in one sqlite database behind an
//! async mutex. Timestamps are RFC 3339 TEXT written by this process.

mod content;
mod events;
mod identity;
mod jobs;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tokio::sync::Mutex;

pub struct Store {
    db: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = Connection::open(path.as_ref())
            .with_context(|| format!("opening database at {}", path.as_ref().display()))?;
        Self::init(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(db: Connection) -> Result<Self> {
        db.execute(
            "CREATE TABLE IF NOT EXISTS identities (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                core_attributes TEXT NOT NULL DEFAULT '{}',
                aesthetic_state TEXT NOT NULL DEFAULT '{}',
                learning_state TEXT NOT NULL DEFAULT '{}',
                identity_embedding TEXT,
                identity_version INTEGER NOT NULL DEFAULT 1,
                sync_status TEXT NOT NULL DEFAULT 'idle',
                last_synced_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS personas (
                user_id TEXT NOT NULL,
                persona_type TEXT NOT NULL,
                headline TEXT NOT NULL,
                narrative TEXT NOT NULL,
                traits TEXT NOT NULL DEFAULT '[]',
                updated_at TEXT NOT NULL,
                PRIMARY KEY (user_id, persona_type)
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS photos (
                photo_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                url TEXT NOT NULL,
                is_primary INTEGER NOT NULL DEFAULT 0,
                rank_score REAL,
                uploaded_at TEXT NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS generated_content (
                content_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                content_type TEXT NOT NULL,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS sync_jobs (
                job_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                triggered_by TEXT NOT NULL,
                total_modules INTEGER NOT NULL,
                completed_modules INTEGER NOT NULL DEFAULT 0,
                current_module TEXT,
                module_results TEXT NOT NULL DEFAULT '{}',
                started_at TEXT NOT NULL,
                completed_at TEXT,
                error TEXT
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                event_type TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        // Schema-level backstop for the one-running-sync-per-user invariant.
        db.execute(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_jobs_one_running
             ON sync_jobs(user_id) WHERE status = 'in_progress'",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_sync_jobs_user_started
             ON sync_jobs(user_id, started_at)",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_photos_user ON photos(user_id)",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_generated_content_user_created
             ON generated_content(user_id, created_at)",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_events_user_id ON events(user_id, id)",
            [],
        )?;

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }
}

pub(crate) fn now_ts() -> String {
    Utc::now().to_rfc3339()
}

pub(crate) fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("invalid timestamp '{raw}'"))?;
    Ok(parsed.with_timezone(&Utc))
}

pub(crate) fn parse_opt_ts(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(parse_ts).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::{AestheticState, CoreAttributes, LearningState, SyncLockState};
    use crate::core::sync::types::TriggeredBy;

    const USER: &str = "user-1";

    async fn store_with_profile() -> Store {
        let store = Store::open_in_memory().expect("in-memory store");
        store
            .upsert_profile(
                USER,
                "Test User",
                &CoreAttributes::default(),
                &AestheticState::default(),
                &LearningState::default(),
                None,
            )
            .await
            .expect("seed profile");
        store
    }

    #[tokio::test]
    async fn database_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mirra.db");
        {
            let store = Store::open(&path).expect("open");
            store
                .upsert_profile(
                    USER,
                    "Test User",
                    &CoreAttributes::default(),
                    &AestheticState::default(),
                    &LearningState::default(),
                    None,
                )
                .await
                .expect("seed profile");
        }

        let store = Store::open(&path).expect("reopen");
        let identity = store
            .get_identity(USER)
            .await
            .expect("read")
            .expect("identity survives reopen");
        assert_eq!(identity.display_name, "Test User");
    }

    #[tokio::test]
    async fn sync_lock_is_a_conditional_update() {
        let store = store_with_profile().await;

        assert!(store.begin_sync(USER).await.expect("first acquire"));
        assert!(!store.begin_sync(USER).await.expect("second acquire"));

        assert!(store.release_sync(USER).await.expect("release"));
        assert!(store.begin_sync(USER).await.expect("reacquire"));

        // Locking a nonexistent profile acquires nothing.
        assert!(!store.begin_sync("nobody").await.expect("no profile"));
    }

    #[tokio::test]
    async fn finish_sync_releases_and_stamps_last_synced_at() {
        let store = store_with_profile().await;
        assert!(store.begin_sync(USER).await.expect("acquire"));
        assert!(store.finish_sync(USER).await.expect("finish"));

        let identity = store
            .get_identity(USER)
            .await
            .expect("read")
            .expect("identity");
        assert_eq!(identity.sync_status, SyncLockState::Idle);
        assert!(identity.last_synced_at.is_some());
    }

    #[tokio::test]
    async fn schema_rejects_a_second_running_job_per_user() {
        let store = store_with_profile().await;
        store
            .create_job(USER, TriggeredBy::Manual, 5)
            .await
            .expect("first running job");
        assert!(
            store.create_job(USER, TriggeredBy::Manual, 5).await.is_err(),
            "partial unique index must reject a second in_progress job"
        );
    }

    #[tokio::test]
    async fn upsert_bumps_version_and_preserves_lock_state() {
        let store = store_with_profile().await;
        assert!(store.begin_sync(USER).await.expect("acquire"));

        let updated = store
            .upsert_profile(
                USER,
                "Renamed",
                &CoreAttributes::default(),
                &AestheticState::default(),
                &LearningState::default(),
                None,
            )
            .await
            .expect("update profile");

        assert_eq!(updated.identity_version, 2);
        assert_eq!(updated.display_name, "Renamed");
        assert_eq!(updated.sync_status, SyncLockState::InProgress);
    }

    #[tokio::test]
    async fn photos_list_primary_first_then_newest() {
        let store = store_with_profile().await;
        let old = store
            .add_photo(USER, "https://example.test/old.jpg", false)
            .await
            .expect("old photo");
        // Distinct timestamps; rfc3339 text ordering must separate them.
        {
            let db = store.db.lock().await;
            db.execute(
                "UPDATE photos SET uploaded_at = ?2 WHERE photo_id = ?1",
                rusqlite::params![
                    old.photo_id,
                    (Utc::now() - chrono::Duration::seconds(60)).to_rfc3339()
                ],
            )
            .expect("backdate");
        }
        let newer = store
            .add_photo(USER, "https://example.test/new.jpg", false)
            .await
            .expect("new photo");
        let primary = store
            .add_photo(USER, "https://example.test/primary.jpg", true)
            .await
            .expect("primary photo");

        let photos = store.list_photos(USER).await.expect("list");
        let ids: Vec<&str> = photos.iter().map(|p| p.photo_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                primary.photo_id.as_str(),
                newer.photo_id.as_str(),
                old.photo_id.as_str()
            ]
        );
    }

    #[tokio::test]
    async fn adding_a_primary_photo_demotes_the_previous_one() {
        let store = store_with_profile().await;
        let first = store
            .add_photo(USER, "https://example.test/a.jpg", true)
            .await
            .expect("first primary");
        let second = store
            .add_photo(USER, "https://example.test/b.jpg", true)
            .await
            .expect("second primary");

        let photos = store.list_photos(USER).await.expect("list");
        assert_eq!(photos[0].photo_id, second.photo_id);
        assert!(photos[0].is_primary);
        assert!(
            !photos
                .iter()
                .find(|p| p.photo_id == first.photo_id)
                .expect("first photo")
                .is_primary
        );
    }

    #[tokio::test]
    async fn recent_generation_summaries_are_capped_and_newest_first() {
        let store = store_with_profile().await;
        for i in 0..4 {
            let id = store
                .add_generated_content(USER, "bio_professional", &format!("body {i}"))
                .await
                .expect("content");
            let db = store.db.lock().await;
            db.execute(
                "UPDATE generated_content SET created_at = ?2 WHERE content_id = ?1",
                rusqlite::params![
                    id,
                    (Utc::now() - chrono::Duration::seconds(100 - i)).to_rfc3339()
                ],
            )
            .expect("spread timestamps");
        }

        let summaries = store
            .recent_generation_summaries(USER, 3)
            .await
            .expect("summaries");
        assert_eq!(summaries.len(), 3);
        assert!(summaries.windows(2).all(|w| w[0].created_at >= w[1].created_at));
    }
}
