use std::collections::BTreeMap;

use anyhow::{Context, Result, anyhow};
use rusqlite::{Connection, OptionalExtension, params};

use super::types::PhotoRecord;
use super::{Store, now_ts, parse_opt_ts, parse_ts};
use crate::core::identity::{
    AestheticState, CoreAttributes, IdentityProfile, LearningState, Persona, PersonaType,
    SyncLockState, parse_profile_column,
};

const IDENTITY_COLUMNS: &str = "user_id, display_name, core_attributes, aesthetic_state, \
     learning_state, identity_embedding, identity_version, sync_status, last_synced_at, \
     created_at, updated_at";

struct IdentityRow {
    user_id: String,
    display_name: String,
    core_attributes: String,
    aesthetic_state: String,
    learning_state: String,
    identity_embedding: Option<String>,
    identity_version: i64,
    sync_status: String,
    last_synced_at: Option<String>,
    created_at: String,
    updated_at: String,
}

impl IdentityRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            user_id: row.get(0)?,
            display_name: row.get(1)?,
            core_attributes: row.get(2)?,
            aesthetic_state: row.get(3)?,
            learning_state: row.get(4)?,
            identity_embedding: row.get(5)?,
            identity_version: row.get(6)?,
            sync_status: row.get(7)?,
            last_synced_at: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_profile(self) -> Result<IdentityProfile> {
        let sync_status = SyncLockState::from_status(&self.sync_status)
            .ok_or_else(|| anyhow!("unknown sync status '{}'", self.sync_status))?;
        let identity_embedding = self
            .identity_embedding
            .as_deref()
            .map(serde_json::from_str::<Vec<f32>>)
            .transpose()
            .context("parsing identity embedding")?;
        Ok(IdentityProfile {
            sync_status,
            identity_embedding,
            display_name: self.display_name,
            core_attributes: parse_profile_column::<CoreAttributes>(&self.core_attributes),
            aesthetic_state: parse_profile_column::<AestheticState>(&self.aesthetic_state),
            learning_state: parse_profile_column::<LearningState>(&self.learning_state),
            identity_version: self.identity_version,
            last_synced_at: parse_opt_ts(self.last_synced_at.as_deref())?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            user_id: self.user_id,
        })
    }
}

fn query_identity(db: &Connection, user_id: &str) -> Result<Option<IdentityProfile>> {
    let row = db
        .query_row(
            &format!("SELECT {IDENTITY_COLUMNS} FROM identities WHERE user_id = ?1 LIMIT 1"),
            params![user_id],
            IdentityRow::from_row,
        )
        .optional()?;
    row.map(IdentityRow::into_profile).transpose()
}

impl Store {
    /// Create or replace the editable profile fields. The sync lock and
    /// `last_synced_at` are never touched here; the version bumps on every
    /// update so contexts can record which shape they saw.
    pub async fn upsert_profile(
        &self,
        user_id: &str,
        display_name: &str,
        core_attributes: &CoreAttributes,
        aesthetic_state: &AestheticState,
        learning_state: &LearningState,
        identity_embedding: Option<&[f32]>,
    ) -> Result<IdentityProfile> {
        let db = self.db.lock().await;
        let now = now_ts();
        let embedding_json = identity_embedding
            .map(serde_json::to_string)
            .transpose()?;
        db.execute(
            "INSERT INTO identities (user_id, display_name, core_attributes, aesthetic_state,
                                     learning_state, identity_embedding, sync_status,
                                     created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'idle', ?7, ?7)
             ON CONFLICT(user_id) DO UPDATE SET
                 display_name = excluded.display_name,
                 core_attributes = excluded.core_attributes,
                 aesthetic_state = excluded.aesthetic_state,
                 learning_state = excluded.learning_state,
                 identity_embedding = COALESCE(excluded.identity_embedding, identities.identity_embedding),
                 identity_version = identities.identity_version + 1,
                 updated_at = excluded.updated_at",
            params![
                user_id,
                display_name,
                serde_json::to_string(core_attributes)?,
                serde_json::to_string(aesthetic_state)?,
                serde_json::to_string(learning_state)?,
                embedding_json,
                now,
            ],
        )?;
        query_identity(&db, user_id)?.ok_or_else(|| anyhow!("identity row missing after upsert"))
    }

    pub async fn get_identity(&self, user_id: &str) -> Result<Option<IdentityProfile>> {
        let db = self.db.lock().await;
        query_identity(&db, user_id)
    }

    /// Atomic lock acquire: flips the identity's sync flag only when it is
    /// currently idle. Returns false when another sync holds it (or the
    /// profile does not exist).
    pub async fn begin_sync(&self, user_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE identities SET sync_status = 'in_progress', updated_at = ?2
             WHERE user_id = ?1 AND sync_status = 'idle'",
            params![user_id, now_ts()],
        )?;
        Ok(rows > 0)
    }

    /// Drop the lock without marking a successful sync. Used when reclaiming
    /// the lock of a stale, abandoned run.
    pub async fn release_sync(&self, user_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE identities SET sync_status = 'idle', updated_at = ?2 WHERE user_id = ?1",
            params![user_id, now_ts()],
        )?;
        Ok(rows > 0)
    }

    /// Unconditional lock release at the end of a sync attempt, stamping
    /// `last_synced_at`.
    pub async fn finish_sync(&self, user_id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let now = now_ts();
        let rows = db.execute(
            "UPDATE identities SET sync_status = 'idle', last_synced_at = ?2, updated_at = ?2
             WHERE user_id = ?1",
            params![user_id, now],
        )?;
        Ok(rows > 0)
    }

    pub async fn set_persona(&self, user_id: &str, persona: &Persona) -> Result<()> {
        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO personas (user_id, persona_type, headline, narrative, traits, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(user_id, persona_type) DO UPDATE SET
                 headline = excluded.headline,
                 narrative = excluded.narrative,
                 traits = excluded.traits,
                 updated_at = excluded.updated_at",
            params![
                user_id,
                persona.persona_type.as_str(),
                persona.headline,
                persona.narrative,
                serde_json::to_string(&persona.traits)?,
                now_ts(),
            ],
        )?;
        Ok(())
    }

    pub async fn get_personas(&self, user_id: &str) -> Result<BTreeMap<PersonaType, Persona>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT persona_type, headline, narrative, traits FROM personas WHERE user_id = ?1",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut out = BTreeMap::new();
        for row in rows {
            let (type_name, headline, narrative, traits) = row?;
            let Some(persona_type) = PersonaType::from_name(&type_name) else {
                continue; // unknown type written by a newer version
            };
            out.insert(
                persona_type,
                Persona {
                    persona_type,
                    headline,
                    narrative,
                    traits: serde_json::from_str(&traits).unwrap_or_default(),
                },
            );
        }
        Ok(out)
    }

    pub async fn add_photo(
        &self,
        user_id: &str,
        url: &str,
        is_primary: bool,
    ) -> Result<PhotoRecord> {
        let db = self.db.lock().await;
        if is_primary {
            db.execute(
                "UPDATE photos SET is_primary = 0 WHERE user_id = ?1",
                params![user_id],
            )?;
        }
        let photo_id = uuid::Uuid::new_v4().to_string();
        let uploaded_at = now_ts();
        db.execute(
            "INSERT INTO photos (photo_id, user_id, url, is_primary, uploaded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![photo_id, user_id, url, is_primary as i64, uploaded_at],
        )?;
        Ok(PhotoRecord {
            photo_id,
            user_id: user_id.to_string(),
            url: url.to_string(),
            is_primary,
            rank_score: None,
            uploaded_at: parse_ts(&uploaded_at)?,
        })
    }

    /// Primary photo first, then newest first.
    pub async fn list_photos(&self, user_id: &str) -> Result<Vec<PhotoRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT photo_id, user_id, url, is_primary, rank_score, uploaded_at FROM photos
             WHERE user_id = ?1 ORDER BY is_primary DESC, uploaded_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, Option<f64>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (photo_id, user_id, url, is_primary, rank_score, uploaded_at) = row?;
            out.push(PhotoRecord {
                photo_id,
                user_id,
                url,
                is_primary: is_primary != 0,
                rank_score,
                uploaded_at: parse_ts(&uploaded_at)?,
            });
        }
        Ok(out)
    }

    pub async fn set_photo_rank(&self, photo_id: &str, score: f64) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "UPDATE photos SET rank_score = ?2 WHERE photo_id = ?1",
            params![photo_id, score],
        )?;
        Ok(rows > 0)
    }
}
