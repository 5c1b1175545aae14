use axum::{
    Json,
    extract::{Path, State},
};

use super::super::{ApiError, AppState};
use crate::core::identity::{
    AestheticState, CoreAttributes, IdentityProfile, LearningState, Persona, PersonaType,
};
use crate::core::store::types::PhotoRecord;

#[derive(serde::Deserialize)]
pub struct UpsertProfileRequest {
    pub display_name: String,
    #[serde(default)]
    pub core_attributes: CoreAttributes,
    #[serde(default)]
    pub aesthetic_state: AestheticState,
    #[serde(default)]
    pub learning_state: LearningState,
    #[serde(default)]
    pub identity_embedding: Option<Vec<f32>>,
}

pub async fn upsert_profile(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<UpsertProfileRequest>,
) -> Result<Json<IdentityProfile>, ApiError> {
    let profile = state
        .store
        .upsert_profile(
            &user_id,
            payload.display_name.trim(),
            &payload.core_attributes,
            &payload.aesthetic_state,
            &payload.learning_state,
            payload.identity_embedding.as_deref(),
        )
        .await?;
    Ok(Json(profile))
}

#[derive(serde::Deserialize)]
pub struct SetPersonaRequest {
    pub headline: String,
    pub narrative: String,
    #[serde(default)]
    pub traits: Vec<String>,
}

pub async fn set_persona(
    Path((user_id, persona_type)): Path<(String, PersonaType)>,
    State(state): State<AppState>,
    Json(payload): Json<SetPersonaRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let persona = Persona {
        persona_type,
        headline: payload.headline,
        narrative: payload.narrative,
        traits: payload.traits,
    };
    state.store.set_persona(&user_id, &persona).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(serde::Deserialize)]
pub struct AddPhotoRequest {
    pub url: String,
    #[serde(default)]
    pub is_primary: bool,
}

pub async fn add_photo(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    Json(payload): Json<AddPhotoRequest>,
) -> Result<Json<PhotoRecord>, ApiError> {
    let photo = state
        .store
        .add_photo(&user_id, &payload.url, payload.is_primary)
        .await?;
    Ok(Json(photo))
}
