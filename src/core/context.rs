//! Per-sync snapshot of a user's profile.
//!
//! A [`GenerationContext`] is built once at the start of a sync (or retry),
//! never mutated afterwards, and owned by the call that built it. Modules see
//! only a [`ModuleContext`] projection of it.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::core::identity::{
    AestheticState, CoreAttributes, LearningState, LengthPreference, Persona, PersonaType,
};
use crate::core::modules::ModuleName;
use crate::core::store::Store;
use crate::core::store::types::{GenerationSummary, PhotoRecord};

#[derive(Debug, Clone, Serialize)]
pub struct GenerationContext {
    pub user_id: String,
    pub display_name: String,
    pub core_attributes: CoreAttributes,
    pub aesthetic_state: AestheticState,
    pub learning_state: LearningState,
    pub identity_embedding: Option<Vec<f32>>,
    pub identity_version: i64,
    /// All four persona slots, absent personas as `None`.
    pub personas: BTreeMap<PersonaType, Option<Persona>>,
    /// Primary photo first, then most recent first.
    pub photos: Vec<PhotoRecord>,
    /// Last K generations, summary fields only.
    pub recent_generations: Vec<GenerationSummary>,
    pub preferences: DerivedPreferences,
    pub built_at: DateTime<Utc>,
}

/// What one module gets to see. A pure projection of the full context; no
/// queries happen here.
#[derive(Debug, Clone, Serialize)]
pub struct ModuleContext {
    pub user_id: String,
    pub display_name: String,
    pub core_attributes: CoreAttributes,
    pub aesthetic_state: Option<AestheticState>,
    pub personas: BTreeMap<PersonaType, Option<Persona>>,
    pub photos: Vec<PhotoRecord>,
    pub recent_generations: Vec<GenerationSummary>,
    pub preferences: DerivedPreferences,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DerivedPreferences {
    /// Tone name -> normalized weight.
    pub tone_weights: BTreeMap<String, f64>,
    pub length_preference: LengthPreference,
    pub style_markers: Vec<String>,
}

/// Fold the free-form feedback history into generation preferences. No
/// feedback at all yields the neutral default weights.
pub fn derive_preferences(learning: &LearningState) -> DerivedPreferences {
    let patterns = &learning.feedback_patterns;

    let tone_weights = if patterns.tone_counts.is_empty() {
        BTreeMap::from([
            ("professional".to_string(), 1.0),
            ("friendly".to_string(), 1.0),
        ])
    } else {
        let total: u64 = patterns.tone_counts.values().sum();
        patterns
            .tone_counts
            .iter()
            .map(|(tone, count)| (tone.clone(), *count as f64 / total as f64))
            .collect()
    };

    DerivedPreferences {
        tone_weights,
        length_preference: patterns.length_preference.unwrap_or_default(),
        style_markers: patterns.style_markers.clone(),
    }
}

impl GenerationContext {
    /// Project the snapshot down to what `module` is allowed to see.
    pub fn module_context(&self, module: ModuleName) -> ModuleContext {
        let (aesthetic, persona_types, with_photos): (bool, &[PersonaType], bool) = match module {
            ModuleName::PhotoRanking => (true, &[], true),
            ModuleName::BioGenerator => (false, &PersonaType::ALL, false),
            ModuleName::CareerDocuments => (false, &[PersonaType::Professional], false),
            ModuleName::DatingContent => {
                (false, &[PersonaType::Dating, PersonaType::Social], true)
            }
            ModuleName::AestheticGuidance => {
                (true, &[PersonaType::Social, PersonaType::Creative], true)
            }
        };

        let personas = PersonaType::ALL
            .into_iter()
            .map(|pt| {
                let visible = persona_types.contains(&pt);
                let persona = if visible {
                    self.personas.get(&pt).cloned().flatten()
                } else {
                    None
                };
                (pt, persona)
            })
            .collect();

        ModuleContext {
            user_id: self.user_id.clone(),
            display_name: self.display_name.clone(),
            core_attributes: self.core_attributes.clone(),
            aesthetic_state: aesthetic.then(|| self.aesthetic_state.clone()),
            personas,
            photos: if with_photos {
                self.photos.clone()
            } else {
                Vec::new()
            },
            recent_generations: self.recent_generations.clone(),
            preferences: self.preferences.clone(),
        }
    }
}

pub struct ContextBuilder {
    store: Arc<Store>,
    recent_limit: usize,
}

impl ContextBuilder {
    pub fn new(store: Arc<Store>, recent_limit: usize) -> Self {
        Self {
            store,
            recent_limit,
        }
    }

    /// Assemble a fresh snapshot. `Ok(None)` means the user has no profile
    /// yet; callers treat that as a precondition failure, not an error.
    pub async fn build(&self, user_id: &str) -> Result<Option<GenerationContext>> {
        let Some(identity) = self.store.get_identity(user_id).await? else {
            return Ok(None);
        };

        let stored = self.store.get_personas(user_id).await?;
        let personas = PersonaType::ALL
            .into_iter()
            .map(|pt| (pt, stored.get(&pt).cloned()))
            .collect();

        let photos = self.store.list_photos(user_id).await?;
        let recent_generations = self
            .store
            .recent_generation_summaries(user_id, self.recent_limit)
            .await?;
        let preferences = derive_preferences(&identity.learning_state);

        Ok(Some(GenerationContext {
            user_id: identity.user_id,
            display_name: identity.display_name,
            core_attributes: identity.core_attributes,
            aesthetic_state: identity.aesthetic_state,
            learning_state: identity.learning_state,
            identity_embedding: identity.identity_embedding,
            identity_version: identity.identity_version,
            personas,
            photos,
            recent_generations,
            preferences,
            built_at: Utc::now(),
        }))
    }
}
