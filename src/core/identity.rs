//! Typed identity profile state.
//!
//! Profile columns are stored as JSON text. Every optional sub-field carries
//! `#[serde(default)]` so a missing or partially-shaped document parses into
//! usable defaults at the single deserialization site instead of being
//! re-checked wherever it is consumed.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaType {
    Professional,
    Dating,
    Social,
    Creative,
}

impl PersonaType {
    pub const ALL: [PersonaType; 4] = [
        PersonaType::Professional,
        PersonaType::Dating,
        PersonaType::Social,
        PersonaType::Creative,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PersonaType::Professional => "professional",
            PersonaType::Dating => "dating",
            PersonaType::Social => "social",
            PersonaType::Creative => "creative",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "professional" => Some(PersonaType::Professional),
            "dating" => Some(PersonaType::Dating),
            "social" => Some(PersonaType::Social),
            "creative" => Some(PersonaType::Creative),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub persona_type: PersonaType,
    pub headline: String,
    pub narrative: String,
    #[serde(default)]
    pub traits: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoreAttributes {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default)]
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AestheticState {
    #[serde(default)]
    pub style_keywords: Vec<String>,
    #[serde(default)]
    pub color_palette: Vec<String>,
    #[serde(default)]
    pub avoid: Vec<String>,
}

/// Accumulated feedback on generated content. The shape has grown over time;
/// older rows may be missing any of these fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningState {
    #[serde(default)]
    pub feedback_patterns: FeedbackPatterns,
    #[serde(default)]
    pub accepted_count: u64,
    #[serde(default)]
    pub rejected_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackPatterns {
    /// Tone name -> number of times the user kept content in that tone.
    #[serde(default)]
    pub tone_counts: BTreeMap<String, u64>,
    #[serde(default)]
    pub length_preference: Option<LengthPreference>,
    #[serde(default)]
    pub style_markers: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthPreference {
    Short,
    #[default]
    Medium,
    Long,
}

/// Advisory sync flag stored on the identity row. Transitions go through the
/// store's conditional update, never through a plain write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncLockState {
    Idle,
    InProgress,
}

impl SyncLockState {
    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "idle" => Some(SyncLockState::Idle),
            "in_progress" => Some(SyncLockState::InProgress),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IdentityProfile {
    pub user_id: String,
    pub display_name: String,
    pub core_attributes: CoreAttributes,
    pub aesthetic_state: AestheticState,
    pub learning_state: LearningState,
    pub identity_embedding: Option<Vec<f32>>,
    pub identity_version: i64,
    pub sync_status: SyncLockState,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parse a JSON profile column, falling back to the type's defaults when the
/// column is empty or malformed.
pub fn parse_profile_column<T: Default + serde::de::DeserializeOwned>(raw: &str) -> T {
    if raw.trim().is_empty() {
        return T::default();
    }
    serde_json::from_str(raw).unwrap_or_default()
}
