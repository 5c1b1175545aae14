use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoRecord {
    pub photo_id: String,
    pub user_id: String,
    pub url: String,
    pub is_primary: bool,
    pub rank_score: Option<f64>,
    pub uploaded_at: DateTime<Utc>,
}

/// Summary view of one generated piece; the body never travels into a sync
/// context.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationSummary {
    pub content_id: String,
    pub content_type: String,
    pub created_at: DateTime<Utc>,
}
