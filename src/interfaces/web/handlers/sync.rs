use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use super::super::{ApiError, AppState};
use crate::core::sync::{JobPage, SyncJob, SyncOptions, SyncOutcome, SyncStatusReport};
use crate::error::SyncError;

pub async fn trigger_sync(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
    payload: Option<Json<SyncOptions>>,
) -> Result<Json<SyncOutcome>, ApiError> {
    let options = payload.map(|Json(o)| o).unwrap_or_default();
    let outcome = state.orchestrator.trigger_sync_all(&user_id, options).await?;
    Ok(Json(outcome))
}

pub async fn get_status(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<SyncStatusReport>, ApiError> {
    Ok(Json(state.orchestrator.get_sync_status(&user_id).await?))
}

#[derive(serde::Deserialize)]
pub struct JobsQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

pub async fn list_jobs(
    Path(user_id): Path<String>,
    Query(query): Query<JobsQuery>,
    State(state): State<AppState>,
) -> Result<Json<JobPage>, ApiError> {
    let page = state
        .orchestrator
        .list_sync_jobs(
            &user_id,
            query.limit.unwrap_or(20).min(100),
            query.offset.unwrap_or(0),
        )
        .await?;
    Ok(Json(page))
}

pub async fn get_job(
    Path((user_id, job_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<SyncJob>, ApiError> {
    let job = state
        .orchestrator
        .get_sync_job(&job_id, &user_id)
        .await?
        .ok_or(SyncError::JobNotFound(job_id))?;
    Ok(Json(job))
}

pub async fn retry_job(
    Path((user_id, job_id)): Path<(String, String)>,
    State(state): State<AppState>,
) -> Result<Json<SyncOutcome>, ApiError> {
    let outcome = state.orchestrator.retry_sync_job(&job_id, &user_id).await?;
    Ok(Json(outcome))
}

/// Server-push stream of this user's progress snapshots.
pub async fn sse_progress(
    Path(user_id): Path<String>,
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.progress.subscribe();
    let stream = BroadcastStream::new(receiver).filter_map(move |msg| match msg {
        Ok(progress) if progress.user_id == user_id => {
            let data = serde_json::to_string(&progress).unwrap_or_else(|_| "{}".to_string());
            Some(Ok(Event::default().data(data)))
        }
        Ok(_) => None,
        Err(_) => Some(Ok(Event::default().data("progress stream lagged"))),
    });
    Sse::new(stream)
}

pub async fn sse_logs(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.log_tx.subscribe();
    let stream = BroadcastStream::new(receiver).map(|msg| match msg {
        Ok(line) => Ok(Event::default().data(line)),
        Err(_) => Ok(Event::default().data("log stream lagged")),
    });
    Sse::new(stream)
}
