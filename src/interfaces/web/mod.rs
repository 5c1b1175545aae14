//! HTTP surface. Handlers deserialize, call into core, and map the error
//! taxonomy onto status codes. Streaming (progress and logs) rides
//! server-sent events over the broadcast channels core already emits on.

mod handlers;
mod router;

use std::sync::Arc;

use anyhow::Result;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::info;

use crate::core::store::Store;
use crate::core::sync::{ProgressBus, SyncOrchestrator};
use crate::error::SyncError;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<Store>,
    pub(crate) orchestrator: Arc<SyncOrchestrator>,
    pub(crate) progress: Arc<ProgressBus>,
    pub(crate) log_tx: tokio::sync::broadcast::Sender<String>,
    pub(crate) api_port: u16,
}

pub struct ApiServer {
    state: AppState,
    api_host: String,
    api_port: u16,
}

impl ApiServer {
    pub fn new(
        store: Arc<Store>,
        orchestrator: Arc<SyncOrchestrator>,
        log_tx: tokio::sync::broadcast::Sender<String>,
        api_host: String,
        api_port: u16,
    ) -> Self {
        let progress = orchestrator.progress_bus();
        Self {
            state: AppState {
                store,
                orchestrator,
                progress,
                log_tx,
                api_port,
            },
            api_host,
            api_port,
        }
    }

    pub async fn serve(self) -> Result<()> {
        let addr = format!("{}:{}", self.api_host, self.api_port);
        let app = router::build_api_router(self.state);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("mirra API running at http://{addr}");
        axum::serve(listener, app).await?;
        Ok(())
    }
}

/// `SyncError` carried across the handler boundary with its HTTP mapping.
pub(crate) struct ApiError(pub(crate) SyncError);

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            SyncError::ProfileNotFound(_) | SyncError::JobNotFound(_) => StatusCode::NOT_FOUND,
            SyncError::SyncInProgress(_) => StatusCode::CONFLICT,
            SyncError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
            SyncError::InvalidRetry { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = serde_json::json!({ "error": self.0.to_string() });
        if let SyncError::CooldownActive { remaining_ms, .. } = &self.0 {
            body["retry_after_ms"] = serde_json::json!(remaining_ms);
        }
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        Self(err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self(SyncError::Internal(err))
    }
}
