//! Progress delivery.
//!
//! The executor reports transitions through [`ProgressSink`]; the
//! orchestrator's sink persists each snapshot into the job row and then
//! fans it out on a broadcast bus, so any number of consumers (the SSE
//! stream, tests, a logger) can subscribe without knowing about each other.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::warn;

use super::types::SyncProgress;
use crate::core::store::Store;

#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn publish(&self, progress: &SyncProgress);
}

pub struct ProgressBus {
    tx: broadcast::Sender<SyncProgress>,
}

impl ProgressBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncProgress> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl ProgressSink for ProgressBus {
    async fn publish(&self, progress: &SyncProgress) {
        // Ignored when no subscriber is listening.
        let _ = self.tx.send(progress.clone());
    }
}

/// Write-through sink used during a run: persist first so polling readers
/// and the stream never disagree, then broadcast.
pub(super) struct JobProgressWriter {
    pub(super) store: Arc<Store>,
    pub(super) bus: Arc<ProgressBus>,
}

#[async_trait]
impl ProgressSink for JobProgressWriter {
    async fn publish(&self, progress: &SyncProgress) {
        if let Err(e) = self
            .store
            .update_job_progress(
                &progress.job_id,
                progress.completed_modules,
                progress.current_module,
                &progress.results,
            )
            .await
        {
            warn!(job_id = %progress.job_id, "failed to persist sync progress: {e}");
        }
        self.bus.publish(progress).await;
    }
}
