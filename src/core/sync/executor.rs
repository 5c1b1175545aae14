//! Module fan-out/fan-in.
//!
//! Every requested module runs as its own task; a task that fails (or
//! panics) settles to a failed [`ModuleResult`] without disturbing its
//! siblings. Progress snapshots are emitted in completion order, which is
//! unrelated to launch order.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::progress::ProgressSink;
use super::types::{ModuleResult, ModuleResultMap, ModuleStatus, SyncProgress, completed_count};
use crate::core::context::GenerationContext;
use crate::core::modules::{ALL_MODULES, ModuleName, ModuleRegistry};

/// The set of modules one run will execute, in launch order.
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub modules: Vec<ModuleName>,
}

impl ExecutionPlan {
    /// `requested = None` means all modules. Skips are applied after the
    /// request filter; order always follows `ALL_MODULES`.
    pub fn select(requested: Option<&[ModuleName]>, skip: &[ModuleName]) -> Self {
        let modules = ALL_MODULES
            .into_iter()
            .filter(|m| requested.is_none_or(|list| list.contains(m)))
            .filter(|m| !skip.contains(m))
            .collect();
        Self { modules }
    }
}

pub struct ModuleExecutor {
    registry: Arc<ModuleRegistry>,
}

impl ModuleExecutor {
    pub fn new(registry: Arc<ModuleRegistry>) -> Self {
        Self { registry }
    }

    pub async fn run(
        &self,
        job_id: &str,
        user_id: &str,
        context: Arc<GenerationContext>,
        modules: &[ModuleName],
        sink: &dyn ProgressSink,
    ) -> ModuleResultMap {
        self.run_with_seed(job_id, user_id, context, modules, ModuleResultMap::new(), sink)
            .await
    }

    /// Re-execute only the failed entries of a previous run. Completed
    /// entries pass through untouched, original timestamps included; the
    /// merged map keeps every original key.
    pub async fn retry_failed(
        &self,
        job_id: &str,
        user_id: &str,
        context: Arc<GenerationContext>,
        previous: &ModuleResultMap,
        sink: &dyn ProgressSink,
    ) -> ModuleResultMap {
        let failed: Vec<ModuleName> = previous
            .values()
            .filter(|r| r.status == ModuleStatus::Failed)
            .map(|r| r.module)
            .collect();
        let seed: ModuleResultMap = previous
            .iter()
            .filter(|(_, r)| r.status == ModuleStatus::Completed)
            .map(|(m, r)| (*m, r.clone()))
            .collect();
        self.run_with_seed(job_id, user_id, context, &failed, seed, sink)
            .await
    }

    async fn run_with_seed(
        &self,
        job_id: &str,
        user_id: &str,
        context: Arc<GenerationContext>,
        modules: &[ModuleName],
        seed: ModuleResultMap,
        sink: &dyn ProgressSink,
    ) -> ModuleResultMap {
        let mut results = seed;
        let total = (results.len() + modules.len()) as u32;

        let (started_tx, mut started_rx) = mpsc::unbounded_channel::<ModuleName>();
        let mut set: JoinSet<(ModuleName, ModuleResult)> = JoinSet::new();
        let mut task_modules: HashMap<tokio::task::Id, ModuleName> = HashMap::new();

        for &name in modules {
            let Some(module) = self.registry.get(name) else {
                warn!(job_id, module = %name, "module not registered, recording failure");
                results.insert(name, ModuleResult::failed_now(name, "module not registered"));
                continue;
            };
            let context = context.clone();
            let started_tx = started_tx.clone();
            let user_id = user_id.to_string();
            let handle = set.spawn(async move {
                let _ = started_tx.send(name);
                let started_at = Utc::now();
                let module_ctx = context.module_context(name);
                let result = match module.generate(&user_id, &module_ctx).await {
                    Ok(output) => ModuleResult {
                        module: name,
                        status: ModuleStatus::Completed,
                        started_at,
                        completed_at: Utc::now(),
                        items_processed: output.items_processed,
                        error: None,
                    },
                    Err(e) => ModuleResult {
                        module: name,
                        status: ModuleStatus::Failed,
                        started_at,
                        completed_at: Utc::now(),
                        items_processed: 0,
                        error: Some(e.to_string()),
                    },
                };
                (name, result)
            });
            task_modules.insert(handle.id(), name);
        }
        drop(started_tx);

        let mut started_order: Vec<ModuleName> = Vec::new();
        let mut running: BTreeSet<ModuleName> = BTreeSet::new();

        loop {
            tokio::select! {
                biased;
                Some(name) = started_rx.recv() => {
                    debug!(job_id, module = %name, "module started");
                    started_order.push(name);
                    running.insert(name);
                    let snap = snapshot(job_id, user_id, total, &results, current(&started_order, &running));
                    sink.publish(&snap).await;
                }
                joined = set.join_next_with_id() => {
                    let Some(joined) = joined else { break };
                    let (name, result) = match joined {
                        Ok((_, pair)) => pair,
                        Err(join_err) => {
                            // A panicking module task still settles to a failed result.
                            let Some(name) = task_modules.get(&join_err.id()).copied() else {
                                warn!(job_id, "unattributable module task failure: {join_err}");
                                continue;
                            };
                            (
                                name,
                                ModuleResult::failed_now(
                                    name,
                                    format!("module task panicked: {join_err}"),
                                ),
                            )
                        }
                    };
                    if result.status == ModuleStatus::Failed {
                        warn!(
                            job_id,
                            module = %name,
                            error = result.error.as_deref().unwrap_or(""),
                            "module failed"
                        );
                    } else {
                        debug!(job_id, module = %name, items = result.items_processed, "module completed");
                    }
                    running.remove(&name);
                    results.insert(name, result);
                    let snap = snapshot(job_id, user_id, total, &results, current(&started_order, &running));
                    sink.publish(&snap).await;
                }
            }
        }

        results
    }
}

/// Most recently started module that is still running.
fn current(started_order: &[ModuleName], running: &BTreeSet<ModuleName>) -> Option<ModuleName> {
    started_order.iter().rev().copied().find(|m| running.contains(m))
}

fn snapshot(
    job_id: &str,
    user_id: &str,
    total: u32,
    results: &ModuleResultMap,
    current_module: Option<ModuleName>,
) -> SyncProgress {
    SyncProgress {
        job_id: job_id.to_string(),
        user_id: user_id.to_string(),
        total_modules: total,
        completed_modules: completed_count(results),
        current_module,
        results: results.clone(),
    }
}
