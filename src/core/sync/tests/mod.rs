mod executor;
mod state_machine;
mod status;

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::core::context::{GenerationContext, ModuleContext, derive_preferences};
use crate::core::identity::{
    AestheticState, CoreAttributes, LearningState, Persona, PersonaType,
};
use crate::core::modules::{
    ALL_MODULES, GenerationModule, ModuleName, ModuleOutput, ModuleRegistry,
};
use crate::core::store::Store;
use crate::core::sync::{ProgressBus, ProgressSink, SyncOrchestrator, SyncProgress, SyncTuning};

pub(super) const USER: &str = "user-1";

#[derive(Clone)]
pub(super) enum StubBehavior {
    Succeed { items: u32, delay_ms: u64 },
    Fail { message: &'static str, delay_ms: u64 },
    /// Fails the first call, succeeds afterwards.
    FailOnce { items: u32 },
    Panic,
}

pub(super) struct StubModule {
    name: ModuleName,
    behavior: StubBehavior,
    calls: AtomicU32,
    /// Display name observed on each invocation; lets tests confirm a retry
    /// saw a freshly built context.
    pub(super) seen_names: std::sync::Mutex<Vec<String>>,
}

impl StubModule {
    pub(super) fn new(name: ModuleName, behavior: StubBehavior) -> Self {
        Self {
            name,
            behavior,
            calls: AtomicU32::new(0),
            seen_names: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl GenerationModule for StubModule {
    fn name(&self) -> ModuleName {
        self.name
    }

    async fn generate(&self, _user_id: &str, ctx: &ModuleContext) -> Result<ModuleOutput> {
        self.seen_names
            .lock()
            .expect("seen_names lock")
            .push(ctx.display_name.clone());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            StubBehavior::Succeed { items, delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                Ok(ModuleOutput {
                    items_processed: *items,
                })
            }
            StubBehavior::Fail { message, delay_ms } => {
                tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                Err(anyhow!(*message))
            }
            StubBehavior::FailOnce { items } => {
                if call == 0 {
                    Err(anyhow!("transient failure"))
                } else {
                    Ok(ModuleOutput {
                        items_processed: *items,
                    })
                }
            }
            StubBehavior::Panic => panic!("stub module panicked"),
        }
    }
}

pub(super) fn stub_registry(behaviors: &[(ModuleName, StubBehavior)]) -> Arc<ModuleRegistry> {
    let mut registry = ModuleRegistry::new();
    for (name, behavior) in behaviors {
        registry.register(Arc::new(StubModule::new(*name, behavior.clone())));
    }
    Arc::new(registry)
}

pub(super) fn all_succeed_registry() -> Arc<ModuleRegistry> {
    stub_registry(&ALL_MODULES.map(|m| (m, StubBehavior::Succeed { items: 1, delay_ms: 2 })))
}

pub(super) fn persona(persona_type: PersonaType) -> Persona {
    Persona {
        persona_type,
        headline: format!("{} headline", persona_type.as_str()),
        narrative: "a narrative".to_string(),
        traits: vec!["curious".to_string()],
    }
}

pub(super) async fn seeded_store(user_id: &str) -> Arc<Store> {
    let store = Arc::new(Store::open_in_memory().expect("in-memory store"));
    store
        .upsert_profile(
            user_id,
            "Test User",
            &CoreAttributes::default(),
            &AestheticState::default(),
            &LearningState::default(),
            None,
        )
        .await
        .expect("seed profile");
    store
        .set_persona(user_id, &persona(PersonaType::Professional))
        .await
        .expect("seed professional persona");
    store
        .set_persona(user_id, &persona(PersonaType::Dating))
        .await
        .expect("seed dating persona");
    store
        .add_photo(user_id, "https://example.test/a.jpg", true)
        .await
        .expect("seed photo");
    store
}

pub(super) fn orchestrator(
    store: Arc<Store>,
    registry: Arc<ModuleRegistry>,
) -> SyncOrchestrator {
    SyncOrchestrator::new(
        store,
        registry,
        Arc::new(ProgressBus::new(64)),
        SyncTuning::default(),
    )
}

/// Context for driving the executor directly, without a store.
pub(super) fn bare_context(user_id: &str) -> Arc<GenerationContext> {
    Arc::new(GenerationContext {
        user_id: user_id.to_string(),
        display_name: "Test User".to_string(),
        core_attributes: CoreAttributes::default(),
        aesthetic_state: AestheticState::default(),
        learning_state: LearningState::default(),
        identity_embedding: None,
        identity_version: 1,
        personas: PersonaType::ALL.into_iter().map(|pt| (pt, None)).collect(),
        photos: Vec::new(),
        recent_generations: Vec::new(),
        preferences: derive_preferences(&LearningState::default()),
        built_at: Utc::now(),
    })
}

/// Records every published snapshot for assertions.
#[derive(Default)]
pub(super) struct CollectSink {
    pub(super) snapshots: Mutex<Vec<SyncProgress>>,
}

#[async_trait]
impl ProgressSink for CollectSink {
    async fn publish(&self, progress: &SyncProgress) {
        self.snapshots.lock().await.push(progress.clone());
    }
}
