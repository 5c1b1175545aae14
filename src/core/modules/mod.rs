//! The five content generation modules and their registry.
//!
//! The orchestrator only knows this trait; each module owns its prompt text
//! and what it writes back to the store. A module invocation is atomic from
//! the orchestrator's point of view: it resolves with an item count or it
//! fails with an error message.

mod aesthetic;
mod bio;
mod career;
mod dating;
mod photo;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::context::ModuleContext;
use crate::core::llm::LlmClient;
use crate::core::store::Store;

pub use aesthetic::AestheticGuidanceModule;
pub use bio::BioGeneratorModule;
pub use career::CareerDocumentsModule;
pub use dating::DatingContentModule;
pub use photo::PhotoRankingModule;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ModuleName {
    PhotoRanking,
    BioGenerator,
    CareerDocuments,
    DatingContent,
    AestheticGuidance,
}

/// Launch order for a full sync. Progress delivery follows completion order,
/// not this order.
pub const ALL_MODULES: [ModuleName; 5] = [
    ModuleName::PhotoRanking,
    ModuleName::BioGenerator,
    ModuleName::CareerDocuments,
    ModuleName::DatingContent,
    ModuleName::AestheticGuidance,
];

impl ModuleName {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleName::PhotoRanking => "photo_ranking",
            ModuleName::BioGenerator => "bio_generator",
            ModuleName::CareerDocuments => "career_documents",
            ModuleName::DatingContent => "dating_content",
            ModuleName::AestheticGuidance => "aesthetic_guidance",
        }
    }

    pub fn from_name(value: &str) -> Option<Self> {
        match value {
            "photo_ranking" => Some(ModuleName::PhotoRanking),
            "bio_generator" => Some(ModuleName::BioGenerator),
            "career_documents" => Some(ModuleName::CareerDocuments),
            "dating_content" => Some(ModuleName::DatingContent),
            "aesthetic_guidance" => Some(ModuleName::AestheticGuidance),
            _ => None,
        }
    }
}

impl fmt::Display for ModuleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ModuleOutput {
    pub items_processed: u32,
}

#[async_trait]
pub trait GenerationModule: Send + Sync {
    fn name(&self) -> ModuleName;

    async fn generate(&self, user_id: &str, ctx: &ModuleContext) -> Result<ModuleOutput>;
}

pub struct ModuleRegistry {
    modules: BTreeMap<ModuleName, Arc<dyn GenerationModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self {
            modules: BTreeMap::new(),
        }
    }

    /// The production wiring: all five modules against one store and one
    /// LLM client.
    pub fn standard(store: Arc<Store>, llm: Arc<dyn LlmClient>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(PhotoRankingModule::new(store.clone(), llm.clone())));
        registry.register(Arc::new(BioGeneratorModule::new(store.clone(), llm.clone())));
        registry.register(Arc::new(CareerDocumentsModule::new(
            store.clone(),
            llm.clone(),
        )));
        registry.register(Arc::new(DatingContentModule::new(store.clone(), llm.clone())));
        registry.register(Arc::new(AestheticGuidanceModule::new(store, llm)));
        registry
    }

    pub fn register(&mut self, module: Arc<dyn GenerationModule>) {
        self.modules.insert(module.name(), module);
    }

    pub fn get(&self, name: ModuleName) -> Option<Arc<dyn GenerationModule>> {
        self.modules.get(&name).cloned()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Render the tone preference histogram for prompt text, heaviest tones
/// first.
pub(crate) fn tone_guidance(ctx: &ModuleContext) -> String {
    let mut tones: Vec<_> = ctx.preferences.tone_weights.iter().collect();
    tones.sort_by(|a, b| b.1.total_cmp(a.1));
    tones
        .iter()
        .map(|(tone, weight)| format!("{} ({:.2})", tone, weight))
        .collect::<Vec<_>>()
        .join(", ")
}
