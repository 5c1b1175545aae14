use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{GenerationModule, ModuleName, ModuleOutput, tone_guidance};
use crate::core::context::ModuleContext;
use crate::core::identity::PersonaType;
use crate::core::llm::LlmClient;
use crate::core::store::Store;

const SYSTEM: &str = "You write career documents. Output only the requested document, \
                      no preamble.";

/// Resume summary and a headline, from the professional persona when one
/// exists, otherwise from core attributes alone.
pub struct CareerDocumentsModule {
    store: Arc<Store>,
    llm: Arc<dyn LlmClient>,
}

impl CareerDocumentsModule {
    pub fn new(store: Arc<Store>, llm: Arc<dyn LlmClient>) -> Self {
        Self { store, llm }
    }

    fn base_prompt(&self, ctx: &ModuleContext) -> String {
        let mut parts = vec![format!("Candidate: {}", ctx.display_name)];
        if let Some(persona) = ctx.personas.get(&PersonaType::Professional).and_then(|p| p.as_ref())
        {
            parts.push(format!("Professional headline: {}", persona.headline));
            parts.push(format!("Background: {}", persona.narrative));
        }
        if let Some(occupation) = &ctx.core_attributes.occupation {
            parts.push(format!("Current role: {}", occupation));
        }
        if let Some(location) = &ctx.core_attributes.location {
            parts.push(format!("Location: {}", location));
        }
        if !ctx.core_attributes.values.is_empty() {
            parts.push(format!("Values: {}", ctx.core_attributes.values.join(", ")));
        }
        parts.push(format!("Tone weights: {}", tone_guidance(ctx)));
        parts.join("\n")
    }
}

#[async_trait]
impl GenerationModule for CareerDocumentsModule {
    fn name(&self) -> ModuleName {
        ModuleName::CareerDocuments
    }

    async fn generate(&self, user_id: &str, ctx: &ModuleContext) -> Result<ModuleOutput> {
        let base = self.base_prompt(ctx);

        let summary = self
            .llm
            .generate(
                SYSTEM,
                &format!("{base}\n\nWrite a three-sentence resume summary."),
            )
            .await?;
        self.store
            .add_generated_content(user_id, "resume_summary", summary.trim())
            .await?;

        let headline = self
            .llm
            .generate(
                SYSTEM,
                &format!("{base}\n\nWrite a one-line professional headline, max 120 characters."),
            )
            .await?;
        self.store
            .add_generated_content(user_id, "professional_headline", headline.trim())
            .await?;

        Ok(ModuleOutput { items_processed: 2 })
    }
}
