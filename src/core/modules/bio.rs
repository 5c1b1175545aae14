use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{GenerationModule, ModuleName, ModuleOutput, tone_guidance};
use crate::core::context::ModuleContext;
use crate::core::identity::Persona;
use crate::core::llm::LlmClient;
use crate::core::store::Store;

const SYSTEM: &str = "You write short first-person bios. Output only the bio text, \
                      no preamble, no markdown.";

/// One bio per persona the user has filled in.
pub struct BioGeneratorModule {
    store: Arc<Store>,
    llm: Arc<dyn LlmClient>,
}

impl BioGeneratorModule {
    pub fn new(store: Arc<Store>, llm: Arc<dyn LlmClient>) -> Self {
        Self { store, llm }
    }

    fn bio_prompt(&self, persona: &Persona, ctx: &ModuleContext) -> String {
        let mut parts = Vec::new();
        parts.push(format!(
            "Write a {} bio for {}.",
            persona.persona_type.as_str(),
            ctx.display_name
        ));
        parts.push(format!("Headline: {}", persona.headline));
        parts.push(format!("About them: {}", persona.narrative));
        if !persona.traits.is_empty() {
            parts.push(format!("Traits to convey: {}", persona.traits.join(", ")));
        }
        if let Some(occupation) = &ctx.core_attributes.occupation {
            parts.push(format!("Occupation: {}", occupation));
        }
        if !ctx.core_attributes.interests.is_empty() {
            parts.push(format!(
                "Interests: {}",
                ctx.core_attributes.interests.join(", ")
            ));
        }
        parts.push(format!("Tone weights: {}", tone_guidance(ctx)));
        if !ctx.preferences.style_markers.is_empty() {
            parts.push(format!(
                "Style notes: {}",
                ctx.preferences.style_markers.join(", ")
            ));
        }
        parts.push(format!(
            "Target length: {:?}",
            ctx.preferences.length_preference
        ));
        parts.join("\n")
    }
}

#[async_trait]
impl GenerationModule for BioGeneratorModule {
    fn name(&self) -> ModuleName {
        ModuleName::BioGenerator
    }

    async fn generate(&self, user_id: &str, ctx: &ModuleContext) -> Result<ModuleOutput> {
        let mut written = 0u32;
        for persona in ctx.personas.values().flatten() {
            let prompt = self.bio_prompt(persona, ctx);
            let body = self.llm.generate(SYSTEM, &prompt).await?;
            self.store
                .add_generated_content(
                    user_id,
                    &format!("bio_{}", persona.persona_type.as_str()),
                    body.trim(),
                )
                .await?;
            written += 1;
        }
        Ok(ModuleOutput {
            items_processed: written,
        })
    }
}
