use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{GenerationModule, ModuleName, ModuleOutput, tone_guidance};
use crate::core::context::ModuleContext;
use crate::core::identity::PersonaType;
use crate::core::llm::LlmClient;
use crate::core::store::Store;

const SYSTEM: &str = "You write dating profile content. Warm, specific, never generic. \
                      Output only the requested text.";

pub struct DatingContentModule {
    store: Arc<Store>,
    llm: Arc<dyn LlmClient>,
}

impl DatingContentModule {
    pub fn new(store: Arc<Store>, llm: Arc<dyn LlmClient>) -> Self {
        Self { store, llm }
    }

    fn base_prompt(&self, ctx: &ModuleContext) -> String {
        let mut parts = vec![format!("Name: {}", ctx.display_name)];
        for pt in [PersonaType::Dating, PersonaType::Social] {
            if let Some(persona) = ctx.personas.get(&pt).and_then(|p| p.as_ref()) {
                parts.push(format!(
                    "{} persona: {} - {}",
                    pt.as_str(),
                    persona.headline,
                    persona.narrative
                ));
            }
        }
        if !ctx.core_attributes.interests.is_empty() {
            parts.push(format!(
                "Interests: {}",
                ctx.core_attributes.interests.join(", ")
            ));
        }
        if !ctx.photos.is_empty() {
            parts.push(format!("They have {} profile photos.", ctx.photos.len()));
        }
        parts.push(format!("Tone weights: {}", tone_guidance(ctx)));
        parts.join("\n")
    }
}

#[async_trait]
impl GenerationModule for DatingContentModule {
    fn name(&self) -> ModuleName {
        ModuleName::DatingContent
    }

    async fn generate(&self, user_id: &str, ctx: &ModuleContext) -> Result<ModuleOutput> {
        let base = self.base_prompt(ctx);

        let profile = self
            .llm
            .generate(SYSTEM, &format!("{base}\n\nWrite their dating profile text."))
            .await?;
        self.store
            .add_generated_content(user_id, "dating_profile", profile.trim())
            .await?;

        let openers = self
            .llm
            .generate(
                SYSTEM,
                &format!("{base}\n\nWrite three conversation openers they could send, one per line."),
            )
            .await?;
        self.store
            .add_generated_content(user_id, "conversation_openers", openers.trim())
            .await?;

        Ok(ModuleOutput { items_processed: 2 })
    }
}
