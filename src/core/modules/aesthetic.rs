use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{GenerationModule, ModuleName, ModuleOutput};
use crate::core::context::ModuleContext;
use crate::core::llm::LlmClient;
use crate::core::store::Store;

const SYSTEM: &str = "You are a personal style advisor. Practical, concrete guidance. \
                      Output only the guidance text.";

pub struct AestheticGuidanceModule {
    store: Arc<Store>,
    llm: Arc<dyn LlmClient>,
}

impl AestheticGuidanceModule {
    pub fn new(store: Arc<Store>, llm: Arc<dyn LlmClient>) -> Self {
        Self { store, llm }
    }
}

#[async_trait]
impl GenerationModule for AestheticGuidanceModule {
    fn name(&self) -> ModuleName {
        ModuleName::AestheticGuidance
    }

    async fn generate(&self, user_id: &str, ctx: &ModuleContext) -> Result<ModuleOutput> {
        let mut prompt = format!("Style guidance for {}.\n", ctx.display_name);
        if let Some(aesthetic) = &ctx.aesthetic_state {
            if !aesthetic.style_keywords.is_empty() {
                prompt.push_str(&format!(
                    "Current style: {}\n",
                    aesthetic.style_keywords.join(", ")
                ));
            }
            if !aesthetic.color_palette.is_empty() {
                prompt.push_str(&format!(
                    "Preferred colors: {}\n",
                    aesthetic.color_palette.join(", ")
                ));
            }
            if !aesthetic.avoid.is_empty() {
                prompt.push_str(&format!("Dislikes: {}\n", aesthetic.avoid.join(", ")));
            }
        }
        for persona in ctx.personas.values().flatten() {
            prompt.push_str(&format!(
                "{} presence: {}\n",
                persona.persona_type.as_str(),
                persona.headline
            ));
        }
        if !ctx.photos.is_empty() {
            prompt.push_str(&format!("They have {} photos on file.\n", ctx.photos.len()));
        }
        prompt.push_str("\nWrite a short set of aesthetic guidance notes for their profiles.");

        let notes = self.llm.generate(SYSTEM, &prompt).await?;
        self.store
            .add_generated_content(user_id, "aesthetic_guidance", notes.trim())
            .await?;

        Ok(ModuleOutput { items_processed: 1 })
    }
}
