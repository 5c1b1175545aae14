use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use super::{GenerationModule, ModuleName, ModuleOutput};
use crate::core::context::ModuleContext;
use crate::core::llm::LlmClient;
use crate::core::store::Store;

const SYSTEM: &str = "You rank profile photos. Reply with one line per photo in the \
                      given order: the photo number, a space, then a score from 0 to 100.";

/// Scores the user's photos against their aesthetic state and persists the
/// ranking back onto the photo rows.
pub struct PhotoRankingModule {
    store: Arc<Store>,
    llm: Arc<dyn LlmClient>,
}

impl PhotoRankingModule {
    pub fn new(store: Arc<Store>, llm: Arc<dyn LlmClient>) -> Self {
        Self { store, llm }
    }
}

/// Parse "N SCORE" lines leniently; photos the model skipped keep no score.
fn parse_scores(output: &str, photo_count: usize) -> Vec<Option<f64>> {
    let mut scores = vec![None; photo_count];
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        let Some(index) = fields.next().and_then(|f| f.parse::<usize>().ok()) else {
            continue;
        };
        let Some(score) = fields.next().and_then(|f| f.parse::<f64>().ok()) else {
            continue;
        };
        if index >= 1 && index <= photo_count {
            scores[index - 1] = Some(score.clamp(0.0, 100.0));
        }
    }
    scores
}

#[async_trait]
impl GenerationModule for PhotoRankingModule {
    fn name(&self) -> ModuleName {
        ModuleName::PhotoRanking
    }

    async fn generate(&self, _user_id: &str, ctx: &ModuleContext) -> Result<ModuleOutput> {
        if ctx.photos.is_empty() {
            return Ok(ModuleOutput { items_processed: 0 });
        }

        let mut prompt = String::from("Photos, primary first:\n");
        for (i, photo) in ctx.photos.iter().enumerate() {
            prompt.push_str(&format!("{}. {}\n", i + 1, photo.url));
        }
        if let Some(aesthetic) = &ctx.aesthetic_state {
            if !aesthetic.style_keywords.is_empty() {
                prompt.push_str(&format!(
                    "Preferred style: {}\n",
                    aesthetic.style_keywords.join(", ")
                ));
            }
            if !aesthetic.avoid.is_empty() {
                prompt.push_str(&format!("Avoid: {}\n", aesthetic.avoid.join(", ")));
            }
        }

        let output = self.llm.generate(SYSTEM, &prompt).await?;
        let scores = parse_scores(&output, ctx.photos.len());

        let mut ranked = 0u32;
        for (photo, score) in ctx.photos.iter().zip(scores) {
            if let Some(score) = score {
                self.store.set_photo_rank(&photo.photo_id, score).await?;
                ranked += 1;
            }
        }
        Ok(ModuleOutput {
            items_processed: ranked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::parse_scores;

    #[test]
    fn parses_numbered_score_lines() {
        let scores = parse_scores("1 90\n2 45.5\n3 120\n", 3);
        assert_eq!(scores, vec![Some(90.0), Some(45.5), Some(100.0)]);
    }

    #[test]
    fn skips_noise_and_out_of_range_indices() {
        let scores = parse_scores("Here are the rankings:\n1 80\n9 50\nnot a line\n", 2);
        assert_eq!(scores, vec![Some(80.0), None]);
    }
}
