//! Visualize stage: propose visuals and render them

use crate::capabilities::{
    CapabilityError, CompletionRequest, ImageGenerationCapability, ReasoningCapability,
};
use crate::pipeline::{parse_json_object, Stage, StageCapability, StageContext, StageOutput};
use crate::report::VisualRef;
use crate::session::EventEmitter;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const INSTRUCTIONS: &str = "You are a data visualization expert. Review the research above \
and decide whether charts, diagrams or illustrations would make it clearer. Respond with a \
JSON object: {\"visuals\": [{\"prompt\": string, \"caption\": string}]}. \"prompt\" is a \
self-contained instruction for an image generator. Return an empty list if no visuals are \
needed.";

#[derive(Debug, Deserialize)]
struct Proposal {
    #[serde(default)]
    visuals: Vec<ProposedVisual>,
}

#[derive(Debug, Deserialize)]
struct ProposedVisual {
    prompt: String,
    #[serde(default)]
    caption: String,
}

/// Proposes visuals for the research and renders each one
pub struct VisualizeStage {
    reasoning: Arc<dyn ReasoningCapability>,
    images: Arc<dyn ImageGenerationCapability>,
}

impl VisualizeStage {
    /// Create the stage
    pub fn new(
        reasoning: Arc<dyn ReasoningCapability>,
        images: Arc<dyn ImageGenerationCapability>,
    ) -> Self {
        Self { reasoning, images }
    }
}

#[async_trait]
impl StageCapability for VisualizeStage {
    fn stage(&self) -> Stage {
        Stage::Visualize
    }

    async fn invoke(
        &self,
        ctx: &StageContext,
        progress: &mut EventEmitter,
    ) -> Result<StageOutput, CapabilityError> {
        let max_visuals = ctx.settings.max_visuals;
        if max_visuals == 0 {
            return Ok(StageOutput::new(
                Stage::Visualize,
                "Visuals are disabled.",
                json!({ "visuals": [] }),
            ));
        }

        let raw = self
            .reasoning
            .complete(&CompletionRequest {
                model: ctx.settings.llm_model.clone(),
                system: format!("{} Propose at most {} visuals.", INSTRUCTIONS, max_visuals),
                prompt: ctx.accumulated(),
                json: true,
            })
            .await?;
        let proposal: Proposal = parse_json_object(&raw)?;

        let proposed: Vec<ProposedVisual> = proposal
            .visuals
            .into_iter()
            .filter(|v| !v.prompt.trim().is_empty())
            .take(max_visuals)
            .collect();

        let total = proposed.len();
        let mut visuals = Vec::with_capacity(total);
        for (i, visual) in proposed.into_iter().enumerate() {
            let caption = if visual.caption.trim().is_empty() {
                format!("Figure {}", i + 1)
            } else {
                visual.caption
            };
            progress
                .delta(
                    Stage::Visualize,
                    format!("Rendering visual {}/{}: {}", i + 1, total, caption),
                    Some(json!({ "visual": i + 1, "caption": caption })),
                )
                .await;

            let image = self
                .images
                .generate(
                    &ctx.settings.image_model,
                    &visual.prompt,
                    &ctx.settings.image_size,
                )
                .await?;
            visuals.push(VisualRef {
                caption,
                url: image.url,
            });
        }

        let text = if visuals.is_empty() {
            "No visuals are needed.".to_string()
        } else {
            visuals
                .iter()
                .enumerate()
                .map(|(i, v)| format!("Figure {}: {}", i + 1, v.caption))
                .collect::<Vec<_>>()
                .join("\n")
        };

        Ok(StageOutput::new(
            Stage::Visualize,
            text,
            json!({ "visuals": visuals }),
        ))
    }
}
