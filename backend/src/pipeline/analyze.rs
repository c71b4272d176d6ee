//! Analyze stage: interpret the request and classify its intent

use crate::capabilities::{
    CapabilityError, CompletionRequest, ReasoningCapability, VisionCapability,
};
use crate::pipeline::{
    parse_json_object, QueryIntent, Stage, StageCapability, StageContext, StageOutput,
};
use crate::session::EventEmitter;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

const INSTRUCTIONS: &str = "You are an expert at analyzing and interpreting user queries. \
Understand the user's intent, identify key entities and clarify ambiguities. \
Decide whether the request needs multi-step web research (\"deep_research\") or can be \
answered directly in a sentence or two (\"simple_chat\", e.g. greetings or small talk). \
Respond with a JSON object: {\"intent\": \"deep_research\" | \"simple_chat\", \
\"interpretation\": string, \"reply\": string}. \"reply\" is the direct answer and is only \
required for simple_chat.";

const IMAGE_INSTRUCTION: &str = "Describe this image in detail. Transcribe any text, \
and summarize any charts or tables including their values.";

#[derive(Debug, Deserialize)]
struct Analysis {
    intent: QueryIntent,
    interpretation: String,
    #[serde(default)]
    reply: Option<String>,
}

/// Interprets the request, describes image attachments, decides the intent
pub struct AnalyzeStage {
    reasoning: Arc<dyn ReasoningCapability>,
    vision: Arc<dyn VisionCapability>,
}

impl AnalyzeStage {
    /// Create the stage
    pub fn new(reasoning: Arc<dyn ReasoningCapability>, vision: Arc<dyn VisionCapability>) -> Self {
        Self { reasoning, vision }
    }
}

#[async_trait]
impl StageCapability for AnalyzeStage {
    fn stage(&self) -> Stage {
        Stage::Analyze
    }

    async fn invoke(
        &self,
        ctx: &StageContext,
        progress: &mut EventEmitter,
    ) -> Result<StageOutput, CapabilityError> {
        let mut descriptions = Vec::new();
        for image in ctx.input.images() {
            let description = self
                .vision
                .describe(
                    &ctx.settings.vision_model,
                    IMAGE_INSTRUCTION,
                    &image.content_type,
                    &image.data,
                )
                .await?;
            progress
                .delta(
                    Stage::Analyze,
                    format!("Described image {}", image.file_name),
                    Some(json!({ "file_name": image.file_name })),
                )
                .await;
            descriptions.push((image.file_name.clone(), description));
        }

        let mut prompt = ctx.accumulated();
        for (file_name, description) in &descriptions {
            prompt.push_str(&format!("\n### Image: {}\n{}\n", file_name, description));
        }

        let raw = self
            .reasoning
            .complete(&CompletionRequest {
                model: ctx.settings.llm_model.clone(),
                system: INSTRUCTIONS.to_string(),
                prompt,
                json: true,
            })
            .await?;
        let analysis: Analysis = parse_json_object(&raw)?;

        let reply = analysis
            .reply
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| analysis.interpretation.clone());

        let mut text = analysis.interpretation.clone();
        for (file_name, description) in &descriptions {
            text.push_str(&format!("\nImage {}: {}", file_name, description));
        }

        tracing::debug!(intent = ?analysis.intent, images = descriptions.len(), "Query analyzed");

        Ok(StageOutput {
            stage: Stage::Analyze,
            text,
            data: json!({
                "intent": analysis.intent,
                "interpretation": analysis.interpretation,
                "reply": reply,
                "image_descriptions": descriptions
                    .iter()
                    .map(|(file_name, description)| json!({
                        "file_name": file_name,
                        "description": description,
                    }))
                    .collect::<Vec<_>>(),
            }),
            intent: Some(analysis.intent),
        })
    }
}
