//! Evaluate stage: produce the final structured result

use crate::capabilities::{CapabilityError, CompletionRequest, ReasoningCapability};
use crate::pipeline::research::Source;
use crate::pipeline::{parse_json_object, Stage, StageCapability, StageContext, StageOutput};
use crate::session::EventEmitter;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

const INSTRUCTIONS: &str = "You are a critical evaluator. Assess the research above for \
completeness, accuracy and objectivity, then write the final report. Respond with a JSON \
object: {\"executive_summary\": string, \"findings\": [string], \"conclusion\": string, \
\"references\": [string], \"thinking_process\": {\"reasoning_steps\": [string], \
\"tools_used\": [string], \"decisions_made\": [string]}}. Findings are concise, cited insights. \
The conclusion covers key takeaways and suggested next steps.";

/// Writes the final report fields and attaches visuals and sources
pub struct EvaluateStage {
    reasoning: Arc<dyn ReasoningCapability>,
}

impl EvaluateStage {
    /// Create the stage
    pub fn new(reasoning: Arc<dyn ReasoningCapability>) -> Self {
        Self { reasoning }
    }
}

#[async_trait]
impl StageCapability for EvaluateStage {
    fn stage(&self) -> Stage {
        Stage::Evaluate
    }

    async fn invoke(
        &self,
        ctx: &StageContext,
        _progress: &mut EventEmitter,
    ) -> Result<StageOutput, CapabilityError> {
        let raw = self
            .reasoning
            .complete(&CompletionRequest {
                model: ctx.settings.llm_model.clone(),
                system: INSTRUCTIONS.to_string(),
                prompt: ctx.accumulated(),
                json: true,
            })
            .await?;
        let mut result: Map<String, Value> = parse_json_object(&raw)?;

        let visuals = ctx
            .output(Stage::Visualize)
            .map(|o| o.data["visuals"].clone())
            .filter(Value::is_array)
            .unwrap_or_else(|| Value::Array(Vec::new()));
        result.insert("visuals".to_string(), visuals);

        let sources: Vec<Source> = ctx
            .output(Stage::Research)
            .and_then(|o| serde_json::from_value(o.data["sources"].clone()).ok())
            .unwrap_or_default();
        let references = merge_references(result.get("references"), &sources);
        result.insert(
            "references".to_string(),
            Value::Array(references.into_iter().map(Value::String).collect()),
        );

        let summary = result
            .get("executive_summary")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Ok(StageOutput::new(Stage::Evaluate, summary, Value::Object(result)))
    }
}

/// References from the model, followed by research sources it did not cite
fn merge_references(from_model: Option<&Value>, sources: &[Source]) -> Vec<String> {
    let mut references: Vec<String> = from_model
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    for source in sources {
        if !references.iter().any(|r| r.contains(&source.url)) {
            references.push(format!("{} - {}", source.title, source.url));
        }
    }
    references
}
