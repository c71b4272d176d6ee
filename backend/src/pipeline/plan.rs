//! Plan stage: break the request into research tasks

use crate::capabilities::{CapabilityError, CompletionRequest, ReasoningCapability};
use crate::pipeline::{parse_json_object, Stage, StageCapability, StageContext, StageOutput};
use crate::session::EventEmitter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const INSTRUCTIONS: &str = "You are a meticulous research planner. Using the request and \
the analysis above, create a plan of focused web searches that together answer the request. \
Respond with a JSON object: {\"tasks\": [{\"query\": string, \"purpose\": string}]}. \
Each query must be a standalone web search query.";

/// One research task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResearchTask {
    /// Web search query
    pub query: String,
    /// What the task contributes to the answer
    #[serde(default)]
    pub purpose: String,
}

#[derive(Debug, Deserialize)]
struct Plan {
    #[serde(default)]
    tasks: Vec<ResearchTask>,
}

/// Produces the research task list
pub struct PlanStage {
    reasoning: Arc<dyn ReasoningCapability>,
}

impl PlanStage {
    /// Create the stage
    pub fn new(reasoning: Arc<dyn ReasoningCapability>) -> Self {
        Self { reasoning }
    }
}

#[async_trait]
impl StageCapability for PlanStage {
    fn stage(&self) -> Stage {
        Stage::Plan
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
                system: format!(
                    "{} Plan at most {} tasks.",
                    INSTRUCTIONS, ctx.settings.max_research_tasks
                ),
                prompt: ctx.accumulated(),
                json: true,
            })
            .await?;
        let plan: Plan = parse_json_object(&raw)?;

        let mut tasks: Vec<ResearchTask> = plan
            .tasks
            .into_iter()
            .filter(|t| !t.query.trim().is_empty())
            .take(ctx.settings.max_research_tasks)
            .collect();

        if tasks.is_empty() {
            let query = fallback_query(ctx);
            tracing::warn!("Planner returned no tasks, falling back to the request itself");
            tasks.push(ResearchTask {
                query,
                purpose: "Answer the request directly".to_string(),
            });
        }

        let text = tasks
            .iter()
            .enumerate()
            .map(|(i, t)| {
                if t.purpose.is_empty() {
                    format!("{}. {}", i + 1, t.query)
                } else {
                    format!("{}. {} ({})", i + 1, t.query, t.purpose)
                }
            })
            .collect::<Vec<_>>()
            .join("\n");

        Ok(StageOutput::new(Stage::Plan, text, json!({ "tasks": tasks })))
    }
}

fn fallback_query(ctx: &StageContext) -> String {
    if !ctx.input.query.is_empty() {
        return ctx.input.query.clone();
    }
    ctx.output(Stage::Analyze)
        .and_then(|o| o.data["interpretation"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| "overview of the attached material".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{context, emitter, ScriptedReasoning};

    #[tokio::test]
    async fn test_tasks_are_capped() {
        let reasoning = ScriptedReasoning::replying(&[
            r#"{"tasks": [
                {"query": "q1", "purpose": "p1"},
                {"query": "q2"},
                {"query": "q3"},
                {"query": "q4"},
                {"query": "q5"},
                {"query": "q6"}
            ]}"#,
        ]);
        let stage = PlanStage::new(reasoning);
        let (mut progress, _rx) = emitter().await;

        let output = stage
            .invoke(&context("topic", vec![], vec![]), &mut progress)
            .await
            .unwrap();

        let tasks: Vec<ResearchTask> = serde_json::from_value(output.data["tasks"].clone()).unwrap();
        assert_eq!(tasks.len(), 4);
        assert!(output.text.starts_with("1. q1 (p1)\n2. q2"));
    }

    #[tokio::test]
    async fn test_empty_plan_falls_back_to_query() {
        let reasoning = ScriptedReasoning::replying(&[r#"{"tasks": [{"query": "  "}]}"#]);
        let stage = PlanStage::new(reasoning);
        let (mut progress, _rx) = emitter().await;

        let output = stage
            .invoke(&context("history of the transistor", vec![], vec![]), &mut progress)
            .await
            .unwrap();

        assert_eq!(output.data["tasks"][0]["query"], "history of the transistor");
    }
}
