//! Research stage: search the web for each task and synthesize findings

use crate::capabilities::{
    CapabilityError, CompletionRequest, ReasoningCapability, SearchCapability, SearchHit,
};
use crate::pipeline::plan::ResearchTask;
use crate::pipeline::{Stage, StageCapability, StageContext, StageOutput};
use crate::services::documents::truncate_chars;
use crate::session::EventEmitter;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const INSTRUCTIONS: &str = "You are a diligent researcher. Using the search results below, \
write a comprehensive synthesis that answers the request. Cite sources inline with their \
bracketed numbers, e.g. [2]. Do not invent sources.";

/// Characters kept from each search hit in the synthesis prompt
const MAX_HIT_CHARS: usize = 1500;

/// A source consulted during research
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Page title
    pub title: String,
    /// Page URL
    pub url: String,
}

/// Searches the web for every planned task, then synthesizes cited findings
pub struct ResearchStage {
    reasoning: Arc<dyn ReasoningCapability>,
    search: Arc<dyn SearchCapability>,
}

impl ResearchStage {
    /// Create the stage
    pub fn new(reasoning: Arc<dyn ReasoningCapability>, search: Arc<dyn SearchCapability>) -> Self {
        Self { reasoning, search }
    }
}

#[async_trait]
impl StageCapability for ResearchStage {
    fn stage(&self) -> Stage {
        Stage::Research
    }

    async fn invoke(
        &self,
        ctx: &StageContext,
        progress: &mut EventEmitter,
    ) -> Result<StageOutput, CapabilityError> {
        let tasks: Vec<ResearchTask> = ctx
            .output(Stage::Plan)
            .map(|o| serde_json::from_value(o.data["tasks"].clone()))
            .transpose()
            .map_err(|e| CapabilityError::MalformedOutput {
                detail: format!("plan output has no usable task list: {}", e),
            })?
            .ok_or_else(|| CapabilityError::MalformedOutput {
                detail: "research ran without a plan".to_string(),
            })?;

        let total = tasks.len();
        let mut hits: Vec<SearchHit> = Vec::new();
        for (i, task) in tasks.iter().enumerate() {
            progress
                .delta(
                    Stage::Research,
                    format!("Searching ({}/{}): {}", i + 1, total, task.query),
                    Some(json!({ "task": i + 1, "query": task.query })),
                )
                .await;

            let found = self
                .search
                .search(&task.query, ctx.settings.max_search_results)
                .await?;
            tracing::debug!(task = i + 1, hits = found.len(), "Search finished");

            for hit in found {
                if !hits.iter().any(|h| h.url == hit.url) {
                    hits.push(hit);
                }
            }
        }

        let mut prompt = ctx.accumulated();
        prompt.push_str("\n## Search results\n");
        if hits.is_empty() {
            prompt.push_str("(no results)\n");
        }
        for (i, hit) in hits.iter().enumerate() {
            prompt.push_str(&format!(
                "\n[{}] {} ({})\n{}\n",
                i + 1,
                hit.title,
                hit.url,
                truncate_chars(&hit.content, MAX_HIT_CHARS)
            ));
        }

        let synthesis = self
            .reasoning
            .complete(&CompletionRequest {
                model: ctx.settings.llm_model.clone(),
                system: INSTRUCTIONS.to_string(),
                prompt,
                json: false,
            })
            .await?;

        let sources: Vec<Source> = hits
            .into_iter()
            .map(|h| Source {
                title: h.title,
                url: h.url,
            })
            .collect();

        Ok(StageOutput::new(
            Stage::Research,
            synthesis.clone(),
            json!({ "findings": synthesis, "sources": sources }),
        ))
    }
}
