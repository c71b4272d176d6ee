//! Research pipeline
//!
//! A fixed, strictly ordered chain of five stages. Each stage is a capability
//! object that receives the accumulated context (original input plus every
//! prior stage output) and returns its own output or an error. The
//! orchestrator owns ordering, accumulation, early termination and timeouts.

pub mod analyze;
pub mod evaluate;
pub mod orchestrator;
pub mod plan;
pub mod research;
pub mod settings;
pub mod visualize;

#[cfg(test)]
pub(crate) mod test_support;

pub use orchestrator::Orchestrator;
pub use settings::PipelineSettings;

use crate::capabilities::CapabilityError;
use crate::intake::ResearchInput;
use crate::report::Report;
use crate::session::{EventEmitter, SessionId};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Interprets the request and classifies its intent
    Analyze,
    /// Breaks the request into research tasks
    Plan,
    /// Searches the web for each task and synthesizes findings
    Research,
    /// Proposes and renders visuals
    Visualize,
    /// Produces the final structured report
    Evaluate,
}

impl Stage {
    /// Every stage, in execution order
    pub const ALL: [Stage; 5] = [
        Stage::Analyze,
        Stage::Plan,
        Stage::Research,
        Stage::Visualize,
        Stage::Evaluate,
    ];

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Analyze => "analyze",
            Stage::Plan => "plan",
            Stage::Research => "research",
            Stage::Visualize => "visualize",
            Stage::Evaluate => "evaluate",
        }
    }

    /// Display name of the agent that runs the stage
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Analyze => "Query Analyzer",
            Stage::Plan => "Task Planner",
            Stage::Research => "Researcher",
            Stage::Visualize => "Visualizer",
            Stage::Evaluate => "Evaluator",
        }
    }

    /// 1-based position in the pipeline
    pub fn position(&self) -> usize {
        match self {
            Stage::Analyze => 1,
            Stage::Plan => 2,
            Stage::Research => 3,
            Stage::Visualize => 4,
            Stage::Evaluate => 5,
        }
    }

    /// Progress line shown when the stage starts
    pub fn progress_message(&self) -> String {
        let activity = match self {
            Stage::Analyze => "Analyzing query...",
            Stage::Plan => "Planning tasks...",
            Stage::Research => "Researching based on tasks...",
            Stage::Visualize => "Generating visuals...",
            Stage::Evaluate => "Evaluating final report...",
        };
        format!("Agent {}/{}: {}", self.position(), Stage::ALL.len(), activity)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Intent of the request, decided by the first stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    /// Run the full pipeline
    DeepResearch,
    /// Answer directly, skip the remaining stages
    SimpleChat,
}

/// Output of one stage
#[derive(Debug, Clone)]
pub struct StageOutput {
    /// Stage that produced the output
    pub stage: Stage,
    /// Text carried into the accumulated context of later stages
    pub text: String,
    /// Structured output (shown in progress events, read by later stages)
    pub data: Value,
    /// Intent classification; only the first stage sets it
    pub intent: Option<QueryIntent>,
}

impl StageOutput {
    /// Output with text and structured data
    pub fn new(stage: Stage, text: impl Into<String>, data: Value) -> Self {
        Self {
            stage,
            text: text.into(),
            data,
            intent: None,
        }
    }
}

/// Everything a stage receives
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Session being run
    pub session_id: SessionId,
    /// Validated input
    pub input: Arc<ResearchInput>,
    /// Settings snapshot taken at session start
    pub settings: PipelineSettings,
    /// Outputs of the stages that already ran, in order
    pub outputs: Vec<StageOutput>,
}

impl StageContext {
    /// Output of an earlier stage
    pub fn output(&self, stage: Stage) -> Option<&StageOutput> {
        self.outputs.iter().find(|o| o.stage == stage)
    }

    /// Original input followed by every prior stage output
    pub fn accumulated(&self) -> String {
        let mut context = String::from("## Original request\n");
        if self.input.query.is_empty() {
            context.push_str("(no query text, see attachments)\n");
        } else {
            context.push_str(&self.input.query);
            context.push('\n');
        }

        for attachment in &self.input.attachments {
            if let Some(text) = &attachment.text {
                context.push_str(&format!(
                    "\n### Attachment: {} ({})\n{}\n",
                    attachment.file_name, attachment.kind, text
                ));
            }
        }

        for output in &self.outputs {
            context.push_str(&format!(
                "\n## {} output\n{}\n",
                output.stage.label(),
                output.text
            ));
        }
        context
    }
}

/// One stage of the pipeline
#[async_trait]
pub trait StageCapability: Send + Sync {
    /// Which stage this is
    fn stage(&self) -> Stage;

    /// Run the stage
    ///
    /// `progress` may be used to emit `delta` events while the stage runs.
    async fn invoke(
        &self,
        ctx: &StageContext,
        progress: &mut EventEmitter,
    ) -> Result<StageOutput, CapabilityError>;
}

/// Why a stage failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No response within the stage timeout
    Timeout,
    /// The capability call returned an error
    Capability,
    /// The capability answered with output of the wrong shape
    MalformedOutput,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Capability => "capability",
            FailureKind::MalformedOutput => "malformed_output",
        })
    }
}

/// A failed stage; ends the session without a report
#[derive(Error, Debug, Clone)]
#[error("{stage} stage failed ({kind}): {detail}")]
pub struct StageFailure {
    /// Failing stage
    pub stage: Stage,
    /// Failure kind
    pub kind: FailureKind,
    /// Human-readable detail
    pub detail: String,
}

impl StageFailure {
    /// Classify a capability error raised by a stage
    pub fn from_capability(stage: Stage, error: &CapabilityError) -> Self {
        let kind = match error {
            CapabilityError::MalformedOutput { .. } => FailureKind::MalformedOutput,
            _ => FailureKind::Capability,
        };
        Self {
            stage,
            kind,
            detail: error.to_string(),
        }
    }
}

/// How a session run ended
#[derive(Debug, Clone)]
pub enum SessionOutcome {
    /// Deep research finished with a report
    Reported(Arc<Report>),
    /// Simple chat answered with a minimal response
    Responded,
    /// A stage failed
    Failed(StageFailure),
    /// The consumer went away
    Cancelled,
}

/// Parse a JSON object out of model output
///
/// Tolerates markdown code fences and prose around the object.
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T, CapabilityError> {
    let trimmed = text.trim();
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end().trim_end_matches("```"))
        .unwrap_or(trimmed);

    let candidate = match (unfenced.find('{'), unfenced.rfind('}')) {
        (Some(start), Some(end)) if start < end => &unfenced[start..=end],
        _ => {
            return Err(CapabilityError::MalformedOutput {
                detail: format!("expected a JSON object, got: {}", preview(text)),
            })
        }
    };

    serde_json::from_str(candidate).map_err(|e| CapabilityError::MalformedOutput {
        detail: format!("{} in: {}", e, preview(text)),
    })
}

fn preview(text: &str) -> String {
    const MAX: usize = 200;
    if text.chars().count() > MAX {
        format!("{}...", text.chars().take(MAX).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::{Attachment, MediaKind};
    use serde_json::json;

    fn context(query: &str, attachments: Vec<Attachment>) -> StageContext {
        StageContext {
            session_id: "s1".to_string(),
            input: Arc::new(ResearchInput {
                session_id: "s1".to_string(),
                query: query.to_string(),
                attachments,
            }),
            settings: PipelineSettings::default(),
            outputs: Vec::new(),
        }
    }

    #[test]
    fn test_stage_order_and_messages() {
        assert_eq!(Stage::ALL[0], Stage::Analyze);
        assert_eq!(Stage::ALL[4], Stage::Evaluate);
        assert_eq!(
            Stage::Research.progress_message(),
            "Agent 3/5: Researching based on tasks..."
        );
        assert_eq!(serde_json::to_value(Stage::Visualize).unwrap(), "visualize");
    }

    #[test]
    fn test_accumulated_context_includes_prior_outputs() {
        let mut ctx = context(
            "Compare solar and wind",
            vec![Attachment {
                file_name: "notes.txt".to_string(),
                kind: MediaKind::Text,
                content_type: "text/plain".to_string(),
                data: b"capacity factors".to_vec(),
                text: Some("capacity factors".to_string()),
            }],
        );
        ctx.outputs
            .push(StageOutput::new(Stage::Analyze, "User wants a comparison", json!({})));

        let accumulated = ctx.accumulated();
        assert!(accumulated.starts_with("## Original request\nCompare solar and wind"));
        assert!(accumulated.contains("### Attachment: notes.txt (text)\ncapacity factors"));
        assert!(accumulated.contains("## Query Analyzer output\nUser wants a comparison"));
        assert!(ctx.output(Stage::Analyze).is_some());
        assert!(ctx.output(Stage::Plan).is_none());
    }

    #[test]
    fn test_parse_json_object_strips_fences() {
        let value: Value = parse_json_object("```json\n{\"tasks\": []}\n```").unwrap();
        assert_eq!(value, json!({"tasks": []}));

        let value: Value = parse_json_object("Here you go: {\"a\": 1} hope it helps").unwrap();
        assert_eq!(value, json!({"a": 1}));
    }

    #[test]
    fn test_parse_json_object_rejects_prose() {
        let err = parse_json_object::<Value>("no json here").unwrap_err();
        assert!(matches!(err, CapabilityError::MalformedOutput { .. }));
    }

    #[test]
    fn test_failure_classification() {
        let malformed = CapabilityError::MalformedOutput {
            detail: "bad".to_string(),
        };
        assert_eq!(
            StageFailure::from_capability(Stage::Plan, &malformed).kind,
            FailureKind::MalformedOutput
        );
        let status = CapabilityError::Status {
            provider: "OpenAI",
            status: 500,
            body: String::new(),
        };
        let failure = StageFailure::from_capability(Stage::Plan, &status);
        assert_eq!(failure.kind, FailureKind::Capability);
        assert!(failure.to_string().starts_with("plan stage failed (capability)"));
    }
}
