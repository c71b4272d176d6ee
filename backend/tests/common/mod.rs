//! Shared helpers for integration tests: scripted pipeline stages

#![allow(dead_code)]

use async_trait::async_trait;
use deep_research_backend::capabilities::CapabilityError;
use deep_research_backend::intake::ResearchInput;
use deep_research_backend::pipeline::{
    Orchestrator, QueryIntent, Stage, StageCapability, StageContext, StageOutput,
};
use deep_research_backend::session::EventEmitter;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a fake stage does when invoked
#[derive(Clone)]
pub enum Behavior {
    /// Return the default output for the stage
    Succeed,
    /// Return a capability error
    Fail,
    /// Never answer
    Hang,
    /// Classify the request as simple chat (analyze only)
    SimpleChat,
    /// Return an evaluate result that does not match the report shape
    Unshaped,
}

/// A stage that follows a script and records its invocations
pub struct FakeStage {
    stage: Stage,
    behavior: Behavior,
    calls: Arc<Mutex<Vec<Stage>>>,
}

#[async_trait]
impl StageCapability for FakeStage {
    fn stage(&self) -> Stage {
        self.stage
    }

    async fn invoke(
        &self,
        ctx: &StageContext,
        progress: &mut EventEmitter,
    ) -> Result<StageOutput, CapabilityError> {
        self.calls.lock().unwrap().push(self.stage);

        match self.behavior {
            Behavior::Fail => {
                return Err(CapabilityError::Status {
                    provider: "fake",
                    status: 500,
                    body: format!("injected failure in {}", self.stage),
                })
            }
            Behavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            _ => {}
        }

        let output = match (self.stage, &self.behavior) {
            (Stage::Analyze, Behavior::SimpleChat) => StageOutput {
                stage: Stage::Analyze,
                text: "Greeting".to_string(),
                data: json!({"intent": "simple_chat", "interpretation": "Greeting", "reply": "Hello!"}),
                intent: Some(QueryIntent::SimpleChat),
            },
            (Stage::Analyze, _) => StageOutput {
                stage: Stage::Analyze,
                text: format!("Interpreted: {}", ctx.input.query),
                data: json!({"intent": "deep_research", "interpretation": "research"}),
                intent: Some(QueryIntent::DeepResearch),
            },
            (Stage::Research, _) => {
                for i in 1..=2 {
                    progress
                        .delta(Stage::Research, format!("Searching ({}/2)", i), None)
                        .await;
                }
                StageOutput::new(Stage::Research, "Findings [1]", json!({"sources": []}))
            }
            (Stage::Evaluate, Behavior::Unshaped) => {
                StageOutput::new(Stage::Evaluate, "?", json!({"verdict": "fine"}))
            }
            (Stage::Evaluate, _) => StageOutput::new(
                Stage::Evaluate,
                "Summary",
                json!({
                    "executive_summary": "Summary",
                    "findings": ["Finding one"],
                    "visuals": [],
                    "conclusion": "Conclusion",
                    "references": ["Source - https://example.com"]
                }),
            ),
            (stage, _) => StageOutput::new(stage, format!("{} done", stage), Value::Null),
        };
        Ok(output)
    }
}

/// A fake five-stage pipeline
pub struct FakePipeline {
    pub orchestrator: Arc<Orchestrator>,
    pub calls: Arc<Mutex<Vec<Stage>>>,
}

impl FakePipeline {
    /// Every stage succeeds
    pub fn succeeding() -> Self {
        Self::with(|_| Behavior::Succeed)
    }

    /// Stage behavior chosen per stage
    pub fn with(behavior: impl Fn(Stage) -> Behavior) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Arc<dyn StageCapability>> = Stage::ALL
            .iter()
            .map(|&stage| {
                Arc::new(FakeStage {
                    stage,
                    behavior: behavior(stage),
                    calls: calls.clone(),
                }) as Arc<dyn StageCapability>
            })
            .collect();
        Self {
            orchestrator: Arc::new(Orchestrator::new(stages).expect("stages are in pipeline order")),
            calls,
        }
    }

    /// Stages invoked so far
    pub fn invoked(&self) -> Vec<Stage> {
        self.calls.lock().unwrap().clone()
    }
}

/// Research input with a query and no attachments
pub fn input(session_id: &str, query: &str) -> ResearchInput {
    ResearchInput {
        session_id: session_id.to_string(),
        query: query.to_string(),
        attachments: Vec::new(),
    }
}
