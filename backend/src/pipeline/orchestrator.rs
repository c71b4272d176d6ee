//! Pipeline orchestrator
//!
//! Runs the stages in their fixed order, one at a time, and turns their
//! results into progress events. The orchestrator's own logic is limited to
//! ordering, context accumulation, the simple-chat short circuit, per-stage
//! timeouts and stopping at the first failure.

use crate::capabilities::{Capabilities, CapabilityError};
use crate::intake::ResearchInput;
use crate::pipeline::analyze::AnalyzeStage;
use crate::pipeline::evaluate::EvaluateStage;
use crate::pipeline::plan::PlanStage;
use crate::pipeline::research::ResearchStage;
use crate::pipeline::visualize::VisualizeStage;
use crate::pipeline::{
    FailureKind, PipelineSettings, QueryIntent, SessionOutcome, Stage, StageCapability,
    StageContext, StageFailure, StageOutput,
};
use crate::report::{Report, ReportExporter};
use crate::session::{EventEmitter, EventKind};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Runs the ordered stage list for a session
pub struct Orchestrator {
    stages: Vec<Arc<dyn StageCapability>>,
}

impl Orchestrator {
    /// Create an orchestrator from a stage list
    ///
    /// The list must contain exactly the pipeline stages in pipeline order.
    pub fn new(stages: Vec<Arc<dyn StageCapability>>) -> anyhow::Result<Self> {
        let order: Vec<Stage> = stages.iter().map(|s| s.stage()).collect();
        anyhow::ensure!(
            order == Stage::ALL,
            "stages must be {:?} in that order, got {:?}",
            Stage::ALL,
            order
        );
        Ok(Self { stages })
    }

    /// The standard pipeline over the given capabilities
    pub fn standard(capabilities: Capabilities) -> Self {
        let Capabilities {
            reasoning,
            vision,
            search,
            images,
        } = capabilities;
        Self {
            stages: vec![
                Arc::new(AnalyzeStage::new(reasoning.clone(), vision)),
                Arc::new(PlanStage::new(reasoning.clone())),
                Arc::new(ResearchStage::new(reasoning.clone(), search)),
                Arc::new(VisualizeStage::new(reasoning.clone(), images)),
                Arc::new(EvaluateStage::new(reasoning)),
            ],
        }
    }

    /// Run one session to its outcome
    ///
    /// Emits `session_started`, then `stage_started`/`stage_completed` per
    /// stage, and ends with exactly one terminal event (`response`, `report`
    /// or `error`) unless the consumer went away first.
    pub async fn run(
        &self,
        input: Arc<ResearchInput>,
        settings: PipelineSettings,
        exporter: &ReportExporter,
        emitter: &mut EventEmitter,
    ) -> SessionOutcome {
        let stage_timeout = Duration::from_secs(settings.stage_timeout_secs);

        emitter
            .emit(
                EventKind::SessionStarted,
                None,
                "Starting multi-agent research process...",
                Some(json!({
                    "query": input.query,
                    "attachments": input.attachment_summaries(),
                })),
            )
            .await;

        let mut ctx = StageContext {
            session_id: input.session_id.clone(),
            input,
            settings,
            outputs: Vec::with_capacity(self.stages.len()),
        };

        for stage in &self.stages {
            if emitter.consumer_gone() {
                tracing::info!("Consumer gone, stopping before next stage");
                return SessionOutcome::Cancelled;
            }

            let current = stage.stage();
            emitter
                .emit(
                    EventKind::StageStarted,
                    Some(current),
                    current.progress_message(),
                    Some(json!({ "agent": current.label() })),
                )
                .await;

            tracing::info!(stage = current.as_str(), "Stage started");
            let start = Instant::now();

            let result = invoke_within_budget(stage.as_ref(), &ctx, emitter, stage_timeout).await;
            let duration_ms = start.elapsed().as_millis();

            let output = match result {
                Some(Ok(output)) => output,
                Some(Err(e)) => {
                    return fail(emitter, StageFailure::from_capability(current, &e), duration_ms)
                        .await
                }
                None => {
                    let failure = StageFailure {
                        stage: current,
                        kind: FailureKind::Timeout,
                        detail: format!(
                            "no response within {}s",
                            stage_timeout.as_secs()
                        ),
                    };
                    return fail(emitter, failure, duration_ms).await;
                }
            };

            tracing::info!(stage = current.as_str(), duration_ms, "Stage completed");
            emitter
                .emit(
                    EventKind::StageCompleted,
                    Some(current),
                    format!("{} finished", current.label()),
                    Some(json!({
                        "agent": current.label(),
                        "response": output.text,
                        "data": output.data,
                    })),
                )
                .await;

            if ctx.outputs.is_empty() && output.intent == Some(QueryIntent::SimpleChat) {
                let reply = output.data["reply"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| output.text.clone());
                tracing::info!("Simple chat request, skipping remaining stages");
                let outcome = SessionOutcome::Responded;
                emitter
                    .emit_terminal(
                        EventKind::Response,
                        None,
                        reply.clone(),
                        Some(json!({ "reply": reply })),
                        &outcome,
                    )
                    .await;
                return outcome;
            }

            ctx.outputs.push(output);
        }

        let Some(last) = ctx.outputs.last() else {
            let failure = StageFailure {
                stage: Stage::Evaluate,
                kind: FailureKind::MalformedOutput,
                detail: "pipeline produced no output".to_string(),
            };
            return fail(emitter, failure, 0).await;
        };

        let report = match Report::assemble(&ctx.session_id, &last.data) {
            Ok(report) => Arc::new(report),
            Err(e) => {
                let failure = StageFailure {
                    stage: last.stage,
                    kind: FailureKind::MalformedOutput,
                    detail: format!("result does not match the report shape: {}", e),
                };
                return fail(emitter, failure, 0).await;
            }
        };

        let export = exporter.export_outcome(&report).await;
        let payload = json!({
            "report": &*report,
            "export": export,
        });
        let outcome = SessionOutcome::Reported(report);
        emitter
            .emit_terminal(
                EventKind::Report,
                None,
                "Multi-agent research process complete.",
                Some(payload),
                &outcome,
            )
            .await;

        outcome
    }
}

/// Run one stage, failing it once it has worked for longer than `budget`
///
/// Time the stage spends waiting on a full relay channel is not counted.
///
/// # Returns
/// * `Some(result)` - The stage finished within its budget
/// * `None` - The budget ran out
async fn invoke_within_budget(
    stage: &dyn StageCapability,
    ctx: &StageContext,
    emitter: &mut EventEmitter,
    budget: Duration,
) -> Option<Result<StageOutput, CapabilityError>> {
    let stall = emitter.relay_stall();
    let stalled_before = stall.stalled();
    let start = tokio::time::Instant::now();

    let invoke = stage.invoke(ctx, emitter);
    tokio::pin!(invoke);

    let mut deadline = start + budget;
    loop {
        tokio::select! {
            result = &mut invoke => return Some(result),
            _ = tokio::time::sleep_until(deadline) => {
                let stalled = stall.stalled().saturating_sub(stalled_before);
                let working = start.elapsed().saturating_sub(stalled);
                if working >= budget && !stall.is_stalled() {
                    return None;
                }
                deadline = tokio::time::Instant::now() + budget.saturating_sub(working).max(STALL_RECHECK);
            }
        }
    }
}

/// Shortest wait before re-checking a budget while the relay is stalled
const STALL_RECHECK: Duration = Duration::from_millis(50);

async fn fail(emitter: &mut EventEmitter, failure: StageFailure, duration_ms: u128) -> SessionOutcome {
    tracing::error!(
        stage = failure.stage.as_str(),
        kind = %failure.kind,
        duration_ms,
        error = %failure.detail,
        "Stage failed"
    );
    let payload = json!({
        "error": "stage_failure",
        "stage": failure.stage,
        "kind": failure.kind,
        "detail": failure.detail,
    });
    let message = failure.to_string();
    let stage = failure.stage;
    let outcome = SessionOutcome::Failed(failure);
    emitter
        .emit_terminal(EventKind::Error, Some(stage), message, Some(payload), &outcome)
        .await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::test_support::{
        CountingImages, EchoSearch, FixedVision, ScriptedReasoning,
    };

    fn capabilities() -> Capabilities {
        Capabilities {
            reasoning: ScriptedReasoning::replying(&[]),
            vision: Arc::new(FixedVision("image")),
            search: EchoSearch::new(),
            images: Arc::new(CountingImages::default()),
        }
    }

    #[test]
    fn test_standard_pipeline_order() {
        let orchestrator = Orchestrator::standard(capabilities());
        let order: Vec<Stage> = orchestrator.stages.iter().map(|s| s.stage()).collect();
        assert_eq!(order, Stage::ALL);
    }

    #[test]
    fn test_new_rejects_wrong_order() {
        let caps = capabilities();
        let stages: Vec<Arc<dyn StageCapability>> = vec![
            Arc::new(PlanStage::new(caps.reasoning.clone())),
            Arc::new(AnalyzeStage::new(caps.reasoning.clone(), caps.vision.clone())),
        ];
        assert!(Orchestrator::new(stages).is_err());
    }
}
