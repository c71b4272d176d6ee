//! Session task and streaming relay
//!
//! Each run gets one spawned task that drives the orchestrator and a bounded
//! channel that carries its events to the HTTP response. The response side
//! holds a [`CancelGuard`]; dropping the guard before the run produced its
//! terminal event aborts the task and marks the session cancelled. A run whose
//! terminal event is already logged keeps its outcome.

use crate::intake::ResearchInput;
use crate::pipeline::orchestrator::Orchestrator;
use crate::pipeline::settings::PipelineSettings;
use crate::report::export::ReportExporter;
use crate::session::{EventEmitter, ProgressEvent, SessionId, SessionRegistry};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info_span, Instrument};

/// A running session: its event channel and the guard that owns the task
pub struct SessionTask {
    /// Ordered events of the run; closes once the run has been recorded
    pub events: mpsc::Receiver<ProgressEvent>,
    /// Aborts the run when dropped while armed
    pub guard: CancelGuard,
}

/// Aborts the session task on drop unless disarmed
pub struct CancelGuard {
    session_id: SessionId,
    registry: SessionRegistry,
    handle: JoinHandle<()>,
    armed: bool,
}

impl CancelGuard {
    /// Stop guarding; the run is allowed to finish on its own
    pub fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        if !self.handle.is_finished() {
            tracing::info!(session_id = %self.session_id, "Consumer gone, cancelling session task");
            // Drops any in-flight outbound request future.
            self.handle.abort();
        }

        let registry = self.registry.clone();
        let session_id = self.session_id.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    registry.mark_cancelled(&session_id).await;
                });
            }
            Err(_) => {
                tracing::warn!(
                    session_id = %self.session_id,
                    "No runtime available to record cancellation"
                );
            }
        }
    }
}

/// Spawn the session task for a validated submission
///
/// The session must already be open in the registry. The returned receiver
/// yields every event in sequence order and closes after the outcome has been
/// recorded.
pub fn start_session(
    orchestrator: Arc<Orchestrator>,
    registry: SessionRegistry,
    exporter: Arc<ReportExporter>,
    input: ResearchInput,
    settings: PipelineSettings,
    buffer: usize,
) -> SessionTask {
    let (tx, rx) = mpsc::channel(buffer.max(1));
    let session_id = input.session_id.clone();
    let span = info_span!("session", session_id = %session_id);

    let task_registry = registry.clone();
    let handle = tokio::spawn(
        async move {
            let mut emitter = EventEmitter::new(input.session_id.clone(), task_registry.clone(), tx);
            let input = Arc::new(input);

            let outcome = orchestrator
                .run(input.clone(), settings, &exporter, &mut emitter)
                .await;
            // Terminal outcomes were recorded with their event; this covers cancellation.
            task_registry.finish(&input.session_id, &outcome).await;

            // Closing the channel tells the stream the outcome is recorded.
            drop(emitter);
        }
        .instrument(span),
    );

    SessionTask {
        events: rx,
        guard: CancelGuard {
            session_id,
            registry,
            handle,
            armed: true,
        },
    }
}
