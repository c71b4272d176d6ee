//! Ordered event emission for one session run

use crate::pipeline::{SessionOutcome, Stage};
use crate::session::{EventKind, ProgressEvent, SessionId, SessionRegistry};
use chrono::Utc;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{self, error::TrySendError};

/// Time the emitter has spent waiting on a full relay channel
///
/// Shared with the orchestrator so that a slow stream consumer does not count
/// against a stage's time budget.
#[derive(Clone)]
pub struct RelayStall {
    inner: Arc<StallState>,
}

struct StallState {
    origin: Instant,
    /// Finished waits, in nanoseconds
    total_nanos: AtomicU64,
    /// Start of the current wait as nanoseconds since `origin`, plus one; 0 when not waiting
    since_nanos: AtomicU64,
}

impl RelayStall {
    fn new() -> Self {
        Self {
            inner: Arc::new(StallState {
                origin: Instant::now(),
                total_nanos: AtomicU64::new(0),
                since_nanos: AtomicU64::new(0),
            }),
        }
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.inner.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn begin(&self) -> StallGuard<'_> {
        self.inner
            .since_nanos
            .store(self.now_nanos().saturating_add(1), Ordering::SeqCst);
        StallGuard(self)
    }

    fn end(&self) {
        let since = self.inner.since_nanos.swap(0, Ordering::SeqCst);
        if since > 0 {
            let waited = self.now_nanos().saturating_sub(since - 1);
            self.inner.total_nanos.fetch_add(waited, Ordering::SeqCst);
        }
    }

    /// Total time spent waiting, including a wait in progress
    pub fn stalled(&self) -> Duration {
        let mut nanos = self.inner.total_nanos.load(Ordering::SeqCst);
        let since = self.inner.since_nanos.load(Ordering::SeqCst);
        if since > 0 {
            nanos = nanos.saturating_add(self.now_nanos().saturating_sub(since - 1));
        }
        Duration::from_nanos(nanos)
    }

    /// Whether a send is waiting right now
    pub fn is_stalled(&self) -> bool {
        self.inner.since_nanos.load(Ordering::SeqCst) > 0
    }
}

// Ends the wait even when the send future is dropped.
struct StallGuard<'a>(&'a RelayStall);

impl Drop for StallGuard<'_> {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// Produces the ordered progress events of a single session run
///
/// Sequence numbers start at 1 and are assigned here only, so they are
/// gap-free by construction. Each event is recorded in the registry before it
/// is forwarded to the relay channel.
pub struct EventEmitter {
    session_id: SessionId,
    next_seq: u64,
    registry: SessionRegistry,
    tx: mpsc::Sender<ProgressEvent>,
    consumer_gone: bool,
    stall: RelayStall,
}

impl EventEmitter {
    /// Create an emitter for a session run
    pub fn new(session_id: SessionId, registry: SessionRegistry, tx: mpsc::Sender<ProgressEvent>) -> Self {
        Self {
            session_id,
            next_seq: 1,
            registry,
            tx,
            consumer_gone: false,
            stall: RelayStall::new(),
        }
    }

    /// Handle on the time spent waiting for the stream consumer
    pub fn relay_stall(&self) -> RelayStall {
        self.stall.clone()
    }

    /// Emit one event
    ///
    /// Suspends while the relay channel is full. Once the consumer is gone the
    /// event is still logged, and `consumer_gone` reports true.
    ///
    /// # Returns
    /// The sequence number assigned to the event
    pub async fn emit(
        &mut self,
        kind: EventKind,
        stage: Option<Stage>,
        message: impl Into<String>,
        payload: Option<Value>,
    ) -> u64 {
        let event = self.next_event(kind, stage, message.into(), payload);
        let seq = event.seq;
        self.registry.append(event.clone()).await;
        self.send(event).await;
        seq
    }

    /// Emit the terminal event of the run together with its outcome
    ///
    /// The outcome is recorded in the same registry update that logs the
    /// event, before the event is handed to the relay. A consumer that leaves
    /// while the terminal event is in flight cannot turn the run into a
    /// cancellation.
    pub async fn emit_terminal(
        &mut self,
        kind: EventKind,
        stage: Option<Stage>,
        message: impl Into<String>,
        payload: Option<Value>,
        outcome: &SessionOutcome,
    ) -> u64 {
        debug_assert!(kind.is_terminal());
        let event = self.next_event(kind, stage, message.into(), payload);
        let seq = event.seq;
        self.registry.append_terminal(event.clone(), outcome).await;
        self.send(event).await;
        seq
    }

    /// Emit incremental output from a running stage
    pub async fn delta(&mut self, stage: Stage, message: impl Into<String>, payload: Option<Value>) -> u64 {
        self.emit(EventKind::Delta, Some(stage), message, payload).await
    }

    /// Whether the stream consumer has gone away
    pub fn consumer_gone(&self) -> bool {
        self.consumer_gone || self.tx.is_closed()
    }

    fn next_event(
        &mut self,
        kind: EventKind,
        stage: Option<Stage>,
        message: String,
        payload: Option<Value>,
    ) -> ProgressEvent {
        let seq = self.next_seq;
        self.next_seq += 1;
        tracing::debug!(seq, kind = kind.as_str(), "Emitting progress event");
        ProgressEvent {
            session_id: self.session_id.clone(),
            seq,
            kind,
            stage,
            message,
            payload,
            timestamp: Utc::now(),
        }
    }

    async fn send(&mut self, event: ProgressEvent) {
        if self.consumer_gone {
            return;
        }
        let seq = event.seq;
        let delivered = match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Closed(_)) => false,
            Err(TrySendError::Full(event)) => {
                let _waiting = self.stall.begin();
                self.tx.send(event).await.is_ok()
            }
        };
        if !delivered {
            tracing::info!(session_id = %self.session_id, seq, "Stream consumer disconnected");
            self.consumer_gone = true;
        }
    }
}
