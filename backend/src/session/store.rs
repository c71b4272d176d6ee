//! In-memory session registry
//!
//! The registry is the only structure shared between sessions. Its lock is
//! held for map updates only, never across an outbound call.

use crate::error::AppError;
use crate::pipeline::SessionOutcome;
use crate::report::Report;
use crate::session::{ProgressEvent, SessionId, SessionStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Capacity of the per-session watcher broadcast
const WATCH_CAPACITY: usize = 256;

/// Session record
#[derive(Debug)]
pub struct SessionRecord {
    /// Session identifier
    pub id: SessionId,
    /// Current status
    pub status: SessionStatus,
    /// When the current run started
    pub created_at: DateTime<Utc>,
    /// When the current run finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Ordered event log of the current run
    pub events: Vec<ProgressEvent>,
    /// Report, once a deep-research run completed
    pub report: Option<Arc<Report>>,
    /// Failure message, once a run failed
    pub error: Option<String>,
    watchers: broadcast::Sender<ProgressEvent>,
}

impl SessionRecord {
    fn new(id: SessionId) -> Self {
        let (watchers, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            id,
            status: SessionStatus::Running,
            created_at: Utc::now(),
            finished_at: None,
            events: Vec::new(),
            report: None,
            error: None,
            watchers,
        }
    }

    fn reset(&mut self) {
        self.status = SessionStatus::Running;
        self.created_at = Utc::now();
        self.finished_at = None;
        self.events.clear();
        self.report = None;
        self.error = None;
    }

    fn finish_with(&mut self, status: SessionStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    fn record_outcome(&mut self, outcome: &SessionOutcome) {
        match outcome {
            SessionOutcome::Reported(report) => {
                self.report = Some(Arc::clone(report));
                self.finish_with(SessionStatus::Completed);
            }
            SessionOutcome::Responded => self.finish_with(SessionStatus::Completed),
            SessionOutcome::Failed(failure) => {
                self.error = Some(failure.to_string());
                self.finish_with(SessionStatus::Failed);
            }
            SessionOutcome::Cancelled => self.finish_with(SessionStatus::Cancelled),
        }
    }

    fn ended_with_terminal_event(&self) -> bool {
        self.events.last().is_some_and(|e| e.kind.is_terminal())
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    /// Session identifier
    pub session_id: SessionId,
    /// Current status
    pub status: SessionStatus,
    /// When the current run started
    pub created_at: DateTime<Utc>,
    /// When the current run finished
    pub finished_at: Option<DateTime<Utc>>,
    /// Ordered event log
    pub events: Vec<ProgressEvent>,
    /// Whether a report can be downloaded
    pub has_report: bool,
    /// Failure message
    pub error: Option<String>,
}

/// Live subscription to a session
pub struct Subscription {
    /// Events already in the log when subscribing
    pub backlog: Vec<ProgressEvent>,
    /// Live events appended after the backlog
    pub live: broadcast::Receiver<ProgressEvent>,
    /// Status at subscription time
    pub status: SessionStatus,
}

/// Registry of sessions (id -> record)
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<HashMap<SessionId, SessionRecord>>>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for a new run
    ///
    /// An unseen identifier creates a record. A finished session is reopened
    /// with an empty log. A session that is still running is rejected.
    pub async fn open(&self, id: &str) -> Result<(), AppError> {
        let mut sessions = self.inner.write().await;
        match sessions.get_mut(id) {
            Some(record) if record.status == SessionStatus::Running => {
                Err(AppError::InvalidRequest(format!(
                    "session '{}' already has a run in progress",
                    id
                )))
            }
            Some(record) => {
                tracing::info!(session_id = %id, "Reopening finished session");
                record.reset();
                Ok(())
            }
            None => {
                sessions.insert(id.to_string(), SessionRecord::new(id.to_string()));
                tracing::info!(session_id = %id, "Session created");
                Ok(())
            }
        }
    }

    /// Append an event to the session log and hand it to watchers
    ///
    /// Both happen under the write lock so watchers that subscribe in between
    /// see every event exactly once (backlog or live).
    pub async fn append(&self, event: ProgressEvent) {
        let mut sessions = self.inner.write().await;
        match sessions.get_mut(&event.session_id) {
            Some(record) => {
                // No receivers is fine.
                let _ = record.watchers.send(event.clone());
                record.events.push(event);
            }
            None => {
                tracing::warn!(
                    session_id = %event.session_id,
                    seq = event.seq,
                    "Dropping event for unknown session"
                );
            }
        }
    }

    /// Log the terminal event of a run and record its outcome in one update
    ///
    /// Watchers receive the event after the outcome is visible.
    pub async fn append_terminal(&self, event: ProgressEvent, outcome: &SessionOutcome) {
        let mut sessions = self.inner.write().await;
        let Some(record) = sessions.get_mut(&event.session_id) else {
            tracing::warn!(
                session_id = %event.session_id,
                seq = event.seq,
                "Dropping terminal event for unknown session"
            );
            return;
        };
        record.record_outcome(outcome);
        let _ = record.watchers.send(event.clone());
        record.events.push(event);
        tracing::info!(
            session_id = %record.id,
            status = ?record.status,
            events = record.events.len(),
            "Session finished"
        );
    }

    /// Record the outcome of a run that ended without a terminal event
    ///
    /// No-op if the outcome was already recorded with the terminal event.
    pub async fn finish(&self, id: &str, outcome: &SessionOutcome) {
        let mut sessions = self.inner.write().await;
        let Some(record) = sessions.get_mut(id) else {
            tracing::warn!(session_id = %id, "Finished run for unknown session");
            return;
        };
        if record.status != SessionStatus::Running {
            return;
        }
        record.record_outcome(outcome);
        tracing::info!(
            session_id = %id,
            status = ?record.status,
            events = record.events.len(),
            "Session finished"
        );
    }

    /// Mark a running session as cancelled
    ///
    /// No-op if the session already finished or its run already logged a
    /// terminal event.
    pub async fn mark_cancelled(&self, id: &str) {
        let mut sessions = self.inner.write().await;
        if let Some(record) = sessions.get_mut(id) {
            if record.status == SessionStatus::Running && !record.ended_with_terminal_event() {
                record.finish_with(SessionStatus::Cancelled);
                tracing::info!(session_id = %id, "Session cancelled");
            }
        }
    }

    /// Current status of a session
    pub async fn status(&self, id: &str) -> Option<SessionStatus> {
        self.inner.read().await.get(id).map(|r| r.status)
    }

    /// Snapshot of a session
    pub async fn snapshot(&self, id: &str) -> Result<SessionSnapshot, AppError> {
        let sessions = self.inner.read().await;
        let record = sessions
            .get(id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;
        Ok(SessionSnapshot {
            session_id: record.id.clone(),
            status: record.status,
            created_at: record.created_at,
            finished_at: record.finished_at,
            events: record.events.clone(),
            has_report: record.report.is_some(),
            error: record.error.clone(),
        })
    }

    /// Report of a completed deep-research run
    pub async fn report(&self, id: &str) -> Result<Arc<Report>, AppError> {
        let sessions = self.inner.read().await;
        let record = sessions
            .get(id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;
        match (&record.report, record.status) {
            (Some(report), _) => Ok(Arc::clone(report)),
            (None, SessionStatus::Running) => Err(AppError::ReportUnavailable(format!(
                "session '{}' is still running",
                id
            ))),
            (None, status) => Err(AppError::ReportUnavailable(format!(
                "session '{}' finished without a report ({:?})",
                id, status
            ))),
        }
    }

    /// Subscribe to a session: backlog plus live events, taken under one lock
    pub async fn subscribe(&self, id: &str) -> Result<Subscription, AppError> {
        let sessions = self.inner.read().await;
        let record = sessions
            .get(id)
            .ok_or_else(|| AppError::SessionNotFound(id.to_string()))?;
        Ok(Subscription {
            backlog: record.events.clone(),
            live: record.watchers.subscribe(),
            status: record.status,
        })
    }

    /// Logged events with a sequence number greater than `after_seq`
    pub async fn events_since(&self, id: &str, after_seq: u64) -> Option<Vec<ProgressEvent>> {
        let sessions = self.inner.read().await;
        sessions.get(id).map(|record| {
            record
                .events
                .iter()
                .filter(|e| e.seq > after_seq)
                .cloned()
                .collect()
        })
    }

    /// Remove finished sessions older than `ttl`
    ///
    /// # Returns
    /// Number of sessions removed
    pub async fn sweep_expired(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> usize {
        let mut sessions = self.inner.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| match record.finished_at {
            Some(finished) if record.status.is_finished() => now - finished < ttl,
            _ => true,
        });
        before - sessions.len()
    }

    /// Number of sessions in the registry
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Whether the registry is empty
    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{FailureKind, Stage, StageFailure};
    use crate::session::EventKind;
    use serde_json::json;

    fn event(session_id: &str, seq: u64, kind: EventKind) -> ProgressEvent {
        ProgressEvent {
            session_id: session_id.to_string(),
            seq,
            kind,
            stage: None,
            message: format!("event {}", seq),
            payload: None,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_open_rejects_running_session() {
        let registry = SessionRegistry::new();
        registry.open("s1").await.unwrap();
        let err = registry.open("s1").await.unwrap_err();
        assert!(matches!(err, AppError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_reopen_finished_session_resets_log() {
        let registry = SessionRegistry::new();
        registry.open("s1").await.unwrap();
        registry
            .append(event("s1", 1, EventKind::SessionStarted))
            .await;
        registry.finish("s1", &SessionOutcome::Responded).await;

        registry.open("s1").await.unwrap();
        let snapshot = registry.snapshot("s1").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Running);
        assert!(snapshot.events.is_empty());
        assert!(snapshot.finished_at.is_none());
    }

    #[tokio::test]
    async fn test_finish_failed_records_error() {
        let registry = SessionRegistry::new();
        registry.open("s1").await.unwrap();
        let failure = StageFailure {
            stage: Stage::Research,
            kind: FailureKind::Timeout,
            detail: "no response within 1s".to_string(),
        };
        registry
            .finish("s1", &SessionOutcome::Failed(failure))
            .await;

        let snapshot = registry.snapshot("s1").await.unwrap();
        assert_eq!(snapshot.status, SessionStatus::Failed);
        assert!(snapshot.error.unwrap().contains("research"));
        assert!(matches!(
            registry.report("s1").await,
            Err(AppError::ReportUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_report_available_after_completion() {
        let registry = SessionRegistry::new();
        registry.open("s1").await.unwrap();
        assert!(matches!(
            registry.report("s1").await,
            Err(AppError::ReportUnavailable(_))
        ));

        let report = Report::assemble(
            "s1",
            &json!({"executive_summary": "summary", "conclusion": "done"}),
        )
        .unwrap();
        registry
            .finish("s1", &SessionOutcome::Reported(Arc::new(report)))
            .await;

        let stored = registry.report("s1").await.unwrap();
        assert_eq!(stored.executive_summary, "summary");
        assert!(matches!(
            registry.report("missing").await,
            Err(AppError::SessionNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_mark_cancelled_only_running() {
        let registry = SessionRegistry::new();
        registry.open("a").await.unwrap();
        registry.open("b").await.unwrap();
        registry.finish("b", &SessionOutcome::Responded).await;

        registry.mark_cancelled("a").await;
        registry.mark_cancelled("b").await;

        assert_eq!(registry.status("a").await, Some(SessionStatus::Cancelled));
        assert_eq!(registry.status("b").await, Some(SessionStatus::Completed));
    }

    #[tokio::test]
    async fn test_terminal_append_records_outcome_before_watchers() {
        let registry = SessionRegistry::new();
        registry.open("s1").await.unwrap();
        let mut subscription = registry.subscribe("s1").await.unwrap();

        let report = Report::assemble(
            "s1",
            &json!({"executive_summary": "summary", "conclusion": "done"}),
        )
        .unwrap();
        registry
            .append_terminal(
                event("s1", 1, EventKind::Report),
                &SessionOutcome::Reported(Arc::new(report)),
            )
            .await;

        assert_eq!(subscription.live.recv().await.unwrap().kind, EventKind::Report);
        assert_eq!(registry.status("s1").await, Some(SessionStatus::Completed));
        assert!(registry.report("s1").await.is_ok());

        // Neither a late cancellation nor a second finish changes the outcome
        registry.mark_cancelled("s1").await;
        registry.finish("s1", &SessionOutcome::Cancelled).await;
        assert_eq!(registry.status("s1").await, Some(SessionStatus::Completed));
        assert!(registry.report("s1").await.is_ok());
    }

    #[tokio::test]
    async fn test_mark_cancelled_ignores_run_with_terminal_event() {
        let registry = SessionRegistry::new();
        registry.open("s1").await.unwrap();
        registry.append(event("s1", 1, EventKind::Error)).await;

        registry.mark_cancelled("s1").await;
        assert_eq!(registry.status("s1").await, Some(SessionStatus::Running));
    }

    #[tokio::test]
    async fn test_subscribe_sees_backlog_then_live() {
        let registry = SessionRegistry::new();
        registry.open("s1").await.unwrap();
        registry
            .append(event("s1", 1, EventKind::SessionStarted))
            .await;

        let mut subscription = registry.subscribe("s1").await.unwrap();
        assert_eq!(subscription.backlog.len(), 1);

        registry
            .append(event("s1", 2, EventKind::StageStarted))
            .await;
        let live = subscription.live.recv().await.unwrap();
        assert_eq!(live.seq, 2);

        let since = registry.events_since("s1", 1).await.unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].seq, 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired_finished_sessions() {
        let registry = SessionRegistry::new();
        registry.open("running").await.unwrap();
        registry.open("done").await.unwrap();
        registry.finish("done", &SessionOutcome::Responded).await;

        let ttl = chrono::Duration::seconds(60);
        assert_eq!(registry.sweep_expired(Utc::now(), ttl).await, 0);

        let later = Utc::now() + chrono::Duration::seconds(120);
        assert_eq!(registry.sweep_expired(later, ttl).await, 1);
        assert_eq!(registry.len().await, 1);
        assert_eq!(
            registry.status("running").await,
            Some(SessionStatus::Running)
        );
    }
}
