//! Session bookkeeping and the streaming relay
//!
//! A session is one research run: it owns an ordered log of progress events
//! and, once finished, either a report or an error. Events are produced by a
//! single session task through an [`EventEmitter`], which numbers them, records
//! them in the [`SessionRegistry`] and forwards them to the client stream.

pub mod emitter;
pub mod relay;
pub mod store;

pub use emitter::{EventEmitter, RelayStall};
pub use relay::{start_session, CancelGuard, SessionTask};
pub use store::{SessionRecord, SessionRegistry, SessionSnapshot, Subscription};

use crate::pipeline::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Unique identifier for a session
pub type SessionId = String;

/// Kind of a progress event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Session run has started
    SessionStarted,
    /// A pipeline stage has started
    StageStarted,
    /// Incremental output from a running stage
    Delta,
    /// A pipeline stage has finished
    StageCompleted,
    /// Minimal reply for a simple-chat query (terminal)
    Response,
    /// Final research report (terminal)
    Report,
    /// Session failed (terminal)
    Error,
}

impl EventKind {
    /// Wire name, used as the SSE `event:` field
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::SessionStarted => "session_started",
            EventKind::StageStarted => "stage_started",
            EventKind::Delta => "delta",
            EventKind::StageCompleted => "stage_completed",
            EventKind::Response => "response",
            EventKind::Report => "report",
            EventKind::Error => "error",
        }
    }

    /// Whether this kind ends a session run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::Response | EventKind::Report | EventKind::Error
        )
    }
}

/// One ordered progress event of a session run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Session the event belongs to
    pub session_id: SessionId,
    /// Sequence number, strictly increasing from 1 within a run
    pub seq: u64,
    /// Event kind
    pub kind: EventKind,
    /// Stage that produced the event (absent for session-level events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
    /// Human-readable message
    pub message: String,
    /// Structured payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// When the event was emitted
    pub timestamp: DateTime<Utc>,
}

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Session task is running
    Running,
    /// Finished with a report or a simple-chat response
    Completed,
    /// Finished with a stage failure
    Failed,
    /// Consumer disconnected before the run finished
    Cancelled,
}

impl SessionStatus {
    /// Whether the session has finished
    pub fn is_finished(&self) -> bool {
        !matches!(self, SessionStatus::Running)
    }
}
