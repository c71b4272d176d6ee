//! Streaming utilities for Server-Sent Events (SSE)
//!
//! Turns a session's event channel into an SSE response. Each progress event
//! becomes one frame:
//!
//! ```text
//! id: <seq>
//! event: <kind>
//! data: <event json>
//! ```

use crate::error::AppError;
use crate::session::{ProgressEvent, SessionTask};
use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::Response,
};
use futures_util::stream::Stream;

/// Response header carrying the session identifier
pub const SESSION_ID_HEADER: &str = "x-session-id";

/// Format one progress event as an SSE frame
pub fn format_sse_event(event: &ProgressEvent) -> String {
    match serde_json::to_string(event) {
        Ok(data) => format!(
            "id: {}\nevent: {}\ndata: {}\n\n",
            event.seq,
            event.kind.as_str(),
            data
        ),
        Err(e) => {
            tracing::error!(seq = event.seq, error = %e, "Failed to serialize progress event");
            format!(
                "id: {}\nevent: error\ndata: {{\"error\":\"serialization\",\"seq\":{}}}\n\n",
                event.seq, event.seq
            )
        }
    }
}

/// Create an SSE response for a running session
///
/// # Arguments
/// * `session_id` - Session identifier, echoed in the `X-Session-Id` header
/// * `task` - Running session (event channel and cancel guard)
///
/// # Returns
/// * `Result<Response, AppError>` - SSE HTTP response or error
pub fn sse_response(session_id: &str, task: SessionTask) -> Result<Response, AppError> {
    let session_header = HeaderValue::from_str(session_id)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid session id header: {}", e)))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .header(SESSION_ID_HEADER, session_header)
        .body(Body::from_stream(event_stream(task)))
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build SSE response: {}", e)))
}

/// Stream of SSE frames; dropping it before the terminal event cancels the run
fn event_stream(task: SessionTask) -> impl Stream<Item = Result<String, std::io::Error>> {
    use async_stream::stream;

    stream! {
        let SessionTask { mut events, mut guard } = task;

        while let Some(event) = events.recv().await {
            if event.kind.is_terminal() {
                guard.disarm();
            }
            yield Ok(format_sse_event(&event));
        }

        // Channel closed: the outcome has been recorded. A still-armed guard
        // means the task ended without a terminal event.
        drop(guard);
    }
}
