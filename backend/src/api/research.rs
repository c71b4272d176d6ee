//! Research submission endpoint
//!
//! `POST /api/research` accepts multipart form data with:
//! - `query` (alias `message`): query text
//! - `session_id`: optional client-supplied session identifier
//! - `file` / `files` / `attachments`: zero or more attachments
//!
//! Validation happens before the response starts; a rejected submission gets
//! a JSON error body and leaves no session behind. An accepted one gets a
//! `text/event-stream` response carrying the session's progress events.

use crate::api::streaming::sse_response;
use crate::error::AppError;
use crate::intake::{self, IntakeLimits, Submission, Upload};
use crate::session::start_session;
use crate::state::SharedState;
use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::Response,
};

/// POST /api/research - Start a research session and stream its progress
pub async fn submit_research(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Response, AppError> {
    let mut multipart =
        multipart.map_err(|e| AppError::InvalidRequest(format!("expected multipart form data: {}", e)))?;
    let submission = read_submission(&mut multipart).await?;

    // Snapshot: later settings updates do not affect this run.
    let settings = state.settings_snapshot().await;
    let limits = IntakeLimits {
        max_query_length: settings.max_query_length,
        max_upload_bytes: state.config.intake.max_upload_bytes,
        max_document_chars: state.config.intake.max_document_chars,
    };

    let input = intake::prepare(submission, &limits).await?;
    state.sessions.open(&input.session_id).await?;

    let session_id = input.session_id.clone();
    let task = start_session(
        state.orchestrator.clone(),
        state.sessions.clone(),
        state.exporter.clone(),
        input,
        settings,
        state.config.sessions.relay_buffer,
    );

    sse_response(&session_id, task)
}

/// Read the multipart body into a raw submission
async fn read_submission(multipart: &mut Multipart) -> Result<Submission, AppError> {
    let mut submission = Submission::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "query" | "message" => {
                submission.query = field.text().await.map_err(multipart_error)?;
            }
            "session_id" => {
                let text = field.text().await.map_err(multipart_error)?;
                let text = text.trim();
                if !text.is_empty() {
                    submission.session_id = Some(text.to_string());
                }
            }
            "file" | "files" | "attachments" => {
                let file_name = field.file_name().unwrap_or("").to_string();
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;

                // Browsers send an empty part when no file was chosen.
                if file_name.is_empty() && data.is_empty() {
                    continue;
                }

                submission.uploads.push(Upload {
                    file_name: if file_name.is_empty() {
                        "attachment".to_string()
                    } else {
                        file_name
                    },
                    content_type,
                    data: data.to_vec(),
                });
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown multipart field");
            }
        }
    }

    Ok(submission)
}

fn multipart_error(e: MultipartError) -> AppError {
    tracing::error!("Failed to read multipart field: {}", e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(e.body_text())
    } else {
        AppError::InvalidRequest(e.body_text())
    }
}
