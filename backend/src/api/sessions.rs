//! Session inspection API handlers

use crate::error::AppError;
use crate::report::{ExportFormat, ReportExporter};
use crate::session::{SessionId, SessionSnapshot};
use crate::state::SharedState;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Json, Response},
};
use serde::Deserialize;

/// Query parameters for the report download
#[derive(Debug, Deserialize)]
pub struct ReportQuery {
    /// `json` (default) or `markdown`
    pub format: Option<String>,
}

/// GET /api/sessions/:id - Session status and event log
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<SessionId>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(state.sessions.snapshot(&id).await?))
}

/// GET /api/sessions/:id/report - Download the session's report
pub async fn get_report(
    State(state): State<SharedState>,
    Path(id): Path<SessionId>,
    Query(query): Query<ReportQuery>,
) -> Result<Response, AppError> {
    let format = match query.format.as_deref() {
        None | Some("") => ExportFormat::Json,
        Some(f) => f.parse::<ExportFormat>().map_err(AppError::InvalidRequest)?,
    };

    let report = state.sessions.report(&id).await?;
    let body = ReportExporter::render(&report, format)?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, format.content_type())
        .header(
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"report-{}.{}\"",
                report.session_id,
                format.extension()
            ),
        )
        .body(body.into())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build report response: {}", e)))
}
