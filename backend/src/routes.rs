//! HTTP router
//!
//! Route table and middleware stack shared by the binary and the tests.

use crate::api;
use crate::intake::MAX_ATTACHMENTS;
use crate::state::SharedState;
use crate::websocket;
use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Room for the text fields and multipart framing on top of the attachments
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        uri = %uri,
    );

    let response = next.run(request).instrument(span).await;

    // For SSE responses this measures time to first byte, not stream length.
    let duration = start.elapsed();
    info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %response.status().as_u16(),
        duration_ms = duration.as_millis(),
        "Request completed"
    );

    response
}

/// Build the application router
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state
        .config
        .intake
        .max_upload_bytes
        .saturating_mul(MAX_ATTACHMENTS)
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    Router::new()
        // Health check and banner
        .route("/", get(api::health::hello_world))
        .route("/api/health", get(api::health::health_check))
        .route("/status", get(api::health::health_check))
        // Research sessions
        .route("/api/research", post(api::research::submit_research))
        .route("/api/sessions/:id", get(api::sessions::get_session))
        .route("/api/sessions/:id/report", get(api::sessions::get_report))
        // Pipeline settings
        .route(
            "/api/config",
            get(api::settings::get_settings).post(api::settings::update_settings),
        )
        // WebSocket session watch
        .route("/ws/sessions/:id", get(websocket::session_watch_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(CorsLayer::permissive()) // Allow CORS for development
        .with_state(state)
}
