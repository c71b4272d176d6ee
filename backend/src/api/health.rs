//! Health and banner endpoints

use crate::state::SharedState;
use axum::{extract::State, response::Json};
use serde::Serialize;

/// Service banner
#[derive(Serialize)]
pub struct HelloResponse {
    /// Greeting
    pub message: String,
    /// Status indicator
    pub status: String,
}

/// Health check payload
#[derive(Serialize)]
pub struct HealthResponse {
    /// Status indicator
    pub status: String,
    /// Crate version
    pub version: String,
    /// Human-readable message
    pub message: String,
    /// Sessions currently held in the registry
    pub sessions: usize,
}

/// GET / - Service banner
pub async fn hello_world() -> Json<HelloResponse> {
    Json(HelloResponse {
        message: "Deep research relay backend".to_string(),
        status: "ok".to_string(),
    })
}

/// GET /api/health and GET /status - Health check
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        message: "API is running".to_string(),
        sessions: state.sessions.len().await,
    })
}
