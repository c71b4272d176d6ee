//! Deep Research Backend Library
//!
//! This library exposes modules for testing and external use.
//! The main binary is in `src/main.rs`.

pub mod api;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod report;
pub mod routes;
pub mod services;
pub mod session;
/// Application state management
///
/// Holds the session registry, pipeline and runtime settings.
pub mod state;
pub mod websocket;
