//! State management module
//!
//! Holds the application state shared across handlers.

pub mod app_state;

pub use app_state::{AppState, SharedState};
