//! API module
//!
//! Contains HTTP request handlers for the research, session and settings
//! endpoints.

pub mod health;
pub mod research;
pub mod sessions;
pub mod settings;
pub mod streaming;
