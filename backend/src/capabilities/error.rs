//! Capability-specific error types
//!
//! Errors that can occur while calling an outbound capability (LLM, vision,
//! search, image generation).

use thiserror::Error;

/// Errors that can occur during a capability call
#[derive(Error, Debug)]
pub enum CapabilityError {
    /// No API key configured for the provider
    #[error("{0} API key is not configured")]
    MissingApiKey(&'static str),

    /// Request could not be sent or the response could not be read
    #[error("{provider} request failed: {detail}")]
    Transport {
        /// Provider name
        provider: &'static str,
        /// Underlying error message
        detail: String,
    },

    /// Provider rejected the request because of rate limiting (HTTP 429)
    #[error("{provider} rate limit exceeded (HTTP 429): {body}")]
    RateLimited {
        /// Provider name
        provider: &'static str,
        /// Response body
        body: String,
    },

    /// Provider returned a non-success status
    #[error("{provider} returned error status {status}: {body}")]
    Status {
        /// Provider name
        provider: &'static str,
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Response body did not have the expected shape
    #[error("Failed to parse {provider} response: {detail}")]
    InvalidResponse {
        /// Provider name
        provider: &'static str,
        /// Parse error and offending content
        detail: String,
    },

    /// Provider answered but produced nothing usable
    #[error("{provider} returned an empty response: {detail}")]
    EmptyResponse {
        /// Provider name
        provider: &'static str,
        /// What was missing
        detail: String,
    },

    /// Output arrived but does not have the structure the caller asked for
    #[error("Malformed output: {detail}")]
    MalformedOutput {
        /// What was wrong with the output
        detail: String,
    },

    /// Provider refused to answer (content filter or refusal)
    #[error("{provider} blocked the request: {reason}")]
    Blocked {
        /// Provider name
        provider: &'static str,
        /// Refusal or filter reason
        reason: String,
    },
}

impl CapabilityError {
    /// Whether the error is the provider throttling us
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, CapabilityError::RateLimited { .. })
    }
}
