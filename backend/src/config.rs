//! Application configuration
//!
//! Centralized configuration management with environment variable support
//! and sensible defaults. A `.env` file is loaded by `main` before this runs.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::AppError;
use crate::pipeline::settings::{validate_settings, PipelineSettings};

/// Longest accepted session TTL (ten years)
const MAX_SESSION_TTL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Outbound provider configuration
    pub providers: ProviderConfig,
    /// Default pipeline settings (adjustable at runtime via `/api/config`)
    pub pipeline: PipelineSettings,
    /// Request intake limits
    pub intake: IntakeConfig,
    /// Session bookkeeping configuration
    pub sessions: SessionConfig,
    /// Report export configuration
    pub export: ExportConfig,
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind the server to
    pub port: u16,
    /// Host address to bind to
    pub host: String,
}

/// Outbound provider configuration
#[derive(Clone)]
pub struct ProviderConfig {
    /// API key for the OpenAI-compatible LLM, vision and image endpoints
    pub openai_api_key: String,
    /// Base URL of the OpenAI-compatible API
    pub openai_base_url: String,
    /// API key for the Tavily search API
    pub tavily_api_key: String,
    /// Base URL of the Tavily search API
    pub tavily_base_url: String,
    /// Transport-level timeout for a single outbound HTTP request (in seconds)
    pub http_timeout_secs: u64,
}

// Keys stay out of the startup log.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("tavily_api_key", &redact(&self.tavily_api_key))
            .field("tavily_base_url", &self.tavily_base_url)
            .field("http_timeout_secs", &self.http_timeout_secs)
            .finish()
    }
}

/// Request intake limits
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    /// Maximum size of a single attachment (in bytes)
    pub max_upload_bytes: usize,
    /// Maximum number of characters kept from an extracted document
    pub max_document_chars: usize,
}

/// Session bookkeeping configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How long a finished session stays queryable (in seconds)
    pub ttl_secs: u64,
    /// Interval between expiry sweeps (in seconds)
    pub sweep_interval_secs: u64,
    /// Capacity of the per-session relay channel
    pub relay_buffer: usize,
}

impl SessionConfig {
    /// Session TTL, clamped to ten years
    pub fn ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.ttl_secs.min(MAX_SESSION_TTL_SECS) as i64)
    }

    /// Interval between expiry sweeps, at least one second
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// Report export configuration
#[derive(Debug, Clone)]
pub struct ExportConfig {
    /// Whether reports are exported to files at all
    pub enabled: bool,
    /// Directory exported reports are written to
    pub dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let defaults = PipelineSettings::default();
        Self {
            server: ServerConfig {
                port: env_or("PORT", 8000),
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            },
            providers: ProviderConfig {
                openai_api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                openai_base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                tavily_api_key: env::var("TAVILY_API_KEY").unwrap_or_default(),
                tavily_base_url: env::var("TAVILY_BASE_URL")
                    .unwrap_or_else(|_| "https://api.tavily.com".to_string()),
                http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 120),
            },
            pipeline: PipelineSettings {
                llm_model: env::var("LLM_MODEL").unwrap_or(defaults.llm_model),
                vision_model: env::var("VISION_MODEL").unwrap_or(defaults.vision_model),
                image_model: env::var("IMAGE_MODEL").unwrap_or(defaults.image_model),
                image_size: env::var("IMAGE_SIZE").unwrap_or(defaults.image_size),
                stage_timeout_secs: env_or("STAGE_TIMEOUT_SECS", defaults.stage_timeout_secs),
                max_research_tasks: env_or("MAX_RESEARCH_TASKS", defaults.max_research_tasks),
                max_search_results: env_or("MAX_SEARCH_RESULTS", defaults.max_search_results),
                max_visuals: env_or("MAX_VISUALS", defaults.max_visuals),
                max_query_length: env_or("MAX_QUERY_LENGTH", defaults.max_query_length),
            },
            intake: IntakeConfig {
                max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 10 * 1024 * 1024),
                max_document_chars: env_or("MAX_DOCUMENT_CHARS", 20_000),
            },
            sessions: SessionConfig {
                ttl_secs: env_or("SESSION_TTL_SECS", 3600),
                sweep_interval_secs: env_or("SESSION_SWEEP_INTERVAL_SECS", 60),
                relay_buffer: env_or("RELAY_BUFFER", 32),
            },
            export: ExportConfig {
                enabled: env_or("EXPORT_ENABLED", true),
                dir: env::var("EXPORT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("exports")),
            },
        }
    }

    /// Validate the startup configuration
    ///
    /// Pipeline defaults go through the same rules as `/api/config` updates.
    pub fn validate(&self) -> Result<(), AppError> {
        validate_settings(&self.pipeline)?;
        if self.sessions.relay_buffer == 0 {
            return Err(AppError::InvalidConfig(
                "RELAY_BUFFER must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the server address as a string
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<redacted>"
    }
}
