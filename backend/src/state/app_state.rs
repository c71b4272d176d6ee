//! Application state shared by all handlers

use crate::capabilities::Capabilities;
use crate::config::Config;
use crate::pipeline::{Orchestrator, PipelineSettings};
use crate::report::ReportExporter;
use crate::session::SessionRegistry;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Shared application state handle
pub type SharedState = Arc<AppState>;

/// Main application state
///
/// Every field is either immutable after startup or carries its own lock, so
/// handlers never serialize on a state-wide lock.
pub struct AppState {
    /// Startup configuration
    pub config: Config,
    /// Session registry
    pub sessions: SessionRegistry,
    /// Research pipeline
    pub orchestrator: Arc<Orchestrator>,
    /// Runtime-adjustable pipeline settings; sessions take a snapshot at start
    pub settings: Arc<RwLock<PipelineSettings>>,
    /// Report file exporter
    pub exporter: Arc<ReportExporter>,
}

impl AppState {
    /// Create state around an existing orchestrator
    pub fn new(config: Config, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            sessions: SessionRegistry::new(),
            orchestrator,
            settings: Arc::new(RwLock::new(config.pipeline.clone())),
            exporter: Arc::new(ReportExporter::new(&config.export)),
            config,
        }
    }

    /// Create state with the standard HTTP-backed pipeline
    pub fn from_config(config: Config) -> anyhow::Result<Self> {
        let capabilities = Capabilities::from_config(&config.providers)?;
        Ok(Self::new(
            config,
            Arc::new(Orchestrator::standard(capabilities)),
        ))
    }

    /// Snapshot of the current pipeline settings
    pub async fn settings_snapshot(&self) -> PipelineSettings {
        self.settings.read().await.clone()
    }
}
