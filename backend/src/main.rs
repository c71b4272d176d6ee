//! Deep Research Backend
//!
//! Accepts research queries with attachments, runs them through the
//! multi-stage research pipeline and streams progress to the client as
//! Server-Sent Events, ending with a structured report.

use deep_research_backend::config::Config;
use deep_research_backend::routes::build_router;
use deep_research_backend::session::SessionRegistry;
use deep_research_backend::state::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before anything reads the environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = Config::from_env();
    config.validate()?;
    info!("Configuration loaded: {:?}", config);

    if config.providers.openai_api_key.is_empty() {
        tracing::warn!("OPENAI_API_KEY is not set; research sessions will fail at the first stage");
    }
    if config.providers.tavily_api_key.is_empty() {
        tracing::warn!("TAVILY_API_KEY is not set; the research stage will fail");
    }

    // Bind to address from config
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    // Initialize application state
    let app_state = Arc::new(AppState::from_config(config)?);

    spawn_session_sweeper(
        app_state.sessions.clone(),
        app_state.config.sessions.sweep_interval(),
        app_state.config.sessions.ttl(),
    );

    let app = build_router(app_state);

    info!("🚀 Server running on http://{}", addr);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    // Setup graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Periodically remove finished sessions older than the TTL
fn spawn_session_sweeper(registry: SessionRegistry, every: Duration, ttl: chrono::Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let removed = registry.sweep_expired(chrono::Utc::now(), ttl).await;
            if removed > 0 {
                info!(removed, "Expired sessions swept");
            }
        }
    });
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
