use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};
use vmexport::api::{create_router, ApiState};
use vmexport::config::{load_config, ExporterConfig};
use vmexport::export::ExportCoordinator;
use vmexport::state::StateEngine;
use vmexport::subscription::TokioScheduler;
use vmexport::writer::VictoriaMetricsWriter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vmexport=info".into()),
        )
        .init();

    info!("VictoriaMetrics exporter starting...");

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("VMEXPORT_CONFIG").ok())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("vmexport.toml"));

    let mut config = if config_path.exists() {
        load_config(&config_path)?
    } else {
        warn!(path = %config_path.display(), "Config file not found, using defaults");
        ExporterConfig::default()
    };
    config.apply_env();
    config.validate().context("Invalid configuration")?;

    let entities = config.entity_configs();
    info!(
        endpoint = %config.endpoint.base_url(),
        entities = entities.len(),
        api_listen = %config.api.listen,
        "Configuration loaded"
    );
    if entities.is_empty() {
        warn!("No entities configured for export");
    }

    let writer = Arc::new(
        VictoriaMetricsWriter::new(config.writer_config())
            .context("Failed to create VictoriaMetrics writer")?,
    );
    if !writer.health_check().await {
        bail!(
            "Cannot reach VictoriaMetrics at {}",
            config.endpoint.base_url()
        );
    }
    info!(base_url = %writer.base_url(), "Connected to VictoriaMetrics");

    let state_engine = Arc::new(StateEngine::new());
    let mut coordinator = ExportCoordinator::new(
        entities,
        state_engine.clone(),
        state_engine.clone(),
        Arc::new(TokioScheduler::new()),
        writer,
    )
    .with_options(config.capture_options());
    coordinator.start();
    let coordinator = Arc::new(Mutex::new(coordinator));

    // Start HTTP API server
    let api_state = ApiState {
        coordinator: Arc::clone(&coordinator),
        state_engine,
        admin_token: config.api.admin_token(),
    };
    let router = create_router(api_state);
    let listener = tokio::net::TcpListener::bind(config.api.listen.as_str())
        .await
        .with_context(|| format!("Failed to bind API listener on {}", config.api.listen))?;
    info!(listen = %config.api.listen, "Control API listening");

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "Control API server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl_c signal")?;
    info!("Shutdown signal received");

    // Graceful shutdown
    server_handle.abort();
    coordinator.lock().await.shutdown().await;
    info!("VictoriaMetrics exporter stopped");

    Ok(())
}
