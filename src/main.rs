//! Skin Lesion Classification Service - Main Entry Point
//!
//! Loads the model ensemble once at startup and serves classification
//! requests over HTTP.

use anyhow::{Context, Result};
use skin_lesion_ensemble::{
    config::AppConfig,
    logging,
    metrics::{MetricsReporter, ServiceMetrics},
    models::{loader::ModelLoader, InferenceEngine},
    server::{self, AppState},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    logging::init(&config.logging)?;

    info!("Starting Skin Lesion Classification Service");
    info!(
        models_dir = %config.models.models_dir,
        device = %config.models.device,
        failure_policy = ?config.models.failure_policy,
        parallel = config.models.parallel,
        "Configuration loaded successfully"
    );

    ort::init()
        .with_name("skin-lesion-ensemble")
        .commit()
        .context("Failed to initialize ONNX Runtime")?;

    // Load models; failures here never abort startup
    let loader = ModelLoader::from_config(&config.models);
    let models_dir = config.models.models_dir.clone();
    let registry = tokio::task::spawn_blocking(move || loader.load_all(models_dir))
        .await
        .context("Model loading task panicked")?;
    let registry = Arc::new(registry);

    if registry.is_usable() {
        info!(
            "Inference engine initialized with {} models: {:?}",
            registry.len(),
            registry.model_names()
        );
    } else {
        error!("No models loaded; /predict will answer 503 until the service is restarted with models");
    }

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = Arc::new(AppState {
        registry,
        engine: InferenceEngine::new(&config.models),
        metrics: metrics.clone(),
        device: config.models.device,
        request_timeout: Duration::from_millis(config.server.request_timeout_ms),
    });
    let app = server::router(state, config.server.max_upload_bytes);

    let addr = config.listen_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    // Print final summary
    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
