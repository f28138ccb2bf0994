//! Fraud Prediction Service - Main Entry Point
//!
//! Loads the configured model once, then serves `/health` and `/v1/predict`.
//! A model that fails to load leaves the service up in a degraded state.

use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use prediction_service::{
    config::{AppConfig, LogFormat, LoggingConfig},
    metrics::{MetricsReporter, ServiceMetrics},
    models::{inference::InferenceEngine, loader::ModelLoader},
    server::{routes, AppState},
};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[actix_web::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_tracing(&config.logging)?;

    info!("Starting Fraud Prediction Service");
    info!(
        model_path = %config.model.path.display(),
        model_version = %config.model.version,
        "Configuration loaded successfully"
    );

    // Load the model; failure degrades to "model not loaded"
    let loader = ModelLoader::with_threads(config.model.onnx_threads)
        .with_feature_order(config.model.feature_order.clone());
    let model_path = config.model.resolved_path();
    let model = match loader.load_shared(&model_path) {
        Ok(model) => Some(model),
        Err(e) => {
            error!(error = %e, "Failed to load model, serving without one");
            None
        }
    };

    let engine = InferenceEngine::new(model, config.model.version.clone());
    info!(
        loaded = engine.is_loaded(),
        model = engine.model_name().unwrap_or("none"),
        "Inference engine initialized"
    );

    // Initialize metrics
    let metrics = Arc::new(ServiceMetrics::new());
    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let state = web::Data::new(AppState::new(engine, metrics.clone()));
    let (host, port) = config.bind_addr();
    let workers = config.server.workers.max(1);

    info!(host = %host, port = port, workers = workers, "Starting HTTP server");

    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .workers(workers)
        .bind((host.as_str(), port))
        .with_context(|| format!("Failed to bind {}:{}", host, port))?
        .run()
        .await
        .context("HTTP server failed")?;

    // Print final summary
    info!("Prediction service shutting down...");
    metrics.print_summary();

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(logging.level.to_lowercase())
        .with_context(|| format!("Invalid log level `{}`", logging.level))?;

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }

    Ok(())
}
