use common::{TelemetryGuard, setup_logging};
use server::{AppState, config::ServerConfig, config::get_configuration, cors_layer, router};
use std::sync::Arc;
use tiling::{
    Collaborators, DetectionService, JsonLinesStore, LocalBlobStore, MediaDirectory, ModelHandle,
    TaskQueue,
};

#[cfg(feature = "ort-backend")]
use tiling::backend::ort::{OrtOptions, OrtSegmentation};

#[cfg(not(feature = "ort-backend"))]
compile_error!("The 'ort-backend' feature must be enabled to serve a model");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration()?;

    let _telemetry = match &config.otel_endpoint {
        Some(endpoint) => Some(TelemetryGuard::init(
            "tiler-server",
            endpoint,
            config.environment,
            &config.log_level,
        )?),
        None => {
            setup_logging(config.environment, &config.log_level);
            None
        }
    };

    tracing::info!(config = ?config, "Loaded configuration");

    let settings = config.service_settings()?;
    let model = load_model(&config);
    let tasks = TaskQueue::start(config.task_history);

    let collaborators = Collaborators {
        images: Arc::new(MediaDirectory::new(&config.media_dir)),
        records: Arc::new(JsonLinesStore::new(&config.records_path)),
        blobs: Arc::new(LocalBlobStore::new(
            &config.blob_root,
            config.blob_bucket.clone(),
            config.blob_base_url.clone(),
        )),
    };
    let service = DetectionService::new(settings, model.clone(), collaborators, tasks.clone())?;

    let app = router(AppState::new(service), cors_layer(&config.cors_origins)?);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Draining background tasks");
    tasks.shutdown().await;
    model.shutdown();

    Ok(())
}

/// A failed load is logged and the server starts anyway; requests then get 503.
fn load_model(config: &ServerConfig) -> ModelHandle {
    let options = OrtOptions {
        input_size: (config.input_size, config.input_size),
        confidence_threshold: config.confidence_threshold,
        iou_threshold: config.iou_threshold,
        ..Default::default()
    };

    match OrtSegmentation::with_options(&config.model_path, options) {
        Ok(backend) => ModelHandle::new(backend),
        Err(e) => {
            tracing::error!(
                path = %config.model_path.display(),
                error = %e,
                "Error loading model"
            );
            ModelHandle::unloaded()
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown signal received");
}
