use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tiling::{GridConfig, ServiceSettings, TilingError};

pub use common::Environment;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub environment: Environment,
    pub log_level: String,
    pub bind_addr: String,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub inference_timeout_ms: u64,
    pub grid_rows: u32,
    pub grid_cols: u32,
    pub work_dir: PathBuf,
    pub media_dir: PathBuf,
    pub records_path: PathBuf,
    pub blob_root: PathBuf,
    pub blob_base_url: String,
    pub blob_bucket: String,
    pub allowed_types: Vec<String>,
    pub cors_origins: Vec<String>,
    pub task_history: usize,
    pub otel_endpoint: Option<String>,
}

impl ServerConfig {
    /// Fails when rows or cols is zero.
    pub fn grid(&self) -> Result<GridConfig, TilingError> {
        GridConfig::new(self.grid_rows, self.grid_cols)
    }

    pub fn service_settings(&self) -> Result<ServiceSettings, TilingError> {
        Ok(ServiceSettings {
            grid: self.grid()?,
            work_dir: self.work_dir.clone(),
            allowed_types: self.allowed_types.clone(),
            inference_timeout: Duration::from_millis(self.inference_timeout_ms),
        })
    }
}

/// Defaults overlaid with `TILER_*` environment variables, e.g. `TILER_GRID_COLS=14`.
///
/// Lists are comma separated: `TILER_ALLOWED_TYPES=png,jpeg`.
pub fn get_configuration() -> Result<ServerConfig, config::ConfigError> {
    build_configuration(config::Environment::with_prefix("TILER"))
}

pub fn build_configuration(
    source: config::Environment,
) -> Result<ServerConfig, config::ConfigError> {
    let config = config::Config::builder()
        .set_default("environment", "development")?
        .set_default("log_level", "info")?
        .set_default("bind_addr", "0.0.0.0:8001")?
        .set_default("model_path", "models/model.onnx")?
        .set_default("input_size", 640)?
        .set_default("confidence_threshold", 0.25)?
        .set_default("iou_threshold", 0.7)?
        .set_default("inference_timeout_ms", 120_000)?
        .set_default("grid_rows", 1)?
        .set_default("grid_cols", 28)?
        .set_default("work_dir", "/tmp/tiler")?
        .set_default("media_dir", "media")?
        .set_default("records_path", "data/detections.jsonl")?
        .set_default("blob_root", "data/blobs")?
        .set_default("blob_base_url", "http://localhost:8001/blobs")?
        .set_default("blob_bucket", "reports")?
        .set_default("allowed_types", vec!["png", "jpeg"])?
        .set_default("cors_origins", vec!["*"])?
        .set_default("task_history", 256)?
        .add_source(
            source
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("allowed_types")
                .with_list_parse_key("cors_origins")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize::<ServerConfig>()
}
