use crate::{
    backend::{BatchError, ModelHandle},
    detection::TileDetections,
    error::{Result, TilingError},
    grid::Tile,
};
use image::RgbImage;
use std::time::{Duration, Instant};

pub const DEFAULT_INFERENCE_TIMEOUT: Duration = Duration::from_secs(120);

/// Sends an ordered tile sequence to the model in one batched call.
///
/// Output index `i` always belongs to input tile `i`; the remapper relies on it.
#[derive(Clone)]
pub struct TileInferenceRunner {
    model: ModelHandle,
    timeout: Duration,
}

impl TileInferenceRunner {
    pub fn new(model: ModelHandle, timeout: Duration) -> Self {
        Self { model, timeout }
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Fails once for the whole request when no model is loaded.
    pub fn ensure_available(&self) -> Result<()> {
        self.model.acquire().map(|_| ())
    }

    #[tracing::instrument(skip_all, fields(tiles = tiles.len()))]
    pub async fn run(&self, tiles: &[Tile]) -> Result<Vec<TileDetections>> {
        let backend = self.model.acquire()?;
        if tiles.is_empty() {
            return Ok(Vec::new());
        }

        let images: Vec<RgbImage> = tiles.iter().map(|t| t.image.clone()).collect();
        let started = Instant::now();

        // The blocking thread keeps running past the deadline; only the request gives up.
        let job = tokio::task::spawn_blocking(move || backend.infer_batch(&images));
        let batch = match tokio::time::timeout(self.timeout, job).await {
            Err(_) => {
                tracing::warn!(timeout = ?self.timeout, "Model call timed out");
                return Err(TilingError::ModelUnavailable(format!(
                    "inference timed out after {:?}",
                    self.timeout
                )));
            }
            Ok(Err(join_error)) => {
                tracing::error!(error = %join_error, "Inference worker failed");
                return Err(TilingError::ModelUnavailable(format!(
                    "inference worker failed: {join_error}"
                )));
            }
            Ok(Ok(Err(BatchError { index, source }))) => {
                let (row, col) = tiles.get(index).map_or((0, 0), |t| (t.row, t.col));
                return Err(TilingError::TileInference {
                    index,
                    row,
                    col,
                    reason: format!("{source:#}"),
                });
            }
            Ok(Ok(Ok(batch))) => batch,
        };

        if batch.len() != tiles.len() {
            return Err(TilingError::TileCountMismatch {
                expected: tiles.len(),
                actual: batch.len(),
            });
        }

        tracing::debug!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            detections = batch.iter().map(Vec::len).sum::<usize>(),
            "Batch inference complete"
        );

        Ok(tiles
            .iter()
            .zip(batch)
            .map(|(tile, detections)| TileDetections {
                width: tile.width(),
                height: tile.height(),
                detections,
            })
            .collect())
    }
}
