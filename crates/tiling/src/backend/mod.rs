use crate::detection::RawDetection;
use image::RgbImage;
use std::path::Path;

mod handle;
pub mod letterbox;
pub mod yolo;

#[cfg(feature = "ort-backend")]
pub mod ort;

pub use handle::ModelHandle;

/// A tile that failed inference, and why.
#[derive(Debug)]
pub struct BatchError {
    pub index: usize,
    pub source: anyhow::Error,
}

/// A detection/segmentation model that works on one bounded-size image at a time.
///
/// Implementations are shared read-only across requests.
pub trait SegmentationBackend: Send + Sync {
    fn load_model(path: &Path) -> anyhow::Result<Self>
    where
        Self: Sized;

    /// Detections in tile-local pixel coordinates.
    fn infer_tile(&self, tile: &RgbImage) -> anyhow::Result<Vec<RawDetection>>;

    /// One result per tile, in input order.
    ///
    /// The default runs tiles sequentially and stops at the first failure.
    fn infer_batch(&self, tiles: &[RgbImage]) -> Result<Vec<Vec<RawDetection>>, BatchError> {
        tiles
            .iter()
            .enumerate()
            .map(|(index, tile)| {
                self.infer_tile(tile)
                    .map_err(|source| BatchError { index, source })
            })
            .collect()
    }
}
