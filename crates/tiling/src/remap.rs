use crate::{
    detection::{GlobalDetection, RawDetection, TileDetections},
    error::{Result, TilingError},
    grid::TileGeometry,
};
use common::span_debug;

/// Translation from tile-local to global pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileOffset {
    pub x: f32,
    pub y: f32,
}

impl TileOffset {
    pub fn for_tile(geometry: &TileGeometry, row: u32, col: u32) -> Self {
        let (x, y) = geometry.offset(row, col);
        Self {
            x: x as f32,
            y: y as f32,
        }
    }

    #[inline]
    pub fn shift(&self, [x, y]: [f32; 2]) -> [f32; 2] {
        [x + self.x, y + self.y]
    }

    #[inline]
    pub fn unshift(&self, [x, y]: [f32; 2]) -> [f32; 2] {
        [x - self.x, y - self.y]
    }
}

/// Shift every coordinate of `raw` by `offset`.
///
/// Not idempotent: applying it to an already-global detection shifts it twice.
pub fn remap_detection(raw: &RawDetection, offset: TileOffset) -> GlobalDetection {
    let [x1, y1, x2, y2] = raw.bbox;
    let [gx1, gy1] = offset.shift([x1, y1]);
    let [gx2, gy2] = offset.shift([x2, y2]);

    GlobalDetection {
        class_id: raw.class_id,
        class_name: raw.class_name.clone(),
        confidence: raw.confidence,
        bbox: [gx1, gy1, gx2, gy2],
        polygon: raw.polygon.iter().map(|&p| offset.shift(p)).collect(),
    }
}

/// Maps runner output back onto the source image.
///
/// A tile's position is recovered from its index in the runner output
/// (`row = i / cols`, `col = i % cols`), so the output must keep partition order.
#[derive(Debug, Clone, Copy)]
pub struct CoordinateRemapper {
    geometry: TileGeometry,
}

impl CoordinateRemapper {
    /// `geometry` must be the one the tiles were partitioned with.
    pub fn new(geometry: TileGeometry) -> Self {
        Self { geometry }
    }

    pub fn offset_for_index(&self, index: usize) -> TileOffset {
        let (row, col) = self.geometry.grid.position(index);
        TileOffset::for_tile(&self.geometry, row, col)
    }

    /// Detections in tile row-major order, then per-tile model order.
    pub fn remap_tiles(&self, tiles: &[TileDetections]) -> Result<Vec<GlobalDetection>> {
        let _s = span_debug!("remap_tiles");

        let expected = self.geometry.grid.tile_count();
        if tiles.len() != expected {
            return Err(TilingError::TileCountMismatch {
                expected,
                actual: tiles.len(),
            });
        }

        let total: usize = tiles.iter().map(|t| t.detections.len()).sum();
        let mut remapped = Vec::with_capacity(total);

        for (index, tile) in tiles.iter().enumerate() {
            let offset = self.offset_for_index(index);
            remapped.extend(
                tile.detections
                    .iter()
                    .map(|raw| remap_detection(raw, offset)),
            );
        }

        tracing::trace!(tiles = tiles.len(), detections = total, "Remapped tile detections");
        Ok(remapped)
    }
}
