use serde::{Deserialize, Serialize};

/// `[x1, y1, x2, y2]`
pub type BBox = [f32; 4];

/// Ordered `(x, y)` vertices; empty when the model produced no mask.
pub type Polygon = Vec<[f32; 2]>;

/// One model output instance in tile-local pixel coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub polygon: Polygon,
}

/// A [`RawDetection`] shifted into the source image's coordinate space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalDetection {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BBox,
    pub polygon: Polygon,
}

/// Runner output for one tile: its pixel size and what the model found in it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TileDetections {
    pub width: u32,
    pub height: u32,
    pub detections: Vec<RawDetection>,
}
