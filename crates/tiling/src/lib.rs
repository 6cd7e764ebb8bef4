pub mod aggregate;
pub mod backend;
pub mod detection;
pub mod error;
pub mod grid;
pub mod remap;
pub mod report;
pub mod runner;
pub mod service;
pub mod store;
pub mod tasks;
pub mod visualize;

pub use aggregate::{AggregatedResult, DetectionAggregator};
pub use backend::{BatchError, ModelHandle, SegmentationBackend};
pub use detection::{BBox, GlobalDetection, Polygon, RawDetection, TileDetections};
pub use error::{ErrorKind, Result, TilingError};
pub use grid::{GridConfig, GridPartitioner, Tile, TileGeometry, TileSet};
pub use remap::{CoordinateRemapper, TileOffset};
pub use report::{Report, ReportAssembler, TileArtifacts};
pub use runner::TileInferenceRunner;
pub use service::{Collaborators, DetectionService, ServiceSettings};
pub use store::{
    BlobStore, DetectionRecord, DetectionStore, ImageRepository, JsonLinesStore, LocalBlobStore,
    MediaDirectory, MemoryBlobStore, MemoryDetectionStore,
};
pub use tasks::{TaskQueue, TaskRecord, TaskStatus};
pub use visualize::Visualizer;
