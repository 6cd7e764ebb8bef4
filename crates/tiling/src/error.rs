use std::io;
use thiserror::Error;

/// Coarse classification used by callers to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Unavailable,
    BadRequest,
    NotFound,
    Internal,
}

#[derive(Error, Debug)]
pub enum TilingError {
    #[error("Invalid grid configuration: rows={rows}, cols={cols} (both must be positive)")]
    InvalidGrid { rows: u32, cols: u32 },

    #[error("Image {width}x{height} is too small for a {rows}x{cols} grid")]
    ImageTooSmall {
        width: u32,
        height: u32,
        rows: u32,
        cols: u32,
    },

    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("Inference failed on tile {index} (row {row}, col {col}): {reason}")]
    TileInference {
        index: usize,
        row: u32,
        col: u32,
        reason: String,
    },

    #[error("Model returned {actual} tile results for {expected} tiles")]
    TileCountMismatch { expected: usize, actual: usize },

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file type `{extension}`, allowed types: {allowed}")]
    UnsupportedFormat { extension: String, allowed: String },

    #[error("No images to merge")]
    NoImagesToMerge,

    #[error("Report rendering failed: {0}")]
    Report(String),

    #[error("Cannot decode image `{file_id}`: {source}")]
    InvalidImage {
        file_id: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl TilingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TilingError::InvalidGrid { .. } => ErrorKind::Configuration,
            TilingError::ModelUnavailable(_) => ErrorKind::Unavailable,
            TilingError::TileInference { .. }
            | TilingError::TileCountMismatch { .. }
            | TilingError::ImageTooSmall { .. }
            | TilingError::UnsupportedFormat { .. }
            | TilingError::InvalidImage { .. } => ErrorKind::BadRequest,
            TilingError::FileNotFound(_) => ErrorKind::NotFound,
            // Encoding or writing our own tiles, visualizations and reports
            TilingError::NoImagesToMerge
            | TilingError::Report(_)
            | TilingError::Image(_)
            | TilingError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Only an unavailable model is worth retrying later; everything else fails the same way again.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}

pub type Result<T> = std::result::Result<T, TilingError>;
