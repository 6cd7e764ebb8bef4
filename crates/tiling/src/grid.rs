use crate::error::{Result, TilingError};
use common::span;
use image::RgbImage;
use serde::{Deserialize, Serialize};

pub const DEFAULT_GRID_ROWS: u32 = 1;
pub const DEFAULT_GRID_COLS: u32 = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridConfig {
    pub rows: u32,
    pub cols: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            rows: DEFAULT_GRID_ROWS,
            cols: DEFAULT_GRID_COLS,
        }
    }
}

impl GridConfig {
    pub fn new(rows: u32, cols: u32) -> Result<Self> {
        let config = Self { rows, cols };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rows == 0 || self.cols == 0 {
            return Err(TilingError::InvalidGrid {
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    pub fn tile_count(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Row-major position of the tile at `index`.
    #[inline]
    pub fn position(&self, index: usize) -> (u32, u32) {
        let cols = self.cols as usize;
        ((index / cols) as u32, (index % cols) as u32)
    }
}

/// Nominal tile size for one image under one grid. Offsets are always derived from here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub grid: GridConfig,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl TileGeometry {
    pub fn for_image(grid: GridConfig, width: u32, height: u32) -> Result<Self> {
        grid.validate()?;

        let tile_width = width / grid.cols;
        let tile_height = height / grid.rows;
        if tile_width == 0 || tile_height == 0 {
            return Err(TilingError::ImageTooSmall {
                width,
                height,
                rows: grid.rows,
                cols: grid.cols,
            });
        }

        Ok(Self {
            grid,
            tile_width,
            tile_height,
        })
    }

    /// Pixel offset of the tile's top-left corner in the source image.
    #[inline]
    pub fn offset(&self, row: u32, col: u32) -> (u32, u32) {
        (col * self.tile_width, row * self.tile_height)
    }

    /// Source pixels covered by the grid. Remainder strips on the right and bottom are excluded.
    pub fn covered_area(&self) -> u64 {
        self.grid.tile_count() as u64 * self.tile_width as u64 * self.tile_height as u64
    }
}

#[derive(Debug, Clone)]
pub struct Tile {
    pub row: u32,
    pub col: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub image: RgbImage,
}

impl Tile {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Tiles of one image in row-major order, plus the geometry that produced them.
#[derive(Debug, Clone)]
pub struct TileSet {
    pub geometry: TileGeometry,
    pub tiles: Vec<Tile>,
}

impl TileSet {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GridPartitioner {
    grid: GridConfig,
}

impl GridPartitioner {
    pub fn new(grid: GridConfig) -> Result<Self> {
        grid.validate()?;
        Ok(Self { grid })
    }

    pub fn grid(&self) -> GridConfig {
        self.grid
    }

    /// Slice `image` into `rows x cols` tiles of `floor(W/cols) x floor(H/rows)` pixels.
    ///
    /// Pixels past `cols * tile_width` or `rows * tile_height` are dropped, not redistributed.
    #[tracing::instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn partition(&self, image: &RgbImage) -> Result<TileSet> {
        let _s = span!("partition");

        let geometry = TileGeometry::for_image(self.grid, image.width(), image.height())?;
        let mut tiles = Vec::with_capacity(self.grid.tile_count());

        for row in 0..self.grid.rows {
            for col in 0..self.grid.cols {
                let (x_offset, y_offset) = geometry.offset(row, col);
                let tile_image = image::imageops::crop_imm(
                    image,
                    x_offset,
                    y_offset,
                    geometry.tile_width,
                    geometry.tile_height,
                )
                .to_image();

                tiles.push(Tile {
                    row,
                    col,
                    x_offset,
                    y_offset,
                    image: tile_image,
                });
            }
        }

        tracing::debug!(
            tiles = tiles.len(),
            tile_width = geometry.tile_width,
            tile_height = geometry.tile_height,
            dropped_columns = image.width() - self.grid.cols * geometry.tile_width,
            dropped_rows = image.height() - self.grid.rows * geometry.tile_height,
            "Image partitioned"
        );

        Ok(TileSet { geometry, tiles })
    }
}

/// `{stem}_r{row}_c{col}.{ext}`, the on-disk name of a tile and of its visualization.
pub fn tile_file_name(stem: &str, row: u32, col: u32, extension: &str) -> String {
    format!("{stem}_r{row}_c{col}.{extension}")
}
