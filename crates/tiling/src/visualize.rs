use crate::{
    detection::{RawDetection, TileDetections},
    error::{Result, TilingError},
    grid::{Tile, tile_file_name},
    report::TileArtifacts,
};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::path::Path;

const PALETTE_SIZE: usize = 80;

/// Draws tile-local detections onto tile copies: box outline plus mask outline.
#[derive(Debug, Clone)]
pub struct Visualizer {
    colors: Vec<Rgb<u8>>,
}

impl Default for Visualizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Visualizer {
    pub fn new() -> Self {
        let colors = (0..PALETTE_SIZE)
            .map(|i| hsv_to_rgb((i as f32 / PALETTE_SIZE as f32) * 360.0, 0.8, 0.9))
            .collect();
        Self { colors }
    }

    pub fn color_for(&self, class_id: u32) -> Rgb<u8> {
        self.colors[class_id as usize % self.colors.len()]
    }

    pub fn render(&self, tile: &RgbImage, detections: &[RawDetection]) -> RgbImage {
        let mut canvas = tile.clone();
        for detection in detections {
            let color = self.color_for(detection.class_id);
            draw_box(&mut canvas, detection, color);
            draw_outline(&mut canvas, &detection.polygon, color);
        }
        canvas
    }

    /// Render and save every tile as `{stem}_r{row}_c{col}.png` under `dir`.
    #[tracing::instrument(skip(self, tiles, results), fields(tiles = tiles.len()))]
    pub fn save_tiles(
        &self,
        dir: &Path,
        stem: &str,
        tiles: &[Tile],
        results: &[TileDetections],
    ) -> Result<TileArtifacts> {
        if tiles.len() != results.len() {
            return Err(TilingError::TileCountMismatch {
                expected: tiles.len(),
                actual: results.len(),
            });
        }

        std::fs::create_dir_all(dir)?;
        let mut artifacts = TileArtifacts::default();

        for (tile, result) in tiles.iter().zip(results) {
            let path = dir.join(tile_file_name(stem, tile.row, tile.col, "png"));
            self.render(&tile.image, &result.detections).save(&path)?;
            artifacts.insert(tile.row, tile.col, path);
        }

        Ok(artifacts)
    }
}

fn draw_box(canvas: &mut RgbImage, detection: &RawDetection, color: Rgb<u8>) {
    let [x1, y1, x2, y2] = detection.bbox;
    let x = x1.max(0.0);
    let y = y1.max(0.0);
    let width = (x2.min(canvas.width() as f32) - x) as u32;
    let height = (y2.min(canvas.height() as f32) - y) as u32;

    if width > 0 && height > 0 {
        draw_hollow_rect_mut(canvas, Rect::at(x as i32, y as i32).of_size(width, height), color);
    }
}

fn draw_outline(canvas: &mut RgbImage, polygon: &[[f32; 2]], color: Rgb<u8>) {
    if polygon.len() < 2 {
        return;
    }
    for (i, &[x0, y0]) in polygon.iter().enumerate() {
        let [x1, y1] = polygon[(i + 1) % polygon.len()];
        draw_line_segment_mut(canvas, (x0, y0), (x1, y1), color);
    }
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = if h < 60.0 {
        (c, x, 0.0)
    } else if h < 120.0 {
        (x, c, 0.0)
    } else if h < 180.0 {
        (0.0, c, x)
    } else if h < 240.0 {
        (0.0, x, c)
    } else if h < 300.0 {
        (x, 0.0, c)
    } else {
        (c, 0.0, x)
    };

    Rgb([
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(bbox: [f32; 4], polygon: Vec<[f32; 2]>) -> RawDetection {
        RawDetection {
            class_id: 0,
            class_name: "crack".into(),
            confidence: 0.9,
            bbox,
            polygon,
        }
    }

    #[test]
    fn test_render_draws_box_outline_only() {
        let visualizer = Visualizer::new();
        let tile = RgbImage::new(10, 10);
        let rendered = visualizer.render(&tile, &[detection([2.0, 2.0, 8.0, 8.0], Vec::new())]);

        let color = visualizer.color_for(0);
        assert_eq!(*rendered.get_pixel(2, 2), color);
        assert_eq!(*rendered.get_pixel(7, 5), color);
        // Interior untouched
        assert_eq!(*rendered.get_pixel(5, 5), Rgb([0, 0, 0]));
        // Source tile untouched
        assert_eq!(*tile.get_pixel(2, 2), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_render_tolerates_degenerate_geometry() {
        let visualizer = Visualizer::new();
        let tile = RgbImage::new(4, 4);
        let rendered = visualizer.render(
            &tile,
            &[
                detection([3.0, 3.0, 3.0, 3.0], vec![[1.0, 1.0]]),
                detection([-5.0, -5.0, 50.0, 50.0], vec![[0.0, 0.0], [3.0, 3.0]]),
            ],
        );
        assert_eq!(rendered.dimensions(), (4, 4));
        assert_eq!(*rendered.get_pixel(1, 1), visualizer.color_for(0));
    }

    #[test]
    fn test_palette_wraps_by_class() {
        let visualizer = Visualizer::new();
        assert_eq!(visualizer.color_for(3), visualizer.color_for(3 + PALETTE_SIZE as u32));
        assert_ne!(visualizer.color_for(0), visualizer.color_for(40));
    }

    #[test]
    fn test_save_tiles_records_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let tiles: Vec<Tile> = (0..3)
            .map(|col| Tile {
                row: 0,
                col,
                x_offset: col * 5,
                y_offset: 0,
                image: RgbImage::new(5, 5),
            })
            .collect();
        let results = vec![TileDetections::default(); 3];

        let artifacts = Visualizer::new()
            .save_tiles(dir.path(), "scan", &tiles, &results)
            .unwrap();

        assert_eq!(artifacts.len(), 3);
        let path = artifacts.get(0, 2).unwrap();
        assert!(path.ends_with("scan_r0_c2.png"));
        assert!(path.exists());
    }

    #[test]
    fn test_save_tiles_rejects_mismatched_results() {
        let dir = tempfile::tempdir().unwrap();
        let tiles = vec![Tile {
            row: 0,
            col: 0,
            x_offset: 0,
            y_offset: 0,
            image: RgbImage::new(2, 2),
        }];
        assert!(
            Visualizer::new()
                .save_tiles(dir.path(), "scan", &tiles, &[])
                .is_err()
        );
    }
}
