use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use image::RgbImage;
use ndarray::Array4;

const LETTERBOX_COLOR: u8 = 114;

/// How a tile was fitted into the model input; inverted when mapping outputs back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxTransform {
    pub scale: f32,
    pub pad_x: f32,
    pub pad_y: f32,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl LetterboxTransform {
    /// Model-input coordinates to tile-local pixels, clamped to the tile.
    #[inline]
    pub fn to_tile(&self, x: f32, y: f32) -> [f32; 2] {
        [
            ((x - self.pad_x) / self.scale).clamp(0.0, self.tile_width as f32),
            ((y - self.pad_y) / self.scale).clamp(0.0, self.tile_height as f32),
        ]
    }
}

/// Resizes tiles into a fixed square-ish model input, keeping aspect ratio.
pub struct Letterbox {
    input_size: (u32, u32),
    resizer: Resizer,
}

impl Letterbox {
    pub fn new(input_size: (u32, u32)) -> Self {
        Self {
            input_size,
            resizer: Resizer::new(),
        }
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.input_size
    }

    pub fn transform_for(&self, width: u32, height: u32) -> LetterboxTransform {
        let (input_width, input_height) = self.input_size;
        let scale = (input_width as f32 / width as f32).min(input_height as f32 / height as f32);
        let new_width = ((width as f32 * scale) as u32).clamp(1, input_width);
        let new_height = ((height as f32 * scale) as u32).clamp(1, input_height);

        LetterboxTransform {
            scale,
            pad_x: ((input_width - new_width) / 2) as f32,
            pad_y: ((input_height - new_height) / 2) as f32,
            tile_width: width,
            tile_height: height,
        }
    }

    /// NCHW float tensor in `[0, 1]` plus the transform that produced it.
    pub fn apply(&mut self, tile: &RgbImage) -> anyhow::Result<(Array4<f32>, LetterboxTransform)> {
        let (width, height) = tile.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("Cannot letterbox an empty tile ({}x{})", width, height);
        }

        let transform = self.transform_for(width, height);
        let (input_width, input_height) = self.input_size;
        let new_width = ((width as f32 * transform.scale) as u32).clamp(1, input_width);
        let new_height = ((height as f32 * transform.scale) as u32).clamp(1, input_height);

        let src = ImageRef::new(width, height, tile.as_raw(), PixelType::U8x3)?;
        let mut resized = Image::new(new_width, new_height, PixelType::U8x3);
        self.resizer.resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        let plane = (input_width * input_height) as usize;
        let mut data = vec![LETTERBOX_COLOR as f32 / 255.0; 3 * plane];
        let resized_data = resized.buffer();
        let (pad_x, pad_y) = (transform.pad_x as u32, transform.pad_y as u32);

        for y in 0..new_height {
            for x in 0..new_width {
                let src_idx = ((y * new_width + x) * 3) as usize;
                let dst_idx = ((y + pad_y) * input_width + (x + pad_x)) as usize;
                for c in 0..3 {
                    data[c * plane + dst_idx] = resized_data[src_idx + c] as f32 / 255.0;
                }
            }
        }

        let tensor = Array4::from_shape_vec(
            (1, 3, input_height as usize, input_width as usize),
            data,
        )?;
        Ok((tensor, transform))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_transform_for_wide_tile() {
        let letterbox = Letterbox::new((640, 640));
        let t = letterbox.transform_for(320, 160);
        assert_eq!(t.scale, 2.0);
        assert_eq!(t.pad_x, 0.0);
        assert_eq!(t.pad_y, 160.0);
    }

    #[test]
    fn test_to_tile_inverts_and_clamps() {
        let letterbox = Letterbox::new((640, 640));
        let t = letterbox.transform_for(320, 160);
        assert_eq!(t.to_tile(100.0, 200.0), [50.0, 20.0]);
        assert_eq!(t.to_tile(-5.0, 700.0), [0.0, 160.0]);
    }

    #[test]
    fn test_apply_fills_padding_and_content() {
        let mut letterbox = Letterbox::new((8, 8));
        let tile = RgbImage::from_pixel(4, 2, Rgb([255, 0, 0]));
        let (tensor, t) = letterbox.apply(&tile).unwrap();

        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
        assert_eq!((t.pad_x, t.pad_y), (0.0, 2.0));
        // Padding row
        assert!((tensor[[0, 0, 0, 0]] - 114.0 / 255.0).abs() < 1e-6);
        // Content row: solid red
        assert!((tensor[[0, 0, 3, 3]] - 1.0).abs() < 1e-3);
        assert!(tensor[[0, 1, 3, 3]].abs() < 1e-3);
    }

    #[test]
    fn test_apply_rejects_empty_tile() {
        let mut letterbox = Letterbox::new((8, 8));
        assert!(letterbox.apply(&RgbImage::new(0, 0)).is_err());
    }
}
