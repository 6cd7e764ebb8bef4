use super::SegmentationBackend;
use super::letterbox::Letterbox;
use super::yolo::{YoloSegDecoder, parse_class_names};
use crate::detection::RawDetection;
use image::RgbImage;
use ndarray::{Ix3, Ix4};
use ort::{
    session::{Session, builder::GraphOptimizationLevel},
    value::TensorRef,
};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

const INPUT_NAME: &str = "images";
const PREDICTIONS_NAME: &str = "output0";
const PROTOS_NAME: &str = "output1";

#[derive(Debug, Clone)]
pub struct OrtOptions {
    pub input_size: (u32, u32),
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub intra_threads: usize,
}

impl Default for OrtOptions {
    fn default() -> Self {
        Self {
            input_size: (640, 640),
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            intra_threads: 4,
        }
    }
}

/// YOLO segmentation model exported to ONNX, run on CPU.
pub struct OrtSegmentation {
    // `Session::run` takes `&mut self`; tiles of concurrent requests serialize here.
    session: Mutex<Session>,
    letterbox: Mutex<Letterbox>,
    decoder: YoloSegDecoder,
}

impl OrtSegmentation {
    pub fn with_options(path: &Path, options: OrtOptions) -> anyhow::Result<Self> {
        if !path.exists() {
            anyhow::bail!("Model file not found: {}", path.display());
        }

        // Initialize ORT environment (idempotent)
        let _ = ort::init().commit();

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(options.intra_threads)?
            .commit_from_file(path)?;

        let class_names = session
            .metadata()
            .ok()
            .and_then(|metadata| metadata.custom("names").ok().flatten())
            .map(|raw| parse_class_names(&raw))
            .unwrap_or_default();

        tracing::info!(
            path = %path.display(),
            classes = class_names.len(),
            "Segmentation model loaded"
        );

        Ok(Self {
            session: Mutex::new(session),
            letterbox: Mutex::new(Letterbox::new(options.input_size)),
            decoder: YoloSegDecoder {
                confidence_threshold: options.confidence_threshold,
                iou_threshold: options.iou_threshold,
                class_names,
                ..Default::default()
            },
        })
    }

    pub fn class_names(&self) -> &[String] {
        &self.decoder.class_names
    }
}

impl SegmentationBackend for OrtSegmentation {
    fn load_model(path: &Path) -> anyhow::Result<Self> {
        Self::with_options(path, OrtOptions::default())
    }

    fn infer_tile(&self, tile: &RgbImage) -> anyhow::Result<Vec<RawDetection>> {
        let (input, transform, input_size) = {
            let mut letterbox = self.letterbox.lock().unwrap_or_else(PoisonError::into_inner);
            let (input, transform) = letterbox.apply(tile)?;
            (input, transform, letterbox.input_size())
        };

        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        let outputs = session.run(ort::inputs![
            INPUT_NAME => TensorRef::from_array_view(input.view())?
        ])?;

        let preds = outputs[PREDICTIONS_NAME]
            .try_extract_array::<f32>()?
            .into_dimensionality::<Ix3>()?;
        let protos = match outputs.get(PROTOS_NAME) {
            Some(value) => Some(
                value
                    .try_extract_array::<f32>()?
                    .into_dimensionality::<Ix4>()?,
            ),
            None => None,
        };

        self.decoder
            .decode(&preds, protos.as_ref(), &transform, input_size)
    }
}
