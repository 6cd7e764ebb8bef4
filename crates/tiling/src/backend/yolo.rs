//! Decoding of YOLO segmentation heads.
//!
//! `preds` is `[1, 4 + nc + nm, N]`: box `cx, cy, w, h` in model-input pixels, `nc`
//! class scores, `nm` mask coefficients. `protos` is `[1, nm, mh, mw]`.

use super::letterbox::LetterboxTransform;
use crate::detection::{BBox, Polygon, RawDetection};
use image::{GrayImage, Luma};
use imageproc::contours::{BorderType, find_contours};
use ndarray::{ArrayView3, ArrayView4};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct YoloSegDecoder {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub mask_threshold: f32,
    pub max_detections: usize,
    pub class_names: Vec<String>,
}

impl Default for YoloSegDecoder {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.25,
            iou_threshold: 0.7,
            mask_threshold: 0.5,
            max_detections: 300,
            class_names: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    class_id: u32,
    confidence: f32,
    bbox: BBox,
    coeffs: Vec<f32>,
}

impl YoloSegDecoder {
    pub fn class_name(&self, class_id: u32) -> String {
        self.class_names
            .get(class_id as usize)
            .cloned()
            .unwrap_or_else(|| format!("class_{class_id}"))
    }

    #[tracing::instrument(skip_all)]
    pub fn decode(
        &self,
        preds: &ArrayView3<f32>,
        protos: Option<&ArrayView4<f32>>,
        transform: &LetterboxTransform,
        input_size: (u32, u32),
    ) -> anyhow::Result<Vec<RawDetection>> {
        let num_masks = protos.map_or(0, |p| p.shape()[1]);
        let channels = preds.shape()[1];
        if channels < 5 + num_masks {
            anyhow::bail!(
                "Prediction head has {} channels, expected at least {}",
                channels,
                5 + num_masks
            );
        }
        let num_classes = channels - 4 - num_masks;

        let candidates = self.collect_candidates(preds, num_classes, num_masks);
        let kept = non_max_suppression(candidates, self.iou_threshold, self.max_detections);

        let detections = kept
            .into_iter()
            .map(|candidate| {
                let polygon = match protos {
                    Some(protos) => self.mask_polygon(&candidate, protos, transform, input_size),
                    None => Vec::new(),
                };
                let [x1, y1] = transform.to_tile(candidate.bbox[0], candidate.bbox[1]);
                let [x2, y2] = transform.to_tile(candidate.bbox[2], candidate.bbox[3]);

                RawDetection {
                    class_id: candidate.class_id,
                    class_name: self.class_name(candidate.class_id),
                    confidence: candidate.confidence,
                    bbox: [x1, y1, x2, y2],
                    polygon,
                }
            })
            .collect();

        Ok(detections)
    }

    fn collect_candidates(
        &self,
        preds: &ArrayView3<f32>,
        num_classes: usize,
        num_masks: usize,
    ) -> Vec<Candidate> {
        let num_anchors = preds.shape()[2];
        let mut candidates = Vec::new();

        for i in 0..num_anchors {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for c in 0..num_classes {
                let score = preds[[0, 4 + c, i]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }

            if best_score < self.confidence_threshold {
                continue;
            }

            let (cx, cy, w, h) = (
                preds[[0, 0, i]],
                preds[[0, 1, i]],
                preds[[0, 2, i]],
                preds[[0, 3, i]],
            );
            let coeffs = (0..num_masks)
                .map(|k| preds[[0, 4 + num_classes + k, i]])
                .collect();

            candidates.push(Candidate {
                class_id: best_class as u32,
                confidence: best_score,
                bbox: [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0],
                coeffs,
            });
        }

        candidates
    }

    /// Binarize the instance mask inside its box at prototype resolution and
    /// trace the largest outer contour.
    fn mask_polygon(
        &self,
        candidate: &Candidate,
        protos: &ArrayView4<f32>,
        transform: &LetterboxTransform,
        input_size: (u32, u32),
    ) -> Polygon {
        let (mask_height, mask_width) = (protos.shape()[2], protos.shape()[3]);
        let sx = mask_width as f32 / input_size.0 as f32;
        let sy = mask_height as f32 / input_size.1 as f32;

        let x1 = ((candidate.bbox[0] * sx).floor().max(0.0) as usize).min(mask_width);
        let y1 = ((candidate.bbox[1] * sy).floor().max(0.0) as usize).min(mask_height);
        let x2 = ((candidate.bbox[2] * sx).ceil().max(0.0) as usize).min(mask_width);
        let y2 = ((candidate.bbox[3] * sy).ceil().max(0.0) as usize).min(mask_height);
        if x1 >= x2 || y1 >= y2 {
            return Vec::new();
        }

        let mut mask = GrayImage::new(mask_width as u32, mask_height as u32);
        for y in y1..y2 {
            for x in x1..x2 {
                let logit: f32 = candidate
                    .coeffs
                    .iter()
                    .enumerate()
                    .map(|(k, coeff)| coeff * protos[[0, k, y, x]])
                    .sum();
                if sigmoid(logit) > self.mask_threshold {
                    mask.put_pixel(x as u32, y as u32, Luma([255]));
                }
            }
        }

        find_contours::<u32>(&mask)
            .into_iter()
            .filter(|contour| contour.border_type == BorderType::Outer)
            .max_by_key(|contour| contour.points.len())
            .map(|contour| {
                contour
                    .points
                    .iter()
                    .map(|p| transform.to_tile((p.x as f32 + 0.5) / sx, (p.y as f32 + 0.5) / sy))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Greedy per-class NMS; result sorted by descending confidence.
fn non_max_suppression(
    mut candidates: Vec<Candidate>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        let suppressed = kept.iter().any(|k| {
            k.class_id == candidate.class_id && iou(&k.bbox, &candidate.bbox) > iou_threshold
        });
        if !suppressed {
            kept.push(candidate);
        }
    }
    kept
}

fn iou(a: &BBox, b: &BBox) -> f32 {
    let ix = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0);
    let iy = (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    let intersection = ix * iy;
    let area_a = (a[2] - a[0]).max(0.0) * (a[3] - a[1]).max(0.0);
    let area_b = (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0);
    let union = area_a + area_b - intersection;
    if union <= 0.0 { 0.0 } else { intersection / union }
}

#[inline]
fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Parse Ultralytics `names` metadata, e.g. `{0: 'person', 1: 'bicycle'}`.
///
/// Missing ids in the range are filled with `class_{id}`.
pub fn parse_class_names(raw: &str) -> Vec<String> {
    let mut names = BTreeMap::new();
    let mut rest = raw.trim().trim_start_matches('{').trim_end_matches('}');

    while let Some(colon) = rest.find(':') {
        let key = rest[..colon].trim().trim_start_matches(',').trim();
        let after = rest[colon + 1..].trim_start();
        let Some(quote) = after.chars().next().filter(|c| *c == '\'' || *c == '"') else {
            break;
        };
        let value = &after[1..];
        let Some(end) = value.find(quote) else {
            break;
        };
        if let Ok(id) = key.parse::<usize>() {
            names.insert(id, value[..end].to_string());
        }
        rest = &value[end + 1..];
    }

    let len = names.keys().next_back().map_or(0, |last| last + 1);
    (0..len)
        .map(|id| {
            names
                .get(&id)
                .cloned()
                .unwrap_or_else(|| format!("class_{id}"))
        })
        .collect()
}
