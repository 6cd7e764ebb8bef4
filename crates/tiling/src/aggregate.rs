use crate::detection::{BBox, GlobalDetection, Polygon};
use serde::{Deserialize, Serialize};

/// All detections of one source image as parallel arrays: index `i` of every
/// sequence describes the same detection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub masks: Vec<Polygon>,
    pub boxes: Vec<BBox>,
    pub classes: Vec<String>,
    pub class_ids: Vec<u32>,
    pub confidences: Vec<f32>,
    pub detected_count: usize,
}

impl AggregatedResult {
    pub fn push(&mut self, detection: GlobalDetection) {
        self.masks.push(detection.polygon);
        self.boxes.push(detection.bbox);
        self.classes.push(detection.class_name);
        self.class_ids.push(detection.class_id);
        self.confidences.push(detection.confidence);
        self.detected_count = self.classes.len();
    }

    pub fn len(&self) -> usize {
        self.detected_count
    }

    pub fn is_empty(&self) -> bool {
        self.detected_count == 0
    }

    /// `(class_name, confidence)` in result order; the report listing.
    pub fn listing(&self) -> impl Iterator<Item = (&str, f32)> {
        self.classes
            .iter()
            .zip(self.confidences.iter())
            .map(|(class, &confidence)| (class.as_str(), confidence))
    }

    pub fn is_consistent(&self) -> bool {
        let n = self.detected_count;
        self.masks.len() == n
            && self.boxes.len() == n
            && self.classes.len() == n
            && self.class_ids.len() == n
            && self.confidences.len() == n
    }
}

impl FromIterator<GlobalDetection> for AggregatedResult {
    fn from_iter<I: IntoIterator<Item = GlobalDetection>>(iter: I) -> Self {
        let mut result = AggregatedResult::default();
        for detection in iter {
            result.push(detection);
        }
        result
    }
}

/// Concatenates remapped detections. Detections that meet at a tile border stay separate.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetectionAggregator;

impl DetectionAggregator {
    pub fn aggregate(&self, detections: Vec<GlobalDetection>) -> AggregatedResult {
        let result: AggregatedResult = detections.into_iter().collect();
        debug_assert!(result.is_consistent());
        result
    }
}
