//! Detection data model shared by the single-image and live paths.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single detected object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    /// Bounding box in pixel coordinates: (x, y, width, height).
    pub bbox: (f32, f32, f32, f32),
}

/// Aggregated detection statistics.
///
/// For the live subsystem this is the published stats record; for the
/// single-image path it is computed once per request. Classes with zero
/// detections are absent from `per_class`, never present with value 0.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub fps: f32,
    pub total: usize,
    pub per_class: HashMap<String, usize>,
}

impl DetectionSummary {
    /// Count total and per-class detections for one result set.
    pub fn count(detections: &[Detection]) -> Self {
        let mut per_class = HashMap::new();
        for det in detections {
            *per_class.entry(det.class_name.clone()).or_insert(0) += 1;
        }
        Self {
            fps: 0.0,
            total: detections.len(),
            per_class,
        }
    }

    /// Same counts with an explicit frames-per-second value attached.
    pub fn with_fps(detections: &[Detection], fps: f32) -> Self {
        let mut summary = Self::count(detections);
        summary.fps = fps;
        summary
    }
}
