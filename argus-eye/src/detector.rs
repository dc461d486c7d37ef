//! Detector seam and the built-in stub backend.
//!
//! The detection model is an external collaborator: anything that can
//! map a frame plus inference parameters to a list of detections fits
//! behind `Detector`. The shipped `StubDetector` is a deterministic
//! luminance-grid backend over the COCO vocabulary, enough to exercise
//! annotation, counting, and the live loop without model weights.

use crate::error::VisionError;
use argus_core::Detection;
use image::RgbImage;

/// COCO class names (80 classes)
pub const COCO_CLASSES: &[&str] = &[
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat",
    "dog", "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack",
    "umbrella", "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball",
    "kite", "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple",
    "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair",
    "couch", "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse",
    "remote", "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator",
    "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

/// Parameters bound to one inference call.
#[derive(Debug, Clone)]
pub struct InferenceParams {
    /// Minimum confidence for a detection to be reported.
    pub confidence: f32,
    /// Square inference size in pixels.
    pub input_size: u32,
    /// Class ids to keep; `None` lets every class through.
    pub class_filter: Option<Vec<usize>>,
}

/// Detection model seam.
///
/// Implementations must be shareable read-only across the single-image
/// path and the live loop; any internal session state has to be
/// thread-safe.
pub trait Detector: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Fixed class vocabulary, indexed by class id.
    fn class_names(&self) -> &[&'static str];

    /// Run detection on a frame.
    fn detect(&self, frame: &RgbImage, params: &InferenceParams)
        -> Result<Vec<Detection>, VisionError>;
}

/// Resolve comma-separated class-name filter text against a vocabulary.
///
/// Resolution happens once per run, before the live loop starts. Names
/// with no vocabulary match are silently dropped. Empty text, or text
/// whose every name is dropped, resolves to `None`, meaning no filter.
pub fn resolve_class_filter(classes: &str, vocabulary: &[&str]) -> Option<Vec<usize>> {
    let classes = classes.trim();
    if classes.is_empty() {
        return None;
    }

    let mut ids = Vec::new();
    for name in classes.split(',').map(str::trim).filter(|n| !n.is_empty()) {
        if let Some(id) = vocabulary.iter().position(|v| *v == name) {
            ids.push(id);
        }
    }

    if ids.is_empty() {
        None
    } else {
        Some(ids)
    }
}

// Grid geometry of the stub backend.
const GRID_COLS: u32 = 4;
const GRID_ROWS: u32 = 3;
const BRIGHT_MEAN: f32 = 160.0;

/// Stub backend: reports a detection for every grid cell whose mean
/// luminance crosses a fixed threshold. Deterministic for a given frame.
#[derive(Debug, Default)]
pub struct StubDetector;

impl StubDetector {
    pub fn new() -> Self {
        Self
    }

    fn cell_class(cell_index: u32) -> usize {
        // Rotate through a small, recognizable slice of the vocabulary.
        const DEMO_CLASSES: [usize; 3] = [0, 2, 16]; // person, car, dog
        DEMO_CLASSES[(cell_index as usize) % DEMO_CLASSES.len()]
    }
}

impl Detector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn class_names(&self) -> &[&'static str] {
        COCO_CLASSES
    }

    fn detect(
        &self,
        frame: &RgbImage,
        params: &InferenceParams,
    ) -> Result<Vec<Detection>, VisionError> {
        let (width, height) = frame.dimensions();
        if width < GRID_COLS || height < GRID_ROWS {
            return Err(VisionError::Detector(format!(
                "Frame too small for inference: {}x{}",
                width, height
            )));
        }

        let cell_w = width / GRID_COLS;
        let cell_h = height / GRID_ROWS;
        let mut detections = Vec::new();

        for row in 0..GRID_ROWS {
            for col in 0..GRID_COLS {
                let x0 = col * cell_w;
                let y0 = row * cell_h;

                let mut sum = 0u64;
                for y in y0..y0 + cell_h {
                    for x in x0..x0 + cell_w {
                        let p = frame.get_pixel(x, y).0;
                        // Integer luma approximation.
                        sum += ((p[0] as u64) * 299 + (p[1] as u64) * 587 + (p[2] as u64) * 114)
                            / 1000;
                    }
                }
                let mean = sum as f32 / (cell_w * cell_h) as f32;
                if mean < BRIGHT_MEAN {
                    continue;
                }

                let confidence = (mean / 255.0).min(1.0);
                if confidence < params.confidence {
                    continue;
                }

                let cell_index = row * GRID_COLS + col;
                let class_id = Self::cell_class(cell_index);
                if let Some(filter) = &params.class_filter {
                    if !filter.contains(&class_id) {
                        continue;
                    }
                }

                detections.push(Detection {
                    class_id,
                    class_name: COCO_CLASSES[class_id].to_string(),
                    confidence,
                    bbox: (x0 as f32, y0 as f32, cell_w as f32, cell_h as f32),
                });
            }
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(confidence: f32, class_filter: Option<Vec<usize>>) -> InferenceParams {
        InferenceParams {
            confidence,
            input_size: 640,
            class_filter,
        }
    }

    #[test]
    fn test_resolve_class_filter_drops_unmatched() {
        let vocabulary = ["person", "car", "dog"];
        let resolved = resolve_class_filter("car, bird, dog", &vocabulary);
        assert_eq!(resolved, Some(vec![1, 2]));
    }

    #[test]
    fn test_resolve_class_filter_empty_text() {
        let vocabulary = ["person", "car", "dog"];
        assert_eq!(resolve_class_filter("", &vocabulary), None);
        assert_eq!(resolve_class_filter("   ", &vocabulary), None);
    }

    #[test]
    fn test_resolve_class_filter_all_unmatched() {
        let vocabulary = ["person", "car", "dog"];
        assert_eq!(resolve_class_filter("bird, zebra", &vocabulary), None);
    }

    #[test]
    fn test_resolve_class_filter_coco() {
        let resolved = resolve_class_filter("person,car", COCO_CLASSES).unwrap();
        assert_eq!(resolved, vec![0, 2]);
    }

    #[test]
    fn test_stub_detector_dark_frame_empty() {
        let frame = RgbImage::from_pixel(640, 480, image::Rgb([10, 10, 10]));
        let detector = StubDetector::new();
        let detections = detector.detect(&frame, &params(0.25, None)).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn test_stub_detector_bright_frame_full_grid() {
        let frame = RgbImage::from_pixel(640, 480, image::Rgb([220, 220, 220]));
        let detector = StubDetector::new();
        let detections = detector.detect(&frame, &params(0.25, None)).unwrap();
        assert_eq!(detections.len(), (GRID_COLS * GRID_ROWS) as usize);
        // Every detection names a class from the vocabulary.
        for det in &detections {
            assert_eq!(det.class_name, COCO_CLASSES[det.class_id]);
        }
    }

    #[test]
    fn test_stub_detector_honors_class_filter() {
        let frame = RgbImage::from_pixel(640, 480, image::Rgb([220, 220, 220]));
        let detector = StubDetector::new();
        // person only
        let detections = detector.detect(&frame, &params(0.25, Some(vec![0]))).unwrap();
        assert!(!detections.is_empty());
        assert!(detections.iter().all(|d| d.class_id == 0));
    }

    #[test]
    fn test_stub_detector_honors_confidence_threshold() {
        let frame = RgbImage::from_pixel(640, 480, image::Rgb([180, 180, 180]));
        let detector = StubDetector::new();
        // 180/255 ≈ 0.70; a higher threshold suppresses everything.
        let detections = detector.detect(&frame, &params(0.95, None)).unwrap();
        assert!(detections.is_empty());
    }

    #[test]
    fn test_stub_detector_rejects_tiny_frame() {
        let frame = RgbImage::new(2, 2);
        let detector = StubDetector::new();
        assert!(detector.detect(&frame, &params(0.25, None)).is_err());
    }
}
