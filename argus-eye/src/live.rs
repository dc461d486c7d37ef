//! Live capture/inference loop and its controller.
//!
//! One background task per run: capture a frame, run the detector,
//! annotate, publish the JPEG plus rolling statistics, repeat until the
//! run flag clears. Control fields (run state + active config) sit
//! behind a mutex held only for a few assignments; published frame and
//! stats live behind their own locks with the loop task as the single
//! writer, so HTTP readers never contend with control commands.
//!
//! The frame and stats records are written together but not atomically
//! paired: a reader may observe a frame newer than the stats or vice
//! versa. Both are treated as independently useful snapshots.

use crate::annotate::{draw_detections, encode_jpeg, JPEG_QUALITY};
use crate::camera::{FrameSource, FrameSourceProvider};
use crate::config::LiveConfig;
use crate::detector::{resolve_class_filter, Detector, InferenceParams};
use argus_core::DetectionSummary;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Fixed delay before retrying a failed capture read or device open.
pub const CAPTURE_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Statistics recomputation window.
const STATS_WINDOW: Duration = Duration::from_secs(1);

/// Run state of the live subsystem.
///
/// `Crashed` records a fatal detector error: the loop task has died and
/// released its device, but nothing pretends the run stopped cleanly.
/// Starting from `Crashed` behaves exactly like starting from `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Stopped,
    Running,
    Crashed,
}

struct ControlState {
    run_state: RunState,
    // Bumped on every successful start; the loop task carries its own
    // generation and exits when the control record has moved on, so a
    // stop immediately followed by a start can never resurrect the
    // previous loop.
    generation: u64,
    active: LiveConfig,
}

struct Inner {
    control: Mutex<ControlState>,
    published_frame: RwLock<Option<Bytes>>,
    published_stats: RwLock<DetectionSummary>,
    provider: Arc<dyn FrameSourceProvider>,
}

/// Cheap-to-clone handle owning the lifecycle of the live loop and its
/// published state.
#[derive(Clone)]
pub struct LiveController {
    inner: Arc<Inner>,
}

impl LiveController {
    pub fn new(provider: Arc<dyn FrameSourceProvider>) -> Self {
        Self {
            inner: Arc::new(Inner {
                control: Mutex::new(ControlState {
                    run_state: RunState::Stopped,
                    generation: 0,
                    active: LiveConfig::default(),
                }),
                published_frame: RwLock::new(None),
                published_stats: RwLock::new(DetectionSummary::default()),
                provider,
            }),
        }
    }

    /// Start a live run bound to `config`.
    ///
    /// Idempotent: when a run is already active the new configuration is
    /// discarded and the one in force is returned unchanged. Otherwise
    /// the snapshot is stored, the state flips to Running, and exactly
    /// one loop task is spawned. The control lock is never held across
    /// the loop's capture or inference work.
    pub fn start(&self, config: LiveConfig, detector: Arc<dyn Detector>) -> LiveConfig {
        let generation;
        {
            let mut control = self.inner.control.lock();
            if control.run_state == RunState::Running {
                return control.active.clone();
            }
            control.active = config.clone();
            control.run_state = RunState::Running;
            control.generation = control.generation.wrapping_add(1);
            generation = control.generation;
        }

        // Class names resolve to ids once per run, against the fixed
        // vocabulary of the detector bound to this run.
        let params = InferenceParams {
            confidence: config.confidence,
            input_size: config.input_size,
            class_filter: resolve_class_filter(&config.classes, detector.class_names()),
        };

        let inner = Arc::clone(&self.inner);
        let snapshot = config.clone();
        tokio::spawn(async move {
            run_live_loop(inner, generation, snapshot, params, detector).await;
        });

        config
    }

    /// Request the loop to stop. Returns immediately; the loop observes
    /// the flag at its next iteration boundary and releases the device
    /// then. Idempotent.
    pub fn stop(&self) {
        let mut control = self.inner.control.lock();
        control.run_state = RunState::Stopped;
    }

    pub fn run_state(&self) -> RunState {
        self.inner.control.lock().run_state
    }

    /// Configuration currently in force (last started run).
    pub fn active_config(&self) -> LiveConfig {
        self.inner.control.lock().active.clone()
    }

    /// Latest published statistics. Stale-but-safe read: the record
    /// changes at most once per one-second window.
    pub fn current_stats(&self) -> DetectionSummary {
        self.inner.published_stats.read().clone()
    }

    /// Most recently published JPEG frame, if any. `None` doubles as the
    /// sentinel for a frame that failed to encode.
    pub fn latest_frame(&self) -> Option<Bytes> {
        self.inner.published_frame.read().clone()
    }
}

impl Inner {
    fn mark_crashed(&self, generation: u64) {
        let mut control = self.control.lock();
        // A loop from a superseded run must not touch the current one.
        if control.run_state == RunState::Running && control.generation == generation {
            control.run_state = RunState::Crashed;
        }
    }

    fn run_current(&self, generation: u64) -> bool {
        let control = self.control.lock();
        control.run_state == RunState::Running && control.generation == generation
    }
}

fn open_with_fallback(
    provider: &Arc<dyn FrameSourceProvider>,
    camera_id: u32,
) -> Result<Box<dyn FrameSource>, crate::error::VisionError> {
    match provider.open(camera_id) {
        Ok(source) => Ok(source),
        Err(err) if camera_id != 0 => {
            warn!(
                "Camera {} failed to open ({}), falling back to camera 0",
                camera_id, err
            );
            provider.open(0)
        }
        Err(err) => Err(err),
    }
}

async fn run_live_loop(
    inner: Arc<Inner>,
    generation: u64,
    config: LiveConfig,
    params: InferenceParams,
    detector: Arc<dyn Detector>,
) {
    info!(
        "Live loop starting: camera={} confidence={} input_size={}",
        config.camera_id, config.confidence, config.input_size
    );

    let mut source: Option<Box<dyn FrameSource>> = None;
    let mut window_start = Instant::now();
    let mut frames_in_window: u32 = 0;

    loop {
        // Continuation check: the only place the loop observes stop or
        // being superseded by a newer run.
        if !inner.run_current(generation) {
            break;
        }

        if source.is_none() {
            match open_with_fallback(&inner.provider, config.camera_id) {
                Ok(opened) => {
                    source = Some(opened);
                    window_start = Instant::now();
                    frames_in_window = 0;
                }
                Err(err) => {
                    // Same policy as a failed read: fixed delay, retry
                    // forever until stopped.
                    warn!("Capture device unavailable: {}", err);
                    tokio::time::sleep(CAPTURE_RETRY_DELAY).await;
                    continue;
                }
            }
        }
        let Some(device) = source.as_mut() else {
            continue;
        };

        let frame = match device.read_frame() {
            Ok(frame) => frame,
            Err(err) => {
                warn!("Frame read failed: {}", err);
                tokio::time::sleep(CAPTURE_RETRY_DELAY).await;
                continue;
            }
        };

        // Detector failure is fatal for the run: mark the state crashed
        // (distinct from a clean stop) and end the task.
        let detections = match detector.detect(&frame, &params) {
            Ok(detections) => detections,
            Err(err) => {
                error!("Detector failed, live loop terminating: {}", err);
                inner.mark_crashed(generation);
                break;
            }
        };

        let mut annotated = frame;
        draw_detections(&mut annotated, &detections);

        frames_in_window = frames_in_window.saturating_add(1);
        let elapsed = window_start.elapsed();
        if elapsed >= STATS_WINDOW {
            let fps = frames_in_window as f32 / elapsed.as_secs_f32();
            // Counts reflect the most recent iteration only, not the
            // whole window.
            *inner.published_stats.write() = DetectionSummary::with_fps(&detections, fps);
            window_start = Instant::now();
            frames_in_window = 0;
        }

        match encode_jpeg(&annotated, JPEG_QUALITY) {
            Ok(bytes) => {
                *inner.published_frame.write() = Some(Bytes::from(bytes));
            }
            Err(err) => {
                warn!("Frame encoding failed: {}", err);
                *inner.published_frame.write() = None;
            }
        }

        tokio::task::yield_now().await;
    }

    if let Some(mut device) = source.take() {
        device.release();
    }
    info!("Live loop exited ({:?})", inner.control.lock().run_state);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VisionError;
    use argus_core::Detection;
    use image::RgbImage;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct TestSource {
        released: Arc<AtomicBool>,
        reads: Arc<AtomicUsize>,
    }

    impl FrameSource for TestSource {
        fn read_frame(&mut self) -> Result<RgbImage, VisionError> {
            // Frames vary with the read counter so successive published
            // JPEGs are distinguishable.
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            let shade = 140 + (n % 100) as u8;
            Ok(RgbImage::from_pixel(16, 12, image::Rgb([shade, shade, shade])))
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct TestProvider {
        released: Arc<AtomicBool>,
        reads: Arc<AtomicUsize>,
        opens: Arc<AtomicUsize>,
    }

    impl FrameSourceProvider for TestProvider {
        fn open(&self, _camera_id: u32) -> Result<Box<dyn FrameSource>, VisionError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(TestSource {
                released: self.released.clone(),
                reads: self.reads.clone(),
            }))
        }
    }

    struct FixedDetector;

    impl Detector for FixedDetector {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn class_names(&self) -> &[&'static str] {
            &["person", "car", "dog"]
        }

        fn detect(
            &self,
            _frame: &RgbImage,
            _params: &InferenceParams,
        ) -> Result<Vec<Detection>, VisionError> {
            Ok(vec![Detection {
                class_id: 1,
                class_name: "car".to_string(),
                confidence: 0.9,
                bbox: (1.0, 1.0, 4.0, 4.0),
            }])
        }
    }

    struct FailingDetector;

    impl Detector for FailingDetector {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn class_names(&self) -> &[&'static str] {
            &["person"]
        }

        fn detect(
            &self,
            _frame: &RgbImage,
            _params: &InferenceParams,
        ) -> Result<Vec<Detection>, VisionError> {
            Err(VisionError::Detector("model error".to_string()))
        }
    }

    async fn wait_until<F: Fn() -> bool>(cond: F) -> bool {
        for _ in 0..200 {
            if cond() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_keeps_original_config() {
        let controller = LiveController::new(Arc::new(TestProvider::default()));
        let detector: Arc<dyn Detector> = Arc::new(FixedDetector);

        let first = LiveConfig {
            camera_id: 1,
            ..LiveConfig::default()
        };
        let effective = controller.start(first.clone(), detector.clone());
        assert_eq!(effective, first);

        let second = LiveConfig {
            camera_id: 3,
            confidence: 0.9,
            ..LiveConfig::default()
        };
        let effective = controller.start(second, detector);
        // Second configuration discarded while a run is active.
        assert_eq!(effective, first);
        assert_eq!(controller.active_config(), first);

        controller.stop();
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let controller = LiveController::new(Arc::new(TestProvider::default()));
        assert_eq!(controller.run_state(), RunState::Stopped);
        controller.stop();
        controller.stop();
        assert_eq!(controller.run_state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn test_loop_publishes_frames_and_releases_on_stop() {
        let provider = Arc::new(TestProvider::default());
        let released = provider.released.clone();
        let controller = LiveController::new(provider);
        let detector: Arc<dyn Detector> = Arc::new(FixedDetector);

        controller.start(LiveConfig::default(), detector);
        assert!(wait_until(|| controller.latest_frame().is_some()).await);

        controller.stop();
        assert!(wait_until(|| released.load(Ordering::SeqCst)).await);
        assert_eq!(controller.run_state(), RunState::Stopped);
    }

    #[tokio::test]
    async fn test_detector_failure_marks_crashed_and_releases() {
        let provider = Arc::new(TestProvider::default());
        let released = provider.released.clone();
        let controller = LiveController::new(provider);
        let detector: Arc<dyn Detector> = Arc::new(FailingDetector);

        controller.start(LiveConfig::default(), detector);
        assert!(wait_until(|| controller.run_state() == RunState::Crashed).await);
        assert!(wait_until(|| released.load(Ordering::SeqCst)).await);

        // Crashed is start-able again, exactly like Stopped.
        let detector: Arc<dyn Detector> = Arc::new(FixedDetector);
        controller.start(LiveConfig::default(), detector);
        assert!(wait_until(|| controller.run_state() == RunState::Running).await);
        controller.stop();
    }

    #[tokio::test]
    async fn test_frame_overwrite_keeps_only_latest() {
        let provider = Arc::new(TestProvider::default());
        let reads = provider.reads.clone();
        let controller = LiveController::new(provider);
        let detector: Arc<dyn Detector> = Arc::new(FixedDetector);

        controller.start(LiveConfig::default(), detector);
        assert!(wait_until(|| controller.latest_frame().is_some()).await);
        let first = controller.latest_frame().unwrap();

        // Let further frames go by, then confirm the slot was
        // overwritten: a reader arriving late sees only the newest
        // frame, never the earlier buffer.
        let mark = reads.load(Ordering::SeqCst);
        assert!(wait_until(|| reads.load(Ordering::SeqCst) >= mark + 3).await);
        assert!(
            wait_until(|| controller
                .latest_frame()
                .map_or(false, |latest| latest != first))
            .await
        );
        controller.stop();
    }
}
