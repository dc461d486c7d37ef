//! Frame capture seams and the built-in synthetic camera.
//!
//! Real capture hardware sits behind `FrameSourceProvider`; the crate
//! ships a deterministic synthetic source so the demo runs (and the
//! tests are reproducible) without a physical device.

use crate::error::VisionError;
use image::RgbImage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

/// An open capture device. Owned exclusively by the live loop task from
/// open to release; no other component reads from it concurrently.
pub trait FrameSource: Send {
    /// Read the next frame. A failure is treated as transient by the
    /// live loop (fixed-delay retry), never as fatal.
    fn read_frame(&mut self) -> Result<RgbImage, VisionError>;

    /// Release the underlying device. Called once when the loop exits.
    fn release(&mut self);
}

/// Opens capture devices by id.
pub trait FrameSourceProvider: Send + Sync {
    fn open(&self, camera_id: u32) -> Result<Box<dyn FrameSource>, VisionError>;
}

const SYNTHETIC_WIDTH: u32 = 640;
const SYNTHETIC_HEIGHT: u32 = 480;

/// Synthetic capture device producing a moving test pattern.
pub struct SyntheticCamera {
    camera_id: u32,
    frame_counter: u64,
    speckle: Vec<u8>,
    released: bool,
}

impl SyntheticCamera {
    fn new(camera_id: u32) -> Self {
        // Per-device speckle layer, seeded by id so frames are reproducible.
        let mut rng = StdRng::seed_from_u64(camera_id as u64);
        let speckle = (0..(SYNTHETIC_WIDTH * SYNTHETIC_HEIGHT))
            .map(|_| rng.gen_range(0..24u8))
            .collect();
        Self {
            camera_id,
            frame_counter: 0,
            speckle,
            released: false,
        }
    }
}

impl FrameSource for SyntheticCamera {
    fn read_frame(&mut self) -> Result<RgbImage, VisionError> {
        if self.released {
            return Err(VisionError::Camera(format!(
                "Camera {} already released",
                self.camera_id
            )));
        }

        let tick = self.frame_counter;
        self.frame_counter = self.frame_counter.wrapping_add(1);

        // Dark gradient background with a bright square orbiting the
        // frame, so detection and motion have something to latch onto.
        let square = 96u32;
        let sx = ((tick * 8) % (SYNTHETIC_WIDTH - square) as u64) as u32;
        let sy = ((tick * 5) % (SYNTHETIC_HEIGHT - square) as u64) as u32;

        let mut frame = RgbImage::new(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT);
        for (x, y, pixel) in frame.enumerate_pixels_mut() {
            let base = (x * 40 / SYNTHETIC_WIDTH) as u8;
            let noise = self.speckle[(y * SYNTHETIC_WIDTH + x) as usize];
            let inside = x >= sx && x < sx + square && y >= sy && y < sy + square;
            let value = if inside {
                230u8.saturating_add(noise / 4)
            } else {
                base.saturating_add(noise)
            };
            *pixel = image::Rgb([value, value, value]);
        }
        Ok(frame)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            info!("Synthetic camera {} released", self.camera_id);
        }
    }
}

/// Provider for `SyntheticCamera` devices. Any id in range opens.
#[derive(Debug, Default)]
pub struct SyntheticCameraProvider;

impl FrameSourceProvider for SyntheticCameraProvider {
    fn open(&self, camera_id: u32) -> Result<Box<dyn FrameSource>, VisionError> {
        info!(
            "Synthetic camera {} opened at {}x{}",
            camera_id, SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT
        );
        Ok(Box::new(SyntheticCamera::new(camera_id)))
    }
}
