//! argus-eye: vision subsystem for the Argus detection demo
//!
//! Provides the live capture/inference loop, the detector and frame
//! source seams, annotation drawing, and JPEG encoding. The HTTP layer
//! in argus-server drives everything here through `LiveController` and
//! the `Detector` trait.

pub mod annotate;
pub mod camera;
pub mod config;
pub mod detector;
pub mod error;
pub mod live;

pub use camera::{FrameSource, FrameSourceProvider, SyntheticCameraProvider};
pub use config::LiveConfig;
pub use detector::{Detector, InferenceParams, StubDetector};
pub use error::VisionError;
pub use live::{LiveController, RunState};
