//! argus-core: shared types for the Argus detection demo
//!
//! Holds the workspace-wide error taxonomy and the detection data model
//! consumed by both the single-image path and the live subsystem.

pub mod detection;
pub mod error;

pub use detection::{Detection, DetectionSummary};
pub use error::{Error, Result};
