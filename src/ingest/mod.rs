//! Frame ingestion sources.
//!
//! The camera module produces two taps per capture, both tagged with the
//! same sequence number:
//! - a low-resolution preview for the first-stage face detector
//! - a frame for rendering and streaming
//!
//! Only the synthetic `stub://` camera is available on hosts without a
//! camera module attached.

pub mod camera;

pub use camera::{Capture, CameraConfig, CameraSource, CameraStats, FrameSource};
