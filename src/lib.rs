//! Head-pose streaming host
//!
//! This crate reassembles the outputs of a two-stage face / head-pose
//! pipeline running on a depth-capable camera module.
//!
//! # Architecture
//!
//! Three stages run on independent clocks and tag their output only with a
//! per-stage sequence number:
//!
//! 1. **Camera**: preview frames (detector input) and frames (render output).
//! 2. **Face detector**: one detection batch per preview.
//! 3. **Head-pose classifier**: one result per detected face.
//!
//! Two correlators put them back together:
//!
//! - `PairCorrelator`: preview + detections → crop requests for stage 3.
//! - `TripleCorrelator`: frame + detections + poses → render bundle.
//!
//! Both are built on `BoundedSequenceBuffer`, which bounds memory and drops
//! the oldest incomplete group when a stream stalls.
//!
//! # Module Structure
//!
//! - `sync`: sequence buffer and correlators
//! - `frame`: sequence-tagged frames with shared pixel data
//! - `detect`: detection / pose types and stage backends
//! - `ingest`: camera sources
//! - `pipeline`: non-blocking control loops and the threaded pipeline
//! - `render`: overlay records and sinks
//! - `config`: file + environment configuration

pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod render;
pub mod sync;

pub use detect::{
    Detection, DetectionBatch, FaceDetector, PoseEstimator, Recognition, StubFaceDetector,
    StubFaceDetectorConfig, StubPoseEstimator,
};
pub use frame::Frame;
pub use ingest::{CameraConfig, CameraSource, Capture, FrameSource};
pub use pipeline::{
    forward, run_detector, DetectorLinks, Forward, HostLoop, Pipeline, PipelineReport, RunOptions,
    ScriptStage,
};
pub use render::{overlay, CollectSink, FaceOverlay, LogSink, RenderSink, RenderedFrame};
pub use sync::{
    BoundedSequenceBuffer, Correlator, CorrelatorStats, CropBundle, CropRect, CropRequest, Fill,
    PairCorrelator, Payload, RenderBundle, SequencedMessage, SharedCorrelator, StreamId,
    TripleCorrelator, DEFAULT_SYNC_CAPACITY, MAX_UNMATCHED_RECOGNITIONS,
};

use config::HeadposeConfig;

/// Camera settings of a loaded configuration.
pub fn camera_config(cfg: &HeadposeConfig) -> CameraConfig {
    CameraConfig {
        url: cfg.camera.url.clone(),
        preview_width: cfg.camera.preview_size.0,
        preview_height: cfg.camera.preview_size.1,
        frame_width: cfg.camera.frame_size.0,
        frame_height: cfg.camera.frame_size.1,
    }
}

/// Synthetic detector settings of a loaded configuration.
pub fn detector_config(cfg: &HeadposeConfig, seed: u64, max_faces: usize) -> StubFaceDetectorConfig {
    StubFaceDetectorConfig {
        seed,
        max_faces,
        confidence_threshold: cfg.detector.confidence_threshold,
        spatial: cfg.detector.stereo,
        depth_lower_mm: cfg.detector.depth_lower_mm,
        depth_upper_mm: cfg.detector.depth_upper_mm,
    }
}
