use anyhow::Result;

use crate::detect::result::{DetectionBatch, Recognition};
use crate::frame::Frame;
use crate::sync::CropRequest;

/// First-stage face detector.
///
/// Runs on preview frames. The returned batch is tagged by the caller with
/// the sequence number of the frame that was passed through the detector.
pub trait FaceDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// True when detections carry a depth-derived `spatial_z`.
    fn is_spatial(&self) -> bool {
        false
    }

    /// Detect faces on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<DetectionBatch>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Second-stage head-pose classifier.
///
/// Receives one crop request per detected face and returns yaw, pitch and
/// roll for that face.
pub trait PoseEstimator: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Estimate the head pose inside `crop` of `frame`.
    fn estimate(&mut self, frame: &Frame, crop: &CropRequest) -> Result<Recognition>;
}
