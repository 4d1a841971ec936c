mod backend;
mod backends;
mod result;

pub use backend::{FaceDetector, PoseEstimator};
pub use backends::{StubFaceDetector, StubFaceDetectorConfig, StubPoseEstimator};
pub use result::{Detection, DetectionBatch, Recognition};
