pub mod stub;

pub use stub::{StubFaceDetector, StubFaceDetectorConfig, StubPoseEstimator};
