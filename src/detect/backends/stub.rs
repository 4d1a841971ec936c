use anyhow::{bail, Result};
use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::detect::backend::{FaceDetector, PoseEstimator};
use crate::detect::result::{Detection, DetectionBatch, Recognition};
use crate::frame::Frame;
use crate::sync::CropRequest;

/// Settings for the synthetic face detector.
#[derive(Clone, Debug)]
pub struct StubFaceDetectorConfig {
    pub seed: u64,
    /// Upper bound of candidate faces per frame.
    pub max_faces: usize,
    /// Candidates below this confidence are dropped.
    pub confidence_threshold: f32,
    /// Attach a depth estimate to each detection.
    pub spatial: bool,
    pub depth_lower_mm: f32,
    pub depth_upper_mm: f32,
}

impl Default for StubFaceDetectorConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_faces: 3,
            confidence_threshold: 0.7,
            spatial: false,
            depth_lower_mm: 100.0,
            depth_upper_mm: 5000.0,
        }
    }
}

/// Synthetic face detector for hosts without a camera module.
///
/// Output depends only on the seed and the frame's sequence number, so two
/// taps of the same frame always see the same batch. Faces near the border
/// may extend slightly outside 0..1 like a real detector's output.
pub struct StubFaceDetector {
    config: StubFaceDetectorConfig,
}

impl StubFaceDetector {
    pub fn new(config: StubFaceDetectorConfig) -> Self {
        Self { config }
    }
}

impl Default for StubFaceDetector {
    fn default() -> Self {
        Self::new(StubFaceDetectorConfig::default())
    }
}

impl FaceDetector for StubFaceDetector {
    fn name(&self) -> &'static str {
        "stub-face"
    }

    fn is_spatial(&self) -> bool {
        self.config.spatial
    }

    fn detect(&mut self, frame: &Frame) -> Result<DetectionBatch> {
        let mut rng = StdRng::seed_from_u64(
            self.config
                .seed
                .wrapping_add(frame.seq.wrapping_mul(0x9E37_79B9_7F4A_7C15)),
        );

        let candidates = rng.gen_range(0..=self.config.max_faces);
        let mut detections = Vec::with_capacity(candidates);
        for _ in 0..candidates {
            let size = rng.gen_range(0.08f32..0.3);
            let cx = rng.gen_range(-0.02f32..1.02);
            let cy = rng.gen_range(-0.02f32..1.02);
            let confidence = rng.gen_range(0.5f32..1.0);

            let mut detection = Detection::new(
                cx - size / 2.0,
                cy - size / 2.0,
                cx + size / 2.0,
                cy + size / 2.0,
            )
            .with_confidence(confidence);
            if self.config.spatial {
                let (lower, upper) = (self.config.depth_lower_mm, self.config.depth_upper_mm);
                let z = if lower < upper {
                    rng.gen_range(lower..upper)
                } else {
                    lower
                };
                detection = detection.with_spatial_z(z);
            }

            if confidence >= self.config.confidence_threshold {
                detections.push(detection);
            }
        }

        Ok(DetectionBatch::new(detections))
    }
}

/// Synthetic head-pose estimator.
///
/// Derives yaw, pitch and roll from a digest of the frame and crop region.
/// Deterministic per input.
#[derive(Default)]
pub struct StubPoseEstimator;

impl StubPoseEstimator {
    pub fn new() -> Self {
        Self
    }
}

impl PoseEstimator for StubPoseEstimator {
    fn name(&self) -> &'static str {
        "stub-pose"
    }

    fn estimate(&mut self, frame: &Frame, crop: &CropRequest) -> Result<Recognition> {
        if crop.frame_seq != frame.seq {
            bail!(
                "crop request for frame {} paired with frame {}",
                crop.frame_seq,
                frame.seq
            );
        }

        let mut hasher = Sha256::new();
        hasher.update(frame.seq.to_le_bytes());
        hasher.update((crop.detection_index as u64).to_le_bytes());
        for value in crop.region.to_array() {
            hasher.update(value.to_le_bytes());
        }
        // Coarse pixel sample.
        for chunk in frame.pixels().chunks(4096) {
            hasher.update(&chunk[..1]);
        }
        let digest: [u8; 32] = hasher.finalize().into();

        Ok(Recognition::new(
            angle([digest[0], digest[1]], 90.0),
            angle([digest[2], digest[3]], 70.0),
            angle([digest[4], digest[5]], 70.0),
        ))
    }
}

fn angle(bytes: [u8; 2], range: f32) -> f32 {
    let unit = u16::from_le_bytes(bytes) as f32 / u16::MAX as f32;
    (unit * 2.0 - 1.0) * range
}
