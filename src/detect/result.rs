/// One detected face.
///
/// Coordinates are normalized to the detector input (0..1). Detectors may
/// report slightly out-of-range values for faces touching the image border.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Detection {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    pub confidence: f32,
    /// Distance from the camera in millimetres, when the detector is spatial.
    pub spatial_z: Option<f32>,
}

impl Detection {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
            confidence: 1.0,
            spatial_z: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_spatial_z(mut self, z_mm: f32) -> Self {
        self.spatial_z = Some(z_mm);
        self
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }
}

/// Ordered detections for one frame.
///
/// Order is significant: recognition result `i` belongs to detection `i`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionBatch {
    pub detections: Vec<Detection>,
}

impl DetectionBatch {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self { detections }
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }
}

impl From<Vec<Detection>> for DetectionBatch {
    fn from(detections: Vec<Detection>) -> Self {
        Self::new(detections)
    }
}

/// Head-pose estimate for one face, in degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Recognition {
    pub yaw: f32,
    pub pitch: f32,
    pub roll: f32,
}

impl Recognition {
    pub fn new(yaw: f32, pitch: f32, roll: f32) -> Self {
        Self { yaw, pitch, roll }
    }
}
