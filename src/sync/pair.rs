use super::correlator::{Correlator, CorrelatorStats, SequenceCorrelator};
use super::{Fill, Payload, SequencedMessage, Slots, StreamId};
use crate::detect::{Detection, DetectionBatch};
use crate::frame::Frame;

/// Margin added on every side of a detection before cropping.
pub const DEFAULT_CROP_MARGIN: f32 = 0.03;

/// Input size of the head-pose classifier.
pub const DEFAULT_CROP_SIZE: (u32, u32) = (60, 60);

/// Lowest / highest coordinate a crop may take. Crops never touch the exact
/// image border, which would give zero-area or full-image regions downstream.
const CROP_MIN: f32 = 0.001;
const CROP_MAX: f32 = 0.999;

/// Normalized crop rectangle; every coordinate lies strictly inside (0, 1).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CropRect {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl CropRect {
    pub fn to_array(&self) -> [f32; 4] {
        [self.xmin, self.ymin, self.xmax, self.ymax]
    }
}

/// Crop + resize instruction for the second inference stage.
#[derive(Clone, Debug, PartialEq)]
pub struct CropRequest {
    /// Sequence number of the frame to crop from.
    pub frame_seq: u64,
    /// Position of the source detection in its batch.
    pub detection_index: usize,
    pub region: CropRect,
    /// Target (width, height) after cropping.
    pub resize: (u32, u32),
    pub keep_aspect_ratio: bool,
}

/// Output of the pair correlator: one frame and a crop request per face.
#[derive(Clone, Debug)]
pub struct CropBundle {
    pub seq: u64,
    pub frame: Frame,
    pub detections: DetectionBatch,
    /// In detection order.
    pub crops: Vec<CropRequest>,
}

/// Expand a detection by `margin` and clamp it into the open unit interval.
///
/// Coordinates at or below 0 become 0.001 and at or above 1 become 0.999.
/// NaN falls back to the nearest edge of its side.
pub fn crop_region(detection: &Detection, margin: f32) -> CropRect {
    CropRect {
        xmin: clamp_unit(detection.xmin - margin, CROP_MIN),
        ymin: clamp_unit(detection.ymin - margin, CROP_MIN),
        xmax: clamp_unit(detection.xmax + margin, CROP_MAX),
        ymax: clamp_unit(detection.ymax + margin, CROP_MAX),
    }
}

fn clamp_unit(value: f32, nan_fallback: f32) -> f32 {
    if value.is_nan() {
        nan_fallback
    } else if value <= 0.0 {
        CROP_MIN
    } else if value >= 1.0 {
        CROP_MAX
    } else {
        value
    }
}

/// Slots of a stage-1 group: one preview frame, one detection batch.
#[derive(Debug, Default)]
pub struct PairSlots {
    pub preview: Option<Frame>,
    pub detections: Option<DetectionBatch>,
}

impl Slots for PairSlots {
    fn accepts(stream: StreamId, payload: &Payload) -> bool {
        matches!(
            (stream, payload),
            (StreamId::Preview, Payload::Frame(_)) | (StreamId::Detections, Payload::Detections(_))
        )
    }

    fn fill(&mut self, stream: StreamId, payload: Payload) -> Fill {
        let replaced = match (stream, payload) {
            (StreamId::Preview, Payload::Frame(frame)) => self.preview.replace(frame).is_some(),
            (StreamId::Detections, Payload::Detections(batch)) => {
                self.detections.replace(batch).is_some()
            }
            _ => return Fill::Rejected,
        };
        if replaced {
            Fill::Overwrote
        } else {
            Fill::Filled
        }
    }

    fn is_complete(&self) -> bool {
        self.preview.is_some() && self.detections.is_some()
    }
}

/// Stage-1 correlator: pairs each preview frame with its detection batch.
///
/// Detection batches are keyed by the sequence number of the detector's
/// passthrough frame, not by anything inside the detection message.
#[derive(Debug)]
pub struct PairCorrelator {
    core: SequenceCorrelator<PairSlots>,
    margin: f32,
    resize: (u32, u32),
}

impl PairCorrelator {
    pub fn new(capacity: usize) -> Self {
        Self {
            core: SequenceCorrelator::new("pair-sync", capacity),
            margin: DEFAULT_CROP_MARGIN,
            resize: DEFAULT_CROP_SIZE,
        }
    }

    pub fn with_crop(mut self, margin: f32, resize: (u32, u32)) -> Self {
        self.margin = margin;
        self.resize = resize;
        self
    }

    pub fn on_preview(&mut self, seq: u64, frame: Frame) -> Fill {
        self.core.push(SequencedMessage::preview(seq, frame))
    }

    /// `passthrough_seq` is the sequence number of the frame the detector ran on.
    pub fn on_detections(&mut self, passthrough_seq: u64, batch: DetectionBatch) -> Fill {
        self.core
            .push(SequencedMessage::detections(passthrough_seq, batch))
    }

    pub fn core(&self) -> &SequenceCorrelator<PairSlots> {
        &self.core
    }

    pub fn evict_oldest(&mut self) -> Option<u64> {
        self.core.evict_oldest()
    }
}

impl Default for PairCorrelator {
    fn default() -> Self {
        Self::new(super::DEFAULT_SYNC_CAPACITY)
    }
}

impl Correlator for PairCorrelator {
    type Bundle = CropBundle;

    fn push(&mut self, message: SequencedMessage) -> Fill {
        self.core.push(message)
    }

    fn poll(&mut self) -> Option<CropBundle> {
        let group = self.core.poll_group()?;
        let seq = group.seq;
        let (Some(frame), Some(detections)) = (group.slots.preview, group.slots.detections) else {
            return None;
        };

        let crops = detections
            .iter()
            .enumerate()
            .map(|(index, detection)| CropRequest {
                frame_seq: seq,
                detection_index: index,
                region: crop_region(detection, self.margin),
                resize: self.resize,
                keep_aspect_ratio: false,
            })
            .collect();

        Some(CropBundle {
            seq,
            frame,
            detections,
            crops,
        })
    }

    fn pending(&self) -> usize {
        self.core.pending()
    }

    fn stats(&self) -> CorrelatorStats {
        self.core.stats()
    }
}
