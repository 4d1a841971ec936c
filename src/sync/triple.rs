use super::correlator::{Correlator, CorrelatorStats, SequenceCorrelator};
use super::{Fill, Payload, SequencedMessage, Slots, StreamId};
use crate::detect::{Detection, DetectionBatch, Recognition};
use crate::frame::Frame;

/// Recognitions held for a seq whose detection batch has not arrived yet.
///
/// Fixed per group, next to the buffer's `DEFAULT_SYNC_CAPACITY`: a stage-2
/// correlator holds at most `capacity * MAX_UNMATCHED_RECOGNITIONS` early
/// results. Once the batch lands the bound is the batch length.
pub const MAX_UNMATCHED_RECOGNITIONS: usize = 64;

/// Slots of a stage-2 group.
///
/// Recognitions accumulate in arrival order, which upstream guarantees to
/// be detection order.
#[derive(Debug, Default)]
pub struct TripleSlots {
    pub frame: Option<Frame>,
    pub detections: Option<DetectionBatch>,
    pub recognitions: Vec<Recognition>,
}

impl TripleSlots {
    fn expected(&self) -> usize {
        self.detections
            .as_ref()
            .map_or(MAX_UNMATCHED_RECOGNITIONS, DetectionBatch::len)
    }
}

impl Slots for TripleSlots {
    fn accepts(stream: StreamId, payload: &Payload) -> bool {
        matches!(
            (stream, payload),
            (StreamId::Frame, Payload::Frame(_))
                | (StreamId::Detections, Payload::Detections(_))
                | (StreamId::Recognition, Payload::Recognition(_))
        )
    }

    fn fill(&mut self, stream: StreamId, payload: Payload) -> Fill {
        match (stream, payload) {
            (StreamId::Frame, Payload::Frame(frame)) => {
                if self.frame.replace(frame).is_some() {
                    Fill::Overwrote
                } else {
                    Fill::Filled
                }
            }
            (StreamId::Detections, Payload::Detections(batch)) => {
                let replaced = self.detections.replace(batch).is_some();
                let expected = self.expected();
                let held = self.recognitions.len();
                if held > expected {
                    self.recognitions.truncate(expected);
                }
                if replaced {
                    if held > expected {
                        log::warn!(
                            "triple-sync: re-delivered batch has {} detection(s), dropping {} held recognition(s)",
                            expected,
                            held - expected
                        );
                    }
                    Fill::Overwrote
                } else if held > expected {
                    Fill::Overflow
                } else {
                    Fill::Filled
                }
            }
            (StreamId::Recognition, Payload::Recognition(recognition)) => {
                if self.recognitions.len() >= self.expected() {
                    Fill::Overflow
                } else {
                    self.recognitions.push(recognition);
                    Fill::Appended
                }
            }
            _ => Fill::Rejected,
        }
    }

    fn is_complete(&self) -> bool {
        self.frame.is_some()
            && self
                .detections
                .as_ref()
                .is_some_and(|batch| batch.len() == self.recognitions.len())
    }
}

/// Render-ready output: one frame, its detections and one pose per detection.
#[derive(Clone, Debug)]
pub struct RenderBundle {
    pub seq: u64,
    pub frame: Frame,
    pub detections: DetectionBatch,
    /// `recognitions[i]` belongs to `detections[i]`.
    pub recognitions: Vec<Recognition>,
}

impl RenderBundle {
    /// Detection / pose pairs in detection order.
    pub fn faces(&self) -> impl Iterator<Item = (&Detection, &Recognition)> {
        self.detections.iter().zip(self.recognitions.iter())
    }
}

/// Stage-2 correlator: frame + detection batch + `n` recognitions.
#[derive(Debug)]
pub struct TripleCorrelator {
    core: SequenceCorrelator<TripleSlots>,
}

impl TripleCorrelator {
    pub fn new(capacity: usize) -> Self {
        Self {
            core: SequenceCorrelator::new("triple-sync", capacity),
        }
    }

    pub fn on_frame(&mut self, seq: u64, frame: Frame) -> Fill {
        self.core.push(SequencedMessage::frame(seq, frame))
    }

    pub fn on_detections(&mut self, seq: u64, batch: DetectionBatch) -> Fill {
        self.core.push(SequencedMessage::detections(seq, batch))
    }

    /// One pose result; several arrive per frame, one per detected face.
    pub fn on_recognition(&mut self, seq: u64, recognition: Recognition) -> Fill {
        self.core
            .push(SequencedMessage::recognition(seq, recognition))
    }

    pub fn core(&self) -> &SequenceCorrelator<TripleSlots> {
        &self.core
    }

    pub fn evict_oldest(&mut self) -> Option<u64> {
        self.core.evict_oldest()
    }
}

impl Default for TripleCorrelator {
    fn default() -> Self {
        Self::new(super::DEFAULT_SYNC_CAPACITY)
    }
}

impl Correlator for TripleCorrelator {
    type Bundle = RenderBundle;

    fn push(&mut self, message: SequencedMessage) -> Fill {
        self.core.push(message)
    }

    fn poll(&mut self) -> Option<RenderBundle> {
        let group = self.core.poll_group()?;
        let TripleSlots {
            frame,
            detections,
            recognitions,
        } = group.slots;
        let (Some(frame), Some(detections)) = (frame, detections) else {
            return None;
        };
        Some(RenderBundle {
            seq: group.seq,
            frame,
            detections,
            recognitions,
        })
    }

    fn pending(&self) -> usize {
        self.core.pending()
    }

    fn stats(&self) -> CorrelatorStats {
        self.core.stats()
    }
}
