//! Multi-stream sequence-number correlation.
//!
//! Camera frames, face detections and head-pose results are produced by
//! independently clocked stages. Each message carries only the producing
//! stage's sequence number. This module reassembles them:
//!
//! - `BoundedSequenceBuffer`: capacity-limited seq → group store with FIFO eviction.
//! - `PairCorrelator`: preview frame + detection batch → crop requests.
//! - `TripleCorrelator`: frame + detection batch + `n` recognitions → render bundle.
//!
//! The correlators never block and never fail. Data that cannot be matched
//! within the buffer capacity is dropped and logged.

mod buffer;
mod correlator;
mod pair;
mod triple;

pub use buffer::{BoundedSequenceBuffer, Group, DEFAULT_SYNC_CAPACITY};
pub use correlator::{Correlator, CorrelatorStats, SequenceCorrelator, SharedCorrelator};
pub use pair::{
    crop_region, CropBundle, CropRect, CropRequest, PairCorrelator, PairSlots,
    DEFAULT_CROP_MARGIN, DEFAULT_CROP_SIZE,
};
pub use triple::{RenderBundle, TripleCorrelator, TripleSlots, MAX_UNMATCHED_RECOGNITIONS};

use std::fmt;

use crate::detect::{DetectionBatch, Recognition};
use crate::frame::Frame;

/// Named input stream of a correlator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamId {
    /// Low-resolution camera preview feeding the first-stage detector.
    Preview,
    /// Camera frame that is rendered and streamed.
    Frame,
    /// Face detection batches from the first-stage detector.
    Detections,
    /// Per-face head-pose results from the second-stage classifier.
    Recognition,
}

impl StreamId {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamId::Preview => "preview",
            StreamId::Frame => "frame",
            StreamId::Detections => "detections",
            StreamId::Recognition => "recognition",
        }
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message body carried on a stream.
#[derive(Clone, Debug)]
pub enum Payload {
    Frame(Frame),
    Detections(DetectionBatch),
    Recognition(Recognition),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Frame(_) => "frame",
            Payload::Detections(_) => "detections",
            Payload::Recognition(_) => "recognition",
        }
    }
}

/// One message as delivered by a producing stage.
#[derive(Clone, Debug)]
pub struct SequencedMessage {
    pub seq: u64,
    pub stream: StreamId,
    pub payload: Payload,
}

impl SequencedMessage {
    pub fn new(seq: u64, stream: StreamId, payload: Payload) -> Self {
        Self {
            seq,
            stream,
            payload,
        }
    }

    pub fn preview(seq: u64, frame: Frame) -> Self {
        Self::new(seq, StreamId::Preview, Payload::Frame(frame))
    }

    pub fn frame(seq: u64, frame: Frame) -> Self {
        Self::new(seq, StreamId::Frame, Payload::Frame(frame))
    }

    pub fn detections(seq: u64, batch: DetectionBatch) -> Self {
        Self::new(seq, StreamId::Detections, Payload::Detections(batch))
    }

    pub fn recognition(seq: u64, recognition: Recognition) -> Self {
        Self::new(seq, StreamId::Recognition, Payload::Recognition(recognition))
    }
}

/// Outcome of placing a payload into a group's slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fill {
    /// Slot was empty and is now filled.
    Filled,
    /// Slot already held a payload; last write wins.
    Overwrote,
    /// Payload was appended to an accumulating slot.
    Appended,
    /// Accumulating slot already holds its expected count; payload dropped.
    Overflow,
    /// Stream is not part of this correlator, or the payload kind does not fit it.
    Rejected,
    /// Sequence number was already emitted; payload dropped.
    Stale,
    /// Buffer is at capacity and every group in it is complete; the new
    /// sequence number is dropped so no finished bundle is lost.
    Full,
}

/// Per-seq slot storage of a correlator.
///
/// The buffer owns one `Slots` value per in-flight sequence number and knows
/// nothing about stream semantics beyond what this trait exposes.
pub trait Slots: Default {
    /// True when `payload` on `stream` belongs in this kind of group.
    /// Rejected messages never create a group.
    fn accepts(stream: StreamId, payload: &Payload) -> bool;

    /// Place a payload for `stream`.
    fn fill(&mut self, stream: StreamId, payload: Payload) -> Fill;

    /// True when the group holds everything needed to emit a bundle.
    fn is_complete(&self) -> bool;
}
