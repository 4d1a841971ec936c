use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::buffer::{BoundedSequenceBuffer, Group};
use super::{Fill, SequencedMessage, Slots};

/// A correlator accepts sequenced messages and emits completed bundles.
///
/// `push` never blocks and never fails. `poll` returns at most one bundle
/// per call, lowest sequence number first.
pub trait Correlator {
    type Bundle;

    fn push(&mut self, message: SequencedMessage) -> Fill;

    fn poll(&mut self) -> Option<Self::Bundle>;

    /// Number of in-flight groups.
    fn pending(&self) -> usize;

    fn stats(&self) -> CorrelatorStats;
}

/// Counters of what a correlator did with its input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CorrelatorStats {
    pub emitted: u64,
    /// Incomplete groups dropped to admit a new seq.
    pub evicted: u64,
    /// Incomplete groups dropped because a later seq was emitted.
    pub superseded: u64,
    /// Messages for seqs that were already emitted.
    pub stale: u64,
    pub overwrites: u64,
    pub overflow: u64,
    pub rejected: u64,
    /// New seqs dropped because every buffered group was complete.
    pub full: u64,
}

/// Push / poll engine shared by the pair and triple correlators.
///
/// Emission is strictly increasing in seq: once seq `s` is emitted, older
/// incomplete groups are discarded and later messages for seqs `<= s` are
/// dropped as stale.
#[derive(Debug)]
pub struct SequenceCorrelator<S> {
    name: &'static str,
    buffer: BoundedSequenceBuffer<S>,
    last_emitted: Option<u64>,
    stats: CorrelatorStats,
}

impl<S: Slots> SequenceCorrelator<S> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        Self {
            name,
            buffer: BoundedSequenceBuffer::new(capacity),
            last_emitted: None,
            stats: CorrelatorStats::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn buffer(&self) -> &BoundedSequenceBuffer<S> {
        &self.buffer
    }

    pub fn last_emitted(&self) -> Option<u64> {
        self.last_emitted
    }

    pub fn push(&mut self, message: SequencedMessage) -> Fill {
        let SequencedMessage {
            seq,
            stream,
            payload,
        } = message;

        if self.last_emitted.is_some_and(|last| seq <= last) {
            self.stats.stale += 1;
            log::debug!(
                "{}: dropping {} for seq {} (already emitted up to {:?})",
                self.name,
                stream,
                seq,
                self.last_emitted
            );
            return Fill::Stale;
        }

        let kind = payload.kind();
        let fill = self.buffer.insert(seq, stream, payload);
        match fill {
            Fill::Overwrote => {
                self.stats.overwrites += 1;
                log::warn!(
                    "{}: {} for seq {} delivered twice, keeping the latest",
                    self.name,
                    stream,
                    seq
                );
            }
            Fill::Overflow => {
                self.stats.overflow += 1;
                log::warn!(
                    "{}: more {} results than detections for seq {}, dropping extra",
                    self.name,
                    stream,
                    seq
                );
            }
            Fill::Rejected => {
                self.stats.rejected += 1;
                log::warn!(
                    "{}: {} payload on stream {} rejected (seq {})",
                    self.name,
                    kind,
                    stream,
                    seq
                );
            }
            Fill::Full => {
                self.stats.full += 1;
                log::warn!(
                    "{}: {} complete group(s) awaiting drain, dropping {} for new seq {}",
                    self.name,
                    self.buffer.len(),
                    stream,
                    seq
                );
            }
            Fill::Filled | Fill::Appended | Fill::Stale => {}
        }
        fill
    }

    /// Drain the lowest complete group, if any.
    pub fn poll_group(&mut self) -> Option<Group<S>> {
        let group = self
            .buffer
            .take_first_complete(|group| group.slots.is_complete())?;

        let superseded = self.buffer.discard_older_than(group.seq);
        if superseded > 0 {
            self.stats.superseded += superseded as u64;
            log::debug!(
                "{}: seq {} complete, discarded {} older incomplete group(s)",
                self.name,
                group.seq,
                superseded
            );
        }

        self.last_emitted = Some(group.seq);
        self.stats.emitted += 1;
        Some(group)
    }

    /// Explicitly drop the oldest-inserted group.
    pub fn evict_oldest(&mut self) -> Option<u64> {
        self.buffer.evict_oldest()
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> CorrelatorStats {
        CorrelatorStats {
            evicted: self.buffer.evicted(),
            ..self.stats
        }
    }
}

/// Correlator shared between producer threads and a consumer thread.
///
/// Every `push` and `poll` runs as one critical section, so eviction on
/// insert can never race with the drain of a completed group.
pub struct SharedCorrelator<C> {
    inner: Arc<Mutex<C>>,
}

impl<C> Clone for SharedCorrelator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Correlator> SharedCorrelator<C> {
    pub fn new(correlator: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(correlator)),
        }
    }

    pub fn push(&self, message: SequencedMessage) -> Result<Fill> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("correlator lock poisoned"))?;
        Ok(guard.push(message))
    }

    pub fn poll(&self) -> Result<Option<C::Bundle>> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("correlator lock poisoned"))?;
        Ok(guard.poll())
    }

    pub fn pending(&self) -> Result<usize> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("correlator lock poisoned"))?;
        Ok(guard.pending())
    }

    pub fn stats(&self) -> Result<CorrelatorStats> {
        let guard = self
            .inner
            .lock()
            .map_err(|_| anyhow!("correlator lock poisoned"))?;
        Ok(guard.stats())
    }
}
