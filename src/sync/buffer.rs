use std::collections::{BTreeMap, VecDeque};

use super::{Fill, Payload, Slots, StreamId};

/// Default number of in-flight sequence numbers per correlator.
///
/// Bounds memory against a transient stall of one stream.
pub const DEFAULT_SYNC_CAPACITY: usize = 15;

/// Partially filled record for one sequence number.
#[derive(Debug)]
pub struct Group<S> {
    pub seq: u64,
    pub slots: S,
    /// Insertion order token; lower is older.
    created_at: u64,
}

impl<S> Group<S> {
    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// Capacity-limited map from sequence number to group.
///
/// Groups are kept twice: by seq for ascending completion scans, and in a
/// queue for oldest-first eviction. Eviction follows insertion order, not
/// seq order.
#[derive(Debug)]
pub struct BoundedSequenceBuffer<S> {
    capacity: usize,
    groups: BTreeMap<u64, Group<S>>,
    order: VecDeque<u64>,
    next_token: u64,
    evicted: u64,
}

impl<S: Slots> BoundedSequenceBuffer<S> {
    /// Create a buffer. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            groups: BTreeMap::new(),
            order: VecDeque::with_capacity(capacity),
            next_token: 0,
            evicted: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn contains(&self, seq: u64) -> bool {
        self.groups.contains_key(&seq)
    }

    pub fn get(&self, seq: u64) -> Option<&Group<S>> {
        self.groups.get(&seq)
    }

    /// Buffered sequence numbers in ascending order.
    pub fn seqs(&self) -> Vec<u64> {
        self.groups.keys().copied().collect()
    }

    /// Total number of groups dropped by eviction since creation.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Place a payload into the group for `seq`, creating the group if needed.
    ///
    /// A new seq arriving at capacity evicts the oldest incomplete group
    /// first. When every buffered group is complete the new seq is dropped
    /// instead (`Fill::Full`).
    pub fn insert(&mut self, seq: u64, stream: StreamId, payload: Payload) -> Fill {
        if !S::accepts(stream, &payload) {
            return Fill::Rejected;
        }
        if !self.groups.contains_key(&seq) {
            while self.groups.len() >= self.capacity {
                if !self.evict_for_insert(seq) {
                    return Fill::Full;
                }
            }
            let created_at = self.next_token;
            self.next_token += 1;
            self.groups.insert(
                seq,
                Group {
                    seq,
                    slots: S::default(),
                    created_at,
                },
            );
            self.order.push_back(seq);
        }

        match self.groups.get_mut(&seq) {
            Some(group) => group.slots.fill(stream, payload),
            None => Fill::Rejected,
        }
    }

    /// Remove and return the group at `seq` when `is_complete` holds for it.
    pub fn try_take_complete<F>(&mut self, seq: u64, is_complete: F) -> Option<Group<S>>
    where
        F: FnOnce(&Group<S>) -> bool,
    {
        let ready = self.groups.get(&seq).is_some_and(is_complete);
        if ready {
            self.remove(seq)
        } else {
            None
        }
    }

    /// Remove and return the lowest-seq group satisfying `is_complete`.
    pub fn take_first_complete<F>(&mut self, mut is_complete: F) -> Option<Group<S>>
    where
        F: FnMut(&Group<S>) -> bool,
    {
        let seq = self
            .groups
            .values()
            .find(|group| is_complete(*group))
            .map(|group| group.seq)?;
        self.remove(seq)
    }

    /// Drop the oldest-inserted group. Returns its seq.
    pub fn evict_oldest(&mut self) -> Option<u64> {
        let seq = self.order.pop_front()?;
        self.groups.remove(&seq);
        self.evicted += 1;
        log::debug!(
            "sync buffer: evicted seq {} (len {}/{})",
            seq,
            self.groups.len(),
            self.capacity
        );
        Some(seq)
    }

    /// Drop every group with a seq lower than `seq`. Returns how many were dropped.
    pub fn discard_older_than(&mut self, seq: u64) -> usize {
        let keep = self.groups.split_off(&seq);
        let dropped = std::mem::replace(&mut self.groups, keep);
        if !dropped.is_empty() {
            self.order.retain(|s| *s >= seq);
        }
        dropped.len()
    }

    /// Eviction on insert never touches a group that is complete and waiting
    /// to be drained. Returns false when there is no incomplete group left.
    fn evict_for_insert(&mut self, incoming: u64) -> bool {
        let victim = self.order.iter().position(|seq| {
            self.groups
                .get(seq)
                .is_some_and(|group| !group.slots.is_complete())
        });

        let Some(seq) = victim.and_then(|pos| self.order.remove(pos)) else {
            return false;
        };
        self.groups.remove(&seq);
        self.evicted += 1;
        log::debug!(
            "sync buffer full ({}), evicted seq {} to admit seq {}",
            self.capacity,
            seq,
            incoming
        );
        true
    }

    fn remove(&mut self, seq: u64) -> Option<Group<S>> {
        let group = self.groups.remove(&seq)?;
        if let Some(pos) = self.order.iter().position(|s| *s == seq) {
            self.order.remove(pos);
        }
        Some(group)
    }
}

impl<S: Slots> Default for BoundedSequenceBuffer<S> {
    fn default() -> Self {
        Self::new(DEFAULT_SYNC_CAPACITY)
    }
}
