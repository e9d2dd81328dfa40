use alloc::vec;
use alloc::vec::Vec;

use crate::types::NodeId;

/// Fixed ring of recently seen `(source, sequence)` pairs.
///
/// Relays and retries can hand a node the same frame more than once; the ring
/// remembers the last `capacity` observations and the oldest are overwritten
/// first. Lookup is a linear scan, which is fine at the default size of 32.
pub struct SeenRing {
    slots: Vec<Option<(NodeId, u16)>>,
    next: usize,
}

impl SeenRing {
    pub fn new(capacity: usize) -> Self {
        SeenRing {
            slots: vec![None; capacity.max(1)],
            next: 0,
        }
    }

    pub fn is_duplicate(&self, source: NodeId, sequence: u16) -> bool {
        self.slots.contains(&Some((source, sequence)))
    }

    /// Record an observation, overwriting the oldest slot.
    pub fn add(&mut self, source: NodeId, sequence: u16) {
        self.slots[self.next] = Some((source, sequence));
        self.next = (self.next + 1) % self.slots.len();
    }
}
