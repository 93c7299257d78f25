use crate::{
    config::StoragePolicy,
    set::{self, CacheLine, Half, Presence},
};

/// Fully associative overflow store shared by every set of the primary
/// cache. Entries have the same shape as primary lines; their tag is the
/// whole address above the byte offset. Eviction within the buffer is plain
/// LRU regardless of the primary replacement policy.
pub struct VictimBuffer {
    entries: Vec<CacheLine>,
}

impl VictimBuffer {
    pub fn new(victim_ways: usize) -> Self {
        Self {
            entries: vec![CacheLine::default(); victim_ways],
        }
    }

    /// An empty buffer (v = 0) misses everything and accepts nothing.
    pub fn is_enabled(&self) -> bool {
        !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, slot: usize) -> &CacheLine {
        &self.entries[slot]
    }

    pub fn entry_mut(&mut self, slot: usize) -> &mut CacheLine {
        &mut self.entries[slot]
    }

    /// Probes for `victim_tag` with the same half-validity rules as the
    /// primary cache.
    pub fn lookup(
        &self,
        victim_tag: u64,
        half: Half,
        storage: StoragePolicy,
    ) -> Option<(usize, Presence)> {
        set::probe(&self.entries, victim_tag, half, storage)
    }

    /// Slot a displaced primary line should land in: the first structurally
    /// invalid entry, else the minimum-recency one (ties to the lowest
    /// slot). Callers must check [`Self::is_enabled`] first.
    pub fn slot_to_update(&self, storage: StoragePolicy) -> usize {
        let mut best = 0;
        for (slot, entry) in self.entries.iter().enumerate() {
            if !entry.holds_data(storage) {
                return slot;
            }
            if entry.recency < self.entries[best].recency {
                best = slot;
            }
        }
        best
    }
}
