//! Eviction-candidate selection and NMRU-FIFO queue maintenance.
//!
//! Both policies prefer a structurally invalid way over evicting live data.
//! Beyond that, LRU takes the true minimum recency stamp, while NMRU-FIFO
//! only avoids the most recently touched tag and relies on [`push_entry`]
//! keeping the physical order of a set acting as an age queue.

use crate::{
    config::{ReplacementPolicy, StoragePolicy},
    set::CacheSet,
};

/// Picks the way a full miss should install into.
///
/// `nmru_tag` is the set's NMRU register value, ignored under LRU. The
/// degenerate NMRU case (every way matches the register) resolves to way 0.
pub fn select_victim_way(
    set: &CacheSet,
    replacement: ReplacementPolicy,
    storage: StoragePolicy,
    nmru_tag: u64,
) -> usize {
    if let Some(way) = first_invalid_way(set, storage) {
        return way;
    }
    match replacement {
        ReplacementPolicy::Lru => min_recency_way(set),
        ReplacementPolicy::NmruFifo => set
            .lines()
            .iter()
            .position(|line| line.tag != nmru_tag)
            .unwrap_or(0),
    }
}

fn first_invalid_way(set: &CacheSet, storage: StoragePolicy) -> Option<usize> {
    set.lines()
        .iter()
        .position(|line| !line.holds_data(storage))
}

/// First minimum in physical order, so ties go to the lowest way.
fn min_recency_way(set: &CacheSet) -> usize {
    let mut best = 0;
    for (way, line) in set.lines().iter().enumerate().skip(1) {
        if line.recency < set.line(best).recency {
            best = way;
        }
    }
    best
}

/// NMRU-FIFO compaction after choosing `way` for an install: shifts every
/// subsequent live way one slot toward `way` and returns the slot the new
/// line must land in. The vacated slot keeps its stale metadata but loses
/// its validity, so it reads as empty from then on.
///
/// Never called under LRU.
pub fn push_entry(set: &mut CacheSet, way: usize, storage: StoragePolicy) -> usize {
    if !set.line(way).holds_data(storage) {
        return way;
    }
    let last = set.ways() - 1;
    for i in way..last {
        if set.line(i + 1).holds_data(storage) {
            *set.line_mut(i) = *set.line(i + 1);
            set.line_mut(i + 1).clear_validity();
        } else {
            return i + 1;
        }
    }
    last
}
