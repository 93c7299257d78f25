use crate::{addr::Addr, config::StoragePolicy};

/// Which half of a line an offset falls into. Only meaningful under
/// sub-blocking; blocking lookups always probe [`Half::Low`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Half {
    Low,
    High,
}

impl Half {
    pub fn of_offset(offset: u64, line_bytes: u64) -> Self {
        if offset < line_bytes / 2 {
            Half::Low
        } else {
            Half::High
        }
    }
    pub fn other(self) -> Self {
        match self {
            Half::Low => Half::High,
            Half::High => Half::Low,
        }
    }
}

/// Per-line metadata. No data bytes are stored; `address` is kept so the
/// victim-level tag can be recomputed when the line is displaced.
#[derive(Clone, Copy, Debug, Default)]
pub struct CacheLine {
    pub address: Addr,
    pub tag: u64,
    pub valid_low: bool,
    pub valid_high: bool,
    pub dirty: bool,
    /// logical-clock stamp of the last touch
    pub recency: u64,
}

impl CacheLine {
    /// Whether the line holds any live data under the given storage policy.
    /// Blocking never sets `valid_high`, so only `valid_low` counts there.
    pub fn holds_data(&self, storage: StoragePolicy) -> bool {
        match storage {
            StoragePolicy::Blocking => self.valid_low,
            StoragePolicy::SubBlocking => self.valid_low || self.valid_high,
        }
    }

    pub fn half_valid(&self, half: Half) -> bool {
        match half {
            Half::Low => self.valid_low,
            Half::High => self.valid_high,
        }
    }

    pub fn clear_validity(&mut self) {
        self.valid_low = false;
        self.valid_high = false;
    }

    /// Marks the whole line present, as after fetching the missing half.
    pub fn fill_both_halves(&mut self) {
        self.valid_low = true;
        self.valid_high = true;
    }
}

/// Outcome of probing a line array for a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presence {
    /// tag matched and the accessed half is valid
    Hit,
    /// tag matched but only the other half is valid (sub-blocking only)
    HalfHit,
}

/// Scans `lines` in physical order for `tag`. Shared by the primary sets and
/// the victim buffer, which differ only in how the tag was computed.
pub(crate) fn probe(
    lines: &[CacheLine],
    tag: u64,
    half: Half,
    storage: StoragePolicy,
) -> Option<(usize, Presence)> {
    for (way, line) in lines.iter().enumerate() {
        if line.tag != tag {
            continue;
        }
        match storage {
            StoragePolicy::Blocking => {
                if line.valid_low {
                    return Some((way, Presence::Hit));
                }
            }
            StoragePolicy::SubBlocking => {
                if line.half_valid(half) {
                    return Some((way, Presence::Hit));
                }
                if line.half_valid(half.other()) {
                    return Some((way, Presence::HalfHit));
                }
            }
        }
    }
    None
}

/// One set of the primary cache: a fixed run of `ways` line slots whose
/// physical order doubles as the NMRU-FIFO eviction-age queue.
pub struct CacheSet {
    lines: Vec<CacheLine>,
}

impl CacheSet {
    pub fn new(ways: usize) -> Self {
        Self {
            lines: vec![CacheLine::default(); ways],
        }
    }

    pub fn ways(&self) -> usize {
        self.lines.len()
    }

    pub fn line(&self, way: usize) -> &CacheLine {
        &self.lines[way]
    }

    pub fn line_mut(&mut self, way: usize) -> &mut CacheLine {
        &mut self.lines[way]
    }

    pub(crate) fn lines(&self) -> &[CacheLine] {
        &self.lines
    }

    pub fn lookup(&self, tag: u64, half: Half, storage: StoragePolicy) -> Option<(usize, Presence)> {
        probe(&self.lines, tag, half, storage)
    }
}
