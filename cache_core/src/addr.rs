use std::fmt;

use crate::config::Geometry;

/// 64-bit reference address as it appears in a trace.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Addr(u64);

impl Addr {
    pub fn new(v: u64) -> Self {
        Self(v)
    }
    pub fn inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl fmt::Debug for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// tag/index/offset split of one address under a fixed geometry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodedAddr {
    pub tag: u64,
    pub index: usize,
    pub offset: u64,
}

fn low_mask(bits: u32) -> u64 {
    if bits >= u64::BITS {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

fn shift_out(v: u64, bits: u32) -> u64 {
    v.checked_shr(bits).unwrap_or(0)
}

/// Splits `addr` into the primary-cache view: the low `offset_bits` are the
/// byte offset within the line, the next `index_bits` select the set, and
/// everything above is the tag.
pub fn decode(addr: Addr, geo: &Geometry) -> DecodedAddr {
    let v = addr.inner();
    DecodedAddr {
        tag: shift_out(v, geo.offset_bits + geo.index_bits),
        index: (shift_out(v, geo.offset_bits) & low_mask(geo.index_bits)) as usize,
        offset: v & low_mask(geo.offset_bits),
    }
}

/// Victim-buffer tag: the buffer is fully associative, so the whole address
/// above the byte offset acts as the tag.
pub fn victim_tag(addr: Addr, geo: &Geometry) -> u64 {
    shift_out(addr.inner(), geo.offset_bits)
}
