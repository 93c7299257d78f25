use std::{fmt, str::FromStr};

use thiserror::Error;

/// How line validity is tracked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoragePolicy {
    /// one validity bit for the whole line
    Blocking,
    /// the two halves of a line are independently valid
    SubBlocking,
}

impl StoragePolicy {
    /// validity bits charged per line in the overhead model
    pub fn validity_bits(self) -> u64 {
        match self {
            StoragePolicy::Blocking => 1,
            StoragePolicy::SubBlocking => 2,
        }
    }
}

impl fmt::Display for StoragePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoragePolicy::Blocking => write!(f, "blocking"),
            StoragePolicy::SubBlocking => write!(f, "sub-blocking"),
        }
    }
}

impl FromStr for StoragePolicy {
    type Err = ConfigError;

    // `B`/`S` are the single-letter codes older trace kits pass around
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "blocking" | "B" => Ok(StoragePolicy::Blocking),
            "sub-blocking" | "subblocking" | "S" => Ok(StoragePolicy::SubBlocking),
            _ => Err(ConfigError::UnknownStoragePolicy(s.to_string())),
        }
    }
}

/// How an eviction candidate is chosen within a set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplacementPolicy {
    /// true least-recently-used over recency stamps
    Lru,
    /// not-most-recently-used, aged by physical-order compaction
    NmruFifo,
}

impl ReplacementPolicy {
    /// recency-field bits charged per line in the overhead model
    pub fn recency_bits(self) -> u64 {
        match self {
            ReplacementPolicy::Lru => 8,
            ReplacementPolicy::NmruFifo => 4,
        }
    }
}

impl fmt::Display for ReplacementPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplacementPolicy::Lru => write!(f, "lru"),
            ReplacementPolicy::NmruFifo => write!(f, "nmru-fifo"),
        }
    }
}

impl FromStr for ReplacementPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "lru" | "L" => Ok(ReplacementPolicy::Lru),
            "nmru-fifo" | "nmrufifo" | "N" => Ok(ReplacementPolicy::NmruFifo),
            _ => Err(ConfigError::UnknownReplacementPolicy(s.to_string())),
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("index width underflows: b + s exceeds c (c={c}, b={b}, s={s})")]
    IndexUnderflow { c: u32, b: u32, s: u32 },
    #[error("size exponent `{name}` = {value} is out of range")]
    ExponentOutOfRange { name: &'static str, value: u32 },
    #[error("unknown storage policy `{0}` (expected `blocking` or `sub-blocking`)")]
    UnknownStoragePolicy(String),
    #[error("unknown replacement policy `{0}` (expected `lru` or `nmru-fifo`)")]
    UnknownReplacementPolicy(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Size exponents and policies as given on the command line. Immutable once
/// the simulator is built.
#[derive(Clone, Copy, Debug)]
pub struct CacheConfig {
    /// total data storage is 2^c bytes
    pub c: u32,
    /// a cache line is 2^b bytes
    pub b: u32,
    /// a set holds 2^s ways
    pub s: u32,
    /// the victim buffer holds 2^v entries; 0 disables it entirely
    pub v: u32,
    pub storage: StoragePolicy,
    pub replacement: ReplacementPolicy,
}

/// Concrete sizes derived from a validated [`CacheConfig`].
#[derive(Clone, Copy, Debug)]
pub struct Geometry {
    pub total_data_bytes: u64,
    pub line_bytes: u64,
    pub ways: usize,
    pub victim_ways: usize,
    pub set_count: usize,
    pub offset_bits: u32,
    pub index_bits: u32,
    pub tag_bits: u32,
}

impl Geometry {
    /// data bytes of primary cache plus victim buffer
    pub fn total_storage_bytes(&self) -> u64 {
        self.total_data_bytes + self.line_bytes * self.victim_ways as u64
    }
}

impl CacheConfig {
    /// Validates the exponents and expands them into concrete sizes. Fails
    /// fast so no inconsistent geometry ever reaches the simulator.
    pub fn geometry(&self) -> Result<Geometry> {
        let Self { c, b, s, v, .. } = *self;
        for (name, value) in [("c", c), ("b", b), ("s", s), ("v", v)] {
            if value >= u64::BITS {
                return Err(ConfigError::ExponentOutOfRange { name, value });
            }
        }
        if b + s > c {
            return Err(ConfigError::IndexUnderflow { c, b, s });
        }
        // c <= 63 already holds, so b + index_bits = c - s stays under 64
        // and the tag width can never underflow
        let index_bits = c - b - s;
        Ok(Geometry {
            total_data_bytes: 1u64 << c,
            line_bytes: 1u64 << b,
            ways: 1usize << s,
            // v = 0 means no victim buffer at all, not a single-entry one
            victim_ways: if v == 0 { 0 } else { 1usize << v },
            set_count: 1usize << index_bits,
            offset_bits: b,
            index_bits,
            tag_bits: u64::BITS - b - index_bits,
        })
    }
}
