use std::fmt;

use serde::Serialize;

use crate::{
    config::{Geometry, ReplacementPolicy, StoragePolicy},
    trace::Operation,
};

pub trait Stat {
    fn view(&self, max_width: usize) -> Box<dyn StatView + '_>;
}

pub trait StatView: fmt::Display {
    /// header of stat
    fn header(&self) -> &'static str;
    /// body width
    fn width(&self) -> usize;
}

pub trait AddStats {
    /// add stat to `buf`.
    fn add_stats(&self, buf: &mut Stats);
}

#[derive(Default)]
pub struct Stats {
    stats: Vec<Box<dyn Stat>>,
}

impl Stats {
    pub fn push(&mut self, stat: Box<dyn Stat>) {
        self.stats.push(stat)
    }
    pub fn view(&self, max_width: usize) -> StatAllView<'_> {
        StatAllView {
            views: self.stats.iter().map(|s| s.view(max_width)).collect(),
        }
    }
}

pub struct StatAllView<'s> {
    views: Vec<Box<dyn StatView + 's>>,
}

impl fmt::Display for StatAllView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .views
            .iter()
            .map(|s| s.header().len().max(s.width()))
            .max()
            .unwrap_or(20);
        writeln!(f, "{:-^width$}", " statistics ")?;
        for sv in &self.views {
            writeln!(f, "{}:", sv.header())?;
            writeln!(f, "{}", sv)?;
        }
        write!(f, "{:-<width$}", "")
    }
}

/// Raw accumulators, bumped on every access and never read back by the
/// engine itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessCounters {
    pub accesses: u64,
    pub reads: u64,
    pub writes: u64,
    pub read_misses: u64,
    pub read_misses_combined: u64,
    pub write_misses: u64,
    pub write_misses_combined: u64,
}

impl AccessCounters {
    pub(crate) fn on_access(&mut self, op: Operation) {
        self.accesses += 1;
        match op {
            Operation::Read => self.reads += 1,
            Operation::Write => self.writes += 1,
        }
    }

    pub(crate) fn on_primary_miss(&mut self, op: Operation) {
        match op {
            Operation::Read => self.read_misses += 1,
            Operation::Write => self.write_misses += 1,
        }
    }

    /// A miss neither the primary cache nor the victim buffer resolved.
    pub(crate) fn on_combined_miss(&mut self, op: Operation) {
        match op {
            Operation::Read => self.read_misses_combined += 1,
            Operation::Write => self.write_misses_combined += 1,
        }
    }
}

/// Final report: the raw counters plus every derived metric. Built fresh
/// from the accumulators on each call, so finalizing twice cannot
/// double-count anything.
#[derive(Clone, Copy, Debug, Serialize)]
pub struct CacheStats {
    pub accesses: u64,
    pub reads: u64,
    pub writes: u64,
    pub read_misses: u64,
    pub read_misses_combined: u64,
    pub write_misses: u64,
    pub write_misses_combined: u64,
    pub misses: u64,
    pub miss_rate: f64,
    pub hit_time: u64,
    pub miss_penalty: u64,
    pub avg_access_time: f64,
    pub storage_overhead: u64,
    pub storage_overhead_ratio: f64,
}

/// Bits of metadata the modeled hardware would carry alongside the data
/// arrays. The recency budget is the nominal hardware field width (8 bits
/// for LRU, 4 for NMRU-FIFO), not the simulator's in-memory u64.
fn overhead_bits(
    geo: &Geometry,
    storage: StoragePolicy,
    replacement: ReplacementPolicy,
) -> u64 {
    let line_count = geo.total_data_bytes / geo.line_bytes;
    let per_line = 1 + storage.validity_bits() + replacement.recency_bits() + geo.tag_bits as u64;
    // victim entries are always LRU and their tag spans everything above the
    // byte offset
    let per_victim = 1 + storage.validity_bits() + 8 + (u64::BITS - geo.offset_bits) as u64;
    per_line * line_count + per_victim * geo.victim_ways as u64
}

pub(crate) fn complete(
    counters: &AccessCounters,
    geo: &Geometry,
    storage: StoragePolicy,
    replacement: ReplacementPolicy,
) -> CacheStats {
    let misses = counters.read_misses_combined + counters.write_misses_combined;
    let miss_rate = if counters.accesses == 0 {
        0.0
    } else {
        misses as f64 / counters.accesses as f64
    };
    let ways = geo.ways as f64;
    let hit_time = (0.2 * ways).ceil() as u64;
    let effective_miss_block_bytes = match storage {
        StoragePolicy::Blocking => geo.line_bytes,
        StoragePolicy::SubBlocking => geo.line_bytes / 2,
    };
    let miss_penalty = (0.2 * ways + 50.0 + 0.25 * effective_miss_block_bytes as f64).ceil() as u64;
    let storage_overhead = overhead_bits(geo, storage, replacement);
    CacheStats {
        accesses: counters.accesses,
        reads: counters.reads,
        writes: counters.writes,
        read_misses: counters.read_misses,
        read_misses_combined: counters.read_misses_combined,
        write_misses: counters.write_misses,
        write_misses_combined: counters.write_misses_combined,
        misses,
        miss_rate,
        hit_time,
        miss_penalty,
        avg_access_time: hit_time as f64 + miss_rate * miss_penalty as f64,
        storage_overhead,
        storage_overhead_ratio: storage_overhead as f64 / 8.0 / geo.total_storage_bytes() as f64,
    }
}

impl Stat for CacheStats {
    fn view(&self, _: usize) -> Box<dyn StatView + '_> {
        Box::new(CacheStatsView { stat: self })
    }
}

pub struct CacheStatsView<'a> {
    stat: &'a CacheStats,
}

impl StatView for CacheStatsView<'_> {
    fn header(&self) -> &'static str {
        "cache statistics"
    }
    fn width(&self) -> usize {
        44
    }
}

impl fmt::Display for CacheStatsView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.stat;
        macro_rules! count {
            ($name:expr, $field:ident) => {
                writeln!(f, "  {:<26}{:>16}", $name, s.$field)
            };
        }
        macro_rules! ratio {
            ($name:expr, $field:ident) => {
                writeln!(f, "  {:<26}{:>16.6}", $name, s.$field)
            };
        }
        count!("accesses:", accesses)?;
        count!("reads:", reads)?;
        count!("read misses:", read_misses)?;
        count!("read misses (combined):", read_misses_combined)?;
        count!("writes:", writes)?;
        count!("write misses:", write_misses)?;
        count!("write misses (combined):", write_misses_combined)?;
        count!("misses:", misses)?;
        ratio!("miss rate:", miss_rate)?;
        count!("hit time:", hit_time)?;
        count!("miss penalty:", miss_penalty)?;
        ratio!("avg access time:", avg_access_time)?;
        count!("storage overhead (bits):", storage_overhead)?;
        ratio!("storage overhead ratio:", storage_overhead_ratio)
    }
}
