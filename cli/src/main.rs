use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
};

use anyhow::{Context, Result};
use cache_core::{
    config::{CacheConfig, ReplacementPolicy, StoragePolicy},
    sim::Simulator,
    trace::TraceReader,
};
use clap::{Parser, ValueEnum};
use terminal_size::terminal_size;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Total data storage is 2^C bytes
    #[arg(short = 'c', default_value_t = 15)]
    c: u32,
    /// A cache line is 2^B bytes
    #[arg(short = 'b', default_value_t = 5)]
    b: u32,
    /// Each set holds 2^S ways
    #[arg(short = 's', default_value_t = 3)]
    s: u32,
    /// The victim buffer holds 2^V entries (0 disables it)
    #[arg(short = 'v', default_value_t = 2)]
    v: u32,
    /// Storage policy
    #[arg(long, value_enum, default_value = "blocking")]
    storage: StorageArg,
    /// Replacement policy
    #[arg(long, value_enum, default_value = "lru")]
    replacement: ReplacementArg,
    /// File path to input trace (`-` or absent reads stdin)
    input: Option<PathBuf>,
    /// Emit the final statistics as JSON
    #[arg(long)]
    json: bool,
    /// Verbose output
    #[arg(long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StorageArg {
    Blocking,
    SubBlocking,
}

impl From<StorageArg> for StoragePolicy {
    fn from(v: StorageArg) -> Self {
        match v {
            StorageArg::Blocking => StoragePolicy::Blocking,
            StorageArg::SubBlocking => StoragePolicy::SubBlocking,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ReplacementArg {
    Lru,
    NmruFifo,
}

impl From<ReplacementArg> for ReplacementPolicy {
    fn from(v: ReplacementArg) -> Self {
        match v {
            ReplacementArg::Lru => ReplacementPolicy::Lru,
            ReplacementArg::NmruFifo => ReplacementPolicy::NmruFifo,
        }
    }
}

fn main() -> Result<()> {
    let args = Cli::parse();
    if args.verbose {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    } else {
        env_logger::init();
    }

    let config = CacheConfig {
        c: args.c,
        b: args.b,
        s: args.s,
        v: args.v,
        storage: args.storage.into(),
        replacement: args.replacement.into(),
    };
    let mut sim = Simulator::new(config).context("invalid cache configuration")?;

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) if path.as_os_str() != "-" => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open trace {}", path.display()))?,
        )),
        _ => Box::new(BufReader::new(io::stdin())),
    };

    let mut references = 0u64;
    for record in TraceReader::new(reader) {
        let record = record.context("failed to read trace")?;
        sim.access(record.op, record.addr);
        references += 1;
    }
    log::info!("finished simulation. {references} references processed.");

    if args.json {
        let report = sim.finalize();
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output_stat(&sim);
    }
    Ok(())
}

fn output_stat(sim: &Simulator) {
    let max_width = get_terminal_width().unwrap_or(120) as usize;
    println!("{}", sim.collect_stat().view(max_width));
}

fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}
