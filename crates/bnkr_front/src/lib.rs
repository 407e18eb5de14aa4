//! The frontend of the simulator. Handles the command line and config file, builds the workloads,
//! runs the hierarchy and prints the report.

#[macro_use]
extern crate log;

pub mod config;
pub mod report;
pub mod workload;

use bnkr_core::{Access, BunkerConfig, Cycle, StopReason, System, SystemConfig};
use bnkr_util::parse_size;
use clap::{Parser, ValueEnum};
use thiserror::Error;

use config::ConfigError;
use workload::TraceError;

use std::fmt;
use std::path::PathBuf;

/// Addresses between the workloads of two requesters.
const REQUESTER_SPACING: u64 = 0x100_0000;

#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Sim(#[from] bnkr_core::Error),

    #[error("failed to write report: {0}")]
    Report(#[from] fmt::Error),

    #[error("the trace workload needs at least one --trace file")]
    NoTrace,

    #[error("accesses of {size} bytes don't fit in a {block_size} byte block")]
    AccessSize {
        size: usize,
        block_size: u64,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Workload {
    /// `y[i] = alpha * x[i] + y[i]` over arrays of doubles.
    Daxpy,
    /// Reads of consecutive addresses.
    Sequential,
    /// Reads a fixed stride apart.
    Strided,
    /// Random reads and writes.
    Random,
    /// Accesses read from trace files, one for each requester.
    Trace,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BunkerLevel {
    L1,
    L2,
}

/// Simulate a two level cache hierarchy with bunker remapping.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Config file. The platform config directory is searched if not given.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    #[arg(short, long, value_enum, default_value = "daxpy")]
    pub workload: Workload,

    /// Trace files for the trace workload.
    #[arg(long)]
    pub trace: Vec<PathBuf>,

    /// Number of requesters. Ignored by the trace workload.
    #[arg(short, long, default_value = "1")]
    pub requesters: usize,

    /// Number of accesses, or array length for daxpy.
    #[arg(short = 'n', long, default_value = "2500")]
    pub count: u64,

    /// Bytes per access.
    #[arg(long, default_value = "8")]
    pub size: usize,

    /// Distance between accesses of the strided workload.
    #[arg(long, default_value = "4kB", value_parser = parse_size)]
    pub stride: u64,

    /// Bytes covered by the random workload.
    #[arg(long, default_value = "1MiB", value_parser = parse_size)]
    pub span: u64,

    /// Overrides the seed of the config.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Bunker stride, overriding the config.
    #[arg(long)]
    pub bunker_stride: Option<u64>,

    /// Bunker radix, overriding the config.
    #[arg(long)]
    pub bunker_radix: Option<u64>,

    /// The cache the bunker overrides apply to.
    #[arg(long, value_enum, default_value = "l2")]
    pub bunker_level: BunkerLevel,

    /// Stop after this many cycles.
    #[arg(long)]
    pub max_cycles: Option<Cycle>,
}

impl Args {
    /// Apply the command line overrides to `config`.
    fn apply(&self, config: &mut SystemConfig) {
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if self.bunker_stride.is_none() && self.bunker_radix.is_none() {
            return;
        }
        let cache = match self.bunker_level {
            BunkerLevel::L1 => &mut config.l1,
            BunkerLevel::L2 => &mut config.l2,
        };
        let bunker = cache.bunker.get_or_insert(BunkerConfig {
            stride: 1,
            radix: 1,
            range: None,
        });
        if let Some(stride) = self.bunker_stride {
            bunker.stride = stride;
        }
        if let Some(radix) = self.bunker_radix {
            bunker.radix = radix;
        }
    }

    fn workloads(&self, seed: u64, block_size: u64) -> Result<Vec<Vec<Access>>, RunError> {
        let sized = matches!(
            self.workload,
            Workload::Sequential | Workload::Strided | Workload::Random,
        );
        if sized && self.size as u64 > block_size {
            return Err(RunError::AccessSize { size: self.size, block_size });
        }

        let per_requester = |make: &dyn Fn(u64, u64) -> Vec<Access>| -> Vec<Vec<Access>> {
            (0..self.requesters.max(1) as u64)
                .map(|i| make(i, i * REQUESTER_SPACING))
                .collect()
        };

        let workloads = match self.workload {
            Workload::Trace => {
                if self.trace.is_empty() {
                    return Err(RunError::NoTrace);
                }
                self.trace
                    .iter()
                    .map(|path| workload::load_trace(path, block_size))
                    .collect::<Result<Vec<_>, _>>()?
            }
            Workload::Daxpy => per_requester(&|_, base| {
                workload::daxpy(workload::DAXPY_BASE + base, self.count)
            }),
            Workload::Sequential => per_requester(&|_, base| {
                workload::sequential(base, self.count, self.size)
            }),
            Workload::Strided => per_requester(&|_, base| {
                workload::strided(base, self.count, self.stride, self.size)
            }),
            Workload::Random => per_requester(&|i, base| {
                workload::random(seed + i, base, self.span, self.count, self.size)
            }),
        };

        Ok(workloads)
    }
}

pub fn run() -> Result<(), RunError> {
    run_with(&Args::parse())
}

pub fn run_with(args: &Args) -> Result<(), RunError> {
    let mut config = match &args.config {
        Some(path) => config::load(path)?,
        None => config::from_file_or_default(),
    };
    args.apply(&mut config);

    let workloads = args.workloads(config.seed, config.block_size)?;
    let mut system = System::new(&config, workloads)?;

    let cycles = match args.max_cycles {
        Some(end) => {
            if system.run_until(end)? == StopReason::Time {
                warn!("stopped at cycle {end} before every requester was done");
            }
            system.cycle()
        }
        None => system.run()?,
    };

    print!("{}", report::report(&system, cycles)?);

    if args.workload == Workload::Daxpy && system.is_done() {
        if system.is_idle() {
            let sum = daxpy_sum(&mut system, args.count)?;
            println!("daxpy sum: {sum}");
        } else {
            warn!("writebacks are still in flight at cycle {cycles}, skipping the daxpy sum");
        }
    }

    Ok(())
}

/// Sum `y` of the daxpy of the first requester, reading the newest copy in the hierarchy.
fn daxpy_sum(system: &mut System, n: u64) -> Result<f64, bnkr_core::Error> {
    let mut sum = 0.0;
    for i in 0..n {
        let addr = workload::daxpy_y(workload::DAXPY_BASE, n, i);
        let mut bytes = [0; 8];
        bytes.copy_from_slice(&system.functional_read(addr, 8)?);
        sum += f64::from_le_bytes(bytes);
    }
    Ok(sum)
}
