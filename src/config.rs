//! Configuration types for rechunk
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Mode selection (coordinator vs worker) with validation
//! - Node list reading with the PBS_NODEFILE environment fallback

use crate::error::ConfigError;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the default node list path
pub const NODEFILE_ENV: &str = "PBS_NODEFILE";

/// Default aggregator interval, seconds
const DEFAULT_INTERVAL_SECS: u64 = 3;

/// Default worker-side reporter interval, seconds
const DEFAULT_REPORT_INTERVAL_SECS: u64 = 1;

/// Default cache directory name, resolved relative to the rechunk root
const DEFAULT_CACHE_DIR: &str = ".rechunk";

/// Distributed file rechunker
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rechunk",
    version,
    about = "Rewrites large files across a cluster so the filesystem re-lays-out their chunks",
    long_about = "Discovers regular files larger than 8 MiB directly under PATH, partitions them\n\
                  among workers started on the hosts in the node list, and rewrites each file\n\
                  out-of-place: copy to a temp file in the cache directory, then atomic rename\n\
                  over the original. Progress streams back over each worker's stdout.",
    after_help = "EXAMPLES:\n    \
        rechunk /mnt/storage -n nodes.txt\n    \
        rechunk /mnt/storage -n nodes.txt -m 2 -i 5 -c /mnt/storage/.rechunk\n    \
        rechunk /mnt/storage --worker -f /mnt/storage/.rechunk/node1.0.list --id 0  # started by the coordinator"
)]
pub struct CliArgs {
    /// Path to rechunk
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Start workers on all nodes in NODEFILE (default: $PBS_NODEFILE)
    #[arg(short = 'n', long, value_name = "FILE")]
    pub nodefile: Option<PathBuf>,

    /// Progress reporting interval in seconds
    #[arg(short = 'i', long, default_value_t = DEFAULT_INTERVAL_SECS, value_name = "SECS")]
    pub interval: u64,

    /// Directory in which to store in-flight file copies
    #[arg(short = 'c', long, value_name = "DIR")]
    pub cachedir: Option<PathBuf>,

    /// Workers started per node
    #[arg(short = 'm', long, default_value = "1", value_name = "NUM")]
    pub multiplier: usize,

    /// Cap on simultaneously running workers (default: all run at once)
    #[arg(long, value_name = "NUM")]
    pub max_concurrent: Option<usize>,

    /// Command used to launch worker processes on remote hosts
    #[arg(long, default_value = "ssh", value_name = "CMD")]
    pub ssh_command: String,

    /// Path of the rechunk binary on remote hosts (default: this binary's path)
    #[arg(long, value_name = "PATH")]
    pub remote_exe: Option<PathBuf>,

    /// Worker mode (do not call manually)
    #[arg(short = 'w', long)]
    pub worker: bool,

    /// File containing filenames to be rewritten (worker mode)
    #[arg(short = 'f', long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,

    /// Assignment id, makes temp filenames unique (worker mode)
    #[arg(long, value_name = "NUM")]
    pub id: Option<usize>,

    /// Worker-side progress sample interval in seconds
    #[arg(long, default_value_t = DEFAULT_REPORT_INTERVAL_SECS, value_name = "SECS")]
    pub report_interval: u64,

    /// Quiet mode - suppress the progress display
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Validated run mode selected from CLI arguments
#[derive(Debug, Clone)]
pub enum RunMode {
    Coordinator(CoordinatorConfig),
    Worker(WorkerConfig),
}

/// Validated coordinator-mode configuration
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Canonicalized rechunk root
    pub root: PathBuf,

    /// Hostnames to start workers on, one entry per worker slot source
    pub nodes: Vec<String>,

    /// Aggregator cadence
    pub interval: Duration,

    /// Absolute cache/working directory
    pub cache_dir: PathBuf,

    /// Workers per node
    pub multiplier: usize,

    /// Cap on simultaneously running workers
    pub max_concurrent: Option<usize>,

    /// Remote launch command
    pub ssh_command: String,

    /// rechunk binary path on remote hosts
    pub remote_exe: PathBuf,

    /// Show the progress display
    pub show_progress: bool,
}

/// Validated worker-mode configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Canonicalized rechunk root
    pub root: PathBuf,

    /// Manifest to consume (and delete when done)
    pub manifest: PathBuf,

    /// Absolute cache/working directory
    pub cache_dir: PathBuf,

    /// Assignment id
    pub id: usize,

    /// Reporter cadence
    pub report_interval: Duration,
}

impl RunMode {
    /// Validate CLI arguments into a run mode
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let root = canonical_root(&args.path)?;
        let cache_dir = resolve_cache_dir(&root, args.cachedir.as_deref());

        if args.worker {
            let manifest = args.manifest.ok_or(ConfigError::MissingManifest)?;
            let id = args.id.ok_or(ConfigError::MissingWorkerId)?;

            return Ok(RunMode::Worker(WorkerConfig {
                root,
                manifest,
                cache_dir,
                id,
                report_interval: Duration::from_secs(args.report_interval.max(1)),
            }));
        }

        if args.multiplier == 0 {
            return Err(ConfigError::InvalidMultiplier(args.multiplier));
        }

        if let Some(cap) = args.max_concurrent {
            if cap == 0 {
                return Err(ConfigError::InvalidConcurrency(cap));
            }
        }

        let nodefile = match args.nodefile {
            Some(path) => path,
            None => std::env::var_os(NODEFILE_ENV)
                .map(PathBuf::from)
                .ok_or(ConfigError::MissingNodeList)?,
        };
        let nodes = read_node_file(&nodefile)?;

        let remote_exe = args
            .remote_exe
            .or_else(|| std::env::current_exe().ok())
            .unwrap_or_else(|| PathBuf::from("rechunk"));

        Ok(RunMode::Coordinator(CoordinatorConfig {
            root,
            nodes,
            interval: Duration::from_secs(args.interval.max(1)),
            cache_dir,
            multiplier: args.multiplier,
            max_concurrent: args.max_concurrent,
            ssh_command: args.ssh_command,
            remote_exe,
            show_progress: !args.quiet,
        }))
    }
}

/// Canonicalize the rechunk root, requiring an existing directory
fn canonical_root(path: &Path) -> Result<PathBuf, ConfigError> {
    let root = path
        .canonicalize()
        .map_err(|_| ConfigError::NotAFolder(path.to_path_buf()))?;

    if !root.is_dir() {
        return Err(ConfigError::NotAFolder(path.to_path_buf()));
    }

    Ok(root)
}

/// Resolve the cache directory to an absolute path under the root
///
/// A relative --cachedir is interpreted relative to the rechunk root, not the
/// process working directory, so remote workers agree on its location.
fn resolve_cache_dir(root: &Path, cachedir: Option<&Path>) -> PathBuf {
    match cachedir {
        Some(dir) if dir.is_absolute() => dir.to_path_buf(),
        Some(dir) => root.join(dir),
        None => root.join(DEFAULT_CACHE_DIR),
    }
}

/// Read a node list: one hostname per line, trimmed, empty lines skipped
pub fn read_node_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::NodeListRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let nodes: Vec<String> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    if nodes.is_empty() {
        return Err(ConfigError::EmptyNodeList(path.to_path_buf()));
    }

    Ok(nodes)
}
