//! Error types for rechunk
//!
//! This module defines the error hierarchy covering:
//! - File discovery and manifest generation
//! - Cache/working directory setup
//! - Worker launch and per-file rewrite failures
//! - Configuration and CLI errors
//!
//! Design philosophy:
//! - Use thiserror for structured error types in library code
//! - Failures local to one worker never abort sibling workers
//! - A broken worker output channel is a cancellation request, not an error

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for the rechunk application
#[derive(Error, Debug)]
pub enum RechunkError {
    /// Discovery or manifest generation errors
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),

    /// Cache/working directory errors
    #[error("Cache directory error: {0}")]
    Cache(#[from] CacheError),

    /// Worker launch and rewrite errors
    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors (manifest reading, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Interrupted by signal
    #[error("Run interrupted by signal")]
    Interrupted,
}

/// Errors during file discovery and manifest generation
///
/// A failed stat on an individual entry is skipped, not an error; only an
/// unreadable root or an unwritable manifest aborts the run.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// Root directory cannot be enumerated
    #[error("Failed to read directory '{path}': {source}")]
    ReadRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Manifest file could not be created
    #[error("Failed to create manifest '{path}': {source}")]
    ManifestCreate {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Manifest file could not be written
    #[error("Failed to write manifest '{path}': {source}")]
    ManifestWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Cache/working directory errors
///
/// All of these are fatal and abort the run before any worker starts.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Path exists but is not a directory
    #[error("'{0}' is not a directory")]
    NotADirectory(PathBuf),

    /// Pre-existing cache directory is not empty
    #[error("Cache directory not empty ({0})")]
    NotEmpty(PathBuf),

    /// Directory could not be created
    #[error("Unable to create cache directory '{path}': {source}")]
    CreateFailed {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Directory could not be listed during setup or reclaim
    #[error("Unable to list cache directory '{path}': {source}")]
    ListFailed {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Worker launch and per-file rewrite errors
///
/// These are fatal to a single worker only; other workers continue.
#[derive(Error, Debug)]
pub enum WorkerError {
    /// External copy exited non-zero; no retry is attempted
    #[error("Unable to copy file '{path}': exit code {code}")]
    CopyFailed { path: PathBuf, code: i32 },

    /// External move exited non-zero; no retry is attempted
    #[error("Unable to move file '{path}': exit code {code}")]
    MoveFailed { path: PathBuf, code: i32 },

    /// A rewrite sub-process could not be spawned
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        program: String,
        source: std::io::Error,
    },

    /// The remote worker process could not be launched
    #[error("Failed to launch worker on '{host}': {source}")]
    LaunchFailed {
        host: String,
        source: std::io::Error,
    },

    /// Manifest line names a path with no final component
    #[error("Manifest entry has no file name: '{0}'")]
    InvalidManifestEntry(PathBuf),
}

/// Configuration and CLI errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// No node list given and no environment fallback
    #[error("No nodefile given and PBS_NODEFILE is not set")]
    MissingNodeList,

    /// Node list contains no hosts
    #[error("Node list '{0}' contains no hosts")]
    EmptyNodeList(PathBuf),

    /// Node list could not be read
    #[error("Failed to read node list '{path}': {source}")]
    NodeListRead {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Root path is not a directory
    #[error("'{0}' is not a folder")]
    NotAFolder(PathBuf),

    /// Worker mode needs a manifest path
    #[error("Worker mode requires --manifest")]
    MissingManifest,

    /// Worker mode needs an assignment id
    #[error("Worker mode requires --id")]
    MissingWorkerId,

    /// Multiplier must be at least 1
    #[error("Invalid multiplier {0}: must be at least 1")]
    InvalidMultiplier(usize),

    /// Concurrency cap must be at least 1
    #[error("Invalid concurrency cap {0}: must be at least 1")]
    InvalidConcurrency(usize),
}

/// Result type alias for RechunkError
pub type Result<T> = std::result::Result<T, RechunkError>;
