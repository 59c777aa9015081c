//! rechunk - Cluster-Wide File Rewriter
//!
//! Rewrites every large file under a directory by copying it out-of-place
//! and atomically renaming the copy back, so the filesystem re-lays-out the
//! file's chunks. The work is partitioned across worker processes started
//! on remote hosts, with live progress aggregated back at the coordinator.
//!
//! # Features
//!
//! - **Random partitioning**: eligible files (> 8 MiB, regular, directly
//!   under the root) are assigned uniformly at random to per-worker
//!   manifests, so load spreads without any central queue.
//!
//! - **Crash-safe rewrites**: every file is copied to the cache directory
//!   first and only replaced by an atomic rename, so at any instant it is
//!   fully pre-rewrite or fully post-rewrite.
//!
//! - **Cooperative cancellation**: a worker whose output channel breaks
//!   stops at the next safe point; a rename in flight always completes.
//!
//! - **Independent workers**: a copy or move failure stops that worker
//!   only; the rest of the cluster keeps rewriting.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────── Coordinator ───────────────────────────┐
//! │                                                                   │
//! │  Manifest Builder ──► <host>.<slot>.list files in the cache dir   │
//! │                                                                   │
//! │  ┌──────────┐  ┌──────────┐        ┌──────────┐   ┌────────────┐  │
//! │  │Executor 0│  │Executor 1│  ...   │Executor N│   │ Aggregator │  │
//! │  └────┬─────┘  └────┬─────┘        └────┬─────┘   └─────┬──────┘  │
//! │       │             │                   │     GlobalProgress      │
//! └───────┼─────────────┼───────────────────┼────────(mutex)──────────┘
//!         │ ssh         │ ssh               │ ssh
//!         ▼             ▼                   ▼
//!   ┌───────────┐ ┌───────────┐      ┌───────────┐
//!   │ Worker 0  │ │ Worker 1  │      │ Worker N  │   one manifest each
//!   │ cp ─► mv  │ │ cp ─► mv  │      │ cp ─► mv  │   progress on stdout:
//!   └───────────┘ └───────────┘      └───────────┘   "<count>,<path>\n"
//! ```
//!
//! # Example
//!
//! ```bash
//! # Rechunk /mnt/storage using the hosts in nodes.txt
//! rechunk /mnt/storage -n nodes.txt
//!
//! # Two workers per node, 5s progress cadence
//! rechunk /mnt/storage -n nodes.txt -m 2 -i 5
//! ```

pub mod config;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod progress;
pub mod transport;
pub mod worker;

pub use config::{CliArgs, CoordinatorConfig, RunMode, WorkerConfig};
pub use coordinator::{Coordinator, RunSummary};
pub use error::{RechunkError, Result};
pub use executor::{WorkerOutcome, WorkerReport};
pub use manifest::{ManifestSet, WorkerAssignment};
pub use progress::GlobalProgress;
pub use transport::{LaunchRequest, LocalTransport, SshTransport, Transport};
pub use worker::WorkerEngine;
