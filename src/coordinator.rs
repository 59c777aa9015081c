//! Run coordinator - orchestrates a cluster-wide rechunk
//!
//! The coordinator is responsible for:
//! - Setting up the cache/working directory
//! - Building per-worker manifests from discovery
//! - Starting one executor per assignment (with a concurrency cap) and the
//!   progress aggregator
//! - Joining everything and reclaiming the working directory

use crate::config::CoordinatorConfig;
use crate::error::{CacheError, RechunkError, Result};
use crate::executor::{Executor, WorkerReport};
use crate::manifest;
use crate::progress::{Aggregator, GlobalProgress};
use crate::transport::{LaunchRequest, SshTransport, Transport};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Result of a completed run
#[derive(Debug)]
pub struct RunSummary {
    /// Total eligible files discovered
    pub total_files: u64,

    /// Total bytes across eligible files
    pub total_bytes: u64,

    /// Files confirmed rewritten across all workers
    pub completed: u64,

    /// Wall-clock duration of the run
    pub duration: Duration,

    /// Per-worker terminal statuses, in assignment order
    pub reports: Vec<WorkerReport>,
}

/// Coordinates manifests, executors and the aggregator for one run
pub struct Coordinator {
    config: CoordinatorConfig,
    transport: Arc<dyn Transport>,
    shutdown: CancellationToken,
}

impl Coordinator {
    /// Create a coordinator that launches workers over ssh
    pub fn new(config: CoordinatorConfig) -> Self {
        let transport = Arc::new(SshTransport::new(config.ssh_command.clone()));
        Self::with_transport(config, transport)
    }

    /// Create a coordinator with an explicit transport (tests, local runs)
    pub fn with_transport(config: CoordinatorConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token a signal handler can cancel to interrupt the run
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run the full rechunk: discover, partition, execute, reclaim
    pub async fn run(self) -> Result<RunSummary> {
        let start = Instant::now();

        prepare_cache_dir(&self.config.cache_dir)?;

        info!(root = %self.config.root.display(), "Generating file lists for workers");
        let set = match manifest::build_manifests(
            &self.config.root,
            &self.config.nodes,
            self.config.multiplier,
            &self.config.cache_dir,
        ) {
            Ok(set) => set,
            Err(e) => {
                // Partial manifests are invalid; tear the working dir down.
                reclaim_cache_dir(&self.config.cache_dir);
                return Err(e.into());
            }
        };

        let progress = Arc::new(GlobalProgress::new(set.total_files));

        let aggregator_stop = CancellationToken::new();
        let aggregator = if self.config.show_progress {
            let task = Aggregator::new(Arc::clone(&progress), self.config.interval)
                .run(aggregator_stop.clone());
            Some(tokio::spawn(task))
        } else {
            None
        };

        let cap = self
            .config
            .max_concurrent
            .unwrap_or_else(|| set.assignments.len().max(1));
        let semaphore = Arc::new(Semaphore::new(cap));

        info!(workers = set.assignments.len(), cap, "Starting workers");

        let mut executors = JoinSet::new();
        for assignment in set.assignments {
            let request = LaunchRequest {
                root: self.config.root.clone(),
                manifest: assignment.manifest_path.clone(),
                cache_dir: self.config.cache_dir.clone(),
                id: assignment.id,
                remote_exe: self.config.remote_exe.clone(),
            };
            let executor = Executor::new(
                assignment,
                request,
                Arc::clone(&self.transport),
                Arc::clone(&progress),
            );
            let semaphore = Arc::clone(&semaphore);

            executors.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("Semaphore closed");
                executor.run().await
            });
        }

        // Workers fail independently; only an external interrupt stops the
        // join phase early, and then without forcing sub-process cleanup.
        let mut reports: Vec<WorkerReport> = Vec::new();
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    warn!("Interrupted, abandoning running workers");
                    aggregator_stop.cancel();
                    return Err(RechunkError::Interrupted);
                }
                joined = executors.join_next() => match joined {
                    None => break,
                    Some(Ok(report)) => reports.push(report),
                    Some(Err(e)) => warn!(error = %e, "Executor task failed to join"),
                }
            }
        }

        aggregator_stop.cancel();
        if let Some(handle) = aggregator {
            let _ = handle.await;
        }

        reclaim_cache_dir(&self.config.cache_dir);

        reports.sort_by_key(|r| r.id);
        let (completed, _) = progress.snapshot();

        info!(
            completed,
            total = set.total_files,
            duration_secs = start.elapsed().as_secs(),
            "Run finished"
        );

        Ok(RunSummary {
            total_files: set.total_files,
            total_bytes: set.total_bytes,
            completed,
            duration: start.elapsed(),
            reports,
        })
    }
}

/// Ensure the cache directory exists, is a directory, and is empty
pub fn prepare_cache_dir(path: &Path) -> std::result::Result<(), CacheError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| CacheError::CreateFailed {
            path: path.to_path_buf(),
            source: e,
        })?;
        return Ok(());
    }

    if !path.is_dir() {
        return Err(CacheError::NotADirectory(path.to_path_buf()));
    }

    let mut entries = std::fs::read_dir(path).map_err(|e| CacheError::ListFailed {
        path: path.to_path_buf(),
        source: e,
    })?;

    if entries.next().is_some() {
        return Err(CacheError::NotEmpty(path.to_path_buf()));
    }

    Ok(())
}

/// Empty and remove the cache directory, best-effort
///
/// After an abnormal worker termination this may find leftover temp copies;
/// they are reclaimed here. A coordinator crash leaves the directory behind
/// with no automatic cleanup - that is a documented limitation.
pub fn reclaim_cache_dir(path: &Path) {
    let entries = match std::fs::read_dir(path) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Cache directory not reclaimed");
            return;
        }
    };

    for entry in entries.flatten() {
        if let Err(e) = std::fs::remove_file(entry.path()) {
            warn!(path = %entry.path().display(), error = %e, "Failed to remove cache file");
        }
    }

    if let Err(e) = std::fs::remove_dir(path) {
        warn!(path = %path.display(), error = %e, "Failed to remove cache directory");
    }
}
