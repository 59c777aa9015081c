//! Remote worker executor
//!
//! One executor per worker assignment. Launches the worker engine through
//! the transport, reads its stdout line-by-line until the channel closes,
//! and feeds positive progress deltas into the shared global counter.
//! Malformed lines are ignored; duplicate or decreasing cumulative counts
//! contribute nothing. An executor never restarts a failed worker.

use crate::manifest::WorkerAssignment;
use crate::progress::{GlobalProgress, ProgressMessage};
use crate::transport::{LaunchRequest, Transport};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

/// Terminal status of one worker, surfaced in the final summary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerOutcome {
    /// The worker reported every assigned file rewritten and exited cleanly
    Completed,

    /// The progress stream ended short of the assigned count, or the worker
    /// exited non-zero (a per-file failure or cancellation truncated it)
    Partial,

    /// The worker process could not be started at all
    LaunchFailed,
}

/// What one executor observed about its worker
#[derive(Debug, Clone)]
pub struct WorkerReport {
    /// Assignment id
    pub id: usize,

    /// Host the worker ran on
    pub host: String,

    /// Last cumulative count observed on the wire
    pub completed: u64,

    /// Terminal status
    pub outcome: WorkerOutcome,
}

/// Coordinator-side handle for one worker assignment
pub struct Executor {
    assignment: WorkerAssignment,
    request: LaunchRequest,
    transport: Arc<dyn Transport>,
    progress: Arc<GlobalProgress>,
}

impl Executor {
    pub fn new(
        assignment: WorkerAssignment,
        request: LaunchRequest,
        transport: Arc<dyn Transport>,
        progress: Arc<GlobalProgress>,
    ) -> Self {
        Self {
            assignment,
            request,
            transport,
            progress,
        }
    }

    /// Launch the worker and consume its progress stream to the end
    ///
    /// Returns a report rather than an error: a worker failure is fatal to
    /// this assignment only and must never abort sibling executors.
    pub async fn run(self) -> WorkerReport {
        let id = self.assignment.id;
        let host = self.assignment.host.clone();

        info!(worker = id, host = %host, files = self.assignment.assigned_count, "Starting worker");

        let mut child = match self.transport.launch(&host, &self.request) {
            Ok(child) => child,
            Err(e) => {
                warn!(worker = id, host = %host, error = %e, "Failed to launch worker");
                return WorkerReport {
                    id,
                    host,
                    completed: 0,
                    outcome: WorkerOutcome::LaunchFailed,
                };
            }
        };

        // A transport that does not pipe stdout gives us no progress channel;
        // treat it like a failed launch rather than panicking the task.
        let Some(stdout) = child.stdout.take() else {
            warn!(worker = id, host = %host, "Worker launched without a piped stdout");
            let _ = child.start_kill();
            let _ = child.wait().await;
            return WorkerReport {
                id,
                host,
                completed: 0,
                outcome: WorkerOutcome::LaunchFailed,
            };
        };
        let mut lines = BufReader::new(stdout).lines();

        // Delta accounting against the previously observed cumulative count.
        // The reporter is lossy, so deltas may exceed 1; duplicates and
        // decreases are ignored.
        let mut prev = 0u64;

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                // End of stream or a transport read error: either way the
                // channel is gone and the worker will cancel itself.
                Ok(None) => break,
                Err(e) => {
                    debug!(worker = id, error = %e, "Progress stream read failed");
                    break;
                }
            };

            let Some(msg) = ProgressMessage::parse(&line) else {
                debug!(worker = id, line = %line, "Ignoring malformed progress line");
                continue;
            };

            let delta = msg.cumulative_count.saturating_sub(prev);
            if delta > 0 {
                self.progress.add(delta);
                prev = msg.cumulative_count;
            }

            debug!(
                worker = id,
                count = msg.cumulative_count,
                path = %msg.current_path,
                "Progress"
            );
        }

        let exited_clean = match child.wait().await {
            Ok(status) => status.success(),
            Err(e) => {
                warn!(worker = id, error = %e, "Failed to wait for worker");
                false
            }
        };

        let outcome = if exited_clean && prev == self.assignment.assigned_count {
            WorkerOutcome::Completed
        } else {
            WorkerOutcome::Partial
        };

        info!(
            worker = id,
            host = %host,
            completed = prev,
            assigned = self.assignment.assigned_count,
            outcome = ?outcome,
            "Worker finished"
        );

        WorkerReport {
            id,
            host,
            completed: prev,
            outcome,
        }
    }
}
