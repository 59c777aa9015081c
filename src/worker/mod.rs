//! Worker engine - the remote side of a rechunk run
//!
//! One worker consumes one manifest: for each listed file it copies the
//! content to a temp file in the cache directory, then atomically renames
//! the copy over the original. A concurrent reporter task samples the
//! worker's position and writes it to stdout, which the coordinator-side
//! executor is reading over the transport.
//!
//! Cancellation originates from the output channel breaking (the transport
//! peer went away) and is cooperative: it is observed mid-copy, at the
//! copied boundary, and after a completed move - never during a move.

mod engine;
mod reporter;

pub use engine::WorkerEngine;

use crate::progress::ProgressMessage;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// State shared between the rewrite loop and the reporter
///
/// The current path / completed count pair is a display cache: the reporter
/// may observe a path from one file paired with a count from another. That
/// staleness only affects the displayed sample, never the rewrite itself,
/// so the two fields are deliberately not read under one lock.
#[derive(Debug, Default)]
pub struct WorkerState {
    /// File the rewrite loop is currently on
    current_path: Mutex<Option<String>>,

    /// Files fully rewritten so far (incremented after a successful move)
    completed: AtomicU64,

    /// Level-triggered cancellation; set once, never cleared
    cancel: CancellationToken,
}

impl WorkerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish the file the rewrite loop is starting on
    pub fn publish(&self, path: &Path) {
        *self.current_path.lock() = Some(path.display().to_string());
    }

    /// Count one more fully rewritten file
    pub fn mark_done(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Files fully rewritten so far
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    /// Sample the current position; None until the first file is published
    pub fn sample(&self) -> Option<ProgressMessage> {
        let current_path = self.current_path.lock().clone()?;
        Some(ProgressMessage {
            cumulative_count: self.completed(),
            current_path,
        })
    }

    /// The worker-wide cancellation signal
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}
