//! File discovery and manifest generation
//!
//! Enumerates regular files directly under the rechunk root (non-recursive)
//! whose size exceeds 8 MiB and partitions them uniformly at random into one
//! manifest file per worker slot. Manifests are plain text, one absolute
//! path per line, and are named `<host>.<slot>.list` inside the cache
//! directory.
//!
//! Invariant: the union of all manifests, taken as a set, is exactly the
//! eligible file set - no duplicates, no omissions.

use crate::error::DiscoveryError;
use rand::Rng;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Minimum file size for rechunking, exclusive
pub const MIN_FILE_SIZE: u64 = 8 * 1024 * 1024;

/// One worker's share of the discovered file set
///
/// Built once by [`build_manifests`] and immutable thereafter. The manifest
/// file itself is deleted by the worker engine on normal completion or on
/// cancellation.
#[derive(Debug, Clone)]
pub struct WorkerAssignment {
    /// Assignment id, unique within a run
    pub id: usize,

    /// Host the worker runs on
    pub host: String,

    /// Absolute path of this worker's manifest file
    pub manifest_path: PathBuf,

    /// Number of files assigned to this worker
    pub assigned_count: u64,
}

/// Result of discovery and partitioning
#[derive(Debug)]
pub struct ManifestSet {
    /// One assignment per worker slot, in id order
    pub assignments: Vec<WorkerAssignment>,

    /// Total eligible files across all manifests
    pub total_files: u64,

    /// Total bytes across all eligible files
    pub total_bytes: u64,
}

/// Open manifest writer for one worker slot during discovery
struct SlotWriter {
    host: String,
    path: PathBuf,
    writer: BufWriter<File>,
    count: u64,
}

/// Discover eligible files under `root` and partition them into one
/// manifest per (node, slot) pair
///
/// `multiplier` is the number of worker slots per node. On failure the
/// caller must tear down the cache directory; partial manifests written
/// before the error are invalid.
pub fn build_manifests(
    root: &Path,
    nodes: &[String],
    multiplier: usize,
    cache_dir: &Path,
) -> Result<ManifestSet, DiscoveryError> {
    let mut slots = Vec::with_capacity(nodes.len() * multiplier);
    for host in nodes {
        for slot in 0..multiplier {
            let path = cache_dir.join(format!("{host}.{slot}.list"));
            let file = File::create(&path).map_err(|e| DiscoveryError::ManifestCreate {
                path: path.clone(),
                source: e,
            })?;

            slots.push(SlotWriter {
                host: host.clone(),
                path,
                writer: BufWriter::new(file),
                count: 0,
            });
        }
    }

    let entries = std::fs::read_dir(root).map_err(|e| DiscoveryError::ReadRoot {
        path: root.to_path_buf(),
        source: e,
    })?;

    let mut rng = rand::rng();
    let mut total_files = 0u64;
    let mut total_bytes = 0u64;

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        // symlink_metadata so symlinks to large files are not followed
        let meta = match entry.path().symlink_metadata() {
            Ok(meta) => meta,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Skipping entry: stat failed");
                continue;
            }
        };

        if !meta.is_file() || meta.len() <= MIN_FILE_SIZE {
            continue;
        }

        let idx = rng.random_range(0..slots.len());
        let slot = &mut slots[idx];

        writeln!(slot.writer, "{}", entry.path().display()).map_err(|e| {
            DiscoveryError::ManifestWrite {
                path: slot.path.clone(),
                source: e,
            }
        })?;
        slot.count += 1;

        total_files += 1;
        total_bytes += meta.len();
    }

    let mut assignments = Vec::with_capacity(slots.len());
    for (id, slot) in slots.into_iter().enumerate() {
        slot.writer
            .into_inner()
            .map_err(|e| DiscoveryError::ManifestWrite {
                path: slot.path.clone(),
                source: e.into_error(),
            })?;

        debug!(id, host = %slot.host, files = slot.count, "Manifest written");

        assignments.push(WorkerAssignment {
            id,
            host: slot.host,
            manifest_path: slot.path,
            assigned_count: slot.count,
        });
    }

    info!(
        files = total_files,
        bytes = total_bytes,
        workers = assignments.len(),
        "File lists generated"
    );

    Ok(ManifestSet {
        assignments,
        total_files,
        total_bytes,
    })
}
