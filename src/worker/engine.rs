//! The per-file rewrite state machine
//!
//! Reads the manifest strictly sequentially (per-worker ordering is part of
//! the protocol) and drives each file through:
//!
//! ```text
//! Pending -> Copying -> Copied -> Moving -> Done
//!               |          |
//!               +----------+--> Aborted (cancellation before the move)
//! ```
//!
//! The copy is an external `cp -p -f` into the cache directory and may be
//! cancelled; the move is an external `mv -f` (an atomic rename on the same
//! filesystem) and once issued always runs to completion. At every instant
//! the original file is either fully pre-rewrite or fully post-rewrite.

use crate::config::WorkerConfig;
use crate::error::{Result, WorkerError};
use crate::worker::{reporter, WorkerState};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Rewrite lifecycle of one manifest entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RewritePhase {
    Pending,
    Copying,
    Copied,
    Moving,
    Done,
    Aborted,
}

/// Transient state of one file being rewritten
#[derive(Debug)]
struct RewriteUnit {
    source: PathBuf,
    temp: PathBuf,
    phase: RewritePhase,
}

impl RewriteUnit {
    fn new(source: PathBuf, temp: PathBuf) -> Self {
        Self {
            source,
            temp,
            phase: RewritePhase::Pending,
        }
    }

    fn advance(&mut self, phase: RewritePhase) {
        debug!(path = %self.source.display(), from = ?self.phase, to = ?phase, "Phase");
        self.phase = phase;
    }
}

/// Whether the rewrite loop keeps going after a file
enum Step {
    Continue,
    Aborted,
}

/// Consumes one manifest on behalf of one assignment
pub struct WorkerEngine {
    config: WorkerConfig,
    state: Arc<WorkerState>,
}

impl WorkerEngine {
    pub fn new(config: WorkerConfig) -> Self {
        Self {
            config,
            state: Arc::new(WorkerState::new()),
        }
    }

    /// Shared state, exposed for tests and for pre-seeding cancellation
    pub fn state(&self) -> &Arc<WorkerState> {
        &self.state
    }

    /// Run the rewrite loop with the reporter alongside
    ///
    /// The reporter is shut down and flushes one final sample whatever way
    /// the loop ends, so the executor sees the last cumulative count even
    /// after a per-file failure.
    pub async fn run(&self) -> Result<()> {
        info!(
            worker = self.config.id,
            manifest = %self.config.manifest.display(),
            "Worker starting"
        );

        let done = CancellationToken::new();
        let reporter = tokio::spawn(reporter::run(
            Arc::clone(&self.state),
            self.config.report_interval,
            done.clone(),
        ));

        let result = self.rewrite_loop().await;

        done.cancel();
        let _ = reporter.await;

        info!(
            worker = self.config.id,
            completed = self.state.completed(),
            "Worker finished"
        );

        result
    }

    async fn rewrite_loop(&self) -> Result<()> {
        let manifest = tokio::fs::File::open(&self.config.manifest).await?;
        let mut lines = BufReader::new(manifest).lines();

        // Sequential reading matters: it guarantees per-worker ordering.
        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match self.process_file(Path::new(line)).await? {
                Step::Aborted => return Ok(()),
                Step::Continue => {}
            }

            // Graceful drain point: the file that just finished counts, but
            // no further manifest lines are taken.
            if self.state.cancel_token().is_cancelled() {
                info!(worker = self.config.id, "Cancelled, draining after completed file");
                self.remove_manifest().await;
                return Ok(());
            }
        }

        self.remove_manifest().await;
        Ok(())
    }

    /// Drive one file through the rewrite state machine
    async fn process_file(&self, source: &Path) -> std::result::Result<Step, WorkerError> {
        self.state.publish(source);

        let temp = temp_path_for(&self.config.cache_dir, self.config.id, source)?;
        let mut unit = RewriteUnit::new(source.to_path_buf(), temp);

        // Pending -> Copying
        unit.advance(RewritePhase::Copying);
        let mut copy = spawn_tool("cp", &["-p", "-f"], &unit.source, &unit.temp)?;

        enum CopyEvent {
            Exited(std::io::Result<std::process::ExitStatus>),
            Cancelled,
        }

        let event = tokio::select! {
            status = copy.wait() => CopyEvent::Exited(status),
            _ = self.state.cancel_token().cancelled() => CopyEvent::Cancelled,
        };

        match event {
            CopyEvent::Cancelled => {
                // Mid-copy cancellation: kill the copy, reclaim the temp and
                // the manifest, leave the original untouched.
                let _ = copy.start_kill();
                let _ = copy.wait().await;
                self.abort_cleanup(&unit.temp).await;
                unit.advance(RewritePhase::Aborted);
                return Ok(Step::Aborted);
            }
            CopyEvent::Exited(status) => {
                let status = status.map_err(|e| WorkerError::SpawnFailed {
                    program: "cp".to_string(),
                    source: e,
                })?;

                if !status.success() {
                    error!(path = %unit.source.display(), code = status.code(), "Copy failed");
                    return Err(WorkerError::CopyFailed {
                        path: unit.source,
                        code: status.code().unwrap_or(-1),
                    });
                }
                unit.advance(RewritePhase::Copied);
            }
        }

        // Copied-boundary poll point: the copy finished but the move has not
        // been issued, so stopping here still leaves the original unmodified.
        // Cleanup matches the mid-copy branch.
        if self.state.cancel_token().is_cancelled() {
            self.abort_cleanup(&unit.temp).await;
            unit.advance(RewritePhase::Aborted);
            return Ok(Step::Aborted);
        }

        // Copied -> Moving. The rename is the only point where the original
        // file's identity changes; once issued it is never interrupted, so
        // there is no cancellation race here.
        unit.advance(RewritePhase::Moving);
        let mut mv = spawn_tool("mv", &["-f"], &unit.temp, &unit.source)?;

        let status = mv.wait().await.map_err(|e| WorkerError::SpawnFailed {
            program: "mv".to_string(),
            source: e,
        })?;

        if !status.success() {
            error!(path = %unit.source.display(), code = status.code(), "Move failed");
            return Err(WorkerError::MoveFailed {
                path: unit.source,
                code: status.code().unwrap_or(-1),
            });
        }

        unit.advance(RewritePhase::Done);
        self.state.mark_done();
        Ok(Step::Continue)
    }

    /// Best-effort removal of the temp file and the manifest when aborting
    async fn abort_cleanup(&self, temp: &Path) {
        if let Err(e) = tokio::fs::remove_file(temp).await {
            debug!(path = %temp.display(), error = %e, "Temp file removal failed");
        }
        self.remove_manifest().await;
    }

    async fn remove_manifest(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.config.manifest).await {
            warn!(
                manifest = %self.config.manifest.display(),
                error = %e,
                "Manifest removal failed"
            );
        }
    }
}

/// Derive the temp path for a source file: `<cachedir>/.rechunk.<id>.<basename>`
fn temp_path_for(cache_dir: &Path, id: usize, source: &Path) -> std::result::Result<PathBuf, WorkerError> {
    let name = source
        .file_name()
        .ok_or_else(|| WorkerError::InvalidManifestEntry(source.to_path_buf()))?;

    let mut temp_name = std::ffi::OsString::from(format!(".rechunk.{id}."));
    temp_name.push(name);
    Ok(cache_dir.join(temp_name))
}

fn spawn_tool(
    program: &str,
    flags: &[&str],
    from: &Path,
    to: &Path,
) -> std::result::Result<Child, WorkerError> {
    Command::new(program)
        .args(flags)
        .arg(from)
        .arg(to)
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| WorkerError::SpawnFailed {
            program: program.to_string(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RechunkError;
    use std::time::Duration;

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn write_manifest(dir: &Path, paths: &[&Path]) -> PathBuf {
        let manifest = dir.join("worker.list");
        let mut body = String::new();
        for p in paths {
            body.push_str(&p.display().to_string());
            body.push('\n');
        }
        std::fs::write(&manifest, body).unwrap();
        manifest
    }

    fn engine_for(root: &Path, cache: &Path, manifest: PathBuf) -> WorkerEngine {
        WorkerEngine::new(WorkerConfig {
            root: root.to_path_buf(),
            manifest,
            cache_dir: cache.to_path_buf(),
            id: 0,
            report_interval: Duration::from_secs(1),
        })
    }

    #[test]
    fn test_temp_path_derivation() {
        let temp = temp_path_for(Path::new("/cache"), 3, Path::new("/data/big.bin")).unwrap();
        assert_eq!(temp, PathBuf::from("/cache/.rechunk.3.big.bin"));

        assert!(matches!(
            temp_path_for(Path::new("/cache"), 3, Path::new("/")),
            Err(WorkerError::InvalidManifestEntry(_))
        ));
    }

    #[tokio::test]
    async fn test_rewrite_preserves_content_and_path() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();

        let a = write_file(root.path(), "a.bin", b"alpha contents");
        let b = write_file(root.path(), "b.bin", b"beta contents");
        let manifest = write_manifest(cache.path(), &[&a, &b]);

        let engine = engine_for(root.path(), cache.path(), manifest.clone());
        engine.run().await.unwrap();

        // Round-trip through the temp file preserves bytes; the final path
        // is the original path.
        assert_eq!(std::fs::read(&a).unwrap(), b"alpha contents");
        assert_eq!(std::fs::read(&b).unwrap(), b"beta contents");
        assert_eq!(engine.state().completed(), 2);

        // Manifest deleted on normal completion; no temps left behind
        assert!(!manifest.exists());
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_preset_cancellation_leaves_original_untouched() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();

        let a = write_file(root.path(), "a.bin", b"untouched");
        let manifest = write_manifest(cache.path(), &[&a]);

        let engine = engine_for(root.path(), cache.path(), manifest.clone());
        engine.state().cancel_token().cancel();
        engine.run().await.unwrap();

        assert_eq!(std::fs::read(&a).unwrap(), b"untouched");
        assert_eq!(engine.state().completed(), 0);
        assert!(!manifest.exists());
        // The temp file no longer exists afterward
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_mid_run_cancellation_drains_and_reclaims() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();

        let files: Vec<PathBuf> = (0..10)
            .map(|i| {
                write_file(
                    root.path(),
                    &format!("file{i}.bin"),
                    format!("contents of file {i}").as_bytes(),
                )
            })
            .collect();
        let refs: Vec<&Path> = files.iter().map(|p| p.as_path()).collect();
        let manifest = write_manifest(cache.path(), &refs);

        let engine = Arc::new(engine_for(root.path(), cache.path(), manifest.clone()));

        let runner = {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.run().await })
        };

        // Cancel once the fifth file has landed; the engine may finish the
        // file in flight but must take no further manifest lines.
        while engine.state().completed() < 5 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        engine.state().cancel_token().cancel();

        runner.await.unwrap().unwrap();

        let completed = engine.state().completed();
        assert!(
            (5..10).contains(&completed),
            "drained worker completed {completed} of 10"
        );

        // Rewritten or not, every file keeps its path and bytes
        for (i, path) in files.iter().enumerate() {
            assert_eq!(
                std::fs::read(path).unwrap(),
                format!("contents of file {i}").as_bytes()
            );
        }

        // Manifest reclaimed on drain and abort alike; no temps left behind
        assert!(!manifest.exists());
        assert_eq!(std::fs::read_dir(cache.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_copy_failure_stops_worker_without_retry() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();

        let missing = root.path().join("missing.bin");
        let after = write_file(root.path(), "after.bin", b"never reached");
        let manifest = write_manifest(cache.path(), &[&missing, &after]);

        let engine = engine_for(root.path(), cache.path(), manifest.clone());
        let err = engine.run().await.unwrap_err();

        assert!(matches!(
            err,
            RechunkError::Worker(WorkerError::CopyFailed { .. })
        ));
        assert_eq!(engine.state().completed(), 0);
        // No further files were processed
        assert_eq!(std::fs::read(&after).unwrap(), b"never reached");
        // Failure is not cancellation: the manifest stays for postmortem
        assert!(manifest.exists());
    }

    #[tokio::test]
    async fn test_empty_manifest_completes_cleanly() {
        let root = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let manifest = write_manifest(cache.path(), &[]);

        let engine = engine_for(root.path(), cache.path(), manifest.clone());
        engine.run().await.unwrap();

        assert_eq!(engine.state().completed(), 0);
        assert!(!manifest.exists());
    }
}
