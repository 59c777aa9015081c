//! Integration tests for rechunk
//!
//! Discovery and partitioning run against synthetic roots built with
//! tempfile (sparse files stand in for large ones). The end-to-end test
//! drives the real binary through the LocalTransport, exercising the
//! manifest, worker, progress-wire and cleanup paths together.

use rechunk::config::CoordinatorConfig;
use rechunk::coordinator::Coordinator;
use rechunk::executor::WorkerOutcome;
use rechunk::manifest::{build_manifests, MIN_FILE_SIZE};
use rechunk::transport::LocalTransport;
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

fn sparse_file(dir: &Path, name: &str, len: u64) -> PathBuf {
    let path = dir.join(name);
    let f = File::create(&path).unwrap();
    f.set_len(len).unwrap();
    path
}

#[test]
fn test_partition_scenario_100_eligible_2_workers() {
    let root = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();

    let mut eligible = HashSet::new();
    for i in 0..100 {
        let p = sparse_file(root.path(), &format!("big{i:03}.bin"), MIN_FILE_SIZE + 1);
        eligible.insert(p.display().to_string());
    }
    let mut small = HashSet::new();
    for i in 0..5 {
        let p = sparse_file(root.path(), &format!("small{i}.bin"), 4096);
        small.insert(p.display().to_string());
    }

    let nodes = vec!["node1".to_string(), "node2".to_string()];
    let set = build_manifests(root.path(), &nodes, 1, cache.path()).unwrap();

    // Exactly 2 manifests whose line counts sum to 100
    assert_eq!(set.assignments.len(), 2);
    assert_eq!(set.total_files, 100);
    assert_eq!(
        set.assignments.iter().map(|a| a.assigned_count).sum::<u64>(),
        100
    );

    // Union (as a set) is exactly the 100 eligible files; small files
    // appear in neither manifest
    let mut union = HashSet::new();
    for assignment in &set.assignments {
        let contents = std::fs::read_to_string(&assignment.manifest_path).unwrap();
        for line in contents.lines() {
            assert!(union.insert(line.to_string()), "path in two manifests: {line}");
            assert!(!small.contains(line), "small file assigned: {line}");
        }
    }
    assert_eq!(union, eligible);
}

fn coordinator_config(root: &Path, cache: &Path, nodes: Vec<String>) -> CoordinatorConfig {
    CoordinatorConfig {
        root: root.to_path_buf(),
        nodes,
        interval: Duration::from_secs(1),
        cache_dir: cache.to_path_buf(),
        multiplier: 1,
        max_concurrent: None,
        ssh_command: "ssh".to_string(),
        remote_exe: PathBuf::from(env!("CARGO_BIN_EXE_rechunk")),
        show_progress: false,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_end_to_end_local_run() {
    let root = tempfile::tempdir().unwrap();
    let cache_dir = root.path().join(".rechunk");

    let mut sizes = Vec::new();
    for i in 0..3 {
        let len = MIN_FILE_SIZE + 1 + i;
        let p = sparse_file(root.path(), &format!("big{i}.bin"), len);
        sizes.push((p, len));
    }
    sparse_file(root.path(), "small.bin", 1024);

    let config = coordinator_config(root.path(), &cache_dir, vec!["localhost".to_string()]);
    let coordinator = Coordinator::with_transport(config, Arc::new(LocalTransport));

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.completed, 3);
    assert_eq!(summary.reports.len(), 1);
    assert_eq!(summary.reports[0].outcome, WorkerOutcome::Completed);
    assert_eq!(summary.reports[0].completed, 3);

    // Every file is back at its original path with its original length
    for (path, len) in &sizes {
        assert_eq!(path.metadata().unwrap().len(), *len);
    }

    // The working directory was emptied and removed
    assert!(!cache_dir.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_end_to_end_multiple_workers() {
    let root = tempfile::tempdir().unwrap();
    let cache_dir = root.path().join(".rechunk");

    for i in 0..8 {
        sparse_file(root.path(), &format!("big{i}.bin"), MIN_FILE_SIZE + 1);
    }

    // Two worker slots; LocalTransport ignores the host names
    let config = coordinator_config(
        root.path(),
        &cache_dir,
        vec!["node1".to_string(), "node2".to_string()],
    );
    let coordinator = Coordinator::with_transport(config, Arc::new(LocalTransport));

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.total_files, 8);
    assert_eq!(summary.completed, 8);
    assert_eq!(summary.reports.len(), 2);
    for report in &summary.reports {
        assert_eq!(report.outcome, WorkerOutcome::Completed);
    }
    assert_eq!(
        summary.reports.iter().map(|r| r.completed).sum::<u64>(),
        8
    );
    assert!(!cache_dir.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_end_to_end_empty_root() {
    let root = tempfile::tempdir().unwrap();
    let cache_dir = root.path().join(".rechunk");
    sparse_file(root.path(), "small.bin", 1024);

    let config = coordinator_config(root.path(), &cache_dir, vec!["localhost".to_string()]);
    let coordinator = Coordinator::with_transport(config, Arc::new(LocalTransport));

    let summary = coordinator.run().await.unwrap();

    // No eligible files: the lone worker gets an empty manifest and
    // completes with nothing to do
    assert_eq!(summary.total_files, 0);
    assert_eq!(summary.completed, 0);
    assert_eq!(summary.reports[0].outcome, WorkerOutcome::Completed);
    assert!(!cache_dir.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_launch_failure_does_not_abort_run() {
    let root = tempfile::tempdir().unwrap();
    let cache_dir = root.path().join(".rechunk");
    sparse_file(root.path(), "big.bin", MIN_FILE_SIZE + 1);

    // Point at a binary that does not exist: every launch fails, but the
    // run itself still completes with per-worker statuses
    let mut config = coordinator_config(root.path(), &cache_dir, vec!["localhost".to_string()]);
    config.remote_exe = PathBuf::from("/no/such/rechunk");
    let coordinator = Coordinator::with_transport(config, Arc::new(LocalTransport));

    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.completed, 0);
    assert_eq!(summary.reports[0].outcome, WorkerOutcome::LaunchFailed);
    // Manifests were never consumed, but reclaim still removes them
    assert!(!cache_dir.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_non_empty_cache_dir_aborts_before_workers() {
    let root = tempfile::tempdir().unwrap();
    let cache_dir = root.path().join(".rechunk");
    std::fs::create_dir(&cache_dir).unwrap();
    std::fs::write(cache_dir.join("stale"), b"previous run").unwrap();

    let config = coordinator_config(root.path(), &cache_dir, vec!["localhost".to_string()]);
    let coordinator = Coordinator::with_transport(config, Arc::new(LocalTransport));

    let err = coordinator.run().await.unwrap_err();
    assert!(matches!(err, rechunk::RechunkError::Cache(_)));

    // The pre-existing directory is left alone
    assert!(cache_dir.join("stale").exists());
}
