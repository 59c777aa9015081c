//! Remote worker launch
//!
//! The transport is the seam over the external point-to-point process-launch
//! primitive: given a host name and a launch request, it spawns a worker
//! process whose stdout carries the progress wire protocol back to the
//! executor. Production runs use ssh; tests and single-node runs exec the
//! binary directly.

use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::{Child, Command};

/// Everything a worker invocation needs
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    /// Canonicalized rechunk root
    pub root: PathBuf,

    /// Manifest the worker consumes
    pub manifest: PathBuf,

    /// Shared cache directory
    pub cache_dir: PathBuf,

    /// Assignment id
    pub id: usize,

    /// rechunk binary path on the target host
    pub remote_exe: PathBuf,
}

impl LaunchRequest {
    /// Worker-mode argument vector, excluding the program itself
    pub fn worker_args(&self) -> Vec<String> {
        vec![
            self.root.display().to_string(),
            "--worker".to_string(),
            "--manifest".to_string(),
            self.manifest.display().to_string(),
            "--cachedir".to_string(),
            self.cache_dir.display().to_string(),
            "--id".to_string(),
            self.id.to_string(),
        ]
    }
}

/// Launches one worker process on a named host
///
/// Implementations must pipe the child's stdout (the progress channel) and
/// leave stderr inherited so worker logs surface on the coordinator's
/// terminal.
pub trait Transport: Send + Sync {
    fn launch(&self, host: &str, request: &LaunchRequest) -> std::io::Result<Child>;
}

/// Launches workers over ssh
///
/// The remote invocation travels as a single shell command line, so the
/// rechunk root, manifest and cache paths must be shell-safe (no quoting is
/// applied, matching the manifest format's no-escaping rule).
pub struct SshTransport {
    ssh_command: String,
}

impl SshTransport {
    pub fn new(ssh_command: impl Into<String>) -> Self {
        Self {
            ssh_command: ssh_command.into(),
        }
    }
}

impl Transport for SshTransport {
    fn launch(&self, host: &str, request: &LaunchRequest) -> std::io::Result<Child> {
        let mut invocation = request.remote_exe.display().to_string();
        for arg in request.worker_args() {
            invocation.push(' ');
            invocation.push_str(&arg);
        }

        Command::new(&self.ssh_command)
            .arg(host)
            .arg(invocation)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
    }
}

/// Execs the worker binary directly, ignoring the host name
///
/// Used by tests and for rechunking a locally mounted filesystem without
/// ssh round-trips.
pub struct LocalTransport;

impl Transport for LocalTransport {
    fn launch(&self, _host: &str, request: &LaunchRequest) -> std::io::Result<Child> {
        Command::new(&request.remote_exe)
            .args(request.worker_args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_args() {
        let request = LaunchRequest {
            root: PathBuf::from("/mnt/storage"),
            manifest: PathBuf::from("/mnt/storage/.rechunk/node1.0.list"),
            cache_dir: PathBuf::from("/mnt/storage/.rechunk"),
            id: 3,
            remote_exe: PathBuf::from("/usr/local/bin/rechunk"),
        };

        assert_eq!(
            request.worker_args(),
            vec![
                "/mnt/storage",
                "--worker",
                "--manifest",
                "/mnt/storage/.rechunk/node1.0.list",
                "--cachedir",
                "/mnt/storage/.rechunk",
                "--id",
                "3",
            ]
        );
    }
}
