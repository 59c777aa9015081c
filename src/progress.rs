//! Progress accounting and display
//!
//! Coordinator-side progress state shared by all executors, the periodic
//! aggregator task that renders it with an indicatif bar, and the wire-level
//! progress message exchanged with workers.

use crate::executor::{WorkerOutcome, WorkerReport};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Global rewrite progress, shared by every executor and the aggregator
///
/// `completed` is monotonically non-decreasing; `total` is fixed at
/// discovery time. A single mutex guards both so executor deltas and
/// aggregator reads never tear.
#[derive(Debug)]
pub struct GlobalProgress {
    counts: Mutex<Counts>,
}

#[derive(Debug, Clone, Copy)]
struct Counts {
    completed: u64,
    total: u64,
}

impl GlobalProgress {
    /// Create progress state for a run over `total` files
    pub fn new(total: u64) -> Self {
        Self {
            counts: Mutex::new(Counts {
                completed: 0,
                total,
            }),
        }
    }

    /// Add a positive delta of newly completed files
    ///
    /// Zero deltas are accepted and do nothing, so callers can pass the
    /// result of a saturating subtraction unconditionally.
    pub fn add(&self, delta: u64) {
        if delta > 0 {
            self.counts.lock().completed += delta;
        }
    }

    /// Read (completed, total)
    pub fn snapshot(&self) -> (u64, u64) {
        let counts = self.counts.lock();
        (counts.completed, counts.total)
    }
}

/// One line of the worker progress wire protocol: `<count>,<path>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressMessage {
    /// Cumulative files fully rewritten by the worker
    pub cumulative_count: u64,

    /// File most recently published by the worker
    pub current_path: String,
}

impl ProgressMessage {
    /// Parse a wire line; returns None for malformed input
    ///
    /// Only the first comma separates count from path, so paths containing
    /// commas survive.
    pub fn parse(line: &str) -> Option<Self> {
        let (count, path) = line.split_once(',')?;
        let cumulative_count = count.trim().parse::<u64>().ok()?;

        Some(Self {
            cumulative_count,
            current_path: path.trim_end().to_string(),
        })
    }

    /// Format as a wire line (without the trailing newline)
    pub fn to_wire(&self) -> String {
        format!("{},{}", self.cumulative_count, self.current_path)
    }
}

/// Periodic task rendering global progress on a fixed cadence
///
/// Read-only over the shared state and tolerant of stale reads; the final
/// authoritative read happens after all executors have joined, when the
/// coordinator cancels the token and `run` paints the last position.
pub struct Aggregator {
    progress: Arc<GlobalProgress>,
    interval: Duration,
    bar: ProgressBar,
}

impl Aggregator {
    /// Create an aggregator over shared progress state
    pub fn new(progress: Arc<GlobalProgress>, interval: Duration) -> Self {
        let (_, total) = progress.snapshot();
        let bar = ProgressBar::new(total);

        bar.set_style(
            ProgressStyle::default_bar()
                .template("Rechunking [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files")
                .expect("Invalid progress template")
                .progress_chars("=>-"),
        );

        Self {
            progress,
            interval,
            bar,
        }
    }

    /// Run until cancelled, then paint the final position
    pub async fn run(self, stop: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                _ = ticker.tick() => {
                    let (completed, _) = self.progress.snapshot();
                    self.bar.set_position(completed);
                }
            }
        }

        let (completed, _) = self.progress.snapshot();
        self.bar.set_position(completed);
        self.bar.finish();
    }
}

/// Print a header at the start of a run
pub fn print_header(root: &str, nodes: usize, workers: usize, cache_dir: &str) {
    println!();
    println!(
        "{} {}",
        style("rechunk").cyan().bold(),
        env!("CARGO_PKG_VERSION")
    );
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Path:").bold(), root);
    println!("  {} {}", style("Nodes:").bold(), nodes);
    println!("  {} {}", style("Workers:").bold(), workers);
    println!("  {} {}", style("Cache:").bold(), cache_dir);
    println!();
}

/// Print a summary of the run results
pub fn print_summary(
    completed: u64,
    total: u64,
    total_bytes: u64,
    duration: Duration,
    reports: &[WorkerReport],
) {
    let failed = reports
        .iter()
        .filter(|r| r.outcome != WorkerOutcome::Completed)
        .count();

    println!();
    if failed == 0 && completed == total {
        println!("{}", style("Rechunk Complete").green().bold());
    } else {
        println!("{}", style("Rechunk Incomplete").yellow().bold());
    }
    println!("{}", style("─".repeat(50)).dim());
    println!(
        "  {} {}/{}",
        style("Files:").bold(),
        format_number(completed),
        format_number(total)
    );
    println!(
        "  {} {}",
        style("Total Size:").bold(),
        format_size(total_bytes, BINARY)
    );
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        duration.as_secs_f64()
    );

    for report in reports {
        let status = match report.outcome {
            WorkerOutcome::Completed => style("completed").green(),
            WorkerOutcome::Partial => style("partial").yellow(),
            WorkerOutcome::LaunchFailed => style("launch failed").red(),
        };
        println!(
            "  {} {} ({}): {} files, {}",
            style("Worker").bold(),
            report.id,
            report.host,
            format_number(report.completed),
            status
        );
    }
    println!();
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_progress_message() {
        let msg = ProgressMessage::parse("5,/data/big.bin\n").unwrap();
        assert_eq!(msg.cumulative_count, 5);
        assert_eq!(msg.current_path, "/data/big.bin");

        // Only the first comma splits; commas in paths survive
        let msg = ProgressMessage::parse("12,/data/a,b.bin").unwrap();
        assert_eq!(msg.cumulative_count, 12);
        assert_eq!(msg.current_path, "/data/a,b.bin");
    }

    #[test]
    fn test_parse_malformed_lines() {
        assert!(ProgressMessage::parse("").is_none());
        assert!(ProgressMessage::parse("no comma here").is_none());
        assert!(ProgressMessage::parse("x,/data/f").is_none());
        assert!(ProgressMessage::parse("-3,/data/f").is_none());
        assert!(ProgressMessage::parse("3.5,/data/f").is_none());
    }

    #[test]
    fn test_wire_round_trip() {
        let msg = ProgressMessage {
            cumulative_count: 42,
            current_path: "/data/big.bin".to_string(),
        };
        assert_eq!(ProgressMessage::parse(&msg.to_wire()).unwrap(), msg);
    }

    #[test]
    fn test_global_progress_monotone() {
        let progress = GlobalProgress::new(10);
        assert_eq!(progress.snapshot(), (0, 10));

        progress.add(3);
        progress.add(0);
        progress.add(2);
        assert_eq!(progress.snapshot(), (5, 10));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }
}
