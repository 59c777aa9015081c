//! Worker-side progress reporter
//!
//! Samples the shared worker state on a fixed cadence and writes one
//! `<count>,<path>` line per sample to stdout, flushed immediately. This is
//! lossy by design: only the latest position per interval goes out, so the
//! executor's delta accounting must tolerate skipped increments.
//!
//! stdout is the transport channel back to the coordinator. A failed write
//! or flush means the peer closed the channel, which is the worker's stop
//! signal: the cancellation token is set and the reporter exits.

use crate::worker::WorkerState;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Run until `done` is cancelled, then flush one final sample
///
/// The final sample is what carries the completed count to the executor
/// when the rewrite loop finishes between reporter ticks.
pub async fn run(state: Arc<WorkerState>, interval: Duration, done: CancellationToken) {
    let mut out = tokio::io::stdout();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = done.cancelled() => {
                // Best-effort: the channel may already be broken.
                let _ = emit(&mut out, &state).await;
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = emit(&mut out, &state).await {
                    debug!(error = %e, "Output channel broken, requesting cancellation");
                    state.cancel_token().cancel();
                    return;
                }
            }
        }
    }
}

/// Write the current sample, if any, and flush
async fn emit(out: &mut Stdout, state: &WorkerState) -> std::io::Result<()> {
    let Some(msg) = state.sample() else {
        return Ok(());
    };

    out.write_all(format!("{}\n", msg.to_wire()).as_bytes())
        .await?;
    out.flush().await
}
