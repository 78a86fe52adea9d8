//! Fixed-delay scheduling.
//!
//! The delay is measured from the end of one run to the start of the next,
//! so a job never overlaps itself however long a run takes.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

/// When a scheduled job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    /// Wait before the first run.
    pub initial_delay: Duration,
    /// Wait after each run completes.
    pub fixed_delay: Duration,
}

impl Schedule {
    pub fn from_millis(initial_delay_ms: u64, fixed_delay_ms: u64) -> Self {
        Self {
            initial_delay: Duration::from_millis(initial_delay_ms),
            fixed_delay: Duration::from_millis(fixed_delay_ms),
        }
    }
}

/// Run `job` on a fixed-delay schedule until `shutdown` flips to `true`
/// (or its sender is dropped).
///
/// A shutdown during a run abandons the in-flight run.
pub async fn run_fixed_delay<F, Fut>(
    name: &'static str,
    schedule: Schedule,
    mut shutdown: watch::Receiver<bool>,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    tracing::info!(
        job = name,
        initial_delay_ms = schedule.initial_delay.as_millis() as u64,
        fixed_delay_ms = schedule.fixed_delay.as_millis() as u64,
        "scheduled job started"
    );

    if sleep_or_shutdown(schedule.initial_delay, &mut shutdown).await {
        tracing::info!(job = name, "scheduled job stopped");
        return;
    }

    loop {
        tokio::select! {
            _ = job() => {}
            _ = wait_for_shutdown(&mut shutdown) => {
                tracing::info!(job = name, "scheduled job stopped mid-run");
                return;
            }
        }

        if sleep_or_shutdown(schedule.fixed_delay, &mut shutdown).await {
            tracing::info!(job = name, "scheduled job stopped");
            return;
        }
    }
}

/// Sleep for `delay`. Returns `true` if shutdown was requested instead.
async fn sleep_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if *shutdown.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = wait_for_shutdown(shutdown) => true,
    }
}

/// Resolves once shutdown is requested or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
