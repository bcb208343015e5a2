//! Bounded, sleep-based polling of observable state.
//!
//! One reusable loop shape shared by every synchronization point in the
//! harness: evaluate a predicate, sleep, repeat, give up after a fixed
//! attempt budget. Budget exhaustion is silent by design; the caller's next
//! assertion against the still-unmet state is the actual failure signal, so
//! no test-specific timeout messages live here.

use std::path::Path;
use std::time::Duration;
use tokio::time::sleep;

/// Interval between polling attempts.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Maximum number of polling attempts (a ten second ceiling at the default
/// interval).
pub const POLL_ATTEMPTS: u32 = 100;

/// Repeatedly evaluates `predicate` until it holds or the attempt budget is
/// exhausted. Returns whether the predicate was ever observed to hold.
pub async fn poll_until(
    interval: Duration,
    attempts: u32,
    mut predicate: impl FnMut() -> bool,
) -> bool {
    for _ in 0..attempts {
        if predicate() {
            return true;
        }
        sleep(interval).await;
    }
    false
}

/// Polls an external file until its content contains `marker`, with the
/// standard budget. An unreadable or missing file counts as an unmet
/// condition, not an error; children may not have created it yet.
pub async fn await_file_marker(path: &Path, marker: &str) -> bool {
    poll_until(POLL_INTERVAL, POLL_ATTEMPTS, || {
        std::fs::read_to_string(path)
            .map(|content| content.contains(marker))
            .unwrap_or(false)
    })
    .await
}
