//! Reconnect backoff schedule and cancellable waiting.
//!
//! Client boxes are expected to outlive relay restarts: when a connection
//! drops they retry with exponentially growing delays, and every wait is
//! chunked so a shutdown request takes effect within one poll interval
//! rather than after a 30-second sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often a long sleep re-checks the shutdown flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Exponential backoff schedule: `initial`, doubling per attempt, capped.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial: Duration,
    pub cap: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            cap: Duration::from_secs(30),
        }
    }
}

impl BackoffPolicy {
    /// Delay before retry number `attempt` (0-based): `initial * 2^attempt`,
    /// saturating at `cap`.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial
            .checked_mul(factor)
            .unwrap_or(self.cap)
            .min(self.cap)
    }
}

/// Sleeps for `total`, waking every [`POLL_INTERVAL`] to re-check
/// `shutdown`.  Returns `false` if the flag was set before the full
/// duration elapsed.
pub async fn sleep_cancellable(total: Duration, shutdown: &Arc<AtomicBool>) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if shutdown.load(Ordering::Relaxed) {
            return false;
        }
        let step = remaining.min(POLL_INTERVAL);
        tokio::time::sleep(step).await;
        remaining = remaining.saturating_sub(step);
    }
    !shutdown.load(Ordering::Relaxed)
}
