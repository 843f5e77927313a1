//! Thread-side cooperative cancellation.
//!
//! The async loops use `rodlink_core::net::backoff::sleep_cancellable`; the
//! hardware threads (authorization, LEDs, LCD) need the blocking
//! equivalent.  Both chunk long waits so a shutdown request takes effect
//! within one poll interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// How often a blocking sleep re-checks the shutdown flag.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Returns `true` once the process-wide shutdown flag is set.
pub fn is_shutdown(flag: &Arc<AtomicBool>) -> bool {
    flag.load(Ordering::Relaxed)
}

/// Sleeps for `total`, waking every [`POLL_INTERVAL`] to re-check the flag.
/// Returns `false` if shutdown was requested before the full duration
/// elapsed.
pub fn sleep_interruptible(flag: &Arc<AtomicBool>, total: Duration) -> bool {
    let mut remaining = total;
    while remaining > Duration::ZERO {
        if is_shutdown(flag) {
            return false;
        }
        let step = remaining.min(POLL_INTERVAL);
        std::thread::sleep(step);
        remaining = remaining.saturating_sub(step);
    }
    !is_shutdown(flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_sleep_completes_when_not_cancelled() {
        let flag = Arc::new(AtomicBool::new(false));
        assert!(sleep_interruptible(&flag, Duration::from_millis(20)));
    }

    #[test]
    fn test_sleep_aborts_promptly_when_cancelled() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            setter.store(true, Ordering::Relaxed);
        });

        let start = Instant::now();
        let completed = sleep_interruptible(&flag, Duration::from_secs(60));
        assert!(!completed);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
