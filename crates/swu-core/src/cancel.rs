//! Cooperative cancellation for shutdown.
//!
//! A single token is cloned into the signal task; the orchestration loop
//! and the download engine check it at their suspension points (before each
//! dequeue attempt, between body chunks). Abandonment latency is bounded by
//! one chunk's transfer time or one poll tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of cancellable sleeps.
const TICK: Duration = Duration::from_millis(100);

/// Shared cancellation flag. Cancellation is a clean-shutdown signal, not a
/// failure; callers observing it short-circuit without reporting an error.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Sleeps up to `duration`, waking early on cancellation.
    /// Returns `true` if the full duration elapsed, `false` if cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep(TICK.min(deadline - now));
        }
    }
}
