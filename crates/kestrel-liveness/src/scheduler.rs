//! Fixed-period check scheduler.

use rand::Rng;
use tokio::time::{self, Instant};
use tracing::{debug, trace};

use crate::LivenessConfig;

/// Information about a fired check, returned by
/// [`LivenessScheduler::wait_for_check`].
#[derive(Debug, Clone, Copy)]
pub struct CheckInfo {
    /// Monotonically increasing check number (starts at 1).
    pub check: u64,
    /// When the check fired. Feed this to [`LivenessState::check`](crate::LivenessState::check).
    pub at: Instant,
}

/// Recurring liveness timer for a single connection.
///
/// Replaces "sleep, check, reschedule myself" with one owned value that
/// the connection's liveness task awaits in a loop. Dropping the task
/// (connection torn down) cancels the schedule.
pub struct LivenessScheduler {
    config: LivenessConfig,
    check_count: u64,
    next_check: Instant,
}

impl LivenessScheduler {
    /// Create a new scheduler from config.
    ///
    /// The first check is scheduled one interval out plus jitter.
    pub fn new(config: LivenessConfig) -> Self {
        let config = config.validated();

        let jitter_ms = config.initial_jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            std::time::Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        } else {
            std::time::Duration::ZERO
        };
        let next_check = Instant::now() + config.check_interval + jitter;

        debug!(
            interval_ms = config.check_interval.as_millis() as u64,
            timeout_ms = config.timeout.as_millis() as u64,
            "liveness scheduler created"
        );

        Self {
            config,
            check_count: 0,
            next_check,
        }
    }

    /// Wait until the next check is due. Cancel-safe, so it can sit in a
    /// `tokio::select!` next to other branches.
    pub async fn wait_for_check(&mut self) -> CheckInfo {
        time::sleep_until(self.next_check).await;

        let now = Instant::now();
        self.check_count += 1;
        // Always schedule from now, never from a missed deadline.
        self.next_check = now + self.config.check_interval;

        trace!(check = self.check_count, "liveness check fired");
        CheckInfo {
            check: self.check_count,
            at: now,
        }
    }
}
