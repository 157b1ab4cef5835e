//! Connection liveness for Kestrel.
//!
//! Two pieces, kept apart so each can be tested on its own:
//!
//! - [`LivenessState`]: the PING/PONG probe state machine for one
//!   connection. Pure: it is handed the current time and answers with a
//!   [`LivenessAction`] (do nothing, send a probe, or give up).
//! - [`LivenessScheduler`]: the fixed-period timer that decides *when*
//!   the state machine is consulted. One per connection, started with a
//!   little random jitter so connections accepted in the same instant
//!   don't all probe in the same instant.
//!
//! # Integration
//!
//! The scheduler sits inside a per-connection task that runs beside the
//! read loop:
//!
//! ```ignore
//! let mut scheduler = LivenessScheduler::new(config.clone());
//! loop {
//!     let check = scheduler.wait_for_check().await;
//!     match state.lock().check(check.at) {
//!         LivenessAction::Idle => {}
//!         LivenessAction::Probe(cookie) => send(format!("PING :{cookie}")),
//!         LivenessAction::TimedOut => { disconnect("Ping timeout"); break; }
//!     }
//! }
//! ```

use std::time::Duration;

use tracing::warn;

mod probe;
mod scheduler;

pub use probe::{generate_cookie, LivenessAction, LivenessState, COOKIE_LEN};
pub use scheduler::{CheckInfo, LivenessScheduler};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Full configuration for liveness checking.
#[derive(Debug, Clone)]
pub struct LivenessConfig {
    /// How often the probe state machine is consulted. Default: 60 s.
    pub check_interval: Duration,
    /// How long a connection may stay silent before it is probed.
    /// An unanswered probe is fatal after twice this. Default: 120 s.
    pub timeout: Duration,
    /// Probe on the very first check even if the timeout hasn't elapsed.
    pub require_pong: bool,
    /// Random jitter (0–max) added to the *first* check.
    pub initial_jitter: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            timeout: Duration::from_secs(120),
            require_pong: false,
            initial_jitter: Duration::from_secs(5),
        }
    }
}

impl LivenessConfig {
    /// Shortest accepted check interval / timeout.
    pub const MIN_PERIOD: Duration = Duration::from_millis(10);

    /// Clamp any out-of-range values so the config is safe to use.
    ///
    /// Called automatically by [`LivenessScheduler::new`] and
    /// [`LivenessState::new`]. A zero interval would spin the check task.
    pub fn validated(mut self) -> Self {
        if self.check_interval < Self::MIN_PERIOD {
            warn!(
                interval_ms = self.check_interval.as_millis() as u64,
                "liveness check interval too short, clamping"
            );
            self.check_interval = Self::MIN_PERIOD;
        }
        if self.timeout < Self::MIN_PERIOD {
            warn!(
                timeout_ms = self.timeout.as_millis() as u64,
                "liveness timeout too short, clamping"
            );
            self.timeout = Self::MIN_PERIOD;
        }
        self
    }
}
