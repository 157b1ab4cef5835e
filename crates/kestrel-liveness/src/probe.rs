//! The PING/PONG probe state machine.
//!
//! ```text
//!            check(): silent > timeout         pong(cookie) matches
//!   Idle ─────────────────────────────→ Waiting ───────────────────→ Idle
//!                                          │
//!                                          │ check(): waiting > 2 × timeout
//!                                          ▼
//!                                       TimedOut
//! ```
//!
//! `last_seen` is stamped both when a probe goes out and when a matching
//! answer comes back, so the 2 × timeout deadline is measured from the
//! probe.

use rand::distr::Alphanumeric;
use rand::Rng;
use tokio::time::Instant;

use crate::LivenessConfig;

/// Length of a randomly generated probe cookie.
pub const COOKIE_LEN: usize = 7;

/// What the owner of a [`LivenessState`] should do after a check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessAction {
    /// Nothing to do.
    Idle,
    /// Send `PING :<cookie>`.
    Probe(String),
    /// The outstanding probe went unanswered for too long; disconnect.
    TimedOut,
}

/// Probe bookkeeping for one connection.
#[derive(Debug, Clone)]
pub struct LivenessState {
    timeout: std::time::Duration,
    require_pong: bool,
    /// Last probe sent or matching answer received. `None` until the
    /// first probe.
    last_seen: Option<Instant>,
    cookie: String,
    /// Peers are probed with a fixed cookie (their SID).
    fixed_cookie: bool,
    waiting: bool,
}

impl LivenessState {
    /// Creates a state that generates a fresh random cookie per probe.
    pub fn new(config: &LivenessConfig) -> Self {
        let config = config.clone().validated();
        Self {
            timeout: config.timeout,
            require_pong: config.require_pong,
            last_seen: None,
            cookie: String::new(),
            fixed_cookie: false,
            waiting: false,
        }
    }

    /// Creates a state that always probes with `cookie`.
    pub fn with_fixed_cookie(config: &LivenessConfig, cookie: impl Into<String>) -> Self {
        Self {
            cookie: cookie.into(),
            fixed_cookie: true,
            ..Self::new(config)
        }
    }

    /// Advances the state machine to `now`.
    pub fn check(&mut self, now: Instant) -> LivenessAction {
        let never_probed = self.last_seen.is_none();
        let silent_too_long = self
            .last_seen
            .is_none_or(|seen| now.saturating_duration_since(seen) > self.timeout);

        if (self.require_pong && never_probed) || (silent_too_long && !self.waiting) {
            if !self.fixed_cookie {
                self.cookie = generate_cookie();
            }
            self.last_seen = Some(now);
            self.waiting = true;
            return LivenessAction::Probe(self.cookie.clone());
        }

        if let Some(seen) = self.last_seen {
            if self.waiting && now.saturating_duration_since(seen) > self.timeout * 2 {
                return LivenessAction::TimedOut;
            }
        }
        LivenessAction::Idle
    }

    /// Records an answer. Returns `true` if `cookie` matched the
    /// outstanding probe; anything else leaves the state untouched.
    pub fn pong(&mut self, cookie: &str, now: Instant) -> bool {
        if self.cookie.is_empty() || self.cookie != cookie {
            return false;
        }
        self.waiting = false;
        self.last_seen = Some(now);
        true
    }

    /// Whether a probe is outstanding.
    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// The cookie of the most recent probe (empty before the first one
    /// for random-cookie states).
    pub fn cookie(&self) -> &str {
        &self.cookie
    }
}

/// Generates a random alphanumeric probe cookie.
pub fn generate_cookie() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(COOKIE_LEN)
        .map(char::from)
        .collect()
}

// =========================================================================
// Tests
// =========================================================================
