//! Integration tests for the liveness scheduler and probe state machine.
//!
//! Uses paused Tokio time (`start_paused = true`) so `sleep_until`
//! resolves as soon as the runtime is otherwise idle, and a minute-long
//! interval costs nothing.

use std::time::Duration;

use kestrel_liveness::{LivenessAction, LivenessConfig, LivenessScheduler, LivenessState};

// =========================================================================
// Helpers
// =========================================================================

fn config_no_jitter() -> LivenessConfig {
    LivenessConfig {
        initial_jitter: Duration::ZERO,
        ..LivenessConfig::default()
    }
}

// =========================================================================
// Check firing
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_wait_for_check_fires_after_one_interval() {
    let mut s = LivenessScheduler::new(config_no_jitter());
    let start = tokio::time::Instant::now();

    let info = s.wait_for_check().await;
    assert_eq!(info.check, 1);
    assert!(info.at.duration_since(start) >= Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_checks_increment_monotonically() {
    let mut s = LivenessScheduler::new(config_no_jitter());
    for expected in 1..=4 {
        let info = s.wait_for_check().await;
        assert_eq!(info.check, expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_jitter_delays_first_check_at_most_jitter() {
    let mut s = LivenessScheduler::new(LivenessConfig {
        initial_jitter: Duration::from_secs(5),
        ..LivenessConfig::default()
    });
    let start = tokio::time::Instant::now();
    let info = s.wait_for_check().await;
    let waited = info.at.duration_since(start);
    assert!(waited >= Duration::from_secs(60));
    assert!(waited <= Duration::from_secs(65));
}

// =========================================================================
// Integration: scheduler driving the probe state machine
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_silent_connection_is_probed_then_timed_out() {
    let config = config_no_jitter();
    let mut s = LivenessScheduler::new(config.clone());
    let mut state = LivenessState::new(&config);

    // 60s: first check probes.
    let first = s.wait_for_check().await;
    assert!(matches!(state.check(first.at), LivenessAction::Probe(_)));

    // 120s, 180s, 240s: waiting, not yet past 2 × 120s from the probe.
    for _ in 0..3 {
        let info = s.wait_for_check().await;
        assert_eq!(state.check(info.at), LivenessAction::Idle);
    }

    // 300s: 240s since the probe, still not strictly greater; 360s is.
    let info = s.wait_for_check().await;
    assert_eq!(state.check(info.at), LivenessAction::Idle);
    let info = s.wait_for_check().await;
    assert_eq!(state.check(info.at), LivenessAction::TimedOut);
}

#[tokio::test(start_paused = true)]
async fn test_answering_connection_never_times_out() {
    let config = config_no_jitter();
    let mut s = LivenessScheduler::new(config.clone());
    let mut state = LivenessState::new(&config);

    for _ in 0..20 {
        let info = s.wait_for_check().await;
        match state.check(info.at) {
            LivenessAction::Probe(cookie) => {
                assert!(state.pong(&cookie, tokio::time::Instant::now()));
            }
            LivenessAction::Idle => {}
            LivenessAction::TimedOut => panic!("answering connection timed out"),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_select_loop_pattern() {
    let mut s = LivenessScheduler::new(config_no_jitter());
    let (tx, mut rx) = tokio::sync::mpsc::channel::<&str>(1);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(190)).await;
        tx.send("closed").await.ok();
    });

    let mut fired = 0u64;
    loop {
        tokio::select! {
            Some(reason) = rx.recv() => {
                assert_eq!(reason, "closed");
                break;
            }
            info = s.wait_for_check() => {
                fired += 1;
                assert_eq!(info.check, fired);
            }
        }
    }
    assert_eq!(fired, 3, "checks at 60s, 120s and 180s");
}
