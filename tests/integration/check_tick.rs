//! Check-tick state machine: alerts on transitions, state updates, lock release

use std::time::Duration;

use watchkeep::error::{ErrorKind, MonitorError};
use watchkeep::models::AvailabilityStatus::{Available, Unavailable, Unknown};

use super::helpers::{FakeNotifier, Harness, Options, ScriptedChecker};

#[test]
fn test_unavailable_to_available_sends_exactly_one_alert() {
    let h = Harness::new(
        ScriptedChecker::new([Ok(Unavailable), Ok(Available)], Available),
        FakeNotifier::new(),
    );

    let first = h.orchestrator.check_tick();
    assert!(first.success);
    assert!(!first.alert_sent);
    assert_eq!(h.notifier.alert_calls(), 0);

    let second = h.orchestrator.check_tick();
    assert!(second.success);
    assert!(second.alert_sent);
    assert!(!second.was_blocked);
    assert_eq!(second.previous_status, Some(Unavailable));
    assert_eq!(second.observed_status, Some(Available));
    assert_eq!(h.notifier.alert_calls(), 1);

    let delivered = h.notifier.delivered();
    assert_eq!(delivered[0].previous_status, Unavailable);
    assert_eq!(delivered[0].new_status, Available);
}

#[test]
fn test_available_to_available_sends_nothing() {
    let h = Harness::new(ScriptedChecker::steady(Available), FakeNotifier::new());

    // First observation alerts by default
    assert!(h.orchestrator.check_tick().alert_sent);
    assert_eq!(h.notifier.alert_calls(), 1);

    for _ in 0..3 {
        let outcome = h.orchestrator.check_tick();
        assert!(outcome.success);
        assert!(!outcome.alert_sent);
    }
    assert_eq!(h.notifier.alert_calls(), 1);
}

#[test]
fn test_first_check_policy_is_configurable() {
    let h = Harness::build(
        ScriptedChecker::steady(Available),
        FakeNotifier::new(),
        Options {
            alert_on_first_check: false,
            ..Options::default()
        },
    );

    let outcome = h.orchestrator.check_tick();
    assert_eq!(outcome.previous_status, Some(Unknown));
    assert!(!outcome.alert_sent);
    assert_eq!(h.notifier.alert_calls(), 0);
}

#[test]
fn test_available_to_unavailable_does_not_alert() {
    let h = Harness::build(
        ScriptedChecker::new([Ok(Available), Ok(Unavailable)], Unavailable),
        FakeNotifier::new(),
        Options {
            alert_on_first_check: false,
            ..Options::default()
        },
    );

    h.orchestrator.check_tick();
    let outcome = h.orchestrator.check_tick();
    assert_eq!(outcome.observed_status, Some(Unavailable));
    assert!(!outcome.alert_sent);
    assert_eq!(h.notifier.alert_calls(), 0);
}

#[test]
fn test_failed_check_keeps_status_and_counts_error() {
    let network = || Err(MonitorError::Network("connection reset".into()));
    let h = Harness::new(
        ScriptedChecker::new([Ok(Unavailable), network(), network(), network()], Available),
        FakeNotifier::new(),
    );

    h.orchestrator.check_tick();
    let outcome = h.orchestrator.check_tick();

    assert!(!outcome.success);
    assert!(!outcome.skipped);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].kind, ErrorKind::Network);
    assert!(outcome.errors[0].message.contains("3 attempts"));
    assert_eq!(h.checker.calls(), 4);

    let state = h.orchestrator.state().read();
    assert_eq!(state.last_observed_status, Unavailable);
    assert_eq!(state.consecutive_failure_count, 1);
    assert_eq!(state.error_count, 1);
    assert!(state.last_error_timestamp.is_some());

    let records = h.orchestrator.check_log().get_all().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].status, Unknown);
    assert!(records[1].error.is_some());

    // Recovery resets the consecutive count and alerts on the transition
    let recovered = h.orchestrator.check_tick();
    assert!(recovered.alert_sent);
    assert_eq!(h.orchestrator.state().read().consecutive_failure_count, 0);
}

#[test]
fn test_retry_succeeds_within_attempts() {
    let h = Harness::new(
        ScriptedChecker::new(
            [Err(MonitorError::Timeout("slow".into())), Ok(Unavailable)],
            Unavailable,
        ),
        FakeNotifier::new(),
    );

    let outcome = h.orchestrator.check_tick();
    assert!(outcome.success);
    assert!(outcome.errors.is_empty());
    assert_eq!(h.checker.calls(), 2);
}

#[test]
fn test_validation_error_is_not_retried() {
    let h = Harness::new(
        ScriptedChecker::new([Err(MonitorError::Validation("bad target".into()))], Available),
        FakeNotifier::new(),
    );

    let outcome = h.orchestrator.check_tick();
    assert!(!outcome.success);
    assert_eq!(outcome.errors[0].kind, ErrorKind::Validation);
    assert_eq!(h.checker.calls(), 1);
}

#[test]
fn test_in_progress_cleared_after_every_tick() {
    let h = Harness::new(
        ScriptedChecker::new(
            [
                Ok(Available),
                Err(MonitorError::Validation("bad".into())),
                Err(MonitorError::Network("down".into())),
            ],
            Available,
        ),
        FakeNotifier::new(),
    );

    for _ in 0..3 {
        h.orchestrator.check_tick();
        assert!(!h.orchestrator.state().read().in_progress);
        assert!(!h.orchestrator.state().is_locked());
    }
}

#[test]
fn test_in_progress_cleared_after_checker_panic() {
    let h = Harness::new(
        ScriptedChecker::steady(Available).panicking("checker bug"),
        FakeNotifier::new(),
    );

    let outcome = h.orchestrator.check_tick();
    assert!(!outcome.success);
    assert!(outcome.errors[0].message.contains("checker bug"));
    assert_eq!(h.checker.calls(), 1);
    assert!(!h.orchestrator.state().read().in_progress);
    assert!(!h.orchestrator.state().is_locked());
}

#[test]
fn test_lock_timeout_skips_tick() {
    let h = Harness::new(ScriptedChecker::steady(Available), FakeNotifier::new());

    let held = h.orchestrator.state().acquire_lock(Duration::from_millis(10)).unwrap();
    let outcome = h.orchestrator.check_tick();
    drop(held);

    assert!(outcome.skipped);
    assert!(!outcome.success);
    assert_eq!(outcome.errors[0].kind, ErrorKind::LockTimeout);
    assert_eq!(h.checker.calls(), 0);

    let status = h.orchestrator.status();
    assert_eq!(status.skipped_ticks, 1);
    assert_eq!(status.state.error_count, 0);

    assert!(h.orchestrator.check_tick().success);
    assert_eq!(h.orchestrator.status().skipped_ticks, 1);
}

#[test]
fn test_state_and_status_snapshot_persisted() {
    let h = Harness::new(ScriptedChecker::steady(Unavailable), FakeNotifier::new());
    h.orchestrator.check_tick();

    let reopened =
        watchkeep::store::StateStore::open(&h.dir.path().join("state.json")).unwrap();
    assert_eq!(reopened.read().last_observed_status, Unavailable);

    let snapshot =
        watchkeep::orchestrator::StatusReport::load(&h.dir.path().join("status.json"))
            .unwrap()
            .unwrap();
    assert_eq!(snapshot.state.last_observed_status, Unavailable);
    assert!(!snapshot.state.in_progress);
}
