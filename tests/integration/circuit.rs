//! Notifier circuit breaker as seen through the check-tick

use watchkeep::error::{ErrorKind, MonitorError};
use watchkeep::models::AvailabilityStatus::{Available, Unavailable};
use watchkeep::resilience::CircuitState;

use super::helpers::{FakeNotifier, Harness, ScriptedChecker};

/// Alternate Unavailable/Available so every second tick is alert-eligible.
fn flapping(transitions: usize) -> ScriptedChecker {
    let script = (0..transitions).flat_map(|_| [Ok(Unavailable), Ok(Available)]);
    ScriptedChecker::new(script, Available)
}

#[test]
fn test_five_notifier_failures_open_circuit_then_fail_fast() {
    let h = Harness::new(
        flapping(6),
        FakeNotifier::failing(MonitorError::notify("smtp relay down")),
    );

    for expected_calls in 1..=5 {
        h.orchestrator.check_tick();
        let outcome = h.orchestrator.check_tick();
        assert!(outcome.was_blocked);
        assert_eq!(outcome.errors[0].kind, ErrorKind::Notify);
        assert_eq!(h.notifier.alert_calls(), expected_calls);
    }
    assert_eq!(h.orchestrator.breaker().state(), CircuitState::Open);

    h.orchestrator.check_tick();
    let blocked = h.orchestrator.check_tick();
    assert!(blocked.was_blocked);
    assert!(!blocked.alert_sent);
    assert_eq!(blocked.errors[0].kind, ErrorKind::CircuitOpen);
    assert_eq!(h.notifier.alert_calls(), 5, "open circuit must not reach the notifier");

    // Nothing was discarded: every undelivered alert is waiting in the queue
    assert_eq!(h.orchestrator.queue().len(), 6);
}

#[test]
fn test_circuit_status_in_report() {
    let h = Harness::new(
        flapping(5),
        FakeNotifier::failing(MonitorError::notify("timeout")),
    );
    for _ in 0..10 {
        h.orchestrator.check_tick();
    }

    let status = h.orchestrator.status();
    assert_eq!(status.circuit.state, CircuitState::Open);
    assert!(status.circuit.next_attempt_at.is_some());
    assert_eq!(status.queue.depth, 5);
}

#[test]
fn test_success_after_failures_keeps_circuit_closed() {
    let h = Harness::new(flapping(5), FakeNotifier::failing(MonitorError::notify("flaky")));

    for _ in 0..4 {
        h.orchestrator.check_tick();
        h.orchestrator.check_tick();
    }
    h.notifier.recover();
    h.orchestrator.check_tick();
    assert!(h.orchestrator.check_tick().alert_sent);

    let status = h.orchestrator.breaker().status();
    assert_eq!(status.state, CircuitState::Closed);
    assert_eq!(status.failure_count, 0);
}
