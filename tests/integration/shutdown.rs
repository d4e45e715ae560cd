//! Graceful shutdown and the scheduler runtime

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use watchkeep::models::AvailabilityStatus::Available;
use watchkeep::orchestrator::{Runtime, ShutdownSignal};

use super::helpers::{wait_until, FakeNotifier, Harness, ScriptedChecker};

#[test]
fn test_shutdown_waits_for_in_flight_tick() {
    let h = Harness::new(
        ScriptedChecker::steady(Available).with_delay(Duration::from_millis(200)),
        FakeNotifier::new(),
    );

    let tick = {
        let orchestrator = Arc::clone(&h.orchestrator);
        thread::spawn(move || orchestrator.check_tick())
    };
    assert!(wait_until(Duration::from_secs(2), || h.orchestrator.in_flight() == 1));

    assert!(h.orchestrator.shutdown(Duration::from_secs(5)));
    let outcome = tick.join().unwrap();
    assert!(outcome.success);
    assert!(!h.orchestrator.state().read().in_progress);

    // New ticks are refused once shutdown has begun
    let refused = h.orchestrator.check_tick();
    assert!(refused.skipped);
    assert!(refused.errors.is_empty());
    assert_eq!(h.checker.calls(), 1);
    assert!(h.orchestrator.run_maintenance().is_none());
}

#[test]
fn test_shutdown_reports_elapsed_grace() {
    let h = Harness::new(
        ScriptedChecker::steady(Available).with_delay(Duration::from_millis(400)),
        FakeNotifier::new(),
    );

    let tick = {
        let orchestrator = Arc::clone(&h.orchestrator);
        thread::spawn(move || orchestrator.check_tick())
    };
    assert!(wait_until(Duration::from_secs(2), || h.orchestrator.in_flight() == 1));

    assert!(!h.orchestrator.shutdown(Duration::from_millis(20)));
    tick.join().unwrap();
    assert_eq!(h.orchestrator.in_flight(), 0);
}

#[test]
fn test_runtime_runs_loops_and_stops() {
    let h = Harness::new(ScriptedChecker::steady(Available), FakeNotifier::new());
    let signal = Arc::new(ShutdownSignal::new());

    let runtime = Runtime::start(Arc::clone(&h.orchestrator), Arc::clone(&signal)).unwrap();

    // The check loop ticks and the maintenance loop runs probes right away
    assert!(wait_until(Duration::from_secs(5), || h.checker.calls() >= 1));
    assert!(wait_until(Duration::from_secs(5), || h
        .orchestrator
        .health()
        .last_report()
        .is_some()));

    assert!(runtime.shutdown(Duration::from_secs(5)));
    assert!(signal.is_triggered());
    assert!(!h.orchestrator.is_accepting());
    assert_eq!(h.orchestrator.in_flight(), 0);
}
