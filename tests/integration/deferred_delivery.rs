//! Undelivered alerts go to the deferred queue and are redelivered later

use std::time::Duration;

use watchkeep::error::MonitorError;
use watchkeep::models::AvailabilityStatus::{Available, Unavailable};
use watchkeep::resilience::{CircuitBreakerConfig, DeferredQueue, QueueConfig};

use super::helpers::{FakeNotifier, Harness, Options, ScriptedChecker};

fn comes_back() -> ScriptedChecker {
    ScriptedChecker::new([Ok(Unavailable), Ok(Available)], Available)
}

#[test]
fn test_failed_alert_is_enqueued_then_drained() {
    let h = Harness::new(comes_back(), FakeNotifier::failing(MonitorError::notify("503")));

    h.orchestrator.check_tick();
    let outcome = h.orchestrator.check_tick();
    assert!(outcome.was_blocked);
    assert!(!outcome.alert_sent);
    assert_eq!(h.orchestrator.queue().len(), 1);

    h.notifier.recover();
    let report = h.orchestrator.drain_queue();
    assert_eq!(report.attempted, 1);
    assert_eq!(report.delivered, 1);
    assert!(h.orchestrator.queue().is_empty());

    let delivered = h.notifier.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].new_status, Available);

    // Delivered entries are never requeued
    let again = h.orchestrator.drain_queue();
    assert_eq!(again.attempted, 0);
    assert_eq!(h.notifier.delivered().len(), 1);
}

#[test]
fn test_drain_of_empty_queue_is_noop() {
    let h = Harness::new(ScriptedChecker::steady(Available), FakeNotifier::new());
    let report = h.orchestrator.drain_queue();
    assert_eq!(report.attempted, 0);
    assert_eq!(h.notifier.alert_calls(), 0);
}

#[test]
fn test_open_circuit_pauses_drain_without_charging_attempts() {
    let h = Harness::build(
        comes_back(),
        FakeNotifier::failing(MonitorError::notify("down")),
        Options {
            circuit: CircuitBreakerConfig {
                failure_threshold: 1,
                cooldown: Duration::from_secs(60),
            },
            ..Options::default()
        },
    );

    h.orchestrator.check_tick();
    h.orchestrator.check_tick();
    assert_eq!(h.notifier.alert_calls(), 1);

    let report = h.orchestrator.drain_queue();
    assert_eq!(report.attempted, 0);
    assert_eq!(report.deferred, 1);
    assert_eq!(h.notifier.alert_calls(), 1);
    assert_eq!(h.orchestrator.queue().entries()[0].attempt_count, 0);
}

#[test]
fn test_permanent_failure_drops_entry() {
    let h = Harness::new(
        comes_back(),
        FakeNotifier::failing(MonitorError::notify("503")),
    );
    h.orchestrator.check_tick();
    h.orchestrator.check_tick();
    assert_eq!(h.orchestrator.queue().len(), 1);

    h.notifier
        .fail_with(MonitorError::notify_permanent("recipient rejected"));
    let report = h.orchestrator.drain_queue();
    assert_eq!(report.dropped, 1);
    assert!(h.orchestrator.queue().is_empty());
    assert_eq!(h.orchestrator.status().queue.dropped_total, 1);
}

#[test]
fn test_full_queue_rejects_and_reports() {
    let h = Harness::build(
        ScriptedChecker::new(
            (0..3).flat_map(|_| [Ok(Unavailable), Ok(Available)]),
            Available,
        ),
        FakeNotifier::failing(MonitorError::notify("down")),
        Options {
            queue: QueueConfig {
                max_capacity: 2,
                base_delay: Duration::ZERO,
                ..QueueConfig::default()
            },
            ..Options::default()
        },
    );

    for _ in 0..3 {
        h.orchestrator.check_tick();
        h.orchestrator.check_tick();
    }

    assert_eq!(h.orchestrator.queue().len(), 2);
    let status = h.orchestrator.status().queue;
    assert_eq!(status.rejected_total, 1);
}

#[test]
fn test_deferred_alerts_survive_restart() {
    let h = Harness::new(comes_back(), FakeNotifier::failing(MonitorError::notify("503")));
    h.orchestrator.check_tick();
    h.orchestrator.check_tick();
    let id = h.orchestrator.queue().entries()[0].id;

    let reopened =
        DeferredQueue::open(QueueConfig::default(), &h.dir.path().join("queue.json")).unwrap();
    let entries = reopened.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, id);
    assert_eq!(entries[0].payload.previous_status, Unavailable);
}
