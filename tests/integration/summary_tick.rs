//! Summary-tick idempotency and statistics

use chrono::Local;
use watchkeep::error::{ErrorKind, MonitorError};
use watchkeep::models::AvailabilityStatus::{Available, Unavailable};
use watchkeep::orchestrator::SummaryOutcome;

use super::helpers::{FakeNotifier, Harness, ScriptedChecker};

#[test]
fn test_second_summary_for_same_date_is_noop() {
    let h = Harness::new(ScriptedChecker::steady(Available), FakeNotifier::new());
    let today = Local::now().date_naive();

    let first = h.orchestrator.summary_tick_for(today);
    assert!(first.is_sent());
    assert_eq!(h.orchestrator.state().read().daily_summary_sent_for_date, Some(today));

    let second = h.orchestrator.summary_tick_for(today);
    assert_eq!(second, SummaryOutcome::AlreadySent { date: today });
    assert_eq!(h.notifier.summary_calls(), 1);

    // A new date sends again
    let tomorrow = today.succ_opt().unwrap();
    assert!(h.orchestrator.summary_tick_for(tomorrow).is_sent());
    assert_eq!(h.notifier.summary_calls(), 2);
}

#[test]
fn test_failed_summary_leaves_date_unmarked() {
    let h = Harness::new(
        ScriptedChecker::steady(Available),
        FakeNotifier::failing(MonitorError::notify("webhook 503")),
    );
    let today = Local::now().date_naive();

    match h.orchestrator.summary_tick_for(today) {
        SummaryOutcome::Failed { date, error } => {
            assert_eq!(date, today);
            assert_eq!(error.kind, ErrorKind::Notify);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(h.orchestrator.state().read().daily_summary_sent_for_date, None);

    h.notifier.recover();
    assert!(h.orchestrator.summary_tick_for(today).is_sent());
    assert_eq!(h.notifier.summary_calls(), 2);
}

#[test]
fn test_summary_counts_todays_checks() {
    let h = Harness::new(
        ScriptedChecker::new(
            [
                Ok(Unavailable),
                Ok(Unavailable),
                Err(MonitorError::Validation("bad response".into())),
                Ok(Available),
            ],
            Available,
        ),
        FakeNotifier::new(),
    );
    for _ in 0..4 {
        h.orchestrator.check_tick();
    }

    let today = Local::now().date_naive();
    assert!(h.orchestrator.summary_tick_for(today).is_sent());

    let stats = &h.notifier.summaries()[0];
    assert_eq!(stats.date, today);
    assert_eq!(stats.total_checks, 4);
    assert_eq!(stats.unavailable_checks, 2);
    assert_eq!(stats.available_checks, 1);
    assert_eq!(stats.failed_checks, 1);
    assert_eq!(stats.last_status, Available);
    assert_eq!(stats.pending_alerts, 0);
}

#[test]
fn test_summary_runs_alongside_held_check_lock() {
    let h = Harness::new(ScriptedChecker::steady(Available), FakeNotifier::new());
    let _held = h
        .orchestrator
        .state()
        .acquire_lock(std::time::Duration::from_millis(10))
        .unwrap();

    assert!(h.orchestrator.summary_tick().is_sent());
}
