//! Summary-tick: one daily report per calendar date.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::{guarded, Orchestrator};
use crate::error::{MonitorError, TickError};
use crate::models::{AvailabilityStatus, SummaryStats};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum SummaryOutcome {
    /// Refused during shutdown
    Skipped,
    /// The summary for this date was already delivered; nothing was sent
    AlreadySent { date: NaiveDate },
    Sent { date: NaiveDate, message_id: String },
    /// Not delivered; the date stays unmarked so the next invocation retries
    Failed { date: NaiveDate, error: TickError },
}

impl SummaryOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, SummaryOutcome::Sent { .. })
    }
}

impl Orchestrator {
    /// Summary-tick for today's local date.
    pub fn summary_tick(&self) -> SummaryOutcome {
        self.summary_tick_for(Local::now().date_naive())
    }

    /// Whether the scheduler should fire a summary-tick at `now`.
    pub fn summary_due(&self, now: DateTime<Local>) -> bool {
        now.time() >= self.config.summary_time
            && self.state.read().summary_pending_for(now.date_naive())
    }

    /// Send the summary for `date` unless it was already sent.
    pub fn summary_tick_for(&self, date: NaiveDate) -> SummaryOutcome {
        let Some(_in_flight) = self.begin("summary-tick") else {
            return SummaryOutcome::Skipped;
        };
        let _serial = self
            .summary_lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        if !self.state.read().summary_pending_for(date) {
            tracing::debug!(%date, "daily summary already sent");
            return SummaryOutcome::AlreadySent { date };
        }

        let stats = match self.summary_stats(date) {
            Ok(stats) => stats,
            Err(err) => return self.summary_failed(date, err),
        };

        let sent = self
            .breaker
            .execute(|| guarded("notifier", || self.notifier.send_summary(&stats)));

        match sent {
            Ok(receipt) => {
                self.state.update(|s| s.summary_sent(date));
                tracing::info!(
                    %date,
                    total_checks = stats.total_checks,
                    message_id = %receipt.message_id,
                    "daily summary delivered"
                );
                self.write_status_snapshot();
                SummaryOutcome::Sent {
                    date,
                    message_id: receipt.message_id,
                }
            }
            Err(err) => self.summary_failed(date, err),
        }
    }

    fn summary_failed(&self, date: NaiveDate, err: MonitorError) -> SummaryOutcome {
        if !matches!(err, MonitorError::CircuitOpen { .. }) {
            self.state.update(|s| s.error_recorded(Utc::now()));
        }
        tracing::warn!(
            %date,
            category = %err.kind(),
            error = %err,
            "daily summary not delivered, will retry on next tick"
        );
        SummaryOutcome::Failed {
            date,
            error: TickError::from(&err),
        }
    }

    /// Statistics over the check records of local calendar day `date`.
    pub fn summary_stats(&self, date: NaiveDate) -> Result<SummaryStats, MonitorError> {
        let start = local_day_start(date);
        let end = date.succ_opt().map(local_day_start);

        let records: Vec<_> = self
            .check_log
            .get_since(start)?
            .into_iter()
            .filter(|r| end.map_or(true, |end| r.timestamp < end))
            .collect();

        let count = |status: AvailabilityStatus| {
            records.iter().filter(|r| r.status == status).count()
        };
        let state = self.state.read();

        Ok(SummaryStats {
            target: self.config.target.clone(),
            date,
            total_checks: records.len(),
            available_checks: count(AvailabilityStatus::Available),
            unavailable_checks: count(AvailabilityStatus::Unavailable),
            failed_checks: records.iter().filter(|r| r.error.is_some()).count(),
            last_status: state.last_observed_status,
            last_check_at: state.last_check_timestamp,
            pending_alerts: self.queue.len(),
        })
    }
}

/// Local midnight of `date` in UTC. Falls back to UTC midnight if local
/// midnight does not exist (DST gap).
fn local_day_start(date: NaiveDate) -> DateTime<Utc> {
    let midnight = date.and_time(chrono::NaiveTime::MIN);
    Local
        .from_local_datetime(&midnight)
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&midnight))
}
