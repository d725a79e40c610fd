//! The weekly calendar state machine. One period per ISO week, created by a
//! scheduled boundary job; transitions only ever move forward
//! (Calibration/Open → Closed → Finalized), and every transition is surfaced
//! as an event for downstream collaborators.

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Period, PeriodId, PeriodStatus, Podium};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("{0} is already finalized")]
    AlreadyFinalized(PeriodId),

    #[error("{period} is {status}; finalization requires a closed period")]
    NotClosed { period: PeriodId, status: PeriodStatus },

    #[error("podium must name three distinct competitors")]
    IndistinctPodium,

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// A lifecycle transition surfaced to downstream collaborators. `from` is
/// `None` when the period was just created.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodTransition {
    pub period: PeriodId,
    pub from: Option<PeriodStatus>,
    pub to: PeriodStatus,
    pub at: DateTime<Utc>,
}

pub struct WeekLifecycle<'a, S: Store> {
    store: &'a S,
}
impl<'a, S: Store> WeekLifecycle<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Returns the period covering `now`'s ISO week, creating it if the
    /// boundary job has not run yet. A new period starts in `Calibration`
    /// when its Monday falls within the first 7 days of the month, or when no
    /// period has ever existed; otherwise it opens immediately. Creating an
    /// open period force-closes any stale one, keeping at most one open.
    pub fn ensure_period(
        &self,
        now: DateTime<Utc>,
    ) -> Result<(Period, Vec<PeriodTransition>), LifecycleError> {
        let week = now.iso_week();
        if let Some(period) = self.store.period_for_week(week.year(), week.week()) {
            return Ok((period, vec![]));
        }

        let monday = now.date_naive() - Duration::days(now.weekday().num_days_from_monday() as i64);
        let start = Utc.from_utc_datetime(&monday.and_time(NaiveTime::MIN));
        let end = start + Duration::days(7);

        let mut transitions = vec![];
        let status = if monday.day() <= 7 || !self.store.has_periods() {
            PeriodStatus::Calibration
        } else {
            PeriodStatus::Open
        };
        if status == PeriodStatus::Open {
            for stale in self.store.open_periods() {
                warn!("force-closing stale {} for week {}/{}", stale.id, stale.year, stale.week);
                transitions.push(self.transition(stale, PeriodStatus::Closed, now)?);
            }
        }

        let period = Period {
            id: self.store.allocate_period_id(),
            year: week.year(),
            week: week.week(),
            month: monday.month(),
            start,
            end,
            status,
            podium: None,
            finalized_at: None,
        };
        self.store.insert_period(period.clone());
        info!(
            "created {} for week {}/{} in {status}",
            period.id, period.year, period.week
        );
        transitions.push(PeriodTransition {
            period: period.id,
            from: None,
            to: status,
            at: now,
        });
        Ok((period, transitions))
    }

    /// Closes an open period. Idempotent: closing a period that is no longer
    /// open warns and changes nothing.
    pub fn close(
        &self,
        period_id: PeriodId,
        now: DateTime<Utc>,
    ) -> Result<Option<PeriodTransition>, LifecycleError> {
        let period = self.store.period(period_id)?;
        if period.status != PeriodStatus::Open {
            warn!("{period_id} is {}; close is a no-op", period.status);
            return Ok(None);
        }
        Ok(Some(self.transition(period, PeriodStatus::Closed, now)?))
    }

    /// Confirms the podium and finalizes the period. Terminal: a second
    /// attempt is rejected.
    pub fn finalize(
        &self,
        period_id: PeriodId,
        podium: Podium,
        now: DateTime<Utc>,
    ) -> Result<PeriodTransition, LifecycleError> {
        let mut period = self.store.period(period_id)?;
        if period.status == PeriodStatus::Finalized {
            return Err(LifecycleError::AlreadyFinalized(period_id));
        }
        if period.status != PeriodStatus::Closed {
            return Err(LifecycleError::NotClosed {
                period: period_id,
                status: period.status,
            });
        }
        if !podium.is_distinct() {
            return Err(LifecycleError::IndistinctPodium);
        }
        period.podium = Some(podium);
        period.finalized_at = Some(now);
        Ok(self.transition(period, PeriodStatus::Finalized, now)?)
    }

    fn transition(
        &self,
        mut period: Period,
        to: PeriodStatus,
        at: DateTime<Utc>,
    ) -> Result<PeriodTransition, StoreError> {
        let from = period.status;
        period.status = to;
        self.store.update_period(period.clone())?;
        info!("{} transitioned {from} → {to}", period.id);
        Ok(PeriodTransition {
            period: period.id,
            from: Some(from),
            to,
            at,
        })
    }
}

/// Quotes may be recomputed any time before a period closes.
pub fn quotes_frozen(period: &Period) -> bool {
    period.status >= PeriodStatus::Closed
}
