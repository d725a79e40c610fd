//! Decides which competitors may be quoted. Rules are checked in a fixed
//! order (calibration first, recent activity second) so the reported reason
//! is always the first unmet requirement.

use anyhow::bail;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EligibilityConfig {
    /// Lifetime races required before a competitor leaves calibration.
    pub min_lifetime_races: u64,
    /// Races required within the trailing activity window.
    pub min_recent_races: usize,
    pub recent_window_days: i64,
    /// Optional extra rule: require at least one race inside the current
    /// betting period. Off by default.
    pub require_period_race: bool,
}
impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            min_lifetime_races: 5,
            min_recent_races: 1,
            recent_window_days: 14,
            require_period_race: false,
        }
    }
}
impl EligibilityConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.recent_window_days <= 0 {
            bail!("recent window must span at least one day");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
pub enum EligibilityReason {
    Eligible,
    /// Lifetime races below the calibration threshold.
    Calibrating,
    /// Too few races within the trailing activity window.
    Inactive,
    /// No race inside the current period (only with `require_period_race`).
    NoPeriodRace,
}

/// The verdict plus the counts it was based on, for transparency.
#[derive(Debug, Clone, PartialEq)]
pub struct Eligibility {
    pub eligible: bool,
    pub reason: EligibilityReason,
    pub lifetime_races: u64,
    pub recent_races: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EligibilityFilter {
    config: EligibilityConfig,
}
impl EligibilityFilter {
    pub fn new(config: EligibilityConfig) -> Self {
        Self { config }
    }

    pub fn assess(
        &self,
        lifetime_races: u64,
        recent_race_dates: &[DateTime<Utc>],
        period_races: usize,
        now: DateTime<Utc>,
    ) -> Eligibility {
        let window_start = now - Duration::days(self.config.recent_window_days);
        let recent_races = recent_race_dates
            .iter()
            .filter(|&&at| at >= window_start && at <= now)
            .count();

        let reason = if lifetime_races < self.config.min_lifetime_races {
            EligibilityReason::Calibrating
        } else if recent_races < self.config.min_recent_races {
            EligibilityReason::Inactive
        } else if self.config.require_period_race && period_races == 0 {
            EligibilityReason::NoPeriodRace
        } else {
            EligibilityReason::Eligible
        };

        Eligibility {
            eligible: reason == EligibilityReason::Eligible,
            reason,
            lifetime_races,
            recent_races,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 20, 12, 0, 0).unwrap()
    }

    fn days_ago(days: i64) -> DateTime<Utc> {
        now() - Duration::days(days)
    }

    #[test]
    fn calibrating_regardless_of_activity() {
        let filter = EligibilityFilter::default();
        let dates = vec![days_ago(1), days_ago(2), days_ago(3), days_ago(4)];
        let verdict = filter.assess(4, &dates, 4, now());
        assert!(!verdict.eligible);
        assert_eq!(EligibilityReason::Calibrating, verdict.reason);
        assert_eq!(4, verdict.lifetime_races);
        assert_eq!(4, verdict.recent_races);
    }

    #[test]
    fn inactive_when_window_is_empty() {
        let filter = EligibilityFilter::default();
        let dates = vec![days_ago(20), days_ago(30)];
        let verdict = filter.assess(10, &dates, 0, now());
        assert!(!verdict.eligible);
        assert_eq!(EligibilityReason::Inactive, verdict.reason);
        assert_eq!(0, verdict.recent_races);
    }

    #[test]
    fn eligible_with_both_thresholds_met() {
        let filter = EligibilityFilter::default();
        let verdict = filter.assess(5, &[days_ago(13)], 0, now());
        assert!(verdict.eligible);
        assert_eq!(EligibilityReason::Eligible, verdict.reason);
    }

    #[test]
    fn window_boundary_is_inclusive() {
        let filter = EligibilityFilter::default();
        let verdict = filter.assess(5, &[days_ago(14)], 0, now());
        assert!(verdict.eligible);
    }

    #[test]
    fn future_dates_do_not_count() {
        let filter = EligibilityFilter::default();
        let verdict = filter.assess(5, &[now() + Duration::days(1)], 0, now());
        assert_eq!(EligibilityReason::Inactive, verdict.reason);
    }

    #[test]
    fn period_rule_only_when_enabled() {
        let relaxed = EligibilityFilter::default();
        assert!(relaxed.assess(5, &[days_ago(1)], 0, now()).eligible);

        let strict = EligibilityFilter::new(EligibilityConfig {
            require_period_race: true,
            ..EligibilityConfig::default()
        });
        let verdict = strict.assess(5, &[days_ago(1)], 0, now());
        assert!(!verdict.eligible);
        assert_eq!(EligibilityReason::NoPeriodRace, verdict.reason);
        assert!(strict.assess(5, &[days_ago(1)], 1, now()).eligible);
    }
}
