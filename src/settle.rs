//! Resolves wagers against a confirmed podium: best-odds-guaranteed payouts,
//! boost multipliers, a perfect-podium bonus, and atomic ranking increments.
//! Settlement operates only on unsettled wagers, making the whole pass
//! idempotent and each wager individually retryable.

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::{
    Period, PeriodId, PeriodStatus, PickOutcome, Podium, UserId, Wager, WagerId, WagerStatus,
};
use crate::store::{RankingDelta, Store, StoreError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Multiplier applied to a correct boosted pick.
    pub boost_multiplier: f64,
    /// Multiplier applied to the wager total when all three picks land.
    pub perfect_bonus: f64,
    /// Floor for a correct pick's payout.
    pub min_pick_points: f64,
    pub incorrect_pick_points: f64,
    /// Boosted wagers allowed per user per calendar month.
    pub monthly_boost_limit: u32,
}
impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            boost_multiplier: 2.0,
            perfect_bonus: 2.0,
            min_pick_points: 1.0,
            incorrect_pick_points: 0.0,
            monthly_boost_limit: 1,
        }
    }
}
impl ScoringConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.boost_multiplier < 1.0 {
            bail!("boost multiplier must not penalise");
        }
        if self.perfect_bonus < 1.0 {
            bail!("perfect bonus must not penalise");
        }
        if self.min_pick_points < 0.0 || self.incorrect_pick_points < 0.0 {
            bail!("point floors must be non-negative");
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("{period} is {status}; settlement requires a finalized period")]
    PeriodNotFinalized { period: PeriodId, status: PeriodStatus },

    #[error("{0} has no confirmed podium")]
    MissingPodium(PeriodId),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

/// Downstream-facing record of one wager's settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct WagerSettled {
    pub wager: WagerId,
    pub user: UserId,
    pub status: WagerStatus,
    pub points: f64,
    pub perfect: bool,
    pub picks: [PickOutcome; 3],
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SettlementSummary {
    pub settled: usize,
    pub won: usize,
    pub lost: usize,
    pub skipped: usize,
    pub total_points: f64,
    pub events: Vec<WagerSettled>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CancellationSummary {
    pub cancelled: usize,
    pub already_settled: usize,
    pub events: Vec<WagerSettled>,
}

/// Rounds at an accumulation boundary; keeps repeated float addition from
/// drifting below the displayed two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub struct SettlementEngine<'a, S: Store> {
    store: &'a S,
    config: ScoringConfig,
}
impl<'a, S: Store> SettlementEngine<'a, S> {
    pub fn new(store: &'a S, config: ScoringConfig) -> Self {
        Self { store, config }
    }

    /// Settles every unsettled wager of a finalized period, then recomputes
    /// the month's ranks in one pass. Safe to re-run: already-settled wagers
    /// are skipped, and a wager whose persistence fails is left unsettled for
    /// the next pass rather than aborting the batch.
    pub fn settle_period(&self, period_id: PeriodId) -> Result<SettlementSummary, SettlementError> {
        let period = self.store.period(period_id)?;
        if period.status != PeriodStatus::Finalized {
            return Err(SettlementError::PeriodNotFinalized {
                period: period_id,
                status: period.status,
            });
        }
        let podium = period.podium.ok_or(SettlementError::MissingPodium(period_id))?;
        let cutoff = period.finalized_at.unwrap_or(period.end);

        let mut summary = SettlementSummary::default();
        for wager in self.store.wagers_for_period(period_id) {
            if wager.settled {
                summary.skipped += 1;
                continue;
            }
            match self.settle_wager(wager, &period, &podium, cutoff) {
                Ok(event) => {
                    summary.settled += 1;
                    match event.status {
                        WagerStatus::Won => summary.won += 1,
                        _ => summary.lost += 1,
                    }
                    summary.total_points = round2(summary.total_points + event.points);
                    summary.events.push(event);
                }
                Err(error) => {
                    warn!("leaving wager unsettled in {period_id} for retry: {error}");
                }
            }
        }
        info!(
            "settled {period_id}: {} wagers ({} won, {} lost, {} previously settled)",
            summary.settled, summary.won, summary.lost, summary.skipped
        );

        self.recompute_ranks(period.month, period.year)?;
        Ok(summary)
    }

    fn settle_wager(
        &self,
        mut wager: Wager,
        period: &Period,
        podium: &Podium,
        cutoff: DateTime<Utc>,
    ) -> Result<WagerSettled, StoreError> {
        let mut outcomes = [PickOutcome {
            correct: false,
            points: 0.0,
            final_odd: 0.0,
            bog: false,
        }; 3];
        let mut total = 0.0;
        let mut correct_picks = 0;

        for (index, pick) in wager.picks.iter().enumerate() {
            let correct = pick.competitor == podium.at(pick.position);
            let mut effective_odd = pick.odds_at_bet;
            let mut bog = false;
            if let Some(closing) =
                self.store.quote_at_or_before(pick.competitor, period.id, cutoff)
            {
                let closing_odd = closing.odd(pick.position);
                if closing_odd > effective_odd {
                    effective_odd = closing_odd;
                    // an incorrect pick pays nothing either way, so the lift
                    // only counts as best-odds-guaranteed when it lands
                    bog = correct;
                }
            }

            let points = if correct {
                correct_picks += 1;
                let mut points = effective_odd;
                if pick.boosted {
                    points *= self.config.boost_multiplier;
                }
                round2(f64::max(points, self.config.min_pick_points))
            } else {
                self.config.incorrect_pick_points
            };
            outcomes[index] = PickOutcome {
                correct,
                points,
                final_odd: effective_odd,
                bog,
            };
            total = round2(total + points);
        }

        let perfect = correct_picks == wager.picks.len();
        if perfect {
            total = round2(total * self.config.perfect_bonus);
        }
        let status = if correct_picks > 0 { WagerStatus::Won } else { WagerStatus::Lost };

        for (pick, outcome) in wager.picks.iter_mut().zip(outcomes.iter()) {
            pick.outcome = Some(*outcome);
        }
        wager.settled = true;
        wager.status = status;
        wager.points = total;
        self.store.update_wager(wager.clone())?;

        self.store.apply_ranking_delta(&RankingDelta {
            user: wager.user,
            month: period.month,
            year: period.year,
            points: total,
            wagers_placed: 1,
            wagers_won: u32::from(status == WagerStatus::Won),
            perfect_count: u32::from(perfect),
            boosts_used: u32::from(wager.boosted_pick().is_some()),
        });
        debug!(
            "settled {} for {}: {status}, {total} points{}",
            wager.id,
            wager.user,
            if perfect { " (perfect podium)" } else { "" }
        );

        Ok(WagerSettled {
            wager: wager.id,
            user: wager.user,
            status,
            points: total,
            perfect,
            picks: outcomes,
        })
    }

    /// Marks every still-pending wager of a period settled with zero points
    /// and `Cancelled` status, emitting one event per voided wager. Re-entrant:
    /// the settled flag guards wagers already resolved or already cancelled.
    pub fn cancel_period(&self, period_id: PeriodId) -> Result<CancellationSummary, SettlementError> {
        let mut summary = CancellationSummary::default();
        for mut wager in self.store.wagers_for_period(period_id) {
            if wager.settled {
                summary.already_settled += 1;
                continue;
            }
            wager.settled = true;
            wager.status = WagerStatus::Cancelled;
            wager.points = 0.0;
            let mut picks = [PickOutcome {
                correct: false,
                points: 0.0,
                final_odd: 0.0,
                bog: false,
            }; 3];
            for (outcome, pick) in picks.iter_mut().zip(&wager.picks) {
                outcome.final_odd = pick.odds_at_bet;
            }
            let event = WagerSettled {
                wager: wager.id,
                user: wager.user,
                status: WagerStatus::Cancelled,
                points: 0.0,
                perfect: false,
                picks,
            };
            self.store.update_wager(wager)?;
            summary.cancelled += 1;
            summary.events.push(event);
        }
        info!(
            "cancelled {period_id}: {} wagers voided, {} untouched",
            summary.cancelled, summary.already_settled
        );
        Ok(summary)
    }

    /// Recomputes ranks for a month in one pass ordered by points descending.
    /// Ties share a rank and displace the following one (1, 2, 2, 4).
    pub fn recompute_ranks(&self, month: u32, year: i32) -> Result<(), SettlementError> {
        let mut rankings = self.store.rankings_for(month, year);
        rankings.sort_by(|a, b| b.points.total_cmp(&a.points));
        let mut last_points = f64::NAN;
        let mut last_rank = 0;
        for (index, ranking) in rankings.iter().enumerate() {
            let rank = if ranking.points == last_points {
                last_rank
            } else {
                index as u32 + 1
            };
            last_points = ranking.points;
            last_rank = rank;
            self.store.assign_rank(ranking.user, month, year, rank);
        }
        Ok(())
    }
}
