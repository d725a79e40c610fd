//! Persistence seam. The engines talk to a [`Store`] trait; the backing
//! technology is a collaborator concern. [`MemStore`] is the in-process
//! reference implementation used by tests and the demo binary, honouring the
//! same atomicity contract a database-backed store must provide.

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Datelike, Utc};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::domain::{
    Competitor, CompetitorId, OddsQuote, Period, PeriodId, PeriodRanking, RaceResult, UserId,
    Wager, WagerId,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a wager already exists for {user} in {period}")]
    DuplicateWager { user: UserId, period: PeriodId },

    #[error("unknown competitor {0}")]
    UnknownCompetitor(CompetitorId),

    #[error("unknown period {0}")]
    UnknownPeriod(PeriodId),

    #[error("unknown wager {0}")]
    UnknownWager(WagerId),
}

/// A single conflict-resolving increment against a user's monthly ranking
/// row. Implementations must apply it atomically: concurrent settlement of
/// two wagers for the same user must never lose an update.
#[derive(Debug, Clone, PartialEq)]
pub struct RankingDelta {
    pub user: UserId,
    pub month: u32,
    pub year: i32,
    pub points: f64,
    pub wagers_placed: u32,
    pub wagers_won: u32,
    pub perfect_count: u32,
    pub boosts_used: u32,
}

pub trait Store {
    fn upsert_competitor(&self, competitor: Competitor);
    fn competitor(&self, id: CompetitorId) -> Result<Competitor, StoreError>;
    fn competitors(&self) -> Vec<Competitor>;

    fn insert_result(&self, result: RaceResult);
    fn results_for(&self, competitor: CompetitorId) -> Vec<RaceResult>;

    fn allocate_period_id(&self) -> PeriodId;
    fn insert_period(&self, period: Period);
    fn update_period(&self, period: Period) -> Result<(), StoreError>;
    fn period(&self, id: PeriodId) -> Result<Period, StoreError>;
    fn period_for_week(&self, year: i32, week: u32) -> Option<Period>;
    fn open_periods(&self) -> Vec<Period>;
    fn has_periods(&self) -> bool;

    fn insert_quote(&self, quote: OddsQuote);
    /// The most recently computed quote for the pair, if any.
    fn live_quote(&self, competitor: CompetitorId, period: PeriodId) -> Option<OddsQuote>;
    /// The most recent quote computed at or before `at`, for best-odds
    /// settlement lookups.
    fn quote_at_or_before(
        &self,
        competitor: CompetitorId,
        period: PeriodId,
        at: DateTime<Utc>,
    ) -> Option<OddsQuote>;

    fn allocate_wager_id(&self) -> WagerId;
    /// Inserts a wager, enforcing the (user, period) uniqueness constraint at
    /// the storage layer: a conflicting insert fails with
    /// [`StoreError::DuplicateWager`] and persists nothing.
    fn insert_wager(&self, wager: Wager) -> Result<(), StoreError>;
    fn update_wager(&self, wager: Wager) -> Result<(), StoreError>;
    fn wagers_for_period(&self, period: PeriodId) -> Vec<Wager>;
    /// Wagers placed by the user in the given calendar month carrying a
    /// boosted pick.
    fn boosted_wagers_in_month(&self, user: UserId, month: u32, year: i32) -> u32;

    fn apply_ranking_delta(&self, delta: &RankingDelta);
    fn rankings_for(&self, month: u32, year: i32) -> Vec<PeriodRanking>;
    fn assign_rank(&self, user: UserId, month: u32, year: i32, rank: u32);
}

#[derive(Debug, Default)]
struct Inner {
    competitors: FxHashMap<CompetitorId, Competitor>,
    results: Vec<RaceResult>,
    periods: FxHashMap<PeriodId, Period>,
    quotes: Vec<OddsQuote>,
    wagers: FxHashMap<WagerId, Wager>,
    wagers_by_owner: FxHashMap<(UserId, PeriodId), WagerId>,
    rankings: FxHashMap<(UserId, u32, i32), PeriodRanking>,
    next_period_id: u64,
    next_wager_id: u64,
}

#[derive(Debug, Default)]
pub struct MemStore {
    inner: Mutex<Inner>,
}
impl MemStore {
    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }
}
impl Store for MemStore {
    fn upsert_competitor(&self, competitor: Competitor) {
        self.locked().competitors.insert(competitor.id, competitor);
    }

    fn competitor(&self, id: CompetitorId) -> Result<Competitor, StoreError> {
        self.locked()
            .competitors
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownCompetitor(id))
    }

    fn competitors(&self) -> Vec<Competitor> {
        self.locked().competitors.values().cloned().collect()
    }

    fn insert_result(&self, result: RaceResult) {
        self.locked().results.push(result);
    }

    fn results_for(&self, competitor: CompetitorId) -> Vec<RaceResult> {
        self.locked()
            .results
            .iter()
            .filter(|result| result.competitor == competitor)
            .cloned()
            .collect()
    }

    fn allocate_period_id(&self) -> PeriodId {
        let mut inner = self.locked();
        inner.next_period_id += 1;
        PeriodId(inner.next_period_id)
    }

    fn insert_period(&self, period: Period) {
        self.locked().periods.insert(period.id, period);
    }

    fn update_period(&self, period: Period) -> Result<(), StoreError> {
        let mut inner = self.locked();
        if !inner.periods.contains_key(&period.id) {
            return Err(StoreError::UnknownPeriod(period.id));
        }
        inner.periods.insert(period.id, period);
        Ok(())
    }

    fn period(&self, id: PeriodId) -> Result<Period, StoreError> {
        self.locked()
            .periods
            .get(&id)
            .cloned()
            .ok_or(StoreError::UnknownPeriod(id))
    }

    fn period_for_week(&self, year: i32, week: u32) -> Option<Period> {
        self.locked()
            .periods
            .values()
            .find(|period| period.year == year && period.week == week)
            .cloned()
    }

    fn open_periods(&self) -> Vec<Period> {
        self.locked()
            .periods
            .values()
            .filter(|period| period.status == crate::domain::PeriodStatus::Open)
            .cloned()
            .collect()
    }

    fn has_periods(&self) -> bool {
        !self.locked().periods.is_empty()
    }

    fn insert_quote(&self, quote: OddsQuote) {
        self.locked().quotes.push(quote);
    }

    fn live_quote(&self, competitor: CompetitorId, period: PeriodId) -> Option<OddsQuote> {
        self.locked()
            .quotes
            .iter()
            .filter(|quote| quote.competitor == competitor && quote.period == period)
            .max_by_key(|quote| quote.computed_at)
            .cloned()
    }

    fn quote_at_or_before(
        &self,
        competitor: CompetitorId,
        period: PeriodId,
        at: DateTime<Utc>,
    ) -> Option<OddsQuote> {
        self.locked()
            .quotes
            .iter()
            .filter(|quote| {
                quote.competitor == competitor
                    && quote.period == period
                    && quote.computed_at <= at
            })
            .max_by_key(|quote| quote.computed_at)
            .cloned()
    }

    fn allocate_wager_id(&self) -> WagerId {
        let mut inner = self.locked();
        inner.next_wager_id += 1;
        WagerId(inner.next_wager_id)
    }

    fn insert_wager(&self, wager: Wager) -> Result<(), StoreError> {
        let mut inner = self.locked();
        let owner = (wager.user, wager.period);
        if inner.wagers_by_owner.contains_key(&owner) {
            return Err(StoreError::DuplicateWager {
                user: wager.user,
                period: wager.period,
            });
        }
        inner.wagers_by_owner.insert(owner, wager.id);
        inner.wagers.insert(wager.id, wager);
        Ok(())
    }

    fn update_wager(&self, wager: Wager) -> Result<(), StoreError> {
        let mut inner = self.locked();
        if !inner.wagers.contains_key(&wager.id) {
            return Err(StoreError::UnknownWager(wager.id));
        }
        inner.wagers.insert(wager.id, wager);
        Ok(())
    }

    fn wagers_for_period(&self, period: PeriodId) -> Vec<Wager> {
        let mut wagers: Vec<_> = self
            .locked()
            .wagers
            .values()
            .filter(|wager| wager.period == period)
            .cloned()
            .collect();
        wagers.sort_by_key(|wager| wager.id);
        wagers
    }

    fn boosted_wagers_in_month(&self, user: UserId, month: u32, year: i32) -> u32 {
        self.locked()
            .wagers
            .values()
            .filter(|wager| {
                wager.user == user
                    && wager.placed_at.month() == month
                    && wager.placed_at.year() == year
                    && wager.boosted_pick().is_some()
            })
            .count() as u32
    }

    fn apply_ranking_delta(&self, delta: &RankingDelta) {
        let mut inner = self.locked();
        let ranking = inner
            .rankings
            .entry((delta.user, delta.month, delta.year))
            .or_insert_with(|| PeriodRanking::new(delta.user, delta.month, delta.year));
        ranking.points += delta.points;
        ranking.wagers_placed += delta.wagers_placed;
        ranking.wagers_won += delta.wagers_won;
        ranking.perfect_count += delta.perfect_count;
        ranking.boosts_used += delta.boosts_used;
    }

    fn rankings_for(&self, month: u32, year: i32) -> Vec<PeriodRanking> {
        self.locked()
            .rankings
            .values()
            .filter(|ranking| ranking.month == month && ranking.year == year)
            .cloned()
            .collect()
    }

    fn assign_rank(&self, user: UserId, month: u32, year: i32, rank: u32) {
        let mut inner = self.locked();
        if let Some(ranking) = inner.rankings.get_mut(&(user, month, year)) {
            ranking.rank = Some(rank);
        }
    }
}
