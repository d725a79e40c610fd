//! Accepts wagers against the live odds snapshot. Every placement invariant
//! is checked synchronously and a rejection names the first violated
//! precondition; the (user, period) uniqueness is ultimately the store's
//! constraint, so concurrent duplicates lose the race inside the store.

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::domain::{
    CompetitorId, PeriodId, PeriodStatus, Pick, Position, UserId, Wager, WagerStatus, PODIUM,
};
use crate::settle::ScoringConfig;
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum PlacementError {
    #[error("{period} is {status}, not open for wagers")]
    PeriodNotOpen { period: PeriodId, status: PeriodStatus },

    #[error("a wager already exists for {user} in {period}")]
    DuplicateWager { user: UserId, period: PeriodId },

    #[error("expected 3 picks, got {actual}")]
    WrongPickCount { actual: usize },

    #[error("position {0} selected more than once")]
    DuplicatePosition(Position),

    #[error("competitor {0} selected more than once")]
    DuplicateCompetitor(CompetitorId),

    #[error("at most one pick may be boosted")]
    MultipleBoosts,

    #[error("{user} has no boost left for month {month}")]
    BoostExhausted { user: UserId, month: u32 },

    #[error("no live quote for {competitor} in {period}")]
    MissingQuote { competitor: CompetitorId, period: PeriodId },

    #[error("unknown competitor {0}")]
    UnknownCompetitor(CompetitorId),

    #[error("unknown period {0}")]
    UnknownPeriod(PeriodId),

    #[error("store failure: {0}")]
    Store(StoreError),
}

/// A pick as requested by the user; the odds are captured at placement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickRequest {
    pub competitor: CompetitorId,
    pub position: Position,
    pub boosted: bool,
}

pub struct WagerLedger<'a, S: Store> {
    store: &'a S,
    config: ScoringConfig,
}
impl<'a, S: Store> WagerLedger<'a, S> {
    pub fn new(store: &'a S, config: ScoringConfig) -> Self {
        Self { store, config }
    }

    /// Places a wager for `user` in `period`, capturing each pick's live odd
    /// at placement time. Nothing is persisted on rejection.
    pub fn place(
        &self,
        user: UserId,
        period_id: PeriodId,
        picks: &[PickRequest],
        now: DateTime<Utc>,
    ) -> Result<Wager, PlacementError> {
        let period = self.store.period(period_id).map_err(|error| match error {
            StoreError::UnknownPeriod(id) => PlacementError::UnknownPeriod(id),
            other => PlacementError::Store(other),
        })?;
        if period.status != PeriodStatus::Open {
            return Err(PlacementError::PeriodNotOpen {
                period: period_id,
                status: period.status,
            });
        }

        if picks.len() != PODIUM {
            return Err(PlacementError::WrongPickCount { actual: picks.len() });
        }
        for (index, pick) in picks.iter().enumerate() {
            for earlier in &picks[..index] {
                if earlier.position == pick.position {
                    return Err(PlacementError::DuplicatePosition(pick.position));
                }
                if earlier.competitor == pick.competitor {
                    return Err(PlacementError::DuplicateCompetitor(pick.competitor));
                }
            }
        }

        let boosts = picks.iter().filter(|pick| pick.boosted).count();
        if boosts > 1 {
            return Err(PlacementError::MultipleBoosts);
        }
        if boosts == 1 {
            let used = self
                .store
                .boosted_wagers_in_month(user, now.month(), now.year());
            if used >= self.config.monthly_boost_limit {
                return Err(PlacementError::BoostExhausted { user, month: now.month() });
            }
        }

        let mut captured = Vec::with_capacity(PODIUM);
        for request in picks {
            self.store
                .competitor(request.competitor)
                .map_err(|_| PlacementError::UnknownCompetitor(request.competitor))?;
            let quote = self
                .store
                .live_quote(request.competitor, period_id)
                .ok_or(PlacementError::MissingQuote {
                    competitor: request.competitor,
                    period: period_id,
                })?;
            captured.push(Pick {
                competitor: request.competitor,
                position: request.position,
                odds_at_bet: quote.odd(request.position),
                boosted: request.boosted,
                outcome: None,
            });
        }
        let picks: [Pick; PODIUM] = captured
            .try_into()
            .map_err(|rejected: Vec<Pick>| PlacementError::WrongPickCount {
                actual: rejected.len(),
            })?;

        let wager = Wager {
            id: self.store.allocate_wager_id(),
            user,
            period: period_id,
            placed_at: now,
            picks,
            settled: false,
            status: WagerStatus::Pending,
            points: 0.0,
        };
        self.store.insert_wager(wager.clone()).map_err(|error| match error {
            StoreError::DuplicateWager { user, period } => {
                PlacementError::DuplicateWager { user, period }
            }
            other => PlacementError::Store(other),
        })?;
        debug!("accepted {} for {user} in {period_id}", wager.id);
        Ok(wager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{OddsQuote, Period};
    use crate::store::MemStore;
    use crate::testing::seed_competitors;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 20, 12, 0, 0).unwrap()
    }

    fn open_period(store: &MemStore) -> PeriodId {
        let id = store.allocate_period_id();
        store.insert_period(Period {
            id,
            year: 2023,
            week: 42,
            month: 10,
            start: now() - chrono::Duration::days(4),
            end: now() + chrono::Duration::days(3),
            status: PeriodStatus::Open,
            podium: None,
            finalized_at: None,
        });
        id
    }

    fn quote_all(store: &MemStore, period: PeriodId, competitors: u64) {
        for competitor in 1..=competitors {
            store.insert_quote(OddsQuote {
                competitor: CompetitorId(competitor),
                period,
                odds: [2.0 + competitor as f64, 3.0, 4.0],
                probs: [0.3, 0.3, 0.3],
                computed_at: now(),
            });
        }
    }

    fn requests(boost_first: bool) -> Vec<PickRequest> {
        vec![
            PickRequest {
                competitor: CompetitorId(1),
                position: Position::First,
                boosted: boost_first,
            },
            PickRequest {
                competitor: CompetitorId(2),
                position: Position::Second,
                boosted: false,
            },
            PickRequest {
                competitor: CompetitorId(3),
                position: Position::Third,
                boosted: false,
            },
        ]
    }

    #[test]
    fn placement_captures_live_odds() {
        let store = MemStore::default();
        seed_competitors(&store, 3);
        let period = open_period(&store);
        quote_all(&store, period, 3);
        let ledger = WagerLedger::new(&store, ScoringConfig::default());
        let wager = ledger.place(UserId(1), period, &requests(false), now()).unwrap();
        assert_eq!(3.0, wager.picks[0].odds_at_bet); // first-position odd of c1
        assert_eq!(3.0, wager.picks[1].odds_at_bet); // second-position odd of c2
        assert_eq!(WagerStatus::Pending, wager.status);
        assert!(!wager.settled);
    }

    #[test]
    fn closed_period_rejects() {
        let store = MemStore::default();
        seed_competitors(&store, 3);
        let period = open_period(&store);
        let mut closed = store.period(period).unwrap();
        closed.status = PeriodStatus::Closed;
        store.update_period(closed).unwrap();
        let ledger = WagerLedger::new(&store, ScoringConfig::default());
        let error = ledger.place(UserId(1), period, &requests(false), now()).unwrap_err();
        assert!(matches!(error, PlacementError::PeriodNotOpen { .. }));
    }

    #[test]
    fn calibration_period_rejects() {
        let store = MemStore::default();
        seed_competitors(&store, 3);
        let period = open_period(&store);
        let mut calibration = store.period(period).unwrap();
        calibration.status = PeriodStatus::Calibration;
        store.update_period(calibration).unwrap();
        let ledger = WagerLedger::new(&store, ScoringConfig::default());
        assert!(matches!(
            ledger.place(UserId(1), period, &requests(false), now()),
            Err(PlacementError::PeriodNotOpen { .. })
        ));
    }

    #[test]
    fn second_wager_for_period_rejects() {
        let store = MemStore::default();
        seed_competitors(&store, 3);
        let period = open_period(&store);
        quote_all(&store, period, 3);
        let ledger = WagerLedger::new(&store, ScoringConfig::default());
        ledger.place(UserId(1), period, &requests(false), now()).unwrap();
        let error = ledger.place(UserId(1), period, &requests(false), now()).unwrap_err();
        assert!(matches!(error, PlacementError::DuplicateWager { .. }));
    }

    #[test]
    fn malformed_picks_reject() {
        let store = MemStore::default();
        seed_competitors(&store, 3);
        let period = open_period(&store);
        quote_all(&store, period, 3);
        let ledger = WagerLedger::new(&store, ScoringConfig::default());

        let two = &requests(false)[..2];
        let error = ledger.place(UserId(1), period, two, now()).unwrap_err();
        assert!(matches!(error, PlacementError::WrongPickCount { actual: 2 }));
        assert_eq!("expected 3 picks, got 2", error.to_string());

        let mut repeated_position = requests(false);
        repeated_position[2].position = Position::Second;
        assert!(matches!(
            ledger.place(UserId(1), period, &repeated_position, now()),
            Err(PlacementError::DuplicatePosition(Position::Second))
        ));

        let mut repeated_competitor = requests(false);
        repeated_competitor[2].competitor = CompetitorId(1);
        assert!(matches!(
            ledger.place(UserId(1), period, &repeated_competitor, now()),
            Err(PlacementError::DuplicateCompetitor(CompetitorId(1)))
        ));
    }

    #[test]
    fn multiple_boosts_reject() {
        let store = MemStore::default();
        seed_competitors(&store, 3);
        let period = open_period(&store);
        quote_all(&store, period, 3);
        let ledger = WagerLedger::new(&store, ScoringConfig::default());
        let mut double_boost = requests(true);
        double_boost[1].boosted = true;
        assert!(matches!(
            ledger.place(UserId(1), period, &double_boost, now()),
            Err(PlacementError::MultipleBoosts)
        ));
    }

    #[test]
    fn monthly_boost_limit_applies() {
        let store = MemStore::default();
        seed_competitors(&store, 3);
        let first_period = open_period(&store);
        quote_all(&store, first_period, 3);
        let ledger = WagerLedger::new(&store, ScoringConfig::default());
        ledger.place(UserId(1), first_period, &requests(true), now()).unwrap();

        // same month, next week
        let second_period = store.allocate_period_id();
        store.insert_period(Period {
            id: second_period,
            year: 2023,
            week: 43,
            month: 10,
            start: now() + chrono::Duration::days(3),
            end: now() + chrono::Duration::days(10),
            status: PeriodStatus::Open,
            podium: None,
            finalized_at: None,
        });
        quote_all(&store, second_period, 3);
        let error = ledger
            .place(UserId(1), second_period, &requests(true), now())
            .unwrap_err();
        assert!(matches!(error, PlacementError::BoostExhausted { .. }));

        // unboosted picks are still welcome
        ledger
            .place(UserId(1), second_period, &requests(false), now())
            .unwrap();
    }

    #[test]
    fn missing_quote_rejects() {
        let store = MemStore::default();
        seed_competitors(&store, 3);
        let period = open_period(&store);
        quote_all(&store, period, 2); // no quote for c3
        let ledger = WagerLedger::new(&store, ScoringConfig::default());
        let error = ledger.place(UserId(1), period, &requests(false), now()).unwrap_err();
        assert!(matches!(
            error,
            PlacementError::MissingQuote { competitor: CompetitorId(3), .. }
        ));
    }

    #[test]
    fn unknown_competitor_rejects() {
        let store = MemStore::default();
        seed_competitors(&store, 2); // c3 does not exist
        let period = open_period(&store);
        quote_all(&store, period, 3);
        let ledger = WagerLedger::new(&store, ScoringConfig::default());
        let error = ledger.place(UserId(1), period, &requests(false), now()).unwrap_err();
        assert!(matches!(error, PlacementError::UnknownCompetitor(CompetitorId(3))));
    }

    #[test]
    fn unknown_period_rejects() {
        let store = MemStore::default();
        let ledger = WagerLedger::new(&store, ScoringConfig::default());
        assert!(matches!(
            ledger.place(UserId(1), PeriodId(99), &requests(false), now()),
            Err(PlacementError::UnknownPeriod(PeriodId(99)))
        ));
    }
}
