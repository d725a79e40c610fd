//! Entry points driven by result feeds and scheduled jobs: race ingestion,
//! the monthly soft reset, and the quote refresh that re-prices the current
//! period after each batch of results.

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{CompetitorId, FinishRank, Period, RaceId, RaceResult};
use crate::eligibility::EligibilityFilter;
use crate::lifecycle::quotes_frozen;
use crate::odds::OddsEngine;
use crate::rating::{self, RatingConfig};
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("competitor {0} finished more than once")]
    DuplicateFinisher(CompetitorId),

    #[error("unknown competitor {0}")]
    UnknownCompetitor(CompetitorId),

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

pub struct RaceIngestor<'a, S: Store> {
    store: &'a S,
    config: RatingConfig,
}
impl<'a, S: Store> RaceIngestor<'a, S> {
    pub fn new(store: &'a S, config: RatingConfig) -> Self {
        Self { store, config }
    }

    /// Ingests one race's finishing order: updates every participant's
    /// rating, lifetime counter, recency buffer and form, and records the
    /// immutable results. Aborts before persisting anything if any finisher
    /// is unknown or repeated.
    pub fn ingest_race(
        &self,
        race: RaceId,
        finishers: &[(CompetitorId, FinishRank)],
        at: DateTime<Utc>,
    ) -> Result<(), IngestError> {
        if finishers.is_empty() {
            warn!("{race} carried no finishers; nothing to ingest");
            return Ok(());
        }
        for (index, &(competitor, _)) in finishers.iter().enumerate() {
            if finishers[..index].iter().any(|&(earlier, _)| earlier == competitor) {
                return Err(IngestError::DuplicateFinisher(competitor));
            }
        }

        let mut competitors = Vec::with_capacity(finishers.len());
        for &(id, _) in finishers {
            let competitor = self
                .store
                .competitor(id)
                .map_err(|_| IngestError::UnknownCompetitor(id))?;
            competitors.push(competitor);
        }

        let states: Vec<_> = competitors.iter().map(|competitor| competitor.state).collect();
        let ranks: Vec<_> = finishers.iter().map(|&(_, rank)| rank).collect();
        let updated = rating::update_race(&states, &ranks, &self.config);

        for ((mut competitor, state), &(id, rank)) in
            competitors.into_iter().zip(updated).zip(finishers)
        {
            competitor.state = state;
            competitor.record_result(at, rank);
            self.store.upsert_competitor(competitor);
            self.store.insert_result(RaceResult { race, competitor: id, rank, at });
        }
        info!("ingested {race} with {} finishers", finishers.len());
        Ok(())
    }

    /// Monthly boundary job: partially regresses every rating toward the
    /// default and widens RDs. Lifetime counters and recency buffers are
    /// untouched.
    pub fn monthly_soft_reset(&self, now: DateTime<Utc>) {
        let competitors = self.store.competitors();
        for mut competitor in competitors {
            competitor.state = rating::soft_reset(&competitor.state, &self.config);
            self.store.upsert_competitor(competitor);
        }
        info!("monthly soft reset applied at {now}");
    }
}

pub struct QuoteRefresher<'a, S: Store> {
    store: &'a S,
    filter: EligibilityFilter,
    engine: OddsEngine,
}
impl<'a, S: Store> QuoteRefresher<'a, S> {
    pub fn new(store: &'a S, filter: EligibilityFilter, engine: OddsEngine) -> Self {
        Self { store, filter, engine }
    }

    /// Re-prices the period: filters the quotable field, simulates podium
    /// probabilities and appends one quote per eligible competitor. A no-op
    /// once the period has closed. Idempotent, so a failure after period
    /// creation is simply retried on the next tick.
    pub fn refresh(
        &self,
        period: &Period,
        seed: u64,
        now: DateTime<Utc>,
    ) -> Result<usize, IngestError> {
        if quotes_frozen(period) {
            warn!("{} is {}; skipping quote refresh", period.id, period.status);
            return Ok(0);
        }

        let mut field = vec![];
        let mut competitors = self.store.competitors();
        competitors.sort_by_key(|competitor| competitor.id);
        for competitor in competitors {
            let results = self.store.results_for(competitor.id);
            let dates: Vec<_> = results.iter().map(|result| result.at).collect();
            let period_races = results
                .iter()
                .filter(|result| result.at >= period.start && result.at < period.end)
                .count();
            let verdict =
                self.filter
                    .assess(competitor.lifetime_races, &dates, period_races, now);
            if verdict.eligible {
                field.push((competitor.id, competitor.state));
            }
        }

        let quotes = self.engine.compute(&field, period.id, seed, now);
        let count = quotes.len();
        for quote in quotes {
            self.store.insert_quote(quote);
        }
        info!("refreshed {count} quotes for {}", period.id);
        Ok(count)
    }
}
