//! Core entities of the rating and wagering domain: competitors, race results,
//! betting periods, odds quotes, wagers and period rankings.

use std::fmt::{Display, Formatter};

use anyhow::bail;
use chrono::{DateTime, Utc};

use crate::rating::RatingState;

/// The largest supported field in a single race.
pub const MAX_FIELD: usize = 12;

/// Number of paying podium positions.
pub const PODIUM: usize = 3;

/// Depth of the recent-results buffer kept per competitor.
pub const RECENT_BUFFER: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct CompetitorId(pub u64);
impl Display for CompetitorId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct RaceId(pub u64);
impl Display for RaceId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "race-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct PeriodId(pub u64);
impl Display for PeriodId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "period-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct UserId(pub u64);
impl Display for UserId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "u{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct WagerId(pub u64);
impl Display for WagerId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "wager-{}", self.0)
    }
}

/// A finishing position in a race. Carries a 1-based number externally while
/// indexing 0-based internally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub struct FinishRank(usize);
impl FinishRank {
    pub fn number(number: usize) -> Self {
        Self::try_number(number).unwrap()
    }

    pub fn try_number(number: usize) -> anyhow::Result<Self> {
        if number == 0 || number > MAX_FIELD {
            bail!("invalid finishing rank {number}");
        }
        Ok(Self(number - 1))
    }

    pub fn index(index: usize) -> Self {
        Self(index)
    }

    pub fn as_index(&self) -> usize {
        self.0
    }

    pub fn as_number(&self) -> usize {
        self.0 + 1
    }
}
impl Display for FinishRank {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.as_number())
    }
}

/// A paying podium position.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum Position {
    First,
    Second,
    Third,
}
impl Position {
    pub fn as_index(&self) -> usize {
        match self {
            Position::First => 0,
            Position::Second => 1,
            Position::Third => 2,
        }
    }
}

/// The confirmed top-three finishers of a period, used to settle wagers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Podium(pub [CompetitorId; PODIUM]);
impl Podium {
    pub fn at(&self, position: Position) -> CompetitorId {
        self.0[position.as_index()]
    }

    pub fn is_distinct(&self) -> bool {
        let [a, b, c] = self.0;
        a != b && a != c && b != c
    }
}

/// One competitor's outcome in one race. Immutable once recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RaceResult {
    pub race: RaceId,
    pub competitor: CompetitorId,
    pub rank: FinishRank,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecentResult {
    pub at: DateTime<Utc>,
    pub rank: FinishRank,
}

/// A rated participant. The rating state is replaced wholesale after every
/// race; the lifetime counter only ever grows.
#[derive(Debug, Clone, PartialEq)]
pub struct Competitor {
    pub id: CompetitorId,
    pub state: RatingState,
    pub lifetime_races: u64,
    /// Most-recent-first, capped at [`RECENT_BUFFER`].
    pub recent: Vec<RecentResult>,
    pub form: f64,
    pub last_race_at: Option<DateTime<Utc>>,
}
impl Competitor {
    pub fn new(id: CompetitorId, state: RatingState) -> Self {
        Self {
            id,
            state,
            lifetime_races: 0,
            recent: Vec::with_capacity(RECENT_BUFFER),
            form: 0.0,
            last_race_at: None,
        }
    }

    pub fn record_result(&mut self, at: DateTime<Utc>, rank: FinishRank) {
        self.recent.insert(0, RecentResult { at, rank });
        self.recent.truncate(RECENT_BUFFER);
        self.lifetime_races += 1;
        self.last_race_at = Some(at);
        self.form = form_score(&self.recent);
    }
}

/// Recency-weighted form in `[0, 1]`: the most recent race carries the
/// greatest weight, and a win scores 1 while finishing last scores 1/12.
pub fn form_score(recent: &[RecentResult]) -> f64 {
    if recent.is_empty() {
        return 0.0;
    }
    let mut weighted = 0.0;
    let mut weights = 0.0;
    for (index, result) in recent.iter().enumerate() {
        let weight = (recent.len() - index) as f64;
        let score = (MAX_FIELD + 1 - result.rank.as_number()) as f64 / MAX_FIELD as f64;
        weighted += weight * score;
        weights += weight;
    }
    weighted / weights
}

/// Lifecycle state of a betting period. Transitions are monotonic, which the
/// `Ord` derivation encodes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum_macros::Display,
    strum_macros::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum PeriodStatus {
    Calibration,
    Open,
    Closed,
    Finalized,
}

/// One ISO week's wagering cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Period {
    pub id: PeriodId,
    pub year: i32,
    pub week: u32,
    pub month: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: PeriodStatus,
    pub podium: Option<Podium>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// A published price for one competitor in one period. Quotes accumulate;
/// the latest by `computed_at` is the live one.
#[derive(Debug, Clone, PartialEq)]
pub struct OddsQuote {
    pub competitor: CompetitorId,
    pub period: PeriodId,
    pub odds: [f64; PODIUM],
    pub probs: [f64; PODIUM],
    pub computed_at: DateTime<Utc>,
}
impl OddsQuote {
    pub fn odd(&self, position: Position) -> f64 {
        self.odds[position.as_index()]
    }

    pub fn prob(&self, position: Position) -> f64 {
        self.probs[position.as_index()]
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum_macros::Display,
    strum_macros::EnumIter,
    serde::Serialize,
    serde::Deserialize,
)]
pub enum WagerStatus {
    Pending,
    Won,
    Lost,
    Cancelled,
}

/// Outcome of a single pick, written exactly once by settlement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PickOutcome {
    pub correct: bool,
    pub points: f64,
    /// The odd the pick was paid at (the better of bet-time and close-time).
    pub final_odd: f64,
    /// Whether best-odds-guaranteed lifted the payout above the bet-time odd.
    pub bog: bool,
}

/// One of the three selections comprising a wager.
#[derive(Debug, Clone, PartialEq)]
pub struct Pick {
    pub competitor: CompetitorId,
    pub position: Position,
    pub odds_at_bet: f64,
    pub boosted: bool,
    pub outcome: Option<PickOutcome>,
}

/// A user's wager for one period. At most one per (user, period); mutated
/// exactly once, by settlement.
#[derive(Debug, Clone, PartialEq)]
pub struct Wager {
    pub id: WagerId,
    pub user: UserId,
    pub period: PeriodId,
    pub placed_at: DateTime<Utc>,
    pub picks: [Pick; PODIUM],
    pub settled: bool,
    pub status: WagerStatus,
    pub points: f64,
}
impl Wager {
    pub fn boosted_pick(&self) -> Option<&Pick> {
        self.picks.iter().find(|pick| pick.boosted)
    }
}

/// A user's accumulated standing for one calendar month.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodRanking {
    pub user: UserId,
    pub month: u32,
    pub year: i32,
    pub points: f64,
    pub wagers_placed: u32,
    pub wagers_won: u32,
    pub perfect_count: u32,
    pub boosts_used: u32,
    pub rank: Option<u32>,
}
impl PeriodRanking {
    pub fn new(user: UserId, month: u32, year: i32) -> Self {
        Self {
            user,
            month,
            year,
            points: 0.0,
            wagers_placed: 0,
            wagers_won: 0,
            perfect_count: 0,
            boosts_used: 0,
            rank: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::*;
    use chrono::TimeZone;

    #[test]
    fn rank_number_index_duality() {
        let rank = FinishRank::number(1);
        assert_eq!(0, rank.as_index());
        assert_eq!(1, rank.as_number());
        assert_eq!(rank, FinishRank::index(0));
        assert_eq!("p1", format!("{rank}"));
    }

    #[test]
    fn rank_bounds() {
        assert!(FinishRank::try_number(0).is_err());
        assert!(FinishRank::try_number(MAX_FIELD + 1).is_err());
        assert!(FinishRank::try_number(MAX_FIELD).is_ok());
    }

    #[test]
    fn form_of_empty_buffer() {
        assert_eq!(0.0, form_score(&[]));
    }

    #[test]
    fn form_weights_recent_races_heavier() {
        let at = Utc.with_ymd_and_hms(2023, 10, 2, 12, 0, 0).unwrap();
        let win_then_last = [
            RecentResult { at, rank: FinishRank::number(1) },
            RecentResult { at, rank: FinishRank::number(12) },
        ];
        let last_then_win = [
            RecentResult { at, rank: FinishRank::number(12) },
            RecentResult { at, rank: FinishRank::number(1) },
        ];
        assert!(form_score(&win_then_last) > form_score(&last_then_win));
        // weights 2:1 over scores 1 and 1/12
        assert_float_absolute_eq!(
            (2.0 * 1.0 + 1.0 / 12.0) / 3.0,
            form_score(&win_then_last),
            1e-9
        );
    }

    #[test]
    fn record_result_caps_buffer() {
        let at = Utc.with_ymd_and_hms(2023, 10, 2, 12, 0, 0).unwrap();
        let mut competitor = Competitor::new(CompetitorId(1), RatingState::default());
        for number in 1..=7 {
            competitor.record_result(at, FinishRank::number(number));
        }
        assert_eq!(7, competitor.lifetime_races);
        assert_eq!(RECENT_BUFFER, competitor.recent.len());
        // most recent first: the 7th race leads the buffer
        assert_eq!(7, competitor.recent[0].rank.as_number());
        assert_eq!(Some(at), competitor.last_race_at);
    }

    #[test]
    fn podium_distinctness() {
        assert!(Podium([CompetitorId(1), CompetitorId(2), CompetitorId(3)]).is_distinct());
        assert!(!Podium([CompetitorId(1), CompetitorId(1), CompetitorId(3)]).is_distinct());
    }

    #[test]
    fn status_ordering_is_monotonic() {
        assert!(PeriodStatus::Calibration < PeriodStatus::Open);
        assert!(PeriodStatus::Open < PeriodStatus::Closed);
        assert!(PeriodStatus::Closed < PeriodStatus::Finalized);
    }
}
