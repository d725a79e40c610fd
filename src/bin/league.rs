//! Simulates a league season end to end: rated competitors race, quotes are
//! refreshed, users wager on the weekly podium, and finalized periods are
//! settled onto a monthly leaderboard.

use std::env;
use std::error::Error;
use std::path::PathBuf;

use anyhow::bail;
use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};
use clap::Parser;
use stanza::renderer::console::Console;
use stanza::renderer::Renderer;
use strum::IntoEnumIterator;
use tinyrand::{Rand, Seeded, StdRand};
use tracing::{debug, info, warn};

use paddock::config::EngineConfig;
use paddock::domain::{
    Competitor, CompetitorId, FinishRank, Period, PeriodId, PeriodStatus, Podium, Position,
    RaceId, UserId, MAX_FIELD, PODIUM,
};
use paddock::eligibility::EligibilityFilter;
use paddock::ingest::{QuoteRefresher, RaceIngestor};
use paddock::lifecycle::WeekLifecycle;
use paddock::mc;
use paddock::odds::{strength, OddsEngine};
use paddock::print::{tabulate_leaderboard, tabulate_quotes, tabulate_settlement};
use paddock::rating::RatingState;
use paddock::settle::SettlementEngine;
use paddock::store::{MemStore, Store};
use paddock::wager::{PickRequest, PlacementError, WagerLedger};

#[derive(Debug, clap::Parser, Clone)]
struct Args {
    /// engine configuration file (JSON); defaults apply if omitted
    #[clap(short = 'c', long)]
    config: Option<PathBuf>,

    /// number of rated competitors
    #[clap(long, default_value = "10")]
    competitors: u64,

    /// number of wagering users
    #[clap(long, default_value = "6")]
    users: u64,

    /// number of weekly periods to simulate
    #[clap(short = 'w', long, default_value = "4")]
    weeks: u32,

    /// races run per week
    #[clap(long, default_value = "3")]
    races: u32,

    /// randomness seed for race outcomes and pricing
    #[clap(short = 's', long, default_value = "42")]
    seed: u64,
}
impl Args {
    fn validate(&self) -> anyhow::Result<()> {
        if !(PODIUM as u64..=MAX_FIELD as u64).contains(&self.competitors) {
            bail!("competitors must lie between {PODIUM} and {MAX_FIELD}");
        }
        if self.users == 0 || self.weeks == 0 || self.races == 0 {
            bail!("users, weeks and races must all be positive");
        }
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    if env::var("RUST_BACKTRACE").is_err() {
        env::set_var("RUST_BACKTRACE", "full")
    }
    if env::var("RUST_LOG").is_err() {
        env::set_var("RUST_LOG", "info")
    }
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    args.validate()?;
    debug!("args: {args:?}");

    let config = match &args.config {
        Some(path) => EngineConfig::read_json_file(path)?,
        None => EngineConfig::default(),
    };
    config.validate()?;

    let store = MemStore::default();
    let seed_state = RatingState {
        rating: config.rating.default_rating,
        rd: config.rating.default_rd,
        volatility: config.rating.default_volatility,
    };
    for id in 1..=args.competitors {
        store.upsert_competitor(Competitor::new(CompetitorId(id), seed_state));
    }

    let ingestor = RaceIngestor::new(&store, config.rating.clone());
    let refresher = QuoteRefresher::new(
        &store,
        EligibilityFilter::new(config.eligibility.clone()),
        OddsEngine::new(config.odds.clone()),
    );
    let ledger = WagerLedger::new(&store, config.scoring.clone());
    let settler = SettlementEngine::new(&store, config.scoring.clone());
    let lifecycle = WeekLifecycle::new(&store);
    let mut rand = StdRand::seed(args.seed);

    // 2025-03-10 is a Monday past the first week of its month, so only the
    // first-ever period calibrates
    let season_start = Utc.with_ymd_and_hms(2025, 3, 10, 0, 0, 0).unwrap();
    let mut next_race = RaceId(1);

    // preseason grind so the field clears the calibration threshold on day one
    for _ in 0..config.eligibility.min_lifetime_races {
        let at = season_start - Duration::days(3);
        run_race(&ingestor, &store, &config, &mut next_race, &mut rand, at)?;
    }

    let mut last_month = season_start.month();
    let mut last_period = None;
    for week in 0..args.weeks {
        let week_start = season_start + Duration::weeks(week as i64);
        if week_start.month() != last_month {
            ingestor.monthly_soft_reset(week_start);
            last_month = week_start.month();
        }

        let (period, _) = lifecycle.ensure_period(week_start)?;
        info!("week {}: {} in {}", week + 1, period.id, period.status);
        last_period = Some(period.id);

        let mut podium = None;
        for race in 0..args.races {
            let at = week_start + Duration::days(race as i64 * 2) + Duration::hours(18);
            podium = Some(run_race(&ingestor, &store, &config, &mut next_race, &mut rand, at)?);
            refresher.refresh(&period, rand.next_u64(), at)?;
        }

        if period.status == PeriodStatus::Open {
            place_wagers(&ledger, &store, &period, args.users, &mut rand, week_start)?;
        }

        let week_end = week_start + Duration::days(6) + Duration::hours(23);
        if lifecycle.close(period.id, week_end)?.is_some() {
            let podium = podium.ok_or("no race decided the podium")?;
            lifecycle.finalize(period.id, podium, week_end)?;
            let summary = settler.settle_period(period.id)?;
            info!(
                "{}: settled {} wagers, {} won, {:.2} points paid",
                period.id, summary.settled, summary.won, summary.total_points
            );
            println!("{}", Console::default().render(&tabulate_settlement(&summary)));
        }
    }

    if let Some(period) = last_period {
        print_market(&store, period);
    }

    let mut rankings = store.rankings_for(last_month, 2025);
    rankings.sort_by_key(|ranking| (ranking.rank.unwrap_or(u32::MAX), ranking.user));
    println!("{}", Console::default().render(&tabulate_leaderboard(&rankings)));
    Ok(())
}

/// Samples a full finishing order from current ratings and ingests it,
/// returning the race's podium.
fn run_race(
    ingestor: &RaceIngestor<MemStore>,
    store: &MemStore,
    config: &EngineConfig,
    next_race: &mut RaceId,
    rand: &mut StdRand,
    at: DateTime<Utc>,
) -> Result<Podium, Box<dyn Error>> {
    let mut competitors = store.competitors();
    competitors.sort_by_key(|competitor| competitor.id);
    let strengths: Vec<_> = competitors
        .iter()
        .map(|competitor| strength(&competitor.state, config.odds.anchor_rating))
        .collect();

    let mut order = vec![0; competitors.len()];
    let mut bitmap = vec![true; competitors.len()];
    mc::run_once(&strengths, &mut order, &mut bitmap, rand);

    let finishers: Vec<_> = order
        .iter()
        .enumerate()
        .map(|(rank, &index)| (competitors[index].id, FinishRank::number(rank + 1)))
        .collect();
    let race = *next_race;
    next_race.0 += 1;
    ingestor.ingest_race(race, &finishers, at)?;
    Ok(Podium([finishers[0].0, finishers[1].0, finishers[2].0]))
}

/// Each user backs three distinct competitors across the podium; every other
/// user boosts their first pick while the monthly allowance lasts.
fn place_wagers(
    ledger: &WagerLedger<MemStore>,
    store: &MemStore,
    period: &Period,
    users: u64,
    rand: &mut StdRand,
    now: DateTime<Utc>,
) -> Result<(), Box<dyn Error>> {
    let mut quoted: Vec<_> = store
        .competitors()
        .into_iter()
        .filter(|competitor| store.live_quote(competitor.id, period.id).is_some())
        .map(|competitor| competitor.id)
        .collect();
    quoted.sort();
    if quoted.len() < PODIUM {
        warn!("only {} quoted competitors; no wagers this week", quoted.len());
        return Ok(());
    }

    for user in 1..=users {
        let mut pool = quoted.clone();
        let mut picks: Vec<_> = Position::iter()
            .enumerate()
            .map(|(index, position)| PickRequest {
                competitor: pool.swap_remove(rand.next_lim_usize(pool.len())),
                position,
                boosted: index == 0 && user % 2 == 0,
            })
            .collect();

        let placed = match ledger.place(UserId(user), period.id, &picks, now) {
            Err(PlacementError::BoostExhausted { .. }) => {
                for pick in &mut picks {
                    pick.boosted = false;
                }
                ledger.place(UserId(user), period.id, &picks, now)
            }
            other => other,
        };
        let wager = placed?;
        debug!("{} placed {}", wager.user, wager.id);
    }
    Ok(())
}

/// Renders the final market of a period from its last quotes.
fn print_market(store: &MemStore, period: PeriodId) {
    let mut quotes: Vec<_> = store
        .competitors()
        .into_iter()
        .filter_map(|competitor| store.live_quote(competitor.id, period))
        .collect();
    quotes.sort_by_key(|quote| quote.competitor);
    if !quotes.is_empty() {
        println!("{}", Console::default().render(&tabulate_quotes(&quotes)));
    }
}
