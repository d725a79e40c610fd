//! A competitive-league rating and wagering engine: Glicko-2 skill ratings over
//! race results, Monte Carlo podium odds in the Plackett-Luce model, and a
//! weekly wagering period lifecycle with boosted picks, best-odds-guaranteed
//! settlement and monthly leaderboards.

pub mod config;
pub mod domain;
pub mod eligibility;
pub mod ingest;
pub mod lifecycle;
pub mod mc;
pub mod odds;
pub mod print;
pub mod probs;
pub mod rating;
pub mod settle;
pub mod store;
pub mod wager;

#[cfg(test)]
pub(crate) mod testing;

#[doc = include_str!("../README.md")]
#[cfg(doc)]
fn readme() {}
