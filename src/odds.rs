//! Derives bounded decimal odds from rating states: Glicko-2 states become
//! Plackett-Luce strengths, a Monte Carlo simulation turns strengths into
//! per-position probabilities, and probabilities are framed as clamped
//! decimal prices.

use std::time::Instant;

use anyhow::bail;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{CompetitorId, OddsQuote, PeriodId, PODIUM};
use crate::mc::MonteCarloEngine;
use crate::probs::SliceExt;
use crate::rating::{g, to_mu, to_phi, RatingState};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsConfig {
    /// Monte Carlo trials per odds computation.
    pub trials: u64,
    pub min_odd: f64,
    pub max_odd: f64,
    /// Rating treated as neutral by the strength transform.
    pub anchor_rating: f64,
}
impl Default for OddsConfig {
    fn default() -> Self {
        Self {
            trials: 50_000,
            min_odd: 1.1,
            max_odd: 50.0,
            anchor_rating: 1500.0,
        }
    }
}
impl OddsConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.trials == 0 {
            bail!("at least one trial must be run");
        }
        if self.min_odd < 1.0 {
            bail!("minimum odd must not pay below stake");
        }
        if self.max_odd <= self.min_odd {
            bail!("maximum odd must exceed the minimum");
        }
        Ok(())
    }
}

/// Plackett-Luce strength of a rating state: `exp(μ·g(φ))`. The `g` factor
/// shrinks high-uncertainty ratings toward a neutral strength of 1.
pub fn strength(state: &RatingState, anchor_rating: f64) -> f64 {
    let mu = to_mu(state.rating, anchor_rating);
    let phi = to_phi(state.rd);
    (mu * g(phi)).exp()
}

/// Win probabilities as the softmax of strengths; sums to 1 for a non-empty
/// field.
pub fn win_probabilities(strengths: &[f64]) -> Vec<f64> {
    let mut probs = strengths.to_vec();
    if !probs.is_empty() {
        probs.normalise(1.0);
    }
    probs
}

#[derive(Debug, Clone, Default)]
pub struct OddsEngine {
    config: OddsConfig,
}
impl OddsEngine {
    pub fn new(config: OddsConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OddsConfig {
        &self.config
    }

    /// Computes one quote per eligible competitor. An empty field yields no
    /// quotes; a field smaller than the podium simulates fewer positions,
    /// with unreachable positions priced at the maximum odd.
    pub fn compute(
        &self,
        field: &[(CompetitorId, RatingState)],
        period: PeriodId,
        seed: u64,
        computed_at: DateTime<Utc>,
    ) -> Vec<OddsQuote> {
        if field.is_empty() {
            return vec![];
        }
        let start_time = Instant::now();

        let strengths: Vec<_> = field
            .iter()
            .map(|(_, state)| strength(state, self.config.anchor_rating))
            .collect();
        let mut engine = MonteCarloEngine::default()
            .with_trials(self.config.trials)
            .with_seed(seed);
        let tally = engine.simulate_tally(&strengths);

        let quotes = field
            .iter()
            .enumerate()
            .map(|(index, &(competitor, _))| {
                let mut probs = [0.0; PODIUM];
                let mut odds = [0.0; PODIUM];
                for rank in 0..PODIUM {
                    let prob = tally.probability(index, rank);
                    probs[rank] = prob;
                    odds[rank] = self.frame_odd(prob);
                }
                OddsQuote {
                    competitor,
                    period,
                    odds,
                    probs,
                    computed_at,
                }
            })
            .collect();

        debug!(
            "priced {} competitors over {} trials in {:.3}s",
            field.len(),
            self.config.trials,
            start_time.elapsed().as_millis() as f64 / 1_000.
        );
        quotes
    }

    /// `1/p` clamped to the configured band. A zero probability prices at the
    /// maximum odd rather than infinity.
    pub fn frame_odd(&self, prob: f64) -> f64 {
        let fair = 1.0 / prob;
        if fair.is_finite() {
            f64::min(f64::max(self.config.min_odd, fair), self.config.max_odd)
        } else {
            self.config.max_odd
        }
    }
}
