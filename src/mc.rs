//! Monte Carlo simulation of podium finishes under a Plackett-Luce choice
//! model: each position is drawn proportionally to the remaining strengths,
//! with drawn competitors removed from the pool between positions.

use tinyrand::{Rand, Seeded, StdRand};

use crate::domain::PODIUM;
use crate::probs::SliceExt;

/// Per-competitor, per-position hit counts over a simulation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodiumTally {
    trials: u64,
    hits: Vec<[u64; PODIUM]>,
}
impl PodiumTally {
    fn allocate(competitors: usize, trials: u64) -> Self {
        Self {
            trials,
            hits: vec![[0; PODIUM]; competitors],
        }
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    pub fn competitors(&self) -> usize {
        self.hits.len()
    }

    pub fn hits(&self, competitor: usize, rank: usize) -> u64 {
        self.hits[competitor][rank]
    }

    pub fn probability(&self, competitor: usize, rank: usize) -> f64 {
        if self.trials == 0 {
            return 0.0;
        }
        self.hits[competitor][rank] as f64 / self.trials as f64
    }
}

/// A seedable podium simulator. With a fixed seed, repeated runs over the same
/// strengths produce byte-identical tallies.
pub struct MonteCarloEngine {
    trials: u64,
    podium_places: usize,
    rand: StdRand,
}
impl Default for MonteCarloEngine {
    fn default() -> Self {
        Self {
            trials: 50_000,
            podium_places: PODIUM,
            rand: StdRand::default(),
        }
    }
}
impl MonteCarloEngine {
    pub fn with_trials(mut self, trials: u64) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_podium_places(mut self, podium_places: usize) -> Self {
        debug_assert!(podium_places <= PODIUM);
        self.podium_places = podium_places;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rand = StdRand::seed(seed);
        self
    }

    pub fn trials(&self) -> u64 {
        self.trials
    }

    /// Runs the configured number of trials over `strengths`, tallying which
    /// competitor lands in which position. A field smaller than the podium
    /// fills fewer positions; an empty field yields an all-zero tally.
    pub fn simulate_tally(&mut self, strengths: &[f64]) -> PodiumTally {
        let mut tally = PodiumTally::allocate(strengths.len(), self.trials);
        let places = usize::min(self.podium_places, strengths.len());
        if places == 0 {
            return tally;
        }

        let mut podium = vec![usize::MAX; places];
        let mut bitmap = vec![true; strengths.len()];
        for _ in 0..self.trials {
            run_once(strengths, &mut podium, &mut bitmap, &mut self.rand);
            for (rank, &competitor) in podium.iter().enumerate() {
                tally.hits[competitor][rank] += 1;
            }
        }
        tally
    }
}

/// Simulates a single podium outcome by repeated proportional draws without
/// replacement. `podium` receives the drawn competitor index per rank;
/// `bitmap` tracks who remains and is reset on entry.
pub fn run_once(
    strengths: &[f64],
    podium: &mut [usize],
    bitmap: &mut [bool],
    rand: &mut impl Rand,
) {
    debug_assert_eq!(strengths.len(), bitmap.len());
    debug_assert!(!podium.is_empty());
    debug_assert!(podium.len() <= strengths.len());
    debug_assert!(validate_strengths(strengths));

    let mut remaining = strengths.sum();
    reset_bitmap(bitmap);
    for rank in 0..podium.len() {
        let random = random_f64(rand) * remaining;
        let mut cumulative = 0.0;
        let mut drawn = usize::MAX;
        for (competitor, &strength) in strengths.iter().enumerate() {
            if bitmap[competitor] {
                cumulative += strength;
                drawn = competitor;
                if cumulative >= random {
                    break;
                }
            }
        }
        // the trailing available competitor soaks up any rounding shortfall
        podium[rank] = drawn;
        bitmap[drawn] = false;
        remaining -= strengths[drawn];
    }
}

fn validate_strengths(strengths: &[f64]) -> bool {
    for &strength in strengths {
        debug_assert!(
            strength.is_finite() && strength >= 0.0,
            "invalid strengths {strengths:?}"
        );
    }
    true
}

fn reset_bitmap(bitmap: &mut [bool]) {
    for flag in bitmap {
        *flag = true;
    }
}

#[inline]
fn random_f64(rand: &mut impl Rand) -> f64 {
    rand.next_u64() as f64 / u64::MAX as f64
}
