//! Glicko-2 skill ratings over race outcomes. A race is decomposed into
//! pairwise virtual matches scored 1/0.5/0 by relative finishing rank, and
//! every participant's (rating, RD, volatility) triple is updated in one pass.
//! Pure functions throughout; callers persist the results.

use anyhow::bail;
use serde::{Deserialize, Serialize};

use crate::domain::FinishRank;

/// Conversion factor between the public Glicko scale and the internal
/// Glicko-2 scale.
pub const GLICKO_SCALE: f64 = 173.7178;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatingConfig {
    /// Constrains volatility drift; smaller values resist rating swings.
    pub tau: f64,
    pub default_rating: f64,
    pub default_rd: f64,
    pub default_volatility: f64,
    /// Convergence tolerance for the volatility root-find.
    pub convergence_tolerance: f64,
    /// Fraction of the old rating retained by the monthly soft reset.
    pub soft_reset_retention: f64,
    /// RD increase applied by the monthly soft reset, capped at `default_rd`.
    pub soft_reset_rd_bump: f64,
}
impl Default for RatingConfig {
    fn default() -> Self {
        Self {
            tau: 0.5,
            default_rating: 1500.0,
            default_rd: 350.0,
            default_volatility: 0.06,
            convergence_tolerance: 1e-6,
            soft_reset_retention: 0.75,
            soft_reset_rd_bump: 50.0,
        }
    }
}
impl RatingConfig {
    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if self.tau <= 0.0 {
            bail!("tau must be positive");
        }
        if self.convergence_tolerance <= 0.0 {
            bail!("convergence tolerance must be positive");
        }
        if !(0.0..=1.0).contains(&self.soft_reset_retention) {
            bail!("soft-reset retention must lie in [0, 1]");
        }
        if self.default_rd <= 0.0 || self.default_volatility <= 0.0 {
            bail!("default RD and volatility must be positive");
        }
        Ok(())
    }
}

/// A competitor's Bayesian skill estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatingState {
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64,
}
impl Default for RatingState {
    fn default() -> Self {
        let config = RatingConfig::default();
        Self {
            rating: config.default_rating,
            rd: config.default_rd,
            volatility: config.default_volatility,
        }
    }
}

#[inline(always)]
pub fn to_mu(rating: f64, default_rating: f64) -> f64 {
    (rating - default_rating) / GLICKO_SCALE
}

#[inline(always)]
pub fn to_phi(rd: f64) -> f64 {
    rd / GLICKO_SCALE
}

#[inline(always)]
pub fn from_mu(mu: f64, default_rating: f64) -> f64 {
    mu * GLICKO_SCALE + default_rating
}

#[inline(always)]
pub fn from_phi(phi: f64) -> f64 {
    phi * GLICKO_SCALE
}

/// Dampening factor for an opponent's uncertainty.
#[inline(always)]
pub fn g(phi: f64) -> f64 {
    1.0 / (1.0 + 3.0 * phi * phi / (std::f64::consts::PI * std::f64::consts::PI)).sqrt()
}

/// Expected score of a `mu`-rated player against an opponent at
/// (`mu_j`, `phi_j`).
#[inline(always)]
pub fn expected_score(mu: f64, mu_j: f64, phi_j: f64) -> f64 {
    1.0 / (1.0 + (-g(phi_j) * (mu - mu_j)).exp())
}

/// Updates every participant's rating state given the race's finishing ranks.
/// `states` and `ranks` are parallel slices. A single-participant race leaves
/// the state untouched.
pub fn update_race(
    states: &[RatingState],
    ranks: &[FinishRank],
    config: &RatingConfig,
) -> Vec<RatingState> {
    debug_assert_eq!(states.len(), ranks.len());
    states
        .iter()
        .enumerate()
        .map(|(index, state)| update_one(index, state, states, ranks, config))
        .collect()
}

fn update_one(
    index: usize,
    state: &RatingState,
    states: &[RatingState],
    ranks: &[FinishRank],
    config: &RatingConfig,
) -> RatingState {
    if states.len() < 2 {
        return *state;
    }

    let mu = to_mu(state.rating, config.default_rating);
    let phi = to_phi(state.rd);

    let mut v_inv = 0.0;
    let mut delta_sum = 0.0;
    for (opponent_index, opponent) in states.iter().enumerate() {
        if opponent_index == index {
            continue;
        }
        let score = pairwise_score(ranks[index], ranks[opponent_index]);
        let mu_j = to_mu(opponent.rating, config.default_rating);
        let phi_j = to_phi(opponent.rd);
        let g_j = g(phi_j);
        let e_j = expected_score(mu, mu_j, phi_j);
        v_inv += g_j * g_j * e_j * (1.0 - e_j);
        delta_sum += g_j * (score - e_j);
    }
    let v = 1.0 / v_inv;
    let delta = v * delta_sum;

    let volatility = solve_volatility(phi, v, delta, state.volatility, config);
    let phi_star = (phi * phi + volatility * volatility).sqrt();
    let phi_prime = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / v).sqrt();
    let mu_prime = mu + phi_prime * phi_prime * delta_sum;

    RatingState {
        rating: from_mu(mu_prime, config.default_rating),
        rd: from_phi(phi_prime),
        volatility,
    }
}

#[inline(always)]
fn pairwise_score(own: FinishRank, other: FinishRank) -> f64 {
    match own.as_index().cmp(&other.as_index()) {
        std::cmp::Ordering::Less => 1.0,
        std::cmp::Ordering::Equal => 0.5,
        std::cmp::Ordering::Greater => 0.0,
    }
}

/// Solves for the new volatility on `x = ln(σ²)` using Glickman's iterative
/// procedure: the search interval is bounded explicitly before a
/// secant/bisection hybrid converges to within the configured tolerance. The
/// lower-bound walk handles the numerically delicate `Δ² ≤ φ² + v` case.
fn solve_volatility(phi: f64, v: f64, delta: f64, sigma: f64, config: &RatingConfig) -> f64 {
    let a = (sigma * sigma).ln();
    let tau = config.tau;
    let delta_sq = delta * delta;
    let phi_sq = phi * phi;

    let f = |x: f64| {
        let ex = x.exp();
        let denominator = phi_sq + v + ex;
        ex * (delta_sq - phi_sq - v - ex) / (2.0 * denominator * denominator)
            - (x - a) / (tau * tau)
    };

    let mut lower = a;
    let mut upper = if delta_sq > phi_sq + v {
        (delta_sq - phi_sq - v).ln()
    } else {
        let mut k = 1.0;
        while f(a - k * tau) < 0.0 {
            k += 1.0;
        }
        a - k * tau
    };

    let mut f_lower = f(lower);
    let mut f_upper = f(upper);
    let mut iterations = 0;
    while (upper - lower).abs() > config.convergence_tolerance && iterations < 100 {
        let mid = lower + (lower - upper) * f_lower / (f_upper - f_lower);
        let f_mid = f(mid);
        if f_mid * f_upper <= 0.0 {
            lower = upper;
            f_lower = f_upper;
        } else {
            // Illinois step: halve the retained side to force convergence
            f_lower /= 2.0;
        }
        upper = mid;
        f_upper = f_mid;
        iterations += 1;
    }

    (lower / 2.0).exp()
}

/// Monthly soft reset: partially regresses the rating toward the default and
/// widens the RD, restoring responsiveness without discarding history.
/// Lifetime counters are unaffected by design of the caller.
pub fn soft_reset(state: &RatingState, config: &RatingConfig) -> RatingState {
    RatingState {
        rating: config.soft_reset_retention * state.rating
            + (1.0 - config.soft_reset_retention) * config.default_rating,
        rd: f64::min(state.rd + config.soft_reset_rd_bump, config.default_rd),
        volatility: config.default_volatility,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_float_eq::*;

    fn default_states(count: usize) -> Vec<RatingState> {
        vec![RatingState::default(); count]
    }

    fn ranks(numbers: &[usize]) -> Vec<FinishRank> {
        numbers.iter().map(|&number| FinishRank::number(number)).collect()
    }

    #[test]
    fn expected_score_of_equals_is_half() {
        assert_f64_near!(0.5, expected_score(0.0, 0.0, to_phi(350.0)));
    }

    #[test]
    fn g_dampens_with_uncertainty() {
        assert_f64_near!(1.0, g(0.0));
        assert!(g(to_phi(350.0)) < 1.0);
    }

    #[test]
    fn winner_gains_rating_and_rd_does_not_increase() {
        let states = default_states(4);
        let updated = update_race(&states, &ranks(&[1, 2, 3, 4]), &RatingConfig::default());
        assert!(updated[0].rating > states[0].rating);
        assert!(updated[0].rd <= states[0].rd);
    }

    #[test]
    fn loser_of_all_drops() {
        let states = default_states(4);
        let updated = update_race(&states, &ranks(&[1, 2, 3, 4]), &RatingConfig::default());
        assert!(updated[3].rating < states[3].rating);
    }

    #[test]
    fn symmetric_field_moves_symmetrically() {
        let states = default_states(2);
        let updated = update_race(&states, &ranks(&[1, 2]), &RatingConfig::default());
        let default_rating = RatingConfig::default().default_rating;
        assert_float_absolute_eq!(
            updated[0].rating - default_rating,
            default_rating - updated[1].rating,
            1e-9
        );
    }

    #[test]
    fn single_participant_is_unchanged() {
        let states = default_states(1);
        let updated = update_race(&states, &ranks(&[1]), &RatingConfig::default());
        assert_eq!(states, updated);
    }

    #[test]
    fn glickman_example() {
        // the worked example from the Glicko-2 paper: 1500/200 beats 1400/30,
        // loses to 1550/100 and 1700/300
        let config = RatingConfig {
            tau: 0.5,
            ..RatingConfig::default()
        };
        let player = RatingState {
            rating: 1500.0,
            rd: 200.0,
            volatility: 0.06,
        };
        let mu = to_mu(player.rating, config.default_rating);
        let phi = to_phi(player.rd);
        let opponents = [
            (1400.0, 30.0, 1.0),
            (1550.0, 100.0, 0.0),
            (1700.0, 300.0, 0.0),
        ];
        let mut v_inv = 0.0;
        let mut delta_sum = 0.0;
        for &(rating, rd, score) in &opponents {
            let mu_j = to_mu(rating, config.default_rating);
            let phi_j = to_phi(rd);
            let e_j = expected_score(mu, mu_j, phi_j);
            let g_j = g(phi_j);
            v_inv += g_j * g_j * e_j * (1.0 - e_j);
            delta_sum += g_j * (score - e_j);
        }
        let v = 1.0 / v_inv;
        let delta = v * delta_sum;
        assert_float_absolute_eq!(1.7785, v, 0.001);
        assert_float_absolute_eq!(-0.4834, delta, 0.001);

        let volatility = solve_volatility(phi, v, delta, player.volatility, &config);
        assert_float_absolute_eq!(0.05999, volatility, 0.0001);

        let phi_star = (phi * phi + volatility * volatility).sqrt();
        let phi_prime = 1.0 / (1.0 / (phi_star * phi_star) + 1.0 / v).sqrt();
        let mu_prime = mu + phi_prime * phi_prime * delta_sum;
        assert_float_absolute_eq!(1464.06, from_mu(mu_prime, config.default_rating), 0.05);
        assert_float_absolute_eq!(151.52, from_phi(phi_prime), 0.05);
    }

    #[test]
    fn volatility_converges_at_small_delta_boundary() {
        // a drawn pair yields delta ≈ 0, forcing the bounded lower-bound walk
        let states = default_states(2);
        let updated = update_race(&states, &ranks(&[1, 1]), &RatingConfig::default());
        for state in &updated {
            assert!(state.volatility.is_finite());
            assert!(state.volatility > 0.0);
            assert_float_absolute_eq!(0.06, state.volatility, 0.001);
        }
    }

    #[test]
    fn soft_reset_narrows_the_field() {
        let config = RatingConfig::default();
        let strong = RatingState { rating: 1800.0, rd: 50.0, volatility: 0.07 };
        let weak = RatingState { rating: 1200.0, rd: 50.0, volatility: 0.05 };
        let strong_reset = soft_reset(&strong, &config);
        let weak_reset = soft_reset(&weak, &config);
        assert_f64_near!(1725.0, strong_reset.rating);
        assert_f64_near!(1275.0, weak_reset.rating);
        assert_f64_near!(100.0, strong_reset.rd);
        assert_f64_near!(0.06, strong_reset.volatility);
        // the 600-point gap narrows to 450
        assert_f64_near!(450.0, strong_reset.rating - weak_reset.rating);
    }

    #[test]
    fn soft_reset_caps_rd_at_default() {
        let config = RatingConfig::default();
        let state = RatingState { rating: 1500.0, rd: 340.0, volatility: 0.06 };
        assert_f64_near!(350.0, soft_reset(&state, &config).rd);
    }

    #[test]
    fn config_validation() {
        assert!(RatingConfig::default().validate().is_ok());
        let bad = RatingConfig { tau: 0.0, ..RatingConfig::default() };
        assert!(bad.validate().is_err());
        let bad = RatingConfig { soft_reset_retention: 1.5, ..RatingConfig::default() };
        assert!(bad.validate().is_err());
    }
}
