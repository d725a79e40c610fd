//! Testing helpers.

use assert_float_eq::*;

use crate::domain::{Competitor, CompetitorId};
use crate::rating::RatingState;
use crate::store::Store;

/// Registers `count` default-rated competitors with ids 1..=count.
pub fn seed_competitors(store: &impl Store, count: u64) {
    for id in 1..=count {
        store.upsert_competitor(Competitor::new(CompetitorId(id), RatingState::default()));
    }
}

pub fn assert_slice_f64_near(expected: &[f64], actual: &[f64], distance: u32) {
    assert_lengths_match(expected, actual);
    for (&expected, &actual) in expected.iter().zip(actual.iter()) {
        if actual != expected {
            assert_f64_near!(expected, actual, distance);
        }
    }
}

fn assert_lengths_match(expected: &[f64], actual: &[f64]) {
    assert_eq!(
        expected.len(),
        actual.len(),
        "lengths do not match: {} ≠ {}",
        expected.len(),
        actual.len()
    );
}
