//! Positive-negative counter.

use crate::Merge;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A counter supporting increment and decrement across replicas.
///
/// Each origin owns one positive and one negative accumulator. Both only
/// grow, so merging takes the pointwise maximum per origin and the result is
/// independent of merge order or duplication.
///
/// # Example
///
/// ```
/// use shoplist_crdt::{Merge, PNCounter};
///
/// let mut a = PNCounter::new();
/// a.increment("n0", 5);
///
/// let mut b = PNCounter::new();
/// b.decrement("n1", 2);
///
/// a.merge(&b);
/// assert_eq!(a.value(), 3);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PNCounter {
    pos: BTreeMap<String, u64>,
    neg: BTreeMap<String, u64>,
}

impl PNCounter {
    /// Creates a counter with value zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `delta` to `origin`'s positive accumulator. A zero delta is ignored.
    pub fn increment(&mut self, origin: &str, delta: u64) {
        if delta == 0 {
            return;
        }
        let slot = self.pos.entry(origin.to_string()).or_insert(0);
        *slot = slot.saturating_add(delta);
    }

    /// Adds `delta` to `origin`'s negative accumulator. A zero delta is ignored.
    pub fn decrement(&mut self, origin: &str, delta: u64) {
        if delta == 0 {
            return;
        }
        let slot = self.neg.entry(origin.to_string()).or_insert(0);
        *slot = slot.saturating_add(delta);
    }

    /// Moves the counter to `target` by charging the difference to `origin`.
    ///
    /// The delta is computed against the locally observed value, so two
    /// origins setting different targets concurrently converge to a value
    /// that neither of them asked for.
    pub fn set(&mut self, origin: &str, target: i64) {
        let diff = i128::from(target) - i128::from(self.value());
        let magnitude = u64::try_from(diff.unsigned_abs()).unwrap_or(u64::MAX);
        if diff > 0 {
            self.increment(origin, magnitude);
        } else if diff < 0 {
            self.decrement(origin, magnitude);
        }
    }

    /// Returns `Σpos − Σneg`, saturated to the `i64` range.
    #[must_use]
    pub fn value(&self) -> i64 {
        let total = i128::from(self.positive()) - i128::from(self.negative());
        i64::try_from(total).unwrap_or(if total < 0 { i64::MIN } else { i64::MAX })
    }

    /// Sum of all positive accumulators.
    #[must_use]
    pub fn positive(&self) -> u64 {
        self.pos.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// Sum of all negative accumulators.
    #[must_use]
    pub fn negative(&self) -> u64 {
        self.neg.values().fold(0u64, |acc, v| acc.saturating_add(*v))
    }

    /// Returns `origin`'s contribution as `(positive, negative)`.
    #[must_use]
    pub fn contribution(&self, origin: &str) -> (u64, u64) {
        (
            self.pos.get(origin).copied().unwrap_or(0),
            self.neg.get(origin).copied().unwrap_or(0),
        )
    }
}

impl Merge for PNCounter {
    fn merge(&mut self, other: &Self) {
        for (origin, count) in &other.pos {
            let slot = self.pos.entry(origin.clone()).or_insert(0);
            *slot = (*slot).max(*count);
        }
        for (origin, count) in &other.neg {
            let slot = self.neg.entry(origin.clone()).or_insert(0);
            *slot = (*slot).max(*count);
        }
    }
}
