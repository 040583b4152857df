//! Last-writer-wins register.

use crate::Merge;
use serde::{Deserialize, Serialize};

/// A single value where the most recent write wins.
///
/// Writes are ordered by `(timestamp, origin)`; the origin breaks ties
/// between replicas that wrote in the same millisecond, so every replica picks
/// the same winner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LwwRegister<T> {
    value: T,
    timestamp: u64,
    origin: String,
}

impl<T: Default> Default for LwwRegister<T> {
    fn default() -> Self {
        Self {
            value: T::default(),
            timestamp: 0,
            origin: String::new(),
        }
    }
}

impl<T> LwwRegister<T> {
    /// Creates a register holding `value` as written by `origin` at `timestamp`.
    pub fn new(value: T, origin: impl Into<String>, timestamp: u64) -> Self {
        Self {
            value,
            timestamp,
            origin: origin.into(),
        }
    }

    /// Returns the current value.
    pub fn get(&self) -> &T {
        &self.value
    }

    /// Returns the timestamp of the winning write.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Returns the origin of the winning write.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Writes `value` locally.
    ///
    /// The stored timestamp is `max(now, previous + 1)` so a local write always
    /// supersedes what this replica has already observed, even with a clock
    /// that went backwards.
    pub fn set(&mut self, value: T, origin: impl Into<String>, now: u64) {
        self.value = value;
        self.timestamp = now.max(self.timestamp.saturating_add(1));
        self.origin = origin.into();
    }

    fn wins_over(&self, other: &Self) -> bool {
        (self.timestamp, self.origin.as_str()) > (other.timestamp, other.origin.as_str())
    }
}

impl<T: Clone> Merge for LwwRegister<T> {
    fn merge(&mut self, other: &Self) {
        if other.wins_over(self) {
            self.value = other.value.clone();
            self.timestamp = other.timestamp;
            self.origin.clone_from(&other.origin);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_write_wins() {
        let mut a = LwwRegister::new("eggs".to_string(), "n0", 10);
        let b = LwwRegister::new("bread".to_string(), "n1", 20);
        a.merge(&b);
        assert_eq!(a.get(), "bread");
        assert_eq!(a.origin(), "n1");
    }

    #[test]
    fn older_write_is_ignored() {
        let mut a = LwwRegister::new("eggs".to_string(), "n0", 30);
        let b = LwwRegister::new("bread".to_string(), "n1", 20);
        a.merge(&b);
        assert_eq!(a.get(), "eggs");
    }

    #[test]
    fn origin_breaks_ties() {
        let x = LwwRegister::new("x".to_string(), "n0", 5);
        let y = LwwRegister::new("y".to_string(), "n1", 5);

        let mut xy = x.clone();
        xy.merge(&y);
        let mut yx = y.clone();
        yx.merge(&x);

        assert_eq!(xy, yx);
        assert_eq!(xy.get(), "y");
    }

    #[test]
    fn local_set_supersedes_future_timestamp() {
        let mut reg = LwwRegister::new(1u32, "n1", 1_000);
        reg.set(2, "n0", 10);
        assert_eq!(*reg.get(), 2);
        assert_eq!(reg.timestamp(), 1_001);
    }

    #[test]
    fn default_loses_to_any_write() {
        let mut reg: LwwRegister<String> = LwwRegister::default();
        reg.merge(&LwwRegister::new("milk".to_string(), "n0", 0));
        assert_eq!(reg.get(), "milk");
    }
}
