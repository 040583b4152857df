//! Shopping item.

use serde::{Deserialize, Serialize};
use shoplist_crdt::{now_millis, Keyed, LwwRegister, Merge, PNCounter};

/// One line of a shopping list.
///
/// Quantities are [`PNCounter`]s so concurrent edits from different replicas
/// add up instead of overwriting each other. The name is a last-writer-wins
/// register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingItem {
    uid: String,
    name: LwwRegister<String>,
    desired: PNCounter,
    current: PNCounter,
}

impl ShoppingItem {
    /// Creates an item, charging the initial quantities to `origin`.
    pub fn new(
        uid: impl Into<String>,
        name: impl Into<String>,
        origin: &str,
        desired: i64,
        current: i64,
    ) -> Self {
        let mut item = Self {
            uid: uid.into(),
            name: LwwRegister::new(name.into(), origin, now_millis()),
            desired: PNCounter::new(),
            current: PNCounter::new(),
        };
        item.desired.set(origin, desired);
        item.current.set(origin, current);
        item
    }

    /// The item's uid.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The item's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.get()
    }

    /// Renames the item as a write by `origin` at `now` (epoch millis).
    pub fn set_name(&mut self, origin: &str, now: u64, name: impl Into<String>) {
        self.name.set(name.into(), origin, now);
    }

    /// How many of this item are wanted.
    #[must_use]
    pub fn desired_quantity(&self) -> i64 {
        self.desired.value()
    }

    /// How many of this item have been bought.
    #[must_use]
    pub fn current_quantity(&self) -> i64 {
        self.current.value()
    }

    /// Sets the desired quantity by charging the delta from the locally
    /// observed value to `origin`.
    pub fn set_desired_quantity(&mut self, origin: &str, quantity: i64) {
        self.desired.set(origin, quantity);
    }

    /// Sets the bought quantity by charging the delta from the locally
    /// observed value to `origin`.
    pub fn set_current_quantity(&mut self, origin: &str, quantity: i64) {
        self.current.set(origin, quantity);
    }

    /// The underlying desired-quantity counter.
    #[must_use]
    pub fn desired_counter(&self) -> &PNCounter {
        &self.desired
    }

    /// The underlying bought-quantity counter.
    #[must_use]
    pub fn current_counter(&self) -> &PNCounter {
        &self.current
    }
}

impl Keyed for ShoppingItem {
    fn uid(&self) -> &str {
        &self.uid
    }
}

impl Merge for ShoppingItem {
    /// Merges both counters and the name. Items with different uids are left
    /// untouched.
    fn merge(&mut self, other: &Self) {
        if self.uid != other.uid {
            return;
        }
        self.name.merge(&other.name);
        self.desired.merge(&other.desired);
        self.current.merge(&other.current);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_item_reports_quantities() {
        let item = ShoppingItem::new("i1", "milk", "n0", 2, 0);
        assert_eq!(item.uid(), "i1");
        assert_eq!(item.name(), "milk");
        assert_eq!(item.desired_quantity(), 2);
        assert_eq!(item.current_quantity(), 0);
        assert_eq!(item.desired_counter().contribution("n0"), (2, 0));
    }

    #[test]
    fn setting_quantity_charges_delta_to_origin() {
        let mut item = ShoppingItem::new("i1", "milk", "n0", 2, 0);
        item.set_desired_quantity("n1", 5);
        assert_eq!(item.desired_quantity(), 5);
        assert_eq!(item.desired_counter().contribution("n1"), (3, 0));

        item.set_current_quantity("n1", 1);
        item.set_current_quantity("n0", 0);
        assert_eq!(item.current_quantity(), 0);
        assert_eq!(item.current_counter().contribution("n0"), (0, 1));
    }

    #[test]
    fn concurrent_bumps_add_up() {
        let base = ShoppingItem::new("i1", "eggs", "n0", 6, 0);
        let mut a = base.clone();
        let mut b = base;

        a.set_current_quantity("n0", 2);
        b.set_current_quantity("n1", 3);

        a.merge(&b);
        assert_eq!(a.current_quantity(), 5);
    }

    #[test]
    fn newer_name_wins() {
        let mut a = ShoppingItem::new("i1", "milk", "n0", 1, 0);
        let mut b = a.clone();
        b.set_name("n1", u64::MAX - 1, "oat milk");

        a.merge(&b);
        assert_eq!(a.name(), "oat milk");
    }

    #[test]
    fn merge_ignores_other_uid() {
        let mut a = ShoppingItem::new("i1", "milk", "n0", 1, 0);
        let before = a.clone();
        a.merge(&ShoppingItem::new("i2", "bread", "n0", 9, 9));
        assert_eq!(a, before);
    }
}
