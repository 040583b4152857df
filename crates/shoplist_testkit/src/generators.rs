//! Property-based test generators using proptest.
//!
//! Item uids are drawn from a small pool so that generated operations
//! collide on the same items, which is where merge behavior matters.

use proptest::prelude::*;
use shoplist_crdt::now_millis;
use shoplist_model::{ShoppingItem, ShoppingList};

/// Size of the item uid pool.
pub const ITEM_POOL: usize = 6;

/// Strategy for item uids from the shared pool.
pub fn item_uid_strategy() -> impl Strategy<Value = String> {
    (0..ITEM_POOL).prop_map(|i| format!("item-{i}"))
}

/// Strategy for item names.
pub fn item_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Z][a-z]{2,9}").expect("Invalid regex")
}

/// Strategy for quantities, negatives included.
pub fn quantity_strategy() -> impl Strategy<Value = i64> {
    -5i64..20
}

/// Strategy for replica origins.
pub fn origin_strategy() -> impl Strategy<Value = String> {
    (0..4u8).prop_map(|i| format!("replica-{i}"))
}

/// One edit a replica can make to a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListOp {
    /// Add an item.
    Add {
        /// Item uid
        item: String,
        /// Display name
        name: String,
        /// Desired quantity
        desired: i64,
        /// Bought quantity
        current: i64,
    },
    /// Remove an item.
    Remove {
        /// Item uid
        item: String,
    },
    /// Set the desired quantity of an item.
    SetDesired {
        /// Item uid
        item: String,
        /// New quantity
        quantity: i64,
    },
    /// Set the bought quantity of an item.
    SetCurrent {
        /// Item uid
        item: String,
        /// New quantity
        quantity: i64,
    },
    /// Rename an item.
    Rename {
        /// Item uid
        item: String,
        /// New name
        name: String,
    },
}

/// Strategy for list operations.
pub fn list_op_strategy() -> impl Strategy<Value = ListOp> {
    prop_oneof![
        3 => (item_uid_strategy(), item_name_strategy(), quantity_strategy(), quantity_strategy())
            .prop_map(|(item, name, desired, current)| ListOp::Add { item, name, desired, current }),
        2 => item_uid_strategy().prop_map(|item| ListOp::Remove { item }),
        2 => (item_uid_strategy(), quantity_strategy())
            .prop_map(|(item, quantity)| ListOp::SetDesired { item, quantity }),
        1 => (item_uid_strategy(), quantity_strategy())
            .prop_map(|(item, quantity)| ListOp::SetCurrent { item, quantity }),
        1 => (item_uid_strategy(), item_name_strategy())
            .prop_map(|(item, name)| ListOp::Rename { item, name }),
    ]
}

/// Strategy for a sequence of operations.
pub fn list_op_sequence_strategy(
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<ListOp>> {
    prop::collection::vec(list_op_strategy(), min_ops..max_ops)
}

/// Applies `op` to `list` as a write by `origin`.
///
/// Returns false if a local precondition rejected it (adding a present
/// item, editing an absent one).
pub fn apply_op(list: &mut ShoppingList, origin: &str, op: &ListOp) -> bool {
    match op {
        ListOp::Add {
            item,
            name,
            desired,
            current,
        } => list
            .add(ShoppingItem::new(
                item.as_str(),
                name.as_str(),
                origin,
                *desired,
                *current,
            ))
            .is_ok(),
        ListOp::Remove { item } => list.remove(item),
        ListOp::SetDesired { item, quantity } => match list.get_item_mut(item) {
            Ok(it) => {
                it.set_desired_quantity(origin, *quantity);
                true
            }
            Err(_) => false,
        },
        ListOp::SetCurrent { item, quantity } => match list.get_item_mut(item) {
            Ok(it) => {
                it.set_current_quantity(origin, *quantity);
                true
            }
            Err(_) => false,
        },
        ListOp::Rename { item, name } => match list.get_item_mut(item) {
            Ok(it) => {
                it.set_name(origin, now_millis(), name.as_str());
                true
            }
            Err(_) => false,
        },
    }
}

/// Applies every op in order, ignoring rejected ones.
pub fn apply_ops(list: &mut ShoppingList, origin: &str, ops: &[ListOp]) {
    for op in ops {
        apply_op(list, origin, op);
    }
}

/// Observable content of a list: `(uid, name, desired, current)` per item,
/// sorted by uid.
pub fn list_view(list: &ShoppingList) -> Vec<(String, String, i64, i64)> {
    let mut view: Vec<_> = list
        .items()
        .map(|i| {
            (
                i.uid().to_string(),
                i.name().to_string(),
                i.desired_quantity(),
                i.current_quantity(),
            )
        })
        .collect();
    view.sort();
    view
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
