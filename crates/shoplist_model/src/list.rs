//! Shopping list aggregate.

use crate::error::{ModelError, ModelResult};
use crate::item::ShoppingItem;
use serde::{Deserialize, Serialize};
use shoplist_crdt::{now_millis, LwwRegister, Merge, ORSet};

/// A replicated shopping list.
///
/// Items live in an add-wins [`ORSet`]; the list name is a last-writer-wins
/// register. Two lists with the same uid always merge to the same state no
/// matter the order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingList {
    uid: String,
    name: LwwRegister<String>,
    items: ORSet<ShoppingItem>,
}

impl ShoppingList {
    /// Creates an empty, named list.
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: LwwRegister::new(name.into(), "", now_millis()),
            items: ORSet::new(),
        }
    }

    /// Creates the unnamed placeholder used before merging a remote copy.
    ///
    /// Its name register loses against any real write.
    pub fn empty(uid: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: LwwRegister::default(),
            items: ORSet::new(),
        }
    }

    /// The list's uid.
    #[must_use]
    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// The list's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.get()
    }

    /// Renames the list as a write by `origin` at `now` (epoch millis).
    pub fn rename(&mut self, origin: &str, now: u64, name: impl Into<String>) {
        self.name.set(name.into(), origin, now);
    }

    /// Adds a new item.
    ///
    /// # Errors
    ///
    /// [`ModelError::DuplicateItem`] if an item with the same uid is present.
    pub fn add(&mut self, item: ShoppingItem) -> ModelResult<()> {
        if self.items.contains(item.uid()) {
            return Err(ModelError::DuplicateItem {
                list: self.uid.clone(),
                item: item.uid().to_string(),
            });
        }
        self.items.add(item);
        Ok(())
    }

    /// Replaces an existing item.
    ///
    /// # Errors
    ///
    /// [`ModelError::ItemNotFound`] if no item with that uid is present.
    pub fn update(&mut self, item: ShoppingItem) -> ModelResult<()> {
        if !self.items.contains(item.uid()) {
            return Err(self.not_found(item.uid()));
        }
        self.items.add(item);
        Ok(())
    }

    /// Tombstones the item with `uid`. Returns false if it was not present.
    pub fn remove(&mut self, uid: &str) -> bool {
        let present = self.items.contains(uid);
        self.items.remove(uid);
        present
    }

    /// Returns true if an item with `uid` is present.
    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        self.items.contains(uid)
    }

    /// Looks up a present item.
    ///
    /// # Errors
    ///
    /// [`ModelError::ItemNotFound`] on an unknown or removed uid.
    pub fn get_item(&self, uid: &str) -> ModelResult<&ShoppingItem> {
        self.items.get(uid).ok_or_else(|| self.not_found(uid))
    }

    /// Looks up a present item for in-place editing.
    ///
    /// # Errors
    ///
    /// [`ModelError::ItemNotFound`] on an unknown or removed uid.
    pub fn get_item_mut(&mut self, uid: &str) -> ModelResult<&mut ShoppingItem> {
        let err = self.not_found(uid);
        self.items.get_mut(uid).ok_or(err)
    }

    /// Iterates over present items in uid order.
    pub fn items(&self) -> impl Iterator<Item = &ShoppingItem> {
        self.items.values()
    }

    /// Number of present items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// The raw item set, tombstones included.
    #[must_use]
    pub fn item_set(&self) -> &ORSet<ShoppingItem> {
        &self.items
    }

    fn not_found(&self, item: &str) -> ModelError {
        ModelError::ItemNotFound {
            list: self.uid.clone(),
            item: item.to_string(),
        }
    }
}

impl Merge for ShoppingList {
    /// Merges the item set and the name. Lists with different uids are left
    /// untouched.
    fn merge(&mut self, other: &Self) {
        if self.uid != other.uid {
            return;
        }
        self.name.merge(&other.name);
        self.items.merge(&other.items);
    }
}
