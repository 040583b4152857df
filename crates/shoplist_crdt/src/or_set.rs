//! Observed-remove set (add-wins).
//!
//! Every add mints a fresh [`Tag`]. A remove tombstones only the tags this
//! replica has observed for the element, so an add that happened concurrently
//! elsewhere carries a tag the remove never saw and survives the merge.
//!
//! An element is present iff at least one of its add tags is not tombstoned.
//! Payloads are kept after removal so that a later concurrent add can still
//! be merged against them.

use crate::tag::Tag;
use crate::{Keyed, Merge};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// An observed-remove set keyed by element uid.
///
/// # Example
///
/// ```
/// use shoplist_crdt::{Keyed, Merge, ORSet};
///
/// #[derive(Clone)]
/// struct Entry(String);
///
/// impl Keyed for Entry {
///     fn uid(&self) -> &str {
///         &self.0
///     }
/// }
///
/// impl Merge for Entry {
///     fn merge(&mut self, _other: &Self) {}
/// }
///
/// let mut a = ORSet::new();
/// a.add(Entry("milk".into()));
/// let mut b = a.clone();
///
/// a.remove("milk");
/// b.add(Entry("milk".into())); // concurrent re-add
///
/// a.merge(&b);
/// assert!(a.contains("milk"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ORSet<T> {
    elements: BTreeMap<String, T>,
    add_tags: BTreeMap<String, BTreeSet<Tag>>,
    remove_tags: BTreeMap<String, BTreeSet<Tag>>,
}

impl<T> Default for ORSet<T> {
    fn default() -> Self {
        Self {
            elements: BTreeMap::new(),
            add_tags: BTreeMap::new(),
            remove_tags: BTreeMap::new(),
        }
    }
}

impl<T> ORSet<T> {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if `uid` is observably present.
    #[must_use]
    pub fn contains(&self, uid: &str) -> bool {
        let Some(added) = self.add_tags.get(uid) else {
            return false;
        };
        match self.remove_tags.get(uid) {
            None => !added.is_empty(),
            Some(removed) => added.iter().any(|tag| !removed.contains(tag)),
        }
    }

    /// Returns the payload for `uid` if it is present.
    #[must_use]
    pub fn get(&self, uid: &str) -> Option<&T> {
        if self.contains(uid) {
            self.elements.get(uid)
        } else {
            None
        }
    }

    /// Returns a mutable payload for `uid` if it is present.
    ///
    /// Mutating a payload in place does not mint a tag; use [`ORSet::add`]
    /// when the change must be visible as a new add.
    pub fn get_mut(&mut self, uid: &str) -> Option<&mut T> {
        if self.contains(uid) {
            self.elements.get_mut(uid)
        } else {
            None
        }
    }

    /// Iterates over present payloads in uid order.
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.elements
            .iter()
            .filter(|(uid, _)| self.contains(uid))
            .map(|(_, elem)| elem)
    }

    /// Iterates over present uids in order.
    pub fn uids(&self) -> impl Iterator<Item = &str> {
        self.add_tags
            .keys()
            .filter(|uid| self.contains(uid))
            .map(String::as_str)
    }

    /// Number of present elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.uids().count()
    }

    /// Returns true if no element is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tags currently witnessing an add of `uid` (including tombstoned ones).
    #[must_use]
    pub fn add_tags(&self, uid: &str) -> Option<&BTreeSet<Tag>> {
        self.add_tags.get(uid)
    }

    /// Tags of `uid` observed as removed.
    #[must_use]
    pub fn remove_tags(&self, uid: &str) -> Option<&BTreeSet<Tag>> {
        self.remove_tags.get(uid)
    }

    /// Tombstones every add tag observed so far for `uid`.
    ///
    /// Removing an unknown uid is a no-op.
    pub fn remove(&mut self, uid: &str) {
        let Some(added) = self.add_tags.get(uid) else {
            return;
        };
        if added.is_empty() {
            return;
        }
        self.remove_tags
            .entry(uid.to_string())
            .or_default()
            .extend(added.iter().copied());
    }
}

impl<T: Keyed> ORSet<T> {
    /// Stores `elem` (overwriting any payload with the same uid) and mints a
    /// fresh add tag for it. Returns the tag.
    pub fn add(&mut self, elem: T) -> Tag {
        let tag = Tag::new();
        self.add_with_tag(elem, tag);
        tag
    }

    /// Stores `elem` under an explicit tag.
    pub fn add_with_tag(&mut self, elem: T, tag: Tag) {
        let uid = elem.uid().to_string();
        self.add_tags.entry(uid.clone()).or_default().insert(tag);
        self.elements.insert(uid, elem);
    }
}

impl<T: Merge + Clone> Merge for ORSet<T> {
    fn merge(&mut self, other: &Self) {
        for (uid, theirs) in &other.elements {
            match self.elements.get_mut(uid) {
                Some(ours) => ours.merge(theirs),
                None => {
                    self.elements.insert(uid.clone(), theirs.clone());
                }
            }
        }

        for (uid, tags) in &other.add_tags {
            self.add_tags
                .entry(uid.clone())
                .or_default()
                .extend(tags.iter().copied());
        }

        for (uid, tags) in &other.remove_tags {
            self.remove_tags
                .entry(uid.clone())
                .or_default()
                .extend(tags.iter().copied());
        }
    }
}
