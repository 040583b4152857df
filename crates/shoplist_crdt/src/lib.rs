//! # Shoplist CRDT
//!
//! State-based convergent replicated data types used by the shopping list
//! model.
//!
//! This crate provides:
//! - [`ORSet`] - observed-remove set with add-wins semantics
//! - [`PNCounter`] - per-origin increment/decrement counter
//! - [`LwwRegister`] - last-writer-wins register ordered by `(timestamp, origin)`
//! - [`Tag`] - globally unique token minted on every OR-Set add
//!
//! ## Key Invariants
//!
//! - Operations never fail; invalid input (removing an absent element,
//!   a zero delta) is a silent no-op
//! - `merge` only grows state (set union, pointwise maximum)
//! - `merge` is commutative, associative and idempotent
//!
//! This is a pure data crate with no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod clock;
mod lww;
mod or_set;
mod pn_counter;
mod tag;

pub use clock::now_millis;
pub use lww::LwwRegister;
pub use or_set::ORSet;
pub use pn_counter::PNCounter;
pub use tag::Tag;

/// A state-based CRDT that can absorb the state of another replica.
pub trait Merge {
    /// Merges `other` into `self`.
    ///
    /// Implementations must be commutative, associative and idempotent.
    fn merge(&mut self, other: &Self);
}

/// An element with a stable identifier, as stored in an [`ORSet`].
pub trait Keyed {
    /// Returns the element's unique identifier.
    fn uid(&self) -> &str;
}
