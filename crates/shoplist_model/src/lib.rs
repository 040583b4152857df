//! # Shoplist Model
//!
//! The shopping list aggregate, composed from the CRDTs in `shoplist_crdt`.
//!
//! - [`ShoppingList`] owns an add-wins set of items and a replicated name
//! - [`ShoppingItem`] carries desired and bought quantities as counters
//!
//! Mutations are local. Convergence across replicas comes from
//! [`Merge`](shoplist_crdt::Merge), never from the precondition checks
//! that [`ShoppingList::add`] and [`ShoppingList::update`] perform.
//!
//! ```
//! use shoplist_crdt::Merge;
//! use shoplist_model::{ShoppingItem, ShoppingList};
//!
//! let mut a = ShoppingList::new("L", "Weekly");
//! a.add(ShoppingItem::new("milk", "Milk", "n0", 2, 0)).unwrap();
//!
//! let mut b = ShoppingList::empty("L");
//! b.merge(&a);
//! assert_eq!(b.get_item("milk").unwrap().desired_quantity(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod item;
mod list;

pub use error::{ModelError, ModelResult};
pub use item::ShoppingItem;
pub use list::ShoppingList;
