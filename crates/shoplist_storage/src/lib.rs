//! # Shoplist Storage
//!
//! Persistence for shoplist replicas.
//!
//! Two layers:
//!
//! - [`KvBackend`]: an **opaque** byte-level key/value store. Backends never
//!   interpret what they store.
//! - [`ListStore`]: the typed list persistence contract (write, read, delete,
//!   read-all and their batch variants) over any backend. Lists are stored as
//!   CBOR snapshots keyed by uid.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and replicas without a data path
//! - [`FileBackend`] - Append-only, checksummed log with crash recovery
//!
//! ## Example
//!
//! ```rust
//! use shoplist_model::ShoppingList;
//! use shoplist_storage::ListStore;
//!
//! let mut store = ListStore::in_memory();
//! store.write(&ShoppingList::new("L", "Weekly")).unwrap();
//! assert_eq!(store.list_ids().unwrap(), vec!["L"]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod list_store;
mod memory;
pub mod record;

pub use backend::KvBackend;
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use list_store::ListStore;
pub use memory::InMemoryBackend;
