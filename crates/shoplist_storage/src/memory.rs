//! In-memory key/value backend.

use crate::backend::KvBackend;
use crate::error::StorageResult;
use std::collections::BTreeMap;

/// An in-memory backend.
///
/// Suitable for unit tests, integration tests and replicas started without
/// a data path. Nothing survives the process.
///
/// # Example
///
/// ```rust
/// use shoplist_storage::{InMemoryBackend, KvBackend};
///
/// let mut backend = InMemoryBackend::new();
/// backend.put(b"list-1", b"snapshot").unwrap();
/// assert_eq!(backend.get(b"list-1").unwrap().as_deref(), Some(&b"snapshot"[..]));
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
}

impl InMemoryBackend {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no key is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl KvBackend for InMemoryBackend {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn keys(&self) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self.entries.keys().cloned().collect())
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }
}
