//! Key/value backend trait definition.

use crate::error::StorageResult;

/// A low-level key/value backend.
///
/// Backends are **opaque byte stores**: they never interpret keys or values.
/// Everything above them (what a key means, how a value is encoded) belongs to
/// [`crate::ListStore`].
///
/// # Invariants
///
/// - `get` returns exactly the bytes last `put` under that key
/// - `delete` makes the key absent until the next `put`
/// - after `flush` returns, every completed write survives process exit
/// - `keys` returns every present key in ascending byte order
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For tests and ephemeral nodes
/// - [`super::FileBackend`] - Append-only log on disk
pub trait KvBackend: Send + Sync {
    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value cannot be read.
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()>;

    /// Removes `key`. Returns whether it was present.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn delete(&mut self, key: &[u8]) -> StorageResult<bool>;

    /// Returns every present key in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    fn keys(&self) -> StorageResult<Vec<Vec<u8>>>;

    /// Makes all completed writes durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Stores several entries.
    ///
    /// The default implementation calls [`KvBackend::put`] once per entry.
    ///
    /// # Errors
    ///
    /// Returns the first write error; earlier entries may already be stored.
    fn put_many(&mut self, entries: &[(Vec<u8>, Vec<u8>)]) -> StorageResult<()> {
        for (key, value) in entries {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Removes several keys. Returns how many were present.
    ///
    /// # Errors
    ///
    /// Returns the first write error; earlier keys may already be removed.
    fn delete_many(&mut self, keys: &[Vec<u8>]) -> StorageResult<usize> {
        let mut removed = 0;
        for key in keys {
            if self.delete(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}
