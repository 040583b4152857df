//! Typed persistence for shopping lists.

use crate::backend::KvBackend;
use crate::error::{StorageError, StorageResult};
use crate::file::FileBackend;
use crate::memory::InMemoryBackend;
use shoplist_codec::{from_cbor, to_cbor};
use shoplist_crdt::Merge;
use shoplist_model::ShoppingList;
use std::path::Path;
use tracing::trace;

/// A store of shopping list snapshots keyed by list uid.
///
/// Each list is stored as one opaque CBOR snapshot. The store never looks
/// inside a snapshot except in [`ListStore::merge`], which is the
/// read-merge-write step every replica performs on incoming state.
pub struct ListStore {
    backend: Box<dyn KvBackend>,
}

impl std::fmt::Debug for ListStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListStore").finish_non_exhaustive()
    }
}

impl ListStore {
    /// Opens (or creates) a durable store at `path`.
    ///
    /// # Errors
    ///
    /// See [`FileBackend::open`].
    pub fn open(path: &Path) -> StorageResult<Self> {
        Ok(Self::with_backend(Box::new(FileBackend::open(path)?)))
    }

    /// Creates a store that lives in memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_backend(Box::new(InMemoryBackend::new()))
    }

    /// Wraps an arbitrary backend.
    #[must_use]
    pub fn with_backend(backend: Box<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Stores `list`, replacing any snapshot with the same uid.
    ///
    /// # Errors
    ///
    /// Encoding or backend write errors.
    pub fn write(&mut self, list: &ShoppingList) -> StorageResult<()> {
        let bytes = to_cbor(list)?;
        self.backend.put(list.uid().as_bytes(), &bytes)?;
        self.backend.flush()?;
        trace!(list = list.uid(), bytes = bytes.len(), "wrote list");
        Ok(())
    }

    /// Loads the list with `uid`.
    ///
    /// # Errors
    ///
    /// Backend read errors or an undecodable snapshot.
    pub fn read(&self, uid: &str) -> StorageResult<Option<ShoppingList>> {
        match self.backend.get(uid.as_bytes())? {
            Some(bytes) => Ok(Some(from_cbor(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Removes the list with `uid`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Backend write errors.
    pub fn delete(&mut self, uid: &str) -> StorageResult<bool> {
        let existed = self.backend.delete(uid.as_bytes())?;
        self.backend.flush()?;
        Ok(existed)
    }

    /// Merges `incoming` into the stored copy (or an empty list) and writes
    /// the result back. Returns the merged list.
    ///
    /// Nothing is written when the stored copy already contains `incoming`.
    ///
    /// # Errors
    ///
    /// Read, decode or write errors.
    pub fn merge(&mut self, incoming: &ShoppingList) -> StorageResult<ShoppingList> {
        let stored = self.read(incoming.uid())?;
        let mut merged = stored
            .clone()
            .unwrap_or_else(|| ShoppingList::empty(incoming.uid()));
        merged.merge(incoming);
        if stored.as_ref() == Some(&merged) {
            trace!(list = incoming.uid(), "merge changed nothing");
            return Ok(merged);
        }
        self.write(&merged)?;
        Ok(merged)
    }

    /// Loads every stored list in uid order.
    ///
    /// # Errors
    ///
    /// Backend read errors or an undecodable snapshot.
    pub fn read_all(&self) -> StorageResult<Vec<ShoppingList>> {
        let mut lists = Vec::new();
        for key in self.backend.keys()? {
            if let Some(bytes) = self.backend.get(&key)? {
                lists.push(from_cbor(&bytes)?);
            }
        }
        Ok(lists)
    }

    /// Stores several lists in one batch.
    ///
    /// # Errors
    ///
    /// Encoding or backend write errors.
    pub fn write_many(&mut self, lists: &[ShoppingList]) -> StorageResult<()> {
        let entries = lists
            .iter()
            .map(|list| Ok((list.uid().as_bytes().to_vec(), to_cbor(list)?)))
            .collect::<StorageResult<Vec<_>>>()?;
        self.backend.put_many(&entries)?;
        self.backend.flush()
    }

    /// Loads several lists. The result is positional: entry `i` is the list
    /// for `uids[i]`, or `None` if it is not stored.
    ///
    /// # Errors
    ///
    /// Backend read errors or an undecodable snapshot.
    pub fn read_many<S: AsRef<str>>(&self, uids: &[S]) -> StorageResult<Vec<Option<ShoppingList>>> {
        uids.iter().map(|uid| self.read(uid.as_ref())).collect()
    }

    /// Removes several lists. Returns how many existed.
    ///
    /// # Errors
    ///
    /// Backend write errors.
    pub fn delete_many<S: AsRef<str>>(&mut self, uids: &[S]) -> StorageResult<usize> {
        let keys: Vec<Vec<u8>> = uids
            .iter()
            .map(|uid| uid.as_ref().as_bytes().to_vec())
            .collect();
        let removed = self.backend.delete_many(&keys)?;
        self.backend.flush()?;
        Ok(removed)
    }

    /// Uids of every stored list in order.
    ///
    /// # Errors
    ///
    /// Backend errors or a key that is not valid UTF-8.
    pub fn list_ids(&self) -> StorageResult<Vec<String>> {
        self.backend
            .keys()?
            .into_iter()
            .map(|key| {
                String::from_utf8(key)
                    .map_err(|e| StorageError::corrupted(format!("non UTF-8 list key: {e}")))
            })
            .collect()
    }

    /// Number of stored lists.
    ///
    /// # Errors
    ///
    /// Backend errors.
    pub fn len(&self) -> StorageResult<usize> {
        Ok(self.backend.keys()?.len())
    }

    /// Returns true if no list is stored.
    ///
    /// # Errors
    ///
    /// Backend errors.
    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shoplist_model::ShoppingItem;

    fn list(uid: &str, items: &[(&str, i64)]) -> ShoppingList {
        let mut list = ShoppingList::new(uid, format!("list {uid}"));
        for (item, desired) in items {
            list.add(ShoppingItem::new(*item, *item, "n0", *desired, 0))
                .unwrap();
        }
        list
    }

    #[test]
    fn write_read_delete() {
        let mut store = ListStore::in_memory();
        let l = list("L", &[("milk", 2)]);

        store.write(&l).unwrap();
        assert_eq!(store.read("L").unwrap(), Some(l));
        assert!(store.read("missing").unwrap().is_none());

        assert!(store.delete("L").unwrap());
        assert!(!store.delete("L").unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn merge_into_empty_stores_incoming() {
        let mut store = ListStore::in_memory();
        let l = list("L", &[("milk", 2)]);

        let merged = store.merge(&l).unwrap();
        assert_eq!(merged, l);
        assert_eq!(store.read("L").unwrap(), Some(l));
    }

    #[test]
    fn merge_combines_with_stored_copy() {
        let mut store = ListStore::in_memory();
        let base = list("L", &[("milk", 2)]);
        store.write(&base).unwrap();

        let mut remote = base.clone();
        remote
            .add(ShoppingItem::new("eggs", "eggs", "n1", 6, 0))
            .unwrap();
        let mut local = base;
        local.remove("milk");
        store.write(&local).unwrap();

        let merged = store.merge(&remote).unwrap();
        assert!(!merged.contains("milk"));
        assert!(merged.contains("eggs"));
    }

    /// Counts puts so tests can tell whether a write happened.
    struct CountingBackend {
        inner: InMemoryBackend,
        puts: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl KvBackend for CountingBackend {
        fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
            self.inner.get(key)
        }

        fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
            self.puts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.put(key, value)
        }

        fn delete(&mut self, key: &[u8]) -> StorageResult<bool> {
            self.inner.delete(key)
        }

        fn keys(&self) -> StorageResult<Vec<Vec<u8>>> {
            self.inner.keys()
        }

        fn flush(&mut self) -> StorageResult<()> {
            self.inner.flush()
        }
    }

    #[test]
    fn merge_without_news_skips_the_write() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let puts = Arc::new(AtomicUsize::new(0));
        let mut store = ListStore::with_backend(Box::new(CountingBackend {
            inner: InMemoryBackend::new(),
            puts: Arc::clone(&puts),
        }));
        let l = list("L", &[("milk", 2)]);

        store.merge(&l).unwrap();
        assert_eq!(puts.load(Ordering::SeqCst), 1);

        // Same snapshot again, and an older subset of it
        assert_eq!(store.merge(&l).unwrap(), l);
        store.merge(&ShoppingList::empty("L")).unwrap();
        assert_eq!(puts.load(Ordering::SeqCst), 1);

        let mut newer = l.clone();
        newer
            .add(ShoppingItem::new("eggs", "eggs", "n1", 6, 0))
            .unwrap();
        store.merge(&newer).unwrap();
        assert_eq!(puts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn batch_operations() {
        let mut store = ListStore::in_memory();
        store
            .write_many(&[list("a", &[]), list("b", &[("x", 1)]), list("c", &[])])
            .unwrap();

        assert_eq!(store.list_ids().unwrap(), vec!["a", "b", "c"]);

        let found = store.read_many(&["b", "zzz", "a"]).unwrap();
        assert_eq!(found.len(), 3);
        assert_eq!(found[0].as_ref().map(ShoppingList::uid), Some("b"));
        assert!(found[1].is_none());
        assert_eq!(found[2].as_ref().map(ShoppingList::uid), Some("a"));

        assert_eq!(store.delete_many(&["a", "c", "nope"]).unwrap(), 2);
        let remaining: Vec<String> = store
            .read_all()
            .unwrap()
            .iter()
            .map(|l| l.uid().to_string())
            .collect();
        assert_eq!(remaining, vec!["b"]);
    }

    #[test]
    fn undecodable_snapshot_is_an_error() {
        let mut backend = InMemoryBackend::new();
        backend.put(b"L", &[0xff, 0x00]).unwrap();
        let store = ListStore::with_backend(Box::new(backend));
        assert!(matches!(store.read("L"), Err(StorageError::Codec(_))));
    }
}
