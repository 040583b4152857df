//! Append-only log backend for persistent storage.

use crate::backend::KvBackend;
use crate::error::{StorageError, StorageResult};
use crate::record::{self, RecordType};
use fs2::FileExt;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Logs smaller than this are never compacted automatically.
const AUTO_COMPACT_MIN_BYTES: u64 = 1024 * 1024;

/// Location of a live value inside the log.
#[derive(Debug, Clone, Copy)]
struct ValueLoc {
    record_len: u64,
    value_offset: u64,
    value_len: usize,
}

/// A file-based key/value backend.
///
/// Every write appends one record to a log; an in-memory index maps each key
/// to its latest value. The index is rebuilt by scanning the log on open.
///
/// # Recovery
///
/// - A record cut short by a crash (torn tail) is truncated away
/// - A record that fails its checksum is fatal: the store refuses to open
///
/// # Locking
///
/// An exclusive advisory lock on `<path>.lock` is held for the lifetime of
/// the backend, so two replicas can never share a data file.
///
/// # Example
///
/// ```no_run
/// use shoplist_storage::{FileBackend, KvBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("node0.log")).unwrap();
/// backend.put(b"list-1", b"snapshot").unwrap();
/// backend.flush().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: RwLock<File>,
    index: BTreeMap<Vec<u8>, ValueLoc>,
    size: u64,
    garbage: u64,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a log at `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// - [`StorageError::Locked`] if another process holds the lock
    /// - [`StorageError::ChecksumMismatch`] or [`StorageError::Corrupted`] on a
    ///   damaged record
    /// - I/O errors
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let lock_path = lock_path(path);
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked { path: lock_path });
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let mut data = Vec::new();
        file.read_to_end(&mut data)?;

        let (index, valid_len, garbage) = scan(&data)?;
        let file_len = data.len() as u64;
        if valid_len < file_len {
            warn!(
                path = %path.display(),
                torn_bytes = file_len - valid_len,
                "truncating torn tail record"
            );
            file.set_len(valid_len)?;
            file.sync_all()?;
        }

        debug!(
            path = %path.display(),
            keys = index.len(),
            bytes = valid_len,
            "opened log"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file: RwLock::new(file),
            index,
            size: valid_len,
            garbage,
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current log size in bytes.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes in the log that no longer back a live value.
    #[must_use]
    pub fn garbage(&self) -> u64 {
        self.garbage
    }

    /// Rewrites the log so it holds exactly one record per live key.
    ///
    /// The new log is written beside the old one, synced, then renamed over it.
    ///
    /// # Errors
    ///
    /// I/O errors. On failure the old log stays in place.
    pub fn compact(&mut self) -> StorageResult<()> {
        let tmp_path = self.path.with_extension("compact");

        let mut buffer = Vec::new();
        let mut new_index = BTreeMap::new();
        for (key, loc) in &self.index {
            let value = self.read_value(loc)?;
            let record_offset = buffer.len() as u64;
            record::encode_into(&mut buffer, RecordType::Put, key, &value)?;
            let record_len = buffer.len() as u64 - record_offset;
            new_index.insert(
                key.clone(),
                ValueLoc {
                    record_len,
                    value_offset: record_offset + (record::HEADER_SIZE + key.len()) as u64,
                    value_len: value.len(),
                },
            );
        }

        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&buffer)?;
            tmp.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let before = self.size;
        *self.file.write() = file;
        self.index = new_index;
        self.size = buffer.len() as u64;
        self.garbage = 0;

        debug!(
            path = %self.path.display(),
            before,
            after = self.size,
            "compacted log"
        );
        Ok(())
    }

    fn maybe_compact(&mut self) -> StorageResult<()> {
        let live = self.size - self.garbage;
        if self.size >= AUTO_COMPACT_MIN_BYTES && self.garbage > live {
            self.compact()?;
        }
        Ok(())
    }

    fn read_value(&self, loc: &ValueLoc) -> StorageResult<Vec<u8>> {
        let mut buffer = vec![0u8; loc.value_len];
        if loc.value_len == 0 {
            return Ok(buffer);
        }
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(loc.value_offset))?;
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, bytes: &[u8]) -> StorageResult<u64> {
        let mut file = self.file.write();
        let offset = self.size;
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(bytes)?;
        self.size += bytes.len() as u64;
        Ok(offset)
    }

    fn retire(&mut self, key: &[u8]) -> bool {
        match self.index.remove(key) {
            Some(old) => {
                self.garbage += old.record_len;
                true
            }
            None => false,
        }
    }

    fn index_put(&mut self, key: &[u8], record_offset: u64, value_len: usize) {
        self.retire(key);
        let record_len = (record::HEADER_SIZE + key.len() + value_len + record::CRC_SIZE) as u64;
        self.index.insert(
            key.to_vec(),
            ValueLoc {
                record_len,
                value_offset: record_offset + (record::HEADER_SIZE + key.len()) as u64,
                value_len,
            },
        );
    }
}

impl KvBackend for FileBackend {
    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        match self.index.get(key) {
            Some(loc) => self.read_value(loc).map(Some),
            None => Ok(None),
        }
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> StorageResult<()> {
        let mut buffer = Vec::new();
        record::encode_into(&mut buffer, RecordType::Put, key, value)?;
        let offset = self.append(&buffer)?;
        self.index_put(key, offset, value.len());
        self.maybe_compact()
    }

    fn delete(&mut self, key: &[u8]) -> StorageResult<bool> {
        if !self.index.contains_key(key) {
            return Ok(false);
        }
        let mut buffer = Vec::new();
        record::encode_into(&mut buffer, RecordType::Delete, key, &[])?;
        self.append(&buffer)?;
        self.retire(key);
        // The tombstone itself is garbage once written
        self.garbage += buffer.len() as u64;
        self.maybe_compact()?;
        Ok(true)
    }

    fn keys(&self) -> StorageResult<Vec<Vec<u8>>> {
        Ok(self.index.keys().cloned().collect())
    }

    fn flush(&mut self) -> StorageResult<()> {
        let mut file = self.file.write();
        file.flush()?;
        file.sync_data()?;
        Ok(())
    }

    fn put_many(&mut self, entries: &[(Vec<u8>, Vec<u8>)]) -> StorageResult<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut buffer = Vec::new();
        let mut offsets = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            offsets.push(buffer.len() as u64);
            record::encode_into(&mut buffer, RecordType::Put, key, value)?;
        }
        let base = self.append(&buffer)?;
        for ((key, value), offset) in entries.iter().zip(offsets) {
            self.index_put(key, base + offset, value.len());
        }
        self.maybe_compact()
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

/// Replays `data`, returning the index, the length of the valid prefix and
/// the number of garbage bytes.
fn scan(data: &[u8]) -> StorageResult<(BTreeMap<Vec<u8>, ValueLoc>, u64, u64)> {
    let mut index: BTreeMap<Vec<u8>, ValueLoc> = BTreeMap::new();
    let mut garbage = 0u64;
    let mut pos = 0usize;

    while pos < data.len() {
        let offset = pos as u64;
        let Some(rec) = record::decode(&data[pos..], offset)? else {
            break;
        };
        let record_len = rec.encoded_len() as u64;
        match rec.kind {
            RecordType::Put => {
                let loc = ValueLoc {
                    record_len,
                    value_offset: offset + rec.value_offset() as u64,
                    value_len: rec.value.len(),
                };
                if let Some(old) = index.insert(rec.key.to_vec(), loc) {
                    garbage += old.record_len;
                }
            }
            RecordType::Delete => {
                if let Some(old) = index.remove(rec.key) {
                    garbage += old.record_len;
                }
                garbage += record_len;
            }
        }
        pos += rec.encoded_len();
    }

    Ok((index, pos as u64, garbage))
}
