//! Single-file key-value store backed by an append-only log
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("SMT_KVS\0")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - live_count: 8 bytes (u64 LE, refreshed on sync)
//!   - reserved: 40 bytes
//!
//! [RECORDS: variable]
//!   - tag: 1 byte (1 = set, 2 = delete)
//!   - key_len: 4 bytes (u32 LE)
//!   - value_len: 4 bytes (u32 LE, 0 for deletes)
//!   - key, value
//! ```
//!
//! Opening a file replays the log into an in-memory index. A torn record at
//! the tail (from a crash mid-append) is dropped and overwritten by the next
//! write.

use super::KvStore;
use crate::{Error, Result, MAGIC, VERSION};
use async_trait::async_trait;
use log::{debug, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

const HEADER_SIZE: u64 = 64;
const RECORD_HEADER_SIZE: u64 = 9;

/// Type tag for log records
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RecordType {
    Set,
    Delete,
}

impl RecordType {
    fn as_byte(&self) -> u8 {
        match self {
            RecordType::Set => 1,
            RecordType::Delete => 2,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(RecordType::Set),
            2 => Some(RecordType::Delete),
            _ => None,
        }
    }
}

/// Location of a live value in the file
#[derive(Clone, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

/// A key-value store backed by a single append-only file
pub struct FileStore {
    /// Path to the store file
    path: PathBuf,
    /// The file handle
    file: RwLock<File>,
    /// Key → value location
    index: RwLock<HashMap<Vec<u8>, IndexEntry>>,
    /// Current append position
    write_offset: RwLock<u64>,
}

impl FileStore {
    /// Create a new store file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;

        file.write_all(&Self::header(0))?;
        file.sync_all()?;

        Ok(FileStore {
            path,
            file: RwLock::new(file),
            index: RwLock::new(HashMap::new()),
            write_offset: RwLock::new(HEADER_SIZE),
        })
    }

    /// Open an existing store file and replay its log
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)
            .map_err(|_| Error::InvalidFile("Truncated header".into()))?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let version = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let file_len = file.seek(SeekFrom::End(0))?;
        file.seek(SeekFrom::Start(HEADER_SIZE))?;

        let mut index = HashMap::new();
        let mut offset = HEADER_SIZE;
        while offset < file_len {
            let mut record_header = [0u8; RECORD_HEADER_SIZE as usize];
            if offset + RECORD_HEADER_SIZE > file_len {
                warn!("Dropping torn record header at offset {}", offset);
                break;
            }
            file.read_exact(&mut record_header)?;

            let record_type = RecordType::from_byte(record_header[0]).ok_or_else(|| {
                Error::Corruption(format!(
                    "Invalid record type {} at offset {}",
                    record_header[0], offset
                ))
            })?;
            let key_len = u32::from_le_bytes([
                record_header[1],
                record_header[2],
                record_header[3],
                record_header[4],
            ]) as u64;
            let value_len = u32::from_le_bytes([
                record_header[5],
                record_header[6],
                record_header[7],
                record_header[8],
            ]);

            let end = offset + RECORD_HEADER_SIZE + key_len + value_len as u64;
            if end > file_len {
                warn!("Dropping torn record at offset {}", offset);
                break;
            }

            let mut key = vec![0u8; key_len as usize];
            file.read_exact(&mut key)?;
            let value_offset = offset + RECORD_HEADER_SIZE + key_len;
            file.seek(SeekFrom::Start(end))?;

            match record_type {
                RecordType::Set => {
                    index.insert(
                        key,
                        IndexEntry {
                            offset: value_offset,
                            size: value_len,
                        },
                    );
                }
                RecordType::Delete => {
                    index.remove(&key);
                }
            }
            offset = end;
        }

        if offset < file_len {
            file.set_len(offset)?;
        }

        debug!(
            "Opened {} with {} live keys ({} bytes of log)",
            path.display(),
            index.len(),
            offset
        );

        Ok(FileStore {
            path,
            file: RwLock::new(file),
            index: RwLock::new(index),
            write_offset: RwLock::new(offset),
        })
    }

    /// Open or create a store file
    pub fn open_or_create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }

    /// Check if a key exists
    pub fn contains(&self, key: &[u8]) -> bool {
        self.index.read().contains_key(key)
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current size of the log, including superseded records
    pub fn log_size(&self) -> u64 {
        *self.write_offset.read()
    }

    /// Read the value stored under `key`
    pub fn read(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entry = match self.index.read().get(key).cloned() {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(entry.offset))?;
        let mut data = vec![0u8; entry.size as usize];
        file.read_exact(&mut data)?;
        Ok(Some(data))
    }

    /// Append a set record
    pub fn write(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let value_offset = self.append(RecordType::Set, key, value)?;
        self.index.write().insert(
            key.to_vec(),
            IndexEntry {
                offset: value_offset,
                size: value.len() as u32,
            },
        );
        Ok(())
    }

    /// Append a delete record if the key is live
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        if !self.contains(key) {
            return Ok(());
        }
        self.append(RecordType::Delete, key, &[])?;
        self.index.write().remove(key);
        Ok(())
    }

    /// Flush the header and file contents to disk
    pub fn sync(&self) -> Result<()> {
        let live = self.index.read().len() as u64;
        let mut file = self.file.write();
        file.seek(SeekFrom::Start(16))?;
        file.write_all(&live.to_le_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    /// Rewrite the log so it only holds live records
    pub fn compact(&self) -> Result<()> {
        let mut keys: Vec<Vec<u8>> = self.index.read().keys().cloned().collect();
        keys.sort();

        let mut live = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.read(&key)? {
                live.push((key, value));
            }
        }

        let tmp_path = self.path.with_extension("compact");
        let mut tmp = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp_path)?;
        tmp.write_all(&Self::header(live.len() as u64))?;

        let mut index = HashMap::with_capacity(live.len());
        let mut offset = HEADER_SIZE;
        for (key, value) in live {
            tmp.write_all(&Self::record(RecordType::Set, &key, &value))?;
            let value_offset = offset + RECORD_HEADER_SIZE + key.len() as u64;
            offset = value_offset + value.len() as u64;
            index.insert(
                key,
                IndexEntry {
                    offset: value_offset,
                    size: value.len() as u32,
                },
            );
        }
        tmp.sync_all()?;
        std::fs::rename(&tmp_path, &self.path)?;

        let before = *self.write_offset.read();
        *self.file.write() = tmp;
        *self.index.write() = index;
        *self.write_offset.write() = offset;
        debug!("Compacted {}: {} -> {} bytes", self.path.display(), before, offset);
        Ok(())
    }

    fn append(&self, record_type: RecordType, key: &[u8], value: &[u8]) -> Result<u64> {
        let record = Self::record(record_type, key, value);

        let mut write_offset = self.write_offset.write();
        let offset = *write_offset;

        let mut file = self.file.write();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&record)?;

        *write_offset = offset + record.len() as u64;
        Ok(offset + RECORD_HEADER_SIZE + key.len() as u64)
    }

    fn header(live_count: u64) -> [u8; HEADER_SIZE as usize] {
        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        // flags: 0
        header[16..24].copy_from_slice(&live_count.to_le_bytes());
        header
    }

    fn record(record_type: RecordType, key: &[u8], value: &[u8]) -> Vec<u8> {
        let mut record = Vec::with_capacity(RECORD_HEADER_SIZE as usize + key.len() + value.len());
        record.push(record_type.as_byte());
        record.extend_from_slice(&(key.len() as u32).to_le_bytes());
        record.extend_from_slice(&(value.len() as u32).to_le_bytes());
        record.extend_from_slice(key);
        record.extend_from_slice(value);
        record
    }
}

#[async_trait]
impl KvStore for FileStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.read(key)
    }

    async fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.write(key, value)
    }

    async fn delete(&self, key: &[u8]) -> Result<()> {
        self.remove(key)
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        // Best-effort sync on drop
        let _ = self.sync();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_and_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.smt");

        {
            let store = FileStore::create(&path).unwrap();
            assert_eq!(store.len(), 0);
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.len(), 0);
            assert_eq!(store.log_size(), HEADER_SIZE);
        }
    }

    #[test]
    fn test_rejects_foreign_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("foreign");
        std::fs::write(&path, [0xAAu8; 80]).unwrap();
        assert!(matches!(FileStore::open(&path), Err(Error::InvalidFile(_))));
    }

    #[test]
    fn test_write_read_remove() {
        let dir = tempdir().unwrap();
        let store = FileStore::create(dir.path().join("test.smt")).unwrap();

        store.write(b"alpha", b"one").unwrap();
        store.write(b"beta", b"two").unwrap();
        store.write(b"alpha", b"uno").unwrap();

        assert_eq!(store.read(b"alpha").unwrap(), Some(b"uno".to_vec()));
        assert_eq!(store.read(b"beta").unwrap(), Some(b"two".to_vec()));

        store.remove(b"beta").unwrap();
        assert_eq!(store.read(b"beta").unwrap(), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.smt");

        {
            let store = FileStore::create(&path).unwrap();
            store.write(b"kept", b"value").unwrap();
            store.write(b"gone", b"value").unwrap();
            store.remove(b"gone").unwrap();
            store.sync().unwrap();
        }

        {
            let store = FileStore::open(&path).unwrap();
            assert_eq!(store.read(b"kept").unwrap(), Some(b"value".to_vec()));
            assert_eq!(store.read(b"gone").unwrap(), None);
            assert_eq!(store.len(), 1);
        }
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.smt");

        {
            let store = FileStore::create(&path).unwrap();
            store.write(b"complete", b"record").unwrap();
        }

        // Simulate a crash in the middle of an append
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[1u8, 10, 0, 0, 0, 4, 0, 0, 0, b'p']).unwrap();
        }

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.len(), 1);
        store.write(b"next", b"write").unwrap();
        drop(store);

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.read(b"complete").unwrap(), Some(b"record".to_vec()));
        assert_eq!(store.read(b"next").unwrap(), Some(b"write".to_vec()));
    }

    #[test]
    fn test_compact() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.smt");
        let store = FileStore::create(&path).unwrap();

        for i in 0..20u8 {
            store.write(b"churn", &[i; 16]).unwrap();
        }
        store.write(b"other", b"x").unwrap();
        let before = store.log_size();

        store.compact().unwrap();
        assert!(store.log_size() < before);
        assert_eq!(store.read(b"churn").unwrap(), Some(vec![19u8; 16]));

        store.write(b"after", b"compaction").unwrap();
        drop(store);

        let store = FileStore::open(&path).unwrap();
        assert_eq!(store.len(), 3);
        assert_eq!(store.read(b"other").unwrap(), Some(b"x".to_vec()));
        assert_eq!(store.read(b"after").unwrap(), Some(b"compaction".to_vec()));
    }

    #[tokio::test]
    async fn test_kv_store_impl() {
        let dir = tempdir().unwrap();
        let store = FileStore::create(dir.path().join("test.smt")).unwrap();

        KvStore::set(&store, b"k", b"v").await.unwrap();
        assert_eq!(KvStore::get(&store, b"k").await.unwrap(), Some(b"v".to_vec()));
        KvStore::delete(&store, b"k").await.unwrap();
        assert_eq!(KvStore::get(&store, b"k").await.unwrap(), None);
    }
}
