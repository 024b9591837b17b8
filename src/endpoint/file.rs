//! Single-file storage endpoint
//!
//! File format:
//! ```text
//! [HEADER: 64 bytes]
//!   - magic: 8 bytes ("NESTSET\0")
//!   - version: 4 bytes (u32 LE)
//!   - flags: 4 bytes
//!   - object_count: 8 bytes (u64 LE)
//!   - index_offset: 8 bytes (u64 LE)
//!   - reserved: 32 bytes
//!
//! [OBJECTS: variable]
//!   - stored frames, concatenated
//!
//! [INDEX: variable]
//!   - sorted array of (fingerprint, offset, size) entries
//!
//! [OBJECTS, INDEX, ...]
//!   - later syncs append more objects and a fresh index
//! ```
//!
//! Each sync writes its index after everything already in the file, then
//! repoints the header at it. Earlier indexes stay behind as dead space and
//! are never overwritten, so a crash loses only the objects appended since
//! the last [`FileEndpoint::sync`].

use super::StorageEndpoint;
use crate::model::Fingerprint;
use crate::{Error, Result, MAGIC, VERSION};
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

const HEADER_SIZE: u64 = 64;
const INDEX_ENTRY_SIZE: usize = 44; // 32 fingerprint + 8 offset + 4 size

/// Index entry for an object
#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u64,
    size: u32,
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(arr)
}

fn le_u64(bytes: &[u8]) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(arr)
}

/// The blocking object file behind a [`FileEndpoint`]
struct ObjectFile {
    path: PathBuf,
    file: Mutex<File>,
    index: RwLock<HashMap<Fingerprint, IndexEntry>>,
    write_offset: Mutex<u64>,
    /// Objects were appended since the last index write
    dirty: AtomicBool,
}

impl ObjectFile {
    fn create(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        header[0..8].copy_from_slice(MAGIC);
        header[8..12].copy_from_slice(&VERSION.to_le_bytes());
        file.write_all(&header)?;
        file.sync_all()?;

        Ok(ObjectFile {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            index: RwLock::new(HashMap::new()),
            write_offset: Mutex::new(HEADER_SIZE),
            dirty: AtomicBool::new(false),
        })
    }

    fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..8] != MAGIC {
            return Err(Error::InvalidFile("Invalid magic bytes".into()));
        }

        let version = le_u32(&header[8..12]);
        if version != VERSION {
            return Err(Error::VersionMismatch {
                expected: VERSION,
                found: version,
            });
        }

        let object_count = le_u64(&header[16..24]);
        let index_offset = le_u64(&header[24..32]);

        let mut index = HashMap::new();
        if index_offset > 0 && object_count > 0 {
            file.seek(SeekFrom::Start(index_offset))?;
            for _ in 0..object_count {
                let mut entry_buf = [0u8; INDEX_ENTRY_SIZE];
                file.read_exact(&mut entry_buf)?;

                let fingerprint = Fingerprint::from_slice(&entry_buf[0..32])
                    .ok_or_else(|| Error::InvalidFile("Truncated index entry".into()))?;
                let offset = le_u64(&entry_buf[32..40]);
                let size = le_u32(&entry_buf[40..44]);

                index.insert(fingerprint, IndexEntry { offset, size });
            }
        }

        // Append after the current index so it stays valid until the next sync
        let write_offset = file.seek(SeekFrom::End(0))?;

        debug!(path = %path.display(), objects = index.len(), "opened object file");

        Ok(ObjectFile {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            index: RwLock::new(index),
            write_offset: Mutex::new(write_offset),
            dirty: AtomicBool::new(false),
        })
    }

    fn put(&self, fingerprint: Fingerprint, data: &[u8]) -> Result<()> {
        if self.index.read().contains_key(&fingerprint) {
            return Ok(());
        }

        let size = u32::try_from(data.len())
            .map_err(|_| Error::Endpoint(format!("object too large: {} bytes", data.len())))?;

        let offset = {
            let mut write_offset = self.write_offset.lock();
            if self.index.read().contains_key(&fingerprint) {
                return Ok(());
            }
            let offset = *write_offset;

            let mut file = self.file.lock();
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(data)?;

            *write_offset = offset + size as u64;
            self.index
                .write()
                .insert(fingerprint, IndexEntry { offset, size });
            self.dirty.store(true, Ordering::SeqCst);
            offset
        };

        debug!(fingerprint = %fingerprint.short(), offset, size, "appended object");
        Ok(())
    }

    fn get(&self, fingerprint: &Fingerprint) -> Result<Option<Vec<u8>>> {
        let entry = match self.index.read().get(fingerprint).copied() {
            Some(entry) => entry,
            None => return Ok(None),
        };

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(entry.offset))?;

        let mut data = vec![0u8; entry.size as usize];
        file.read_exact(&mut data)?;
        Ok(Some(data))
    }

    fn sync(&self) -> Result<()> {
        let mut write_offset = self.write_offset.lock();
        if !self.dirty.load(Ordering::SeqCst) {
            return Ok(());
        }
        let index = self.index.read();
        let mut file = self.file.lock();

        // Sort by fingerprint for determinism
        let mut entries: Vec<_> = index.iter().collect();
        entries.sort_by_key(|(fp, _)| **fp);

        let mut buf = Vec::with_capacity(entries.len() * INDEX_ENTRY_SIZE);
        for (fingerprint, entry) in entries {
            buf.extend_from_slice(fingerprint.as_bytes());
            buf.extend_from_slice(&entry.offset.to_le_bytes());
            buf.extend_from_slice(&entry.size.to_le_bytes());
        }

        let index_offset = *write_offset;
        file.seek(SeekFrom::Start(index_offset))?;
        file.write_all(&buf)?;
        file.sync_data()?;

        // The header only moves once the new index is on disk
        file.seek(SeekFrom::Start(16))?;
        file.write_all(&(index.len() as u64).to_le_bytes())?;
        file.write_all(&index_offset.to_le_bytes())?;
        file.sync_all()?;

        *write_offset = index_offset + buf.len() as u64;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for ObjectFile {
    fn drop(&mut self) {
        if let Err(e) = self.sync() {
            warn!(path = %self.path.display(), error = %e, "failed to sync object file on drop");
        }
    }
}

/// A storage endpoint backed by a single append-only file
///
/// File I/O is blocking and runs on tokio's blocking pool. Cloning shares the
/// same open file.
#[derive(Clone)]
pub struct FileEndpoint {
    inner: Arc<ObjectFile>,
}

impl FileEndpoint {
    /// Create a new store file, truncating any existing one
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(FileEndpoint {
            inner: Arc::new(ObjectFile::create(path.as_ref())?),
        })
    }

    /// Open an existing store file
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(FileEndpoint {
            inner: Arc::new(ObjectFile::open(path.as_ref())?),
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

    /// Check if a fingerprint is stored
    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.inner.index.read().contains_key(fingerprint)
    }

    /// Get the number of objects in the store
    pub fn object_count(&self) -> usize {
        self.inner.index.read().len()
    }

    /// Flush changes and write the index to disk
    pub fn sync(&self) -> Result<()> {
        self.inner.sync()
    }

    /// Get the file path
    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

#[async_trait::async_trait]
impl StorageEndpoint for FileEndpoint {
    async fn put(&self, fingerprint: Fingerprint, data: Bytes) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || inner.put(fingerprint, &data)).await?
    }

    async fn get(&self, fingerprint: Fingerprint) -> Result<Option<Bytes>> {
        let inner = Arc::clone(&self.inner);
        let data = tokio::task::spawn_blocking(move || inner.get(&fingerprint)).await??;
        Ok(data.map(Bytes::from))
    }
}
