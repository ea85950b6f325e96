//! File-backed store: an in-memory working set persisted as a snapshot.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::memory::MemoryStore;
use super::snapshot::{self, STORE_MAGIC};
use super::KvStore;
use crate::error::Result;

/// A [`KvStore`] loaded from and flushed to a single snapshot file.
///
/// Writes land in memory; [`FileStore::flush`] persists them. Dropping a
/// store with unflushed writes flushes it, logging any failure.
pub struct FileStore {
    path: PathBuf,
    inner: MemoryStore,
    dirty: bool,
}

impl FileStore {
    /// Open the snapshot at `path`, starting empty if it does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = snapshot::load(&path, STORE_MAGIC)?.unwrap_or_default();
        debug!(path = %path.display(), "Opened file store");
        Ok(Self {
            path,
            inner,
            dirty: false,
        })
    }

    /// Persist pending writes.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let count = self.inner.len()? as u64;
        snapshot::save(&self.path, STORE_MAGIC, &self.inner, count)?;
        self.dirty = false;
        Ok(())
    }
}

impl KvStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.dirty = true;
        self.inner.put(key, value)
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.dirty = true;
        self.inner.delete(key)
    }

    fn exists(&self, key: &str) -> Result<bool> {
        self.inner.exists(key)
    }

    fn scan(&self, from: &str, to: Option<&str>, limit: usize) -> Result<Vec<(String, Vec<u8>)>> {
        self.inner.scan(from, to, limit)
    }

    fn is_empty(&self) -> Result<bool> {
        KvStore::is_empty(&self.inner)
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }
}

impl Drop for FileStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to flush store on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::TypedStore;

    #[test]
    fn test_writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        {
            let mut s = FileStore::open(&path).unwrap();
            s.save("version", "0.1").unwrap();
            s.flush().unwrap();
        }
        let s = FileStore::open(&path).unwrap();
        assert_eq!(s.load_string("version").unwrap(), "0.1");
    }

    #[test]
    fn test_drop_flushes_pending_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        {
            let mut s = FileStore::open(&path).unwrap();
            s.save("k", &7u64).unwrap();
        }
        let s = FileStore::open(&path).unwrap();
        assert_eq!(s.load::<u64>("k").unwrap(), Some(7));
    }

    #[test]
    fn test_clean_store_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.bin");
        let mut s = FileStore::open(&path).unwrap();
        s.flush().unwrap();
        assert!(!path.exists());
    }
}
