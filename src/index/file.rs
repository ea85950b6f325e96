//! File-backed index: a [`MemoryIndex`] persisted as a snapshot.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::memory::MemoryIndex;
use super::query::Query;
use super::{IndexEntry, InvertedIndex};
use crate::error::Result;
use crate::model::ids::IndexDocId;
use crate::store::snapshot::{self, INDEX_MAGIC};

/// An [`InvertedIndex`] loaded from and flushed to a snapshot file.
pub struct FileIndex {
    path: PathBuf,
    inner: MemoryIndex,
    dirty: bool,
}

impl FileIndex {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let inner = snapshot::load(&path, INDEX_MAGIC)?.unwrap_or_default();
        debug!(path = %path.display(), "Opened file index");
        Ok(Self {
            path,
            inner,
            dirty: false,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let count = self.inner.size()? as u64;
        snapshot::save(&self.path, INDEX_MAGIC, &self.inner, count)?;
        self.dirty = false;
        Ok(())
    }
}

impl InvertedIndex for FileIndex {
    fn add_entry(&mut self, entry: &IndexEntry) -> Result<IndexDocId> {
        self.dirty = true;
        self.inner.add_entry(entry)
    }

    fn add_label(&mut self, doc: IndexDocId, label: &str) -> Result<()> {
        self.dirty = true;
        self.inner.add_label(doc, label)
    }

    fn remove_label(&mut self, doc: IndexDocId, label: &str) -> Result<()> {
        self.dirty = true;
        self.inner.remove_label(doc, label)
    }

    fn run_query(
        &self,
        query: &Query,
        after: Option<IndexDocId>,
        limit: usize,
    ) -> Result<Vec<IndexDocId>> {
        self.inner.run_query(query, after, limit)
    }

    fn size(&self) -> Result<usize> {
        self.inner.size()
    }
}

impl Drop for FileIndex {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(path = %self.path.display(), error = %e, "Failed to flush index on drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.bin");
        let id = {
            let mut index = FileIndex::open(&path).unwrap();
            let mut e = IndexEntry::new();
            e.add_string("body", "hello bob");
            let id = index.add_entry(&e).unwrap();
            index.add_label(id, "inbox").unwrap();
            id
        };
        let index = FileIndex::open(&path).unwrap();
        let q = Query::parse_default("hello ~inbox").unwrap();
        assert_eq!(index.run_query(&q, None, 10).unwrap(), vec![id]);
    }
}
