//! Key/value store: the point-access contract the meta-index relies on,
//! typed helpers on top of it, and two implementations.
//!
//! Keys are opaque strings ordered bytewise. There are no transactions; the
//! only conditional write is [`KvStore::put_if_absent`].

pub mod file;
pub mod memory;
pub mod snapshot;

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{ArchiveError, Result};

pub use file::FileStore;
pub use memory::MemoryStore;

/// Byte-addressed store keyed by strings.
pub trait KvStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    fn delete(&mut self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Entries with `from <= key < to` in key order, at most `limit` of them.
    /// `to = None` scans to the end of the keyspace.
    fn scan(&self, from: &str, to: Option<&str>, limit: usize) -> Result<Vec<(String, Vec<u8>)>>;

    /// Write only if the key is unset. Returns whether the write happened.
    ///
    /// Used for first-writer-wins records such as parent pointers, where a
    /// later message must not rewrite ancestry established by an earlier one.
    fn put_if_absent(&mut self, key: &str, value: Vec<u8>) -> Result<bool> {
        if self.exists(key)? {
            return Ok(false);
        }
        self.put(key, value)?;
        Ok(true)
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.scan("", None, 1)?.is_empty())
    }

    fn len(&self) -> Result<usize>;
}

/// bincode-encoded typed access over any [`KvStore`].
pub trait TypedStore: KvStore {
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(bytes) => bincode::deserialize(&bytes)
                .map(Some)
                .map_err(|e| ArchiveError::codec(key, e)),
            None => Ok(None),
        }
    }

    fn save<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let bytes = bincode::serialize(value).map_err(|e| ArchiveError::codec(key, e))?;
        self.put(key, bytes)
    }

    fn save_if_absent<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<bool> {
        let bytes = bincode::serialize(value).map_err(|e| ArchiveError::codec(key, e))?;
        self.put_if_absent(key, bytes)
    }

    /// Load a set, treating a missing key as the empty set.
    fn load_set<T: DeserializeOwned + Ord>(&self, key: &str) -> Result<BTreeSet<T>> {
        Ok(self.load(key)?.unwrap_or_default())
    }

    /// Load a string, treating a missing key as empty.
    fn load_string(&self, key: &str) -> Result<String> {
        Ok(self.load(key)?.unwrap_or_default())
    }
}

impl<S: KvStore + ?Sized> TypedStore for S {}
