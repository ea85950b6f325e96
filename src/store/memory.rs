//! In-memory ordered store.

use std::collections::BTreeMap;
use std::ops::Bound;

use serde::{Deserialize, Serialize};

use super::KvStore;
use crate::error::Result;

/// A [`KvStore`] over a `BTreeMap`. Used directly in tests and as the
/// working set of [`super::FileStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryStore {
    entries: BTreeMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&mut self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn scan(&self, from: &str, to: Option<&str>, limit: usize) -> Result<Vec<(String, Vec<u8>)>> {
        let upper = match to {
            Some(t) if t <= from => return Ok(Vec::new()),
            Some(t) => Bound::Excluded(t),
            None => Bound::Unbounded,
        };
        Ok(self
            .entries
            .range::<str, _>((Bound::Included(from), upper))
            .take(limit)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn is_empty(&self) -> Result<bool> {
        Ok(self.entries.is_empty())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entries.len())
    }
}
