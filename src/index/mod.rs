//! Inverted index: the search collaborator of the meta-index.
//!
//! The index stores per-document field text and per-document label tags,
//! numbers documents itself, and answers [`Query`]s with index-local ids in
//! index order (newest first), one page at a time. It knows nothing about
//! threads or the key/value store.

pub mod file;
pub mod memory;
pub mod query;

use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::ids::IndexDocId;

pub use file::FileIndex;
pub use memory::MemoryIndex;
pub use query::Query;

/// Searchable fields, in the order they are written for each message.
pub const FIELDS: [&str; 5] = ["from", "to", "subject", "date", "body"];

/// Field searched by bare words.
pub const DEFAULT_FIELD: &str = "body";

/// Structured text submitted for indexing: field name → text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexEntry {
    pub fields: BTreeMap<String, String>,
}

impl IndexEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_string(&mut self, field: &str, text: impl Into<String>) -> &mut Self {
        self.fields.insert(field.to_string(), text.into());
        self
    }
}

/// The operations the meta-index needs from a full-text index.
pub trait InvertedIndex {
    /// Index an entry and return its newly assigned id.
    fn add_entry(&mut self, entry: &IndexEntry) -> Result<IndexDocId>;

    fn add_label(&mut self, doc: IndexDocId, label: &str) -> Result<()>;

    fn remove_label(&mut self, doc: IndexDocId, label: &str) -> Result<()>;

    /// Up to `limit` matches in index order, starting strictly after `after`
    /// (or from the beginning when `after` is `None`).
    fn run_query(
        &self,
        query: &Query,
        after: Option<IndexDocId>,
        limit: usize,
    ) -> Result<Vec<IndexDocId>>;

    /// Number of indexed documents.
    fn size(&self) -> Result<usize>;
}

/// Split text into lower-cased alphanumeric words.
pub fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Whether `label` can be written as a `~label` query token.
///
/// Labels may not start with `(`, `)`, `"`, `-`, `~`, `:` or `*`, may not
/// contain `(`, `)`, `"` or `:` anywhere, and may not contain whitespace.
pub fn is_valid_label(label: &str) -> bool {
    let mut chars = label.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if matches!(first, '(' | ')' | '"' | '-' | '~' | ':' | '*') || first.is_whitespace() {
        return false;
    }
    chars.all(|c| !matches!(c, '(' | ')' | '"' | ':') && !c.is_whitespace())
}
