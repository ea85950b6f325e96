//! In-memory postings index.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use super::query::Query;
use super::{words, IndexEntry, InvertedIndex};
use crate::error::{ArchiveError, Result};
use crate::model::ids::IndexDocId;

/// Postings keyed by `field:word`, plus label postings.
///
/// Ids are assigned densely from 1. Index order is newest first.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct MemoryIndex {
    next_id: u64,
    docs: BTreeSet<IndexDocId>,
    postings: HashMap<String, BTreeSet<IndexDocId>>,
    labels: HashMap<String, BTreeSet<IndexDocId>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn check_doc(&self, doc: IndexDocId) -> Result<()> {
        if self.docs.contains(&doc) {
            Ok(())
        } else {
            Err(ArchiveError::CorruptMapping(format!(
                "index has no document {doc}"
            )))
        }
    }

    #[cfg(test)]
    pub(crate) fn labels_of(&self, doc: IndexDocId) -> BTreeSet<String> {
        self.labels
            .iter()
            .filter(|(_, ids)| ids.contains(&doc))
            .map(|(l, _)| l.clone())
            .collect()
    }

    fn evaluate(&self, query: &Query) -> BTreeSet<IndexDocId> {
        match query {
            Query::Term { field, word } => self
                .postings
                .get(&posting_key(field, word))
                .cloned()
                .unwrap_or_default(),
            Query::Label(l) => self.labels.get(l).cloned().unwrap_or_default(),
            Query::And(parts) => {
                let mut acc = self.docs.clone();
                for p in parts {
                    if acc.is_empty() {
                        break;
                    }
                    let matched = self.evaluate(p);
                    acc.retain(|d| matched.contains(d));
                }
                acc
            }
            Query::Or(parts) => parts.iter().flat_map(|p| self.evaluate(p)).collect(),
            Query::Not(inner) => {
                let excluded = self.evaluate(inner);
                self.docs.difference(&excluded).copied().collect()
            }
        }
    }
}

fn posting_key(field: &str, word: &str) -> String {
    format!("{field}:{word}")
}

impl InvertedIndex for MemoryIndex {
    fn add_entry(&mut self, entry: &IndexEntry) -> Result<IndexDocId> {
        self.next_id += 1;
        let id = IndexDocId(self.next_id);
        for (field, text) in &entry.fields {
            for word in words(text) {
                self.postings
                    .entry(posting_key(field, &word))
                    .or_default()
                    .insert(id);
            }
        }
        self.docs.insert(id);
        Ok(id)
    }

    fn add_label(&mut self, doc: IndexDocId, label: &str) -> Result<()> {
        self.check_doc(doc)?;
        self.labels.entry(label.to_string()).or_default().insert(doc);
        Ok(())
    }

    fn remove_label(&mut self, doc: IndexDocId, label: &str) -> Result<()> {
        self.check_doc(doc)?;
        if let Some(ids) = self.labels.get_mut(label) {
            ids.remove(&doc);
            if ids.is_empty() {
                self.labels.remove(label);
            }
        }
        Ok(())
    }

    fn run_query(
        &self,
        query: &Query,
        after: Option<IndexDocId>,
        limit: usize,
    ) -> Result<Vec<IndexDocId>> {
        let matched = self.evaluate(query);
        Ok(matched
            .into_iter()
            .rev()
            .filter(|id| after.is_none_or(|a| *id < a))
            .take(limit)
            .collect())
    }

    fn size(&self) -> Result<usize> {
        Ok(self.docs.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_with(bodies: &[&str]) -> (MemoryIndex, Vec<IndexDocId>) {
        let mut index = MemoryIndex::new();
        let ids = bodies
            .iter()
            .map(|b| {
                let mut e = IndexEntry::new();
                e.add_string("body", *b).add_string("subject", "status");
                index.add_entry(&e).unwrap()
            })
            .collect();
        (index, ids)
    }

    #[test]
    fn test_results_are_newest_first_and_paged() {
        let (index, ids) = index_with(&["hello bob", "hello alice", "hello carol"]);
        let q = Query::parse_default("hello").unwrap();
        let first = index.run_query(&q, None, 2).unwrap();
        assert_eq!(first, vec![ids[2], ids[1]]);
        let rest = index.run_query(&q, Some(ids[1]), 2).unwrap();
        assert_eq!(rest, vec![ids[0]]);
    }

    #[test]
    fn test_labels_and_negation() {
        let (mut index, ids) = index_with(&["one", "two"]);
        index.add_label(ids[0], "tired").unwrap();
        let q = Query::parse_default("subject:status -~tired").unwrap();
        assert_eq!(index.run_query(&q, None, 10).unwrap(), vec![ids[1]]);
        index.remove_label(ids[0], "tired").unwrap();
        assert!(index.labels_of(ids[0]).is_empty());
        assert_eq!(index.run_query(&q, None, 10).unwrap().len(), 2);
    }

    #[test]
    fn test_label_on_unknown_doc_is_corruption() {
        let mut index = MemoryIndex::new();
        let err = index.add_label(IndexDocId(9), "x").unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_or_and_empty_and() {
        let (index, ids) = index_with(&["apple", "banana", "cherry"]);
        let q = Query::parse_default("apple OR cherry").unwrap();
        assert_eq!(index.run_query(&q, None, 10).unwrap(), vec![ids[2], ids[0]]);
        assert_eq!(index.run_query(&Query::everything(), None, 10).unwrap().len(), 3);
        assert_eq!(index.size().unwrap(), 3);
    }
}
