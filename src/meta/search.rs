//! Thread-level search over the message-level inverted index.
//!
//! The index matches messages; callers page through threads. A
//! [`QueryCursor`] remembers where in the index order it stopped and which
//! threads it has already returned, so one query never yields a thread
//! twice. Cursors belong to the caller and any number may be live at once.

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use tracing::{debug, info};

use super::{keys, MetaIndex};
use crate::error::{ArchiveError, Result};
use crate::index::{InvertedIndex, Query};
use crate::model::ids::{IndexDocId, ThreadId};
use crate::model::record::ThreadInfo;
use crate::model::state::MessageState;
use crate::store::{KvStore, TypedStore};

/// Paging state of one query.
#[derive(Debug, Clone)]
pub struct QueryCursor {
    query: Query,
    position: Option<IndexDocId>,
    exhausted: bool,
    seen_threads: HashSet<ThreadId>,
}

fn not_deleted() -> Query {
    Query::label(MessageState::Deleted.as_str()).negate()
}

impl QueryCursor {
    /// Bind a query. Deleted messages never match.
    pub fn new(query: Query) -> Self {
        Self {
            query: query.and(not_deleted()),
            position: None,
            exhausted: false,
            seen_threads: HashSet::new(),
        }
    }

    /// Parse `input` with bare words searching the message body.
    pub fn parse(input: &str) -> Result<Self> {
        Query::parse_default(input).map(Self::new)
    }

    /// The query actually run, including the deleted filter.
    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Start over from the newest match.
    pub fn reset(&mut self) {
        self.position = None;
        self.exhausted = false;
        self.seen_threads.clear();
    }
}

impl<S: KvStore, I: InvertedIndex> MetaIndex<S, I> {
    /// The next `num` distinct threads matching the cursor's query, in
    /// match order. Returns fewer once the query is exhausted.
    pub fn get_some_results(&self, cursor: &mut QueryCursor, num: usize) -> Result<Vec<ThreadInfo>> {
        let start = Instant::now();
        let mut thread_ids = Vec::new();

        while thread_ids.len() < num && !cursor.exhausted {
            let batch = self
                .index
                .run_query(&cursor.query, cursor.position, num - thread_ids.len())?;
            if batch.is_empty() {
                cursor.exhausted = true;
                break;
            }
            for index_id in batch {
                cursor.position = Some(index_id);
                let thread_id = self.thread_of_index_doc(index_id)?;
                if cursor.seen_threads.insert(thread_id) {
                    thread_ids.push(thread_id);
                    if thread_ids.len() == num {
                        break;
                    }
                }
            }
        }
        let search_time = start.elapsed();

        let mut results = Vec::with_capacity(thread_ids.len());
        for thread_id in thread_ids {
            let info = self.load_threadinfo(thread_id)?.ok_or_else(|| {
                ArchiveError::CorruptMapping(format!("matched thread {thread_id} has no record"))
            })?;
            results.push(info);
        }
        debug!(
            query = %cursor.query,
            results = results.len(),
            search_ms = search_time.as_millis() as u64,
            total_ms = start.elapsed().as_millis() as u64,
            "Fetched results"
        );
        Ok(results)
    }

    /// Number of distinct threads matching the cursor's query. The cursor
    /// itself is not advanced.
    pub fn count_results(&self, cursor: &QueryCursor) -> Result<usize> {
        let batch_size = self.options.count_batch_size.max(1);
        let mut threads = HashSet::new();
        let mut after = None;
        loop {
            let batch = self.index.run_query(&cursor.query, after, batch_size)?;
            for index_id in &batch {
                threads.insert(self.thread_of_index_doc(*index_id)?);
            }
            if batch.len() < batch_size {
                break;
            }
            after = batch.last().copied();
        }
        Ok(threads.len())
    }

    /// Drop labels that no live message carries from the global label
    /// list. Runs one query per label. Returns the labels removed.
    pub fn prune_labels(&mut self) -> Result<BTreeSet<String>> {
        let labels = self.all_labels()?;
        let mut kept = BTreeSet::new();
        let mut pruned = BTreeSet::new();
        for label in labels {
            let query = Query::label(&label).and(not_deleted());
            if self.index.run_query(&query, None, 1)?.is_empty() {
                pruned.insert(label);
            } else {
                kept.insert(label);
            }
        }
        if !pruned.is_empty() {
            self.store.save(keys::LABEL_LIST, &kept)?;
        }
        info!(kept = kept.len(), pruned = pruned.len(), "Pruned label list");
        Ok(pruned)
    }

    fn thread_of_index_doc(&self, index_id: IndexDocId) -> Result<ThreadId> {
        let docid = self.docid_of(index_id)?;
        self.thread_id_of(docid)
    }
}
