//! The meta-index: threads, state, labels and contacts over a key/value
//! store and an inverted index.
//!
//! The two backends are addressed independently and offer no multi-key
//! transactions, so every mutation here is a sequence of point writes.
//! Mutations take `&mut self` and reads take `&self`; callers sharing one
//! meta-index across threads wrap it with [`MetaIndex::into_shared`], which
//! serializes mutations (including thread merges) behind one lock.
//!
//! Operations are spread over sub-modules by concern:
//! - [`ingest`]: `add_message`
//! - [`thread`]: ancestry bookkeeping and thread (re)construction
//! - [`state`]: message/thread state and label propagation
//! - [`search`]: query cursors, counting, label pruning
//! - [`contacts`]: last-seen correspondents
//! - [`idmap`]: docid ↔ index-id mapping

pub mod contacts;
pub mod idmap;
pub mod ingest;
pub mod keys;
pub mod search;
pub mod state;
pub mod thread;

use std::collections::BTreeSet;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use lru::LruCache;
use tracing::{debug, info};

use crate::error::{ArchiveError, Result};
use crate::hooks::TextTransform;
use crate::index::InvertedIndex;
use crate::model::ids::{DocId, ThreadId};
use crate::model::record::{MessageInfo, MessageRecord, ThreadEntry, ThreadInfo, ThreadRecord};
use crate::store::{KvStore, TypedStore};

pub use search::QueryCursor;

/// Schema version of the records this build reads and writes.
pub const MAJOR_VERSION: u32 = 0;
pub const MINOR_VERSION: u32 = 1;

/// Library-side tuning knobs.
#[derive(Debug, Clone)]
pub struct MetaOptions {
    /// Maximum snippet length in characters.
    pub snippet_max_chars: usize,
    /// Page size used by [`MetaIndex::count_results`].
    pub count_batch_size: usize,
    /// Number of decoded message records kept in memory.
    pub record_cache_size: usize,
}

impl Default for MetaOptions {
    fn default() -> Self {
        Self {
            snippet_max_chars: 100,
            count_batch_size: 1000,
            record_cache_size: 256,
        }
    }
}

/// Time spent in each backend during ingestion, since the last reset.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timings {
    pub index: Duration,
    pub store: Duration,
    pub thread: Duration,
}

/// A meta-index shared between threads.
pub type SharedMetaIndex<S, I> = Arc<Mutex<MetaIndex<S, I>>>;

pub struct MetaIndex<S: KvStore, I: InvertedIndex> {
    store: S,
    index: I,
    transform: Option<Box<dyn TextTransform>>,
    options: MetaOptions,
    timings: Timings,
    // Message records never change after insertion, so caching them is safe.
    records: Mutex<LruCache<DocId, MessageRecord>>,
}

impl<S: KvStore, I: InvertedIndex> MetaIndex<S, I> {
    /// Open a meta-index over `store` and `index`.
    ///
    /// An empty store is stamped with the current schema version; otherwise
    /// the stored version must match exactly.
    pub fn open(store: S, index: I, options: MetaOptions) -> Result<Self> {
        let cache_size = NonZeroUsize::new(options.record_cache_size.max(1))
            .unwrap_or(NonZeroUsize::MIN);
        let mut meta = Self {
            store,
            index,
            transform: None,
            options,
            timings: Timings::default(),
            records: Mutex::new(LruCache::new(cache_size)),
        };
        meta.check_version()?;
        Ok(meta)
    }

    fn check_version(&mut self) -> Result<()> {
        let expected = Self::version();
        if self.store.is_empty()? {
            info!(version = %expected, "Initializing empty store");
            return self.store.save(keys::VERSION, &expected);
        }
        let stored: Option<String> = self.store.load(keys::VERSION)?;
        match stored {
            Some(v) if v == expected => {
                debug!(version = %v, "Store version ok");
                Ok(())
            }
            other => Err(ArchiveError::VersionMismatch {
                stored: other.unwrap_or_else(|| "<none>".to_string()),
                expected,
            }),
        }
    }

    /// Install a transform applied to indexable text before indexing.
    pub fn with_transform(mut self, transform: Box<dyn TextTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// `major.minor` schema version.
    pub fn version() -> String {
        format!("{MAJOR_VERSION}.{MINOR_VERSION}")
    }

    /// Number of indexed messages.
    pub fn size(&self) -> Result<usize> {
        self.index.size()
    }

    /// Time spent so far in the index, the store and threading.
    pub fn timings(&self) -> Timings {
        self.timings
    }

    /// Zero the timing counters.
    pub fn reset_timers(&mut self) {
        self.timings = Timings::default();
    }

    /// The backing key/value store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// The backing inverted index.
    pub fn index(&self) -> &I {
        &self.index
    }

    /// Give the backends back, e.g. to flush them.
    pub fn into_parts(self) -> (S, I) {
        (self.store, self.index)
    }

    /// Wrap for use from several threads; writers take the lock in turn.
    pub fn into_shared(self) -> SharedMetaIndex<S, I> {
        Arc::new(Mutex::new(self))
    }

    /// Whether a message with this content hash was added.
    pub fn contains(&self, safe_msgid: &str) -> Result<bool> {
        self.store.exists(&keys::docid_for(safe_msgid))
    }

    /// The `(docid, thread id)` of a message content hash, if it was added.
    pub fn lookup(&self, safe_msgid: &str) -> Result<Option<(DocId, ThreadId)>> {
        match self.store.load::<DocId>(&keys::docid_for(safe_msgid))? {
            Some(docid) => Ok(Some((docid, self.thread_id_of(docid)?))),
            None => Ok(None),
        }
    }

    /// Every label ever accepted, minus pruned ones.
    pub fn all_labels(&self) -> Result<BTreeSet<String>> {
        self.store.load_set(keys::LABEL_LIST)
    }

    /// A message with its state, labels, thread and snippet, or `None`.
    pub fn load_messageinfo(&self, docid: DocId) -> Result<Option<MessageInfo>> {
        let Some(record) = self.message_record(docid)? else {
            return Ok(None);
        };
        Ok(Some(MessageInfo {
            docid,
            thread_id: self.thread_id_of(docid)?,
            record,
            state: self.store.load_set(&keys::state(docid))?,
            labels: self.store.load_set(&keys::message_labels(docid))?,
            snippet: self.store.load_string(&keys::message_snippet(docid))?,
        }))
    }

    /// A thread record with its state, labels, snippet and unread senders, or `None`.
    pub fn load_threadinfo(&self, thread_id: ThreadId) -> Result<Option<ThreadInfo>> {
        let Some(record) = self.thread_record(thread_id)? else {
            return Ok(None);
        };
        Ok(Some(ThreadInfo {
            thread_id,
            record,
            state: self.store.load_set(&keys::thread_state(thread_id))?,
            labels: self.store.load_set(&keys::thread_labels(thread_id))?,
            snippet: self.store.load_string(&keys::thread_snippet(thread_id))?,
            unread_participants: self
                .store
                .load_set(&keys::unread_participants(thread_id))?,
        }))
    }

    /// The thread's messages in structure order with their depth.
    /// Pseudo-roots appear as entries without a message.
    pub fn load_thread_messageinfos(&self, thread_id: ThreadId) -> Result<Option<Vec<ThreadEntry>>> {
        let Some(record) = self.thread_record(thread_id)? else {
            return Ok(None);
        };
        let mut nodes = Vec::new();
        record
            .structure
            .walk(0, &mut |node, depth| nodes.push((node.id, depth)));

        let mut out = Vec::with_capacity(nodes.len());
        for (id, depth) in nodes {
            let message = match id.docid() {
                Some(docid) => Some(self.load_messageinfo(docid)?.ok_or_else(|| {
                    ArchiveError::CorruptMapping(format!(
                        "thread {thread_id} lists doc {docid} which has no record"
                    ))
                })?),
                None => None,
            };
            out.push(ThreadEntry { message, depth });
        }
        Ok(Some(out))
    }

    // ── shared helpers ──────────────────────────────────────────

    pub(crate) fn thread_record(&self, thread_id: ThreadId) -> Result<Option<ThreadRecord>> {
        self.store.load(&keys::thread(thread_id))
    }

    pub(crate) fn require_thread_record(&self, thread_id: ThreadId) -> Result<ThreadRecord> {
        self.thread_record(thread_id)?
            .ok_or(ArchiveError::UnknownThread(thread_id))
    }

    /// The thread a docid belongs to. A docid without one is corruption.
    pub(crate) fn thread_id_of(&self, docid: DocId) -> Result<ThreadId> {
        self.store
            .load::<ThreadId>(&keys::thread_of(docid))?
            .ok_or_else(|| ArchiveError::CorruptMapping(format!("no thread id for doc {docid}")))
    }

    pub(crate) fn message_record(&self, docid: DocId) -> Result<Option<MessageRecord>> {
        if let Some(hit) = self.cached_record(docid) {
            return Ok(Some(hit));
        }
        let record: Option<MessageRecord> = self.store.load(&keys::doc(docid))?;
        if let Some(ref r) = record {
            if let Ok(mut cache) = self.records.lock() {
                cache.put(docid, r.clone());
            }
        }
        Ok(record)
    }

    /// A record for a docid found in a thread structure; absence is corruption.
    pub(crate) fn member_record(&self, docid: DocId) -> Result<MessageRecord> {
        self.message_record(docid)?.ok_or_else(|| {
            ArchiveError::CorruptMapping(format!("doc {docid} is threaded but has no record"))
        })
    }

    fn cached_record(&self, docid: DocId) -> Option<MessageRecord> {
        self.records.lock().ok()?.get(&docid).cloned()
    }
}
