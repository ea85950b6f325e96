//! Persistent message threading.
//!
//! Ancestry lives in the store as parent pointers (`pmsgid/`) and child sets
//! (`cmsgids/`) keyed by message content hash, so ancestors we have never
//! seen still take part. Each insertion walks up to the root of whatever
//! tree the message joins, rebuilds that tree from the docids we actually
//! hold, and tears down any older threads the new tree swallowed.

use std::collections::{BTreeSet, HashSet};
use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::{keys, MetaIndex};
use crate::error::{ArchiveError, Result};
use crate::index::InvertedIndex;
use crate::model::ids::{DocId, ThreadId};
use crate::model::message::Message;
use crate::model::record::{ThreadNode, ThreadRecord};
use crate::store::{KvStore, TypedStore};

/// Outcome of threading one message.
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadPlacement {
    pub thread_id: ThreadId,
    pub structure: ThreadNode,
    /// Labels of the threads merged into this one.
    pub absorbed_labels: BTreeSet<String>,
}

/// `[self, nearest ancestor, ..., most distal ancestor]`, without repeats.
fn ancestor_chain(message: &Message) -> Vec<String> {
    let mut seen = HashSet::new();
    std::iter::once(message.safe_msgid())
        .chain(message.safe_refs().into_iter().rev())
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

impl<S: KvStore, I: InvertedIndex> MetaIndex<S, I> {
    /// Place an already stored message into its thread.
    ///
    /// Rewrites `threadid/` for every member; the caller writes the thread
    /// record and its aggregates.
    pub(crate) fn thread_message(&mut self, message: &Message) -> Result<ThreadPlacement> {
        let start = Instant::now();
        let chain = ancestor_chain(message);

        // Step 1: record ancestry. A child keeps the first parent it was given.
        for pair in chain.windows(2) {
            let (child, parent) = (&pair[0], &pair[1]);
            if !self.store.save_if_absent(&keys::parent(child), parent)? {
                continue;
            }
            let key = keys::children(parent);
            let mut children: BTreeSet<String> = self.store.load_set(&key)?;
            if children.insert(child.clone()) {
                self.store.save(&key, &children)?;
            }
        }

        // Step 2: find the root, stopping at the first node seen twice.
        let root = self.find_root(&chain[0])?;

        // Step 3: materialize the tree from the docids we hold.
        let structure = self
            .build_structure_from(&root, &mut HashSet::new())?
            .ok_or_else(|| {
                ArchiveError::CorruptMapping(format!(
                    "message {} is not reachable from its thread root",
                    chain[0]
                ))
            })?;
        let thread_id = structure.id;
        let docids = structure.docids();

        // Step 4: tear down every thread this tree now covers, keeping labels.
        let mut old_threads: BTreeSet<ThreadId> = structure.flatten().into_iter().collect();
        for docid in &docids {
            if let Some(previous) = self.store.load::<ThreadId>(&keys::thread_of(*docid))? {
                old_threads.insert(previous);
            }
        }
        let mut absorbed_labels = BTreeSet::new();
        for old in old_threads {
            if !self.store.exists(&keys::thread(old))? {
                continue;
            }
            let labels: BTreeSet<String> = self.store.load_set(&keys::thread_labels(old))?;
            info!(old = %old, new = %thread_id, labels = labels.len(), "Absorbing thread");
            absorbed_labels.extend(labels);
            for key in keys::all_thread_keys(old) {
                self.store.delete(&key)?;
            }
        }

        // Step 5: point every member at the thread.
        for docid in &docids {
            self.store.save(&keys::thread_of(*docid), &thread_id)?;
        }

        self.timings.thread += start.elapsed();
        Ok(ThreadPlacement {
            thread_id,
            structure,
            absorbed_labels,
        })
    }

    fn find_root(&self, start: &str) -> Result<String> {
        let mut root = start.to_string();
        let mut seen = HashSet::from([root.clone()]);
        while let Some(parent) = self.store.load::<String>(&keys::parent(&root))? {
            if !seen.insert(parent.clone()) {
                warn!(msgid = %parent, "Ancestry cycle; using first repeated node as root");
                root = parent;
                break;
            }
            root = parent;
        }
        Ok(root)
    }

    /// Build the subtree under `safe_msgid`, or `None` if it holds no
    /// message we know. Several known children under an unknown parent are
    /// joined by a pseudo-root.
    fn build_structure_from(
        &self,
        safe_msgid: &str,
        seen: &mut HashSet<String>,
    ) -> Result<Option<ThreadNode>> {
        if !seen.insert(safe_msgid.to_string()) {
            return Ok(None);
        }
        let docid: Option<DocId> = self.store.load(&keys::docid_for(safe_msgid))?;
        let child_ids: BTreeSet<String> = self.store.load_set(&keys::children(safe_msgid))?;

        let mut children = Vec::with_capacity(child_ids.len());
        for child in &child_ids {
            if let Some(node) = self.build_structure_from(child, seen)? {
                children.push(node);
            }
        }
        // Oldest branch first.
        children.sort_by_key(ThreadNode::first_docid);

        Ok(match (docid, children.len()) {
            (Some(d), _) => Some(ThreadNode {
                id: ThreadId::Real(d),
                children,
            }),
            (None, 0) => None,
            (None, 1) => children.pop(),
            (None, _) => children[0].first_docid().map(|token| ThreadNode {
                id: ThreadId::Pseudo(token),
                children,
            }),
        })
    }

    /// Compute and persist the summary record for a thread structure.
    pub(crate) fn write_thread_record(
        &mut self,
        thread_id: ThreadId,
        structure: &ThreadNode,
    ) -> Result<ThreadRecord> {
        let docids = structure.docids();
        let mut records = Vec::with_capacity(docids.len());
        for docid in &docids {
            records.push(self.member_record(*docid)?);
        }
        let Some(first) = records.first() else {
            return Err(ArchiveError::CorruptMapping(format!(
                "thread {thread_id} has no messages"
            )));
        };

        let mut participants: Vec<String> = Vec::new();
        for r in &records {
            if !participants.contains(&r.from) {
                participants.push(r.from.clone());
            }
        }
        let date: DateTime<Utc> = records.iter().map(|r| r.date).max().unwrap_or(first.date);

        let record = ThreadRecord {
            subject: first.subject.clone(),
            date,
            participants,
            direct_recipients: records.iter().flat_map(|r| r.to.iter().cloned()).collect(),
            indirect_recipients: records.iter().flat_map(|r| r.cc.iter().cloned()).collect(),
            size: docids.len(),
            structure: structure.clone(),
        };
        self.store.save(&keys::thread(thread_id), &record)?;
        Ok(record)
    }
}
