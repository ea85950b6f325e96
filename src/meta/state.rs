//! Message state, thread aggregates and label propagation.
//!
//! Thread state is never stored independently of its members: it is the
//! union of the member states and is recomputed whenever one of them
//! changes. Labels live on the thread and are mirrored onto every member
//! in the inverted index so `~label` queries match single messages.

use std::collections::BTreeSet;
use std::time::Instant;

use tracing::debug;

use super::{keys, MetaIndex};
use crate::error::{ArchiveError, Result};
use crate::index::{is_valid_label, InvertedIndex};
use crate::model::ids::{DocId, ThreadId};
use crate::model::record::ThreadNode;
use crate::model::state::{state_words, MessageState, StateSet};
use crate::store::{KvStore, TypedStore};

/// Derived per-thread values, recomputed from the members.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ThreadAggregates {
    pub state: StateSet,
    pub snippet: String,
    pub unread_participants: BTreeSet<String>,
}

/// Drop state words from caller labels and check the rest.
///
/// Fails on the first invalid label, before anything has been written.
pub(crate) fn clean_labels<L: AsRef<str>>(labels: &[L]) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    for label in labels {
        let label = label.as_ref();
        if MessageState::is_state_word(label) {
            continue;
        }
        if !is_valid_label(label) {
            return Err(ArchiveError::InvalidLabel(label.to_string()));
        }
        out.insert(label.to_string());
    }
    Ok(out)
}

fn without_state_words(labels: &BTreeSet<String>) -> BTreeSet<String> {
    labels
        .iter()
        .filter(|l| !MessageState::is_state_word(l))
        .cloned()
        .collect()
}

impl<S: KvStore, I: InvertedIndex> MetaIndex<S, I> {
    /// Set the mutable state of one message, keeping its immutable flags.
    pub fn update_message_state<W: AsRef<str>>(
        &mut self,
        docid: DocId,
        state: &[W],
    ) -> Result<StateSet> {
        if !self.store.exists(&keys::doc(docid))? {
            return Err(ArchiveError::UnknownMessage(docid));
        }
        let requested = MessageState::mutable_from_words(state);
        let (changed, new_state) = self.write_message_state(docid, &requested)?;
        if changed {
            let thread_id = self.thread_id_of(docid)?;
            let record = self.thread_record(thread_id)?.ok_or_else(|| {
                ArchiveError::CorruptMapping(format!(
                    "doc {docid} points at thread {thread_id} which does not exist"
                ))
            })?;
            self.rebuild_thread_metadata(thread_id, &record.structure)?;
        }
        debug!(%docid, changed, state = ?new_state, "Updated message state");
        Ok(new_state)
    }

    /// Set the same mutable state on every message of a thread and return
    /// the resulting thread state.
    pub fn update_thread_state<W: AsRef<str>>(
        &mut self,
        thread_id: ThreadId,
        state: &[W],
    ) -> Result<StateSet> {
        let record = self.require_thread_record(thread_id)?;
        let requested = MessageState::mutable_from_words(state);

        let mut changed = false;
        for docid in record.structure.docids() {
            let (this_changed, _) = self.write_message_state(docid, &requested)?;
            changed |= this_changed;
        }

        if changed {
            self.rebuild_thread_metadata(thread_id, &record.structure)
        } else {
            self.store.load_set(&keys::thread_state(thread_id))
        }
    }

    /// Replace the caller-visible labels of a thread.
    ///
    /// State words are ignored on input and kept from the thread's current
    /// labels. Returns the full new label set.
    pub fn update_thread_labels<L: AsRef<str>>(
        &mut self,
        thread_id: ThreadId,
        labels: &[L],
    ) -> Result<BTreeSet<String>> {
        let labels = clean_labels(labels)?;
        let record = self.require_thread_record(thread_id)?;

        self.add_to_label_list(&labels)?;

        let key = keys::thread_labels(thread_id);
        let old: BTreeSet<String> = self.store.load_set(&key)?;
        let mut new: BTreeSet<String> = old
            .iter()
            .filter(|l| MessageState::is_state_word(l))
            .cloned()
            .collect();
        new.extend(labels);
        self.store.save(&key, &new)?;

        self.mirror_labels(&record.structure, &new)?;
        debug!(thread = %thread_id, labels = ?new, "Updated thread labels");
        Ok(new)
    }

    /// Replace the mutable part of a message's state.
    /// Returns whether anything changed, and the new state.
    pub(crate) fn write_message_state(
        &mut self,
        docid: DocId,
        mutable: &StateSet,
    ) -> Result<(bool, StateSet)> {
        let key = keys::state(docid);
        let old: StateSet = self.store.load_set(&key)?;
        let new: StateSet = old
            .iter()
            .filter(|s| !s.is_mutable())
            .chain(mutable.iter())
            .copied()
            .collect();
        let changed = new != old;
        if changed {
            self.store.save(&key, &new)?;
        }
        Ok((changed, new))
    }

    /// State, snippet and unread senders of the messages in `structure`.
    pub(crate) fn thread_aggregates(&self, structure: &ThreadNode) -> Result<ThreadAggregates> {
        let mut agg = ThreadAggregates::default();
        let mut snippet_from: Option<DocId> = None;
        for docid in structure.docids() {
            let state: StateSet = self.store.load_set(&keys::state(docid))?;
            if state.contains(&MessageState::Unread) {
                snippet_from.get_or_insert(docid);
                agg.unread_participants.insert(self.member_record(docid)?.from);
            }
            agg.state.extend(state);
        }
        if let Some(docid) = snippet_from.or_else(|| structure.first_docid()) {
            agg.snippet = self.store.load_string(&keys::message_snippet(docid))?;
        }
        Ok(agg)
    }

    /// Recompute snippet, state and unread participants after a member's
    /// state changed. Labels are re-derived only if the thread state moved.
    /// Returns the new thread state.
    pub(crate) fn rebuild_thread_metadata(
        &mut self,
        thread_id: ThreadId,
        structure: &ThreadNode,
    ) -> Result<StateSet> {
        let agg = self.thread_aggregates(structure)?;

        let snip_key = keys::thread_snippet(thread_id);
        if self.store.load_string(&snip_key)? != agg.snippet {
            self.store.save(&snip_key, &agg.snippet)?;
        }

        let state_key = keys::thread_state(thread_id);
        let old_state: StateSet = self.store.load_set(&state_key)?;
        if old_state != agg.state {
            self.store.save(&state_key, &agg.state)?;

            let labels_key = keys::thread_labels(thread_id);
            let old_labels: BTreeSet<String> = self.store.load_set(&labels_key)?;
            let mut labels = without_state_words(&old_labels);
            labels.extend(state_words(&agg.state));
            self.store.save(&labels_key, &labels)?;
            self.mirror_labels(structure, &labels)?;
        }

        self.store
            .save(&keys::unread_participants(thread_id), &agg.unread_participants)?;
        Ok(agg.state)
    }

    /// Copy a thread's labels onto each member, in the store and in the
    /// index, touching only the labels that differ.
    pub(crate) fn mirror_labels(
        &mut self,
        structure: &ThreadNode,
        labels: &BTreeSet<String>,
    ) -> Result<()> {
        for docid in structure.docids() {
            let key = keys::message_labels(docid);
            let old: BTreeSet<String> = self.store.load_set(&key)?;
            if &old == labels {
                continue;
            }
            self.store.save(&key, labels)?;

            let index_id = self.index_id_of(docid)?;
            let start = Instant::now();
            for label in old.difference(labels) {
                debug!(%docid, %index_id, label, "Removing label");
                self.index.remove_label(index_id, label)?;
            }
            for label in labels.difference(&old) {
                debug!(%docid, %index_id, label, "Adding label");
                self.index.add_label(index_id, label)?;
            }
            self.timings.index += start.elapsed();
        }
        Ok(())
    }

    pub(crate) fn add_to_label_list(&mut self, labels: &BTreeSet<String>) -> Result<()> {
        let mut list: BTreeSet<String> = self.store.load_set(keys::LABEL_LIST)?;
        let before = list.len();
        list.extend(labels.iter().cloned());
        if list.len() != before {
            self.store.save(keys::LABEL_LIST, &list)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::index::Query;
    use crate::model::state::MessageState::*;

    fn three_message_thread(meta: &mut TestIndex) -> (Vec<DocId>, ThreadId) {
        let (a, _) = add(meta, &message("a", &[]), &[], &[]);
        let (b, _) = add(meta, &message("b", &["a"]), &[], &[]);
        let (c, t) = add(meta, &message("c", &["a", "b"]), &[], &[]);
        (vec![a, b, c], t)
    }

    #[test]
    fn test_clean_labels_drops_state_words_and_rejects_bad_tokens() {
        assert_eq!(
            clean_labels(&["inbox", "unread", "tired"]).unwrap(),
            strings(&["inbox", "tired"])
        );
        let err = clean_labels(&["ok", "-bad"]).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidLabel(ref l) if l == "-bad"));
    }

    #[test]
    fn test_thread_state_follows_member_union() {
        let mut meta = open();
        let (docs, t) = three_message_thread(&mut meta);
        assert!(meta.load_threadinfo(t).unwrap().unwrap().state.is_empty());

        for d in &docs {
            meta.update_message_state(*d, &["unread"]).unwrap();
            assert_eq!(meta.load_threadinfo(t).unwrap().unwrap().state, set(&[Unread]));
        }
        for d in &docs {
            meta.update_message_state(*d, &[] as &[&str]).unwrap();
        }
        assert!(meta.load_threadinfo(t).unwrap().unwrap().state.is_empty());

        meta.update_message_state(docs[2], &["starred"]).unwrap();
        let info = meta.load_threadinfo(t).unwrap().unwrap();
        assert_eq!(info.state, set(&[Starred]));
        assert!(info.labels.contains("starred"));
    }

    #[test]
    fn test_message_state_keeps_immutable_flags() {
        let mut meta = open();
        let mut m = message("a", &[]);
        m.flags.has_attachment = true;
        let (d, _) = add(&mut meta, &m, &["unread"], &[]);
        let state = meta.update_message_state(d, &["starred", "attachment"]).unwrap();
        assert_eq!(state, set(&[Starred, Attachment]));
        let state = meta.update_message_state(d, &[] as &[&str]).unwrap();
        assert_eq!(state, set(&[Attachment]));
    }

    #[test]
    fn test_update_unknown_ids_fail() {
        let mut meta = open();
        let err = meta.update_message_state(DocId(7), &["unread"]).unwrap_err();
        assert!(matches!(err, ArchiveError::UnknownMessage(DocId(7))));
        let err = meta
            .update_thread_state(ThreadId::Real(DocId(7)), &["unread"])
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnknownThread(_)));
        let err = meta
            .update_thread_labels(ThreadId::Real(DocId(7)), &["x"])
            .unwrap_err();
        assert!(err.is_caller_error());
    }

    #[test]
    fn test_thread_state_update_touches_every_member() {
        let mut meta = open();
        let (docs, t) = three_message_thread(&mut meta);
        let state = meta.update_thread_state(t, &["unread", "sent"]).unwrap();
        assert_eq!(state, set(&[Unread]));
        for d in docs {
            let info = meta.load_messageinfo(d).unwrap().unwrap();
            assert_eq!(info.state, set(&[Unread]));
            assert!(info.labels.contains("unread"));
        }
        // Unchanged request reports the stored thread state.
        assert_eq!(meta.update_thread_state(t, &["unread"]).unwrap(), set(&[Unread]));
    }

    #[test]
    fn test_snippet_and_unread_participants_track_unread_members() {
        let mut meta = open();
        let (docs, t) = three_message_thread(&mut meta);
        assert_eq!(meta.load_threadinfo(t).unwrap().unwrap().snippet, "snippet of a");

        meta.update_message_state(docs[1], &["unread"]).unwrap();
        let info = meta.load_threadinfo(t).unwrap().unwrap();
        assert_eq!(info.snippet, "snippet of b");
        assert_eq!(info.unread_participants, strings(&["Egg Zample <egg@example.com>"]));

        meta.update_message_state(docs[1], &[] as &[&str]).unwrap();
        let info = meta.load_threadinfo(t).unwrap().unwrap();
        assert_eq!(info.snippet, "snippet of a");
        assert!(info.unread_participants.is_empty());
    }

    #[test]
    fn test_thread_labels_keep_state_words_and_mirror_to_index() {
        let mut meta = open();
        let (docs, t) = three_message_thread(&mut meta);
        meta.update_thread_state(t, &["starred"]).unwrap();

        let labels = meta.update_thread_labels(t, &["tired", "unread"]).unwrap();
        assert_eq!(labels, strings(&["starred", "tired"]));
        let hits = meta.index().run_query(&Query::label("tired"), None, 10).unwrap();
        assert_eq!(hits.len(), docs.len());

        let labels = meta.update_thread_labels(t, &[] as &[&str]).unwrap();
        assert_eq!(labels, strings(&["starred"]));
        let hits = meta.index().run_query(&Query::label("tired"), None, 10).unwrap();
        assert!(hits.is_empty());
        assert!(meta.all_labels().unwrap().contains("tired"));
    }

    #[test]
    fn test_invalid_label_writes_nothing() {
        let mut meta = open();
        let (_, t) = three_message_thread(&mut meta);
        meta.update_thread_labels(t, &["keep"]).unwrap();
        let err = meta.update_thread_labels(t, &["fine", "a:b"]).unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidLabel(_)));
        let info = meta.load_threadinfo(t).unwrap().unwrap();
        assert_eq!(info.labels, strings(&["keep"]));
        assert!(!meta.all_labels().unwrap().contains("fine"));
    }
}
