//! Message ingestion.

use std::collections::BTreeMap;
use std::time::Instant;

use tracing::{debug, info};

use super::state::clean_labels;
use super::{keys, MetaIndex};
use crate::error::Result;
use crate::hooks::{self, TextTransform};
use crate::index::{IndexEntry, InvertedIndex};
use crate::model::ids::{DocId, ThreadId};
use crate::model::message::Message;
use crate::model::person::Person;
use crate::model::record::MessageRecord;
use crate::model::state::{state_words, MessageState, StateSet};
use crate::store::{KvStore, TypedStore};

/// Cut `text` to at most `max` characters.
fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((end, _)) => text[..end].to_string(),
        None => text.to_string(),
    }
}

impl<S: KvStore, I: InvertedIndex> MetaIndex<S, I> {
    /// Add a message and thread it.
    ///
    /// `state` may only set mutable flags; immutable flags come from the
    /// message itself. `labels` may not contain state words (they are
    /// dropped) and must all be valid or nothing is written. Adding a
    /// message that is already present returns its existing ids.
    pub fn add_message<W: AsRef<str>>(
        &mut self,
        message: &Message,
        state: &[W],
        labels: &[String],
        extra: BTreeMap<String, String>,
    ) -> Result<(DocId, ThreadId)> {
        let safe_msgid = message.safe_msgid();
        if let Some(existing) = self.lookup(&safe_msgid)? {
            debug!(msgid = %message.message_id, docid = %existing.0, "Message already present");
            return Ok(existing);
        }

        let requested_labels = clean_labels(labels)?;
        let mut state: StateSet = MessageState::mutable_from_words(state);
        state.extend(message.flags.to_state());

        // Index first: the store only learns about the message once the
        // index can find it.
        let start = Instant::now();
        let entry = self.index_entry(message);
        let index_id = self.index.add_entry(&entry)?;
        self.timings.index += start.elapsed();

        let start = Instant::now();
        let docid = self.allocate_docid()?;
        self.write_id_mapping(docid, index_id)?;

        let record = MessageRecord {
            safe_msgid: safe_msgid.clone(),
            subject: message.subject.clone(),
            date: message.date,
            from: message.from.to_email_address(),
            to: message.to.iter().map(Person::to_email_address).collect(),
            cc: message.cc.iter().map(Person::to_email_address).collect(),
            has_attachment: message.flags.has_attachment,
            extra,
        };
        self.store.save(&keys::doc(docid), &record)?;
        self.store.save(&keys::state(docid), &state)?;
        let snippet = truncate_chars(&message.snippet, self.options.snippet_max_chars);
        self.store.save(&keys::message_snippet(docid), &snippet)?;
        self.store.save(&keys::docid_for(&safe_msgid), &docid)?;
        self.timings.store += start.elapsed();

        let placement = self.thread_message(message)?;
        let thread_id = placement.thread_id;

        let start = Instant::now();
        let agg = self.thread_aggregates(&placement.structure)?;
        let mut labels = requested_labels;
        labels.extend(placement.absorbed_labels);
        labels.retain(|l| !MessageState::is_state_word(l));
        labels.extend(state_words(&agg.state));

        self.write_thread_record(thread_id, &placement.structure)?;
        self.store.save(&keys::thread_labels(thread_id), &labels)?;
        self.store.save(&keys::thread_state(thread_id), &agg.state)?;
        self.store.save(&keys::thread_snippet(thread_id), &agg.snippet)?;
        self.store
            .save(&keys::unread_participants(thread_id), &agg.unread_participants)?;
        self.timings.store += start.elapsed();

        self.mirror_labels(&placement.structure, &labels)?;
        self.add_to_label_list(&labels)?;
        self.touch_contact(&message.from, message.date.timestamp())?;

        info!(
            %docid,
            thread = %thread_id,
            size = placement.structure.docids().len(),
            "Added message"
        );
        Ok((docid, thread_id))
    }

    /// Per-field text for the inverted index, lower-cased and passed
    /// through the text transform.
    fn index_entry(&self, message: &Message) -> IndexEntry {
        let transform = self.transform.as_deref();
        let mut entry = IndexEntry::new();
        entry
            .add_string("from", people_text(transform, std::iter::once(&message.from)))
            .add_string("to", people_text(transform, message.recipients()))
            .add_string("subject", message.subject.to_lowercase())
            .add_string("date", message.date.format("%Y%m%d").to_string())
            .add_string(
                "body",
                hooks::apply(transform, &message.indexable_text).to_lowercase(),
            );
        entry
    }
}

fn people_text<'a>(
    transform: Option<&dyn TextTransform>,
    people: impl Iterator<Item = &'a Person>,
) -> String {
    people
        .map(|p| hooks::apply(transform, &p.indexable_text()).to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::error::ArchiveError;
    use crate::index::Query;
    use crate::model::state::MessageState::*;

    #[test]
    fn test_truncate_chars_counts_characters() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("hi", 10), "hi");
        assert_eq!(truncate_chars("", 0), "");
    }

    #[test]
    fn test_add_is_idempotent() {
        let mut meta = open();
        let m = message("a", &[]);
        let first = add(&mut meta, &m, &["unread"], &["inbox"]);
        let size = meta.size().unwrap();
        let second = add(&mut meta, &m, &["starred"], &["other"]);
        assert_eq!(first, second);
        assert_eq!(meta.size().unwrap(), size);
        let info = meta.load_messageinfo(first.0).unwrap().unwrap();
        assert_eq!(info.state, set(&[Unread]));
        assert!(!meta.all_labels().unwrap().contains("other"));
    }

    #[test]
    fn test_caller_cannot_set_immutable_state() {
        let mut meta = open();
        let (d, _) = add(&mut meta, &message("a", &[]), &["attachment", "unread", "bogus"], &[]);
        let info = meta.load_messageinfo(d).unwrap().unwrap();
        assert_eq!(info.state, set(&[Unread]));
        assert!(!info.record.has_attachment);
    }

    #[test]
    fn test_content_flags_become_state() {
        let mut meta = open();
        let mut m = message("a", &[]);
        m.flags.signed = true;
        m.flags.has_attachment = true;
        let (d, t) = add(&mut meta, &m, &[], &[]);
        assert_eq!(
            meta.load_messageinfo(d).unwrap().unwrap().state,
            set(&[Attachment, Signed])
        );
        let info = meta.load_threadinfo(t).unwrap().unwrap();
        assert_eq!(info.labels, strings(&["attachment", "signed"]));
    }

    #[test]
    fn test_invalid_label_rejects_whole_message() {
        let mut meta = open();
        let m = message("a", &[]);
        let labels = vec!["fine".to_string(), "~bad".to_string()];
        let err = meta
            .add_message(&m, &[] as &[&str], &labels, Default::default())
            .unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidLabel(ref l) if l == "~bad"));
        assert_eq!(meta.size().unwrap(), 0);
        assert!(!meta.contains(&m.safe_msgid()).unwrap());
        assert!(meta.all_labels().unwrap().is_empty());
    }

    #[test]
    fn test_labels_are_mirrored_and_listed() {
        let mut meta = open();
        let (d, t) = add(&mut meta, &message("a", &[]), &["unread"], &["inbox", "unread"]);
        let thread = meta.load_threadinfo(t).unwrap().unwrap();
        assert_eq!(thread.labels, strings(&["inbox", "unread"]));
        let msg = meta.load_messageinfo(d).unwrap().unwrap();
        assert_eq!(msg.labels, thread.labels);
        assert!(meta.all_labels().unwrap().contains("inbox"));
        let q = Query::label("inbox").and(Query::label("unread"));
        assert_eq!(meta.index().run_query(&q, None, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_order_merge_unions_labels() {
        let mut meta = open();
        let (a, ta) = add(&mut meta, &message("1", &[]), &[], &["alpha"]);
        let (c, tc) = add(&mut meta, &message("3", &["2"]), &[], &["gamma"]);
        assert_ne!(ta, tc);

        let (b, tb) = add(&mut meta, &message("2", &["1"]), &[], &[]);
        assert_eq!(tb, ta);
        for d in [a, b, c] {
            assert_eq!(meta.load_messageinfo(d).unwrap().unwrap().thread_id, ta);
        }
        let info = meta.load_threadinfo(ta).unwrap().unwrap();
        assert_eq!(info.labels, strings(&["alpha", "gamma"]));
        assert!(meta.load_threadinfo(tc).unwrap().is_none());
        // The merged labels reach every member in the index.
        let hits = meta.index().run_query(&Query::label("gamma"), None, 10).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn test_message_record_and_snippet() {
        let mut meta = open();
        let mut m = message("a", &[]);
        m.snippet = "x".repeat(250);
        let mut extra = BTreeMap::new();
        extra.insert("folder".to_string(), "INBOX".to_string());
        let (d, _) = meta.add_message(&m, &[] as &[&str], &[], extra).unwrap();
        let info = meta.load_messageinfo(d).unwrap().unwrap();
        assert_eq!(info.snippet.chars().count(), 100);
        assert_eq!(info.record.from, "Egg Zample <egg@example.com>");
        assert_eq!(info.record.extra.get("folder").map(String::as_str), Some("INBOX"));
        assert_eq!(info.record.safe_msgid, m.safe_msgid());
    }

    #[test]
    fn test_fields_are_searchable() {
        let mut meta = open();
        let mut m = message("a", &[]);
        m.subject = "Quarterly REPORT".into();
        add(&mut meta, &m, &[], &[]);
        for q in ["subject:report", "from:zample", "to:eggs", "mice", "date:20240101"] {
            let query = Query::parse_default(q).unwrap();
            assert_eq!(meta.index().run_query(&query, None, 10).unwrap().len(), 1, "{q}");
        }
    }

    #[test]
    fn test_transform_rewrites_indexed_body() {
        let meta = open();
        let mut meta = meta.with_transform(Box::new(
            |t: &str| -> anyhow::Result<Option<String>> { Ok(Some(t.replace("mice", "rodents"))) },
        ));
        add(&mut meta, &message("a", &[]), &[], &[]);
        let hit = Query::parse_default("rodents").unwrap();
        let miss = Query::parse_default("mice").unwrap();
        assert_eq!(meta.index().run_query(&hit, None, 10).unwrap().len(), 1);
        assert!(meta.index().run_query(&miss, None, 10).unwrap().is_empty());
    }

    #[test]
    fn test_failing_transform_indexes_original_text() {
        let meta = open();
        let mut meta = meta.with_transform(Box::new(
            |_: &str| -> anyhow::Result<Option<String>> { anyhow::bail!("stemmer crashed") },
        ));
        let (d, t) = add(&mut meta, &message("a", &[]), &[], &["kept"]);
        assert!(meta.load_messageinfo(d).unwrap().is_some());
        for q in ["mice", "from:egg", "~kept"] {
            let query = Query::parse_default(q).unwrap();
            assert_eq!(meta.index().run_query(&query, None, 10).unwrap().len(), 1, "{q}");
        }
        let mut cursor = crate::meta::QueryCursor::parse("love").unwrap();
        let hits = meta.get_some_results(&mut cursor, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].thread_id, t);
    }

    #[test]
    fn test_sender_becomes_contact() {
        let mut meta = open();
        let m = message("a", &[]);
        add(&mut meta, &m, &[], &[]);
        let contacts = meta.list_contacts(Some("egg@"), 10).unwrap();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].timestamp, m.date.timestamp());
    }
}
