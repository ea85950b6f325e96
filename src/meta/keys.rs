//! Key namespaces in the key/value store.
//!
//! | key                    | value                          |
//! |------------------------|--------------------------------|
//! | `version`              | schema version string          |
//! | `next_docid`           | next docid to hand out         |
//! | `docid/<hash>`         | docid of a message content hash|
//! | `doc/<docid>`          | `MessageRecord`                |
//! | `state/<docid>`        | message state set              |
//! | `mlabels/<docid>`      | labels mirrored onto a message |
//! | `msnip/<docid>`        | message snippet                |
//! | `threadid/<docid>`     | thread a message belongs to    |
//! | `s2i/<docid>`          | index-local id of a docid      |
//! | `i2s/<index id>`       | docid of an index-local id     |
//! | `pmsgid/<hash>`        | parent content hash            |
//! | `cmsgids/<hash>`       | child content hashes           |
//! | `thread/<tid>`         | `ThreadRecord`                 |
//! | `tlabels/<tid>`        | thread label set               |
//! | `tstate/<tid>`         | thread state set               |
//! | `tsnip/<tid>`          | thread snippet                 |
//! | `turps/<tid>`          | unread participants            |
//! | `labellist`            | every label ever accepted      |
//! | `c/<email>`            | `Contact` by lower-cased email |
//! | `cname/<name>`         | `Contact` by lower-cased name  |

use crate::model::ids::{DocId, IndexDocId, ThreadId};

pub const VERSION: &str = "version";
pub const NEXT_DOCID: &str = "next_docid";
pub const LABEL_LIST: &str = "labellist";
pub const CONTACT_PREFIX: &str = "c/";

pub fn docid_for(safe_msgid: &str) -> String {
    format!("docid/{safe_msgid}")
}

pub fn doc(d: DocId) -> String {
    format!("doc/{d}")
}

pub fn state(d: DocId) -> String {
    format!("state/{d}")
}

pub fn message_labels(d: DocId) -> String {
    format!("mlabels/{d}")
}

pub fn message_snippet(d: DocId) -> String {
    format!("msnip/{d}")
}

pub fn thread_of(d: DocId) -> String {
    format!("threadid/{d}")
}

pub fn store_to_index(d: DocId) -> String {
    format!("s2i/{d}")
}

pub fn index_to_store(i: IndexDocId) -> String {
    format!("i2s/{i}")
}

pub fn parent(safe_msgid: &str) -> String {
    format!("pmsgid/{safe_msgid}")
}

pub fn children(safe_msgid: &str) -> String {
    format!("cmsgids/{safe_msgid}")
}

pub fn thread(t: ThreadId) -> String {
    format!("thread/{t}")
}

pub fn thread_labels(t: ThreadId) -> String {
    format!("tlabels/{t}")
}

pub fn thread_state(t: ThreadId) -> String {
    format!("tstate/{t}")
}

pub fn thread_snippet(t: ThreadId) -> String {
    format!("tsnip/{t}")
}

pub fn unread_participants(t: ThreadId) -> String {
    format!("turps/{t}")
}

/// Every per-thread key, for tearing a thread down when it is absorbed.
pub fn all_thread_keys(t: ThreadId) -> [String; 5] {
    [
        thread(t),
        thread_labels(t),
        thread_state(t),
        thread_snippet(t),
        unread_participants(t),
    ]
}

pub fn contact(email: &str) -> String {
    format!("{CONTACT_PREFIX}{}", email.to_lowercase())
}

pub fn contact_by_name(name: &str) -> String {
    format!("cname/{}", name.to_lowercase())
}
