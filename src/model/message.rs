//! Parsed message as handed to the meta-index.
//!
//! MIME decoding happens upstream; by the time a [`Message`] exists its
//! headers are decoded, its text is flattened and its content flags are
//! known. Messages are identified by a content hash of their `Message-ID`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::person::Person;
use super::state::{MessageState, StateSet};

/// Content-derived flags. These become the immutable part of message state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MessageFlags {
    pub has_attachment: bool,
    pub signed: bool,
    pub encrypted: bool,
    pub draft: bool,
    pub sent: bool,
}

impl MessageFlags {
    pub fn to_state(self) -> StateSet {
        [
            (self.has_attachment, MessageState::Attachment),
            (self.signed, MessageState::Signed),
            (self.encrypted, MessageState::Encrypted),
            (self.draft, MessageState::Draft),
            (self.sent, MessageState::Sent),
        ]
        .into_iter()
        .filter_map(|(on, s)| on.then_some(s))
        .collect()
    }
}

/// An incoming message. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// The `Message-ID` header value.
    pub message_id: String,
    /// Ancestor ids from `References`/`In-Reply-To`, most distal first,
    /// nearest ancestor last.
    #[serde(default)]
    pub references: Vec<String>,
    pub from: Person,
    #[serde(default)]
    pub to: Vec<Person>,
    #[serde(default)]
    pub cc: Vec<Person>,
    #[serde(default)]
    pub bcc: Vec<Person>,
    #[serde(default)]
    pub subject: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub flags: MessageFlags,
    /// Flattened searchable text (headers and text parts).
    #[serde(default)]
    pub indexable_text: String,
    /// Short plain-text preview.
    #[serde(default)]
    pub snippet: String,
}

impl Message {
    /// Content hash of the message id.
    pub fn safe_msgid(&self) -> String {
        safe_id(&self.message_id)
    }

    /// Content hashes of the ancestors, in header order.
    pub fn safe_refs(&self) -> Vec<String> {
        self.references
            .iter()
            .map(|r| normalize_id(r))
            .filter(|r| !r.is_empty())
            .map(|r| safe_id(&r))
            .collect()
    }

    /// Everyone the message was sent to: `To`, then `Cc`, then `Bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &Person> {
        self.to.iter().chain(self.cc.iter()).chain(self.bcc.iter())
    }
}

/// SHA-256 hex digest of a normalized message id.
pub fn safe_id(message_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_id(message_id).as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Strip angle brackets and whitespace from a message id.
fn normalize_id(id: &str) -> String {
    id.trim()
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: &str, refs: &[&str]) -> Message {
        Message {
            message_id: id.to_string(),
            references: refs.iter().map(|r| r.to_string()).collect(),
            from: Person::parse("Egg Zample <egg@example.com>"),
            to: vec![Person::parse("eggs@example.com")],
            cc: Vec::new(),
            bcc: vec![Person::parse("hidden@example.com")],
            subject: "test message".to_string(),
            date: Utc::now(),
            flags: MessageFlags::default(),
            indexable_text: "i love mice".to_string(),
            snippet: "i love mice".to_string(),
        }
    }

    #[test]
    fn test_safe_id_ignores_angle_brackets() {
        assert_eq!(safe_id("<a@ex.com>"), safe_id(" a@ex.com "));
        assert_ne!(safe_id("a@ex.com"), safe_id("b@ex.com"));
        assert_eq!(safe_id("a@ex.com").len(), 64);
    }

    #[test]
    fn test_safe_refs_skip_blank_ids() {
        let m = message("<c@ex.com>", &["<a@ex.com>", "  ", "<b@ex.com>"]);
        assert_eq!(m.safe_refs(), vec![safe_id("a@ex.com"), safe_id("b@ex.com")]);
    }

    #[test]
    fn test_flags_to_state() {
        let flags = MessageFlags {
            has_attachment: true,
            signed: true,
            ..Default::default()
        };
        assert_eq!(
            flags.to_state(),
            StateSet::from([MessageState::Attachment, MessageState::Signed])
        );
        assert!(MessageFlags::default().to_state().is_empty());
    }

    #[test]
    fn test_recipients_include_bcc() {
        let m = message("<a@ex.com>", &[]);
        let emails: Vec<_> = m.recipients().map(|p| p.email.as_str()).collect();
        assert_eq!(emails, vec!["eggs@example.com", "hidden@example.com"]);
    }

    #[test]
    fn test_deserialize_minimal_json() {
        let json = r#"{
            "message_id": "<x@ex.com>",
            "from": {"name": null, "email": "x@ex.com"},
            "date": "2024-01-01T10:00:00Z"
        }"#;
        let m: Message = serde_json::from_str(json).unwrap();
        assert!(m.references.is_empty());
        assert_eq!(m.flags, MessageFlags::default());
    }
}
