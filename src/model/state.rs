//! Message state vocabulary.
//!
//! State is set per message. The mutable part can be changed by callers; the
//! immutable part is derived from message content once, at insertion. Every
//! state word doubles as a reserved label: thread state is unioned into the
//! thread's label set so that `~unread` and friends are searchable.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single state flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MessageState {
    Starred,
    Unread,
    Deleted,
    Attachment,
    Signed,
    Encrypted,
    Draft,
    Sent,
}

/// Set of state flags on a message or thread.
pub type StateSet = BTreeSet<MessageState>;

impl MessageState {
    /// Flags a caller may set or clear.
    pub const MUTABLE: [MessageState; 3] = [Self::Starred, Self::Unread, Self::Deleted];

    /// Flags derived from message content only.
    pub const IMMUTABLE: [MessageState; 5] = [
        Self::Attachment,
        Self::Signed,
        Self::Encrypted,
        Self::Draft,
        Self::Sent,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starred => "starred",
            Self::Unread => "unread",
            Self::Deleted => "deleted",
            Self::Attachment => "attachment",
            Self::Signed => "signed",
            Self::Encrypted => "encrypted",
            Self::Draft => "draft",
            Self::Sent => "sent",
        }
    }

    pub fn is_mutable(self) -> bool {
        Self::MUTABLE.contains(&self)
    }

    /// Whether `word` is reserved by the state vocabulary.
    pub fn is_state_word(word: &str) -> bool {
        word.parse::<MessageState>().is_ok()
    }

    /// Keep only the caller-settable flags named in `words`; anything else,
    /// including immutable flags and unknown words, is dropped.
    pub fn mutable_from_words<W: AsRef<str>>(words: &[W]) -> StateSet {
        words
            .iter()
            .filter_map(|w| w.as_ref().parse::<MessageState>().ok())
            .filter(|s| s.is_mutable())
            .collect()
    }
}

impl fmt::Display for MessageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "starred" => Self::Starred,
            "unread" => Self::Unread,
            "deleted" => Self::Deleted,
            "attachment" => Self::Attachment,
            "signed" => Self::Signed,
            "encrypted" => Self::Encrypted,
            "draft" => Self::Draft,
            "sent" => Self::Sent,
            other => return Err(format!("unknown state {other:?}")),
        })
    }
}

/// Render a state set as its words, for label unions and display.
pub fn state_words(state: &StateSet) -> BTreeSet<String> {
    state.iter().map(|s| s.as_str().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutable_from_words_drops_everything_else() {
        let got = MessageState::mutable_from_words(&["attachment", "unread", "bogus"]);
        assert_eq!(got, StateSet::from([MessageState::Unread]));
    }

    #[test]
    fn test_state_words_roundtrip() {
        for s in MessageState::MUTABLE.iter().chain(MessageState::IMMUTABLE.iter()) {
            assert_eq!(s.as_str().parse::<MessageState>().unwrap(), *s);
            assert!(MessageState::is_state_word(s.as_str()));
        }
        assert!(!MessageState::is_state_word("inbox"));
    }

    #[test]
    fn test_partition_is_disjoint() {
        for s in MessageState::IMMUTABLE {
            assert!(!s.is_mutable());
        }
    }
}
