//! Identifier types.
//!
//! The store and the inverted index number documents independently, so the
//! two id spaces get distinct newtypes. Thread ids are tagged: a thread is
//! either rooted at a real message or at a pseudo-root standing in for an
//! ancestor that has never been seen.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Stable message identity assigned by the meta-index. Starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocId(pub u64);

/// Document identity assigned by the inverted index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexDocId(pub u64);

/// Identity of a thread, and of a node inside a thread structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ThreadId {
    /// The node (or thread root) is a message we hold.
    Real(DocId),
    /// Placeholder joining several known children of an unseen parent.
    /// The token is the first real docid found under its first child.
    Pseudo(DocId),
}

impl ThreadId {
    /// The docid of a real node, `None` for pseudo-roots.
    pub fn docid(self) -> Option<DocId> {
        match self {
            ThreadId::Real(d) => Some(d),
            ThreadId::Pseudo(_) => None,
        }
    }

    pub fn is_pseudo(self) -> bool {
        matches!(self, ThreadId::Pseudo(_))
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for IndexDocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Real threads print as the bare docid, pseudo-roots as `p<token>`.
impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadId::Real(d) => write!(f, "{}", d.0),
            ThreadId::Pseudo(d) => write!(f, "p{}", d.0),
        }
    }
}

impl FromStr for DocId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(DocId)
    }
}

impl FromStr for ThreadId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.strip_prefix('p') {
            Some(token) => token.parse().map(|n| ThreadId::Pseudo(DocId(n))),
            None => s.parse().map(|n| ThreadId::Real(DocId(n))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_id_display_and_parse() {
        let real = ThreadId::Real(DocId(12));
        let pseudo = ThreadId::Pseudo(DocId(12));
        assert_eq!(real.to_string(), "12");
        assert_eq!(pseudo.to_string(), "p12");
        assert_eq!("12".parse::<ThreadId>().unwrap(), real);
        assert_eq!("p12".parse::<ThreadId>().unwrap(), pseudo);
        assert!("px".parse::<ThreadId>().is_err());
    }

    #[test]
    fn test_real_and_pseudo_never_compare_equal() {
        assert_ne!(ThreadId::Real(DocId(3)), ThreadId::Pseudo(DocId(3)));
        assert_eq!(ThreadId::Real(DocId(3)).docid(), Some(DocId(3)));
        assert_eq!(ThreadId::Pseudo(DocId(3)).docid(), None);
    }
}
