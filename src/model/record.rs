//! Records persisted in the key/value store and the hydrated views built from them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{DocId, ThreadId};
use super::state::StateSet;

/// Per-message metadata written once at insertion (`doc/<docid>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    pub safe_msgid: String,
    pub subject: String,
    pub date: DateTime<Utc>,
    /// Sender in `Name <addr>` form.
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub has_attachment: bool,
    /// Caller-defined extension fields.
    pub extra: BTreeMap<String, String>,
}

/// One node of a thread tree: a message or a pseudo-root, plus its replies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadNode {
    pub id: ThreadId,
    pub children: Vec<ThreadNode>,
}

impl ThreadNode {
    pub fn leaf(id: ThreadId) -> Self {
        Self {
            id,
            children: Vec::new(),
        }
    }

    /// All node ids in pre-order.
    pub fn flatten(&self) -> Vec<ThreadId> {
        let mut out = Vec::new();
        self.walk(0, &mut |node, _| out.push(node.id));
        out
    }

    /// Real docids in pre-order; pseudo-roots are skipped.
    pub fn docids(&self) -> Vec<DocId> {
        self.flatten().into_iter().filter_map(ThreadId::docid).collect()
    }

    /// First real docid in pre-order.
    pub fn first_docid(&self) -> Option<DocId> {
        self.id
            .docid()
            .or_else(|| self.children.iter().find_map(ThreadNode::first_docid))
    }

    /// Visit every node with its depth, parents before children.
    pub fn walk<F: FnMut(&ThreadNode, usize)>(&self, depth: usize, f: &mut F) {
        f(self, depth);
        for child in &self.children {
            child.walk(depth + 1, f);
        }
    }
}

/// Thread summary written at (re)threading time (`thread/<id>`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadRecord {
    /// Subject of the first message in structure order.
    pub subject: String,
    /// Date of the newest member.
    pub date: DateTime<Utc>,
    /// Senders in structure order, without repeats.
    pub participants: Vec<String>,
    pub direct_recipients: BTreeSet<String>,
    pub indirect_recipients: BTreeSet<String>,
    /// Number of real messages.
    pub size: usize,
    pub structure: ThreadNode,
}

/// A message record joined with its mutable per-message data.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageInfo {
    pub docid: DocId,
    pub thread_id: ThreadId,
    #[serde(flatten)]
    pub record: MessageRecord,
    pub state: StateSet,
    pub labels: BTreeSet<String>,
    pub snippet: String,
}

/// A thread record joined with its derived aggregates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadInfo {
    pub thread_id: ThreadId,
    #[serde(flatten)]
    pub record: ThreadRecord,
    pub state: StateSet,
    pub labels: BTreeSet<String>,
    pub snippet: String,
    pub unread_participants: BTreeSet<String>,
}

/// Entry of [`crate::meta::MetaIndex::load_thread_messageinfos`]: a message,
/// or `None` for a pseudo-root, with its depth in the tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThreadEntry {
    pub message: Option<MessageInfo>,
    pub depth: usize,
}

/// Last-seen record of a correspondent (`c/<email>`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub name: Option<String>,
    pub email: String,
    /// Unix seconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn real(n: u64) -> ThreadId {
        ThreadId::Real(DocId(n))
    }

    #[test]
    fn test_flatten_and_docids_skip_pseudo() {
        let tree = ThreadNode {
            id: ThreadId::Pseudo(DocId(3)),
            children: vec![
                ThreadNode {
                    id: real(3),
                    children: vec![ThreadNode::leaf(real(5))],
                },
                ThreadNode::leaf(real(4)),
            ],
        };
        assert_eq!(
            tree.flatten(),
            vec![ThreadId::Pseudo(DocId(3)), real(3), real(5), real(4)]
        );
        assert_eq!(tree.docids(), vec![DocId(3), DocId(5), DocId(4)]);
        assert_eq!(tree.first_docid(), Some(DocId(3)));
    }

    #[test]
    fn test_walk_depths() {
        let tree = ThreadNode {
            id: real(1),
            children: vec![ThreadNode {
                id: real(2),
                children: vec![ThreadNode::leaf(real(3))],
            }],
        };
        let mut depths = Vec::new();
        tree.walk(0, &mut |n, d| depths.push((n.id, d)));
        assert_eq!(depths, vec![(real(1), 0), (real(2), 1), (real(3), 2)]);
    }
}
