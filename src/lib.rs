//! `archivist`: a personal mail archive backend.
//!
//! This crate threads, labels and searches message metadata. It sits on top
//! of two collaborators: a key/value store holding records, and an inverted
//! index answering full-text and label queries. Reference implementations of
//! both are included, in memory and file-backed.

pub mod config;
pub mod error;
pub mod hooks;
pub mod index;
pub mod meta;
pub mod model;
pub mod store;

pub use error::{ArchiveError, Result};
pub use meta::{MetaIndex, MetaOptions, QueryCursor};
pub use model::ids::{DocId, IndexDocId, ThreadId};
pub use model::message::{Message, MessageFlags};
pub use model::person::Person;
pub use model::state::{MessageState, StateSet};
