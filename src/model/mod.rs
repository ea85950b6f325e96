//! Core data model: ids, state vocabulary, people, messages and stored records.

pub mod ids;
pub mod message;
pub mod person;
pub mod record;
pub mod state;
