//! Docid allocation and the docid ↔ index-id mapping.

use tracing::trace;

use super::{keys, MetaIndex};
use crate::error::{ArchiveError, Result};
use crate::index::InvertedIndex;
use crate::model::ids::{DocId, IndexDocId};
use crate::store::{KvStore, TypedStore};

impl<S: KvStore, I: InvertedIndex> MetaIndex<S, I> {
    /// Hand out the next docid. Docids start at 1 and are never reused.
    pub(crate) fn allocate_docid(&mut self) -> Result<DocId> {
        let next: u64 = self.store.load(keys::NEXT_DOCID)?.unwrap_or(1);
        self.store.save(keys::NEXT_DOCID, &(next + 1))?;
        Ok(DocId(next))
    }

    pub(crate) fn write_id_mapping(&mut self, docid: DocId, index_id: IndexDocId) -> Result<()> {
        trace!(%docid, %index_id, "Mapping ids");
        self.store.save(&keys::store_to_index(docid), &index_id)?;
        self.store.save(&keys::index_to_store(index_id), &docid)
    }

    pub(crate) fn index_id_of(&self, docid: DocId) -> Result<IndexDocId> {
        self.store
            .load(&keys::store_to_index(docid))?
            .ok_or_else(|| ArchiveError::CorruptMapping(format!("doc {docid} has no index id")))
    }

    pub(crate) fn docid_of(&self, index_id: IndexDocId) -> Result<DocId> {
        self.store.load(&keys::index_to_store(index_id))?.ok_or_else(|| {
            ArchiveError::CorruptMapping(format!("index id {index_id} has no doc"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_docids_start_at_one_and_increase() {
        let mut meta = open();
        assert_eq!(meta.allocate_docid().unwrap(), DocId(1));
        assert_eq!(meta.allocate_docid().unwrap(), DocId(2));
    }

    #[test]
    fn test_mapping_both_directions() {
        let mut meta = open();
        meta.write_id_mapping(DocId(5), IndexDocId(0)).unwrap();
        assert_eq!(meta.index_id_of(DocId(5)).unwrap(), IndexDocId(0));
        assert_eq!(meta.docid_of(IndexDocId(0)).unwrap(), DocId(5));
    }

    #[test]
    fn test_missing_mapping_is_corruption() {
        let meta = open();
        assert!(meta.index_id_of(DocId(1)).unwrap_err().is_corruption());
        assert!(meta.docid_of(IndexDocId(1)).unwrap_err().is_corruption());
    }
}
