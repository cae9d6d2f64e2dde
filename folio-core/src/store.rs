//! Persistence contracts for blocks and documents, plus an in-memory arena.
//!
//! Stores are plain key-value maps: they never interpret `next`/`prev`.
//! Chain traversal lives in [`crate::chain`] and is exposed here through
//! [`NoteStore::blocks_for_document`].

use std::collections::HashMap;
use std::sync::RwLock;

use crate::chain;
use crate::error::{Result, SyncError};
use crate::model::{ContentBlock, SuperObject};

/// Key-value persistence for individual blocks, keyed by block id.
pub trait BlockStore: Send + Sync {
    fn get_block(&self, id: &str) -> Result<Option<ContentBlock>>;

    /// Insert or overwrite the block stored under `block.id`.
    fn save_block(&self, block: &ContentBlock) -> Result<()>;

    /// Returns `false` when nothing was stored under `id`.
    fn delete_block(&self, id: &str) -> Result<bool>;

    fn contains_block(&self, id: &str) -> Result<bool> {
        Ok(self.get_block(id)?.is_some())
    }
}

/// Persistence for document records.
pub trait DocumentStore: Send + Sync {
    fn get_document(&self, id: &str) -> Result<Option<SuperObject>>;

    fn save_document(&self, doc: &SuperObject) -> Result<()>;

    fn find_by_file_id(&self, file_id: i64) -> Result<Option<SuperObject>>;

    /// Store `doc` unless a document already owns `doc.file_id`.
    ///
    /// Returns whichever record ends up owning the file id. Must be atomic
    /// with respect to concurrent callers for the same file id.
    fn insert_document_if_absent(&self, doc: &SuperObject) -> Result<SuperObject>;
}

/// Everything the synchronizer needs from a backend.
pub trait NoteStore: BlockStore + DocumentStore {
    /// Walk the chain from `firstItem`, failing on cycles or dangling links.
    fn blocks_for_document(&self, document_id: &str) -> Result<Vec<ContentBlock>> {
        chain::blocks_for_document(self, document_id)
    }
}

impl<T: BlockStore + DocumentStore + ?Sized> NoteStore for T {}

/// In-memory arena: block map plus document map.
///
/// Used when the server runs without a data directory, and by tests.
#[derive(Default)]
pub struct MemoryStore {
    blocks: RwLock<HashMap<String, ContentBlock>>,
    documents: RwLock<HashMap<String, SuperObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks stored, linked or not.
    pub fn block_count(&self) -> Result<usize> {
        let blocks = self.blocks.read().map_err(SyncError::persistence)?;
        Ok(blocks.len())
    }

    pub fn document_count(&self) -> Result<usize> {
        let documents = self.documents.read().map_err(SyncError::persistence)?;
        Ok(documents.len())
    }
}

impl BlockStore for MemoryStore {
    fn get_block(&self, id: &str) -> Result<Option<ContentBlock>> {
        let blocks = self.blocks.read().map_err(SyncError::persistence)?;
        Ok(blocks.get(id).cloned())
    }

    fn save_block(&self, block: &ContentBlock) -> Result<()> {
        let mut blocks = self.blocks.write().map_err(SyncError::persistence)?;
        blocks.insert(block.id.clone(), block.clone());
        Ok(())
    }

    fn delete_block(&self, id: &str) -> Result<bool> {
        let mut blocks = self.blocks.write().map_err(SyncError::persistence)?;
        Ok(blocks.remove(id).is_some())
    }

    fn contains_block(&self, id: &str) -> Result<bool> {
        let blocks = self.blocks.read().map_err(SyncError::persistence)?;
        Ok(blocks.contains_key(id))
    }
}

impl DocumentStore for MemoryStore {
    fn get_document(&self, id: &str) -> Result<Option<SuperObject>> {
        let documents = self.documents.read().map_err(SyncError::persistence)?;
        Ok(documents.get(id).cloned())
    }

    fn save_document(&self, doc: &SuperObject) -> Result<()> {
        let mut documents = self.documents.write().map_err(SyncError::persistence)?;
        documents.insert(doc.id.clone(), doc.clone());
        Ok(())
    }

    fn find_by_file_id(&self, file_id: i64) -> Result<Option<SuperObject>> {
        let documents = self.documents.read().map_err(SyncError::persistence)?;
        Ok(documents.values().find(|d| d.file_id == file_id).cloned())
    }

    fn insert_document_if_absent(&self, doc: &SuperObject) -> Result<SuperObject> {
        // Check and insert under one write guard
        let mut documents = self.documents.write().map_err(SyncError::persistence)?;
        if let Some(existing) = documents.values().find(|d| d.file_id == doc.file_id) {
            return Ok(existing.clone());
        }
        documents.insert(doc.id.clone(), doc.clone());
        Ok(doc.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BlockData;

    #[test]
    fn test_block_save_get_delete() {
        let store = MemoryStore::new();
        let block = ContentBlock::new("b1", "paragraph", BlockData::new());

        store.save_block(&block).unwrap();
        assert_eq!(store.get_block("b1").unwrap(), Some(block));
        assert!(store.contains_block("b1").unwrap());

        assert!(store.delete_block("b1").unwrap());
        assert!(!store.delete_block("b1").unwrap());
        assert!(store.get_block("b1").unwrap().is_none());
    }

    #[test]
    fn test_save_block_overwrites() {
        let store = MemoryStore::new();
        let mut block = ContentBlock::new("b1", "paragraph", BlockData::new());
        store.save_block(&block).unwrap();

        block.kind = "header".into();
        store.save_block(&block).unwrap();

        assert_eq!(store.get_block("b1").unwrap().unwrap().kind, "header");
        assert_eq!(store.block_count().unwrap(), 1);
    }

    #[test]
    fn test_find_by_file_id() {
        let store = MemoryStore::new();
        let doc = SuperObject::new(42, "note", "Plan");
        store.save_document(&doc).unwrap();

        assert_eq!(store.find_by_file_id(42).unwrap().unwrap().id, doc.id);
        assert!(store.find_by_file_id(43).unwrap().is_none());
    }

    #[test]
    fn test_insert_if_absent_keeps_first() {
        let store = MemoryStore::new();
        let first = SuperObject::new(5, "note", "First");
        let second = SuperObject::new(5, "note", "Second");

        let a = store.insert_document_if_absent(&first).unwrap();
        let b = store.insert_document_if_absent(&second).unwrap();

        assert_eq!(a.id, first.id);
        assert_eq!(b.id, first.id);
        assert_eq!(store.document_count().unwrap(), 1);
    }

    #[test]
    fn test_blocks_for_empty_document() {
        let store = MemoryStore::new();
        let doc = SuperObject::new(1, "note", "Empty");
        store.save_document(&doc).unwrap();

        assert!(store.blocks_for_document(&doc.id).unwrap().is_empty());
        assert!(matches!(
            store.blocks_for_document("missing"),
            Err(SyncError::DocumentNotFound(_))
        ));
    }
}
