//! Block list synchronizer.
//!
//! Reconciles the editor's full block list with the persisted chain:
//!
//! ```text
//!   incoming [x, new, y]          persisted  head → a → x → y → b
//!        │
//!        ├─ 1. plan   resolve ids (reuse x, y; mint id for new), link in order
//!        ├─ 2. write  upsert every planned block, pointers included
//!        ├─ 3. swap   save document head/tail
//!        └─ 4. sweep  delete a, b (prior chain, not planned)
//! ```
//!
//! Reused blocks get their new links in step 2, before the swap, so an
//! interruption can leave the stored chain inconsistent: dangling links, a
//! head or tail from the old order, even a cycle through a reused block.
//! Readers report that as `ChainBroken` or `ChainCycleDetected`. The next
//! successful sync heals it, because it collects the prior chain with
//! lenient walks from both ends and rewrites every link.
//!
//! There is no isolation against a concurrent single-block edit of the same
//! document: the last write to reach the store wins.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::chain;
use crate::error::{Result, SyncError};
use crate::model::{
    new_block_id, parse_block_id, BlockInput, BlockPatch, ContentBlock, DocumentPatch,
    NewDocument, SuperObject,
};
use crate::store::NoteStore;

/// Applies full syncs and single-block edits against a [`NoteStore`].
#[derive(Clone)]
pub struct Synchronizer {
    store: Arc<dyn NoteStore>,
}

impl Synchronizer {
    pub fn new(store: Arc<dyn NoteStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn NoteStore> {
        &self.store
    }

    // ─── Full sync ────────────────────────────────────────────────────

    /// Make the document's chain equal `incoming`, in order.
    ///
    /// Entries whose id names a stored block update it in place; all others
    /// become new blocks. Blocks of the prior chain that are not named are
    /// deleted. When a client id appears more than once, only its last
    /// occurrence is kept.
    pub fn sync(&self, document_id: &str, incoming: Vec<BlockInput>) -> Result<SuperObject> {
        for (index, entry) in incoming.iter().enumerate() {
            entry.validate(index)?;
        }

        let mut doc = self
            .store
            .get_document(document_id)?
            .ok_or_else(|| SyncError::DocumentNotFound(document_id.to_string()))?;

        let prior = chain::prior_chain_ids(self.store.as_ref(), &doc)?;
        let mut planned = self.plan(incoming)?;
        chain::link(&mut planned);

        for block in &planned {
            self.store.save_block(block)?;
        }

        doc.first_item = planned.first().map(|b| b.id.clone());
        doc.last_item = planned.last().map(|b| b.id.clone());
        doc.touch();
        self.store.save_document(&doc)?;

        let kept: HashSet<&str> = planned.iter().map(|b| b.id.as_str()).collect();
        let mut removed = 0usize;
        for id in prior.iter().filter(|id| !kept.contains(id.as_str())) {
            if self.store.delete_block(id)? {
                removed += 1;
            }
        }

        log::debug!(
            "Synced document {document_id}: {} blocks, {removed} removed",
            planned.len()
        );
        Ok(doc)
    }

    /// Resolve every entry to the block it will become, unlinked.
    fn plan(&self, incoming: Vec<BlockInput>) -> Result<Vec<ContentBlock>> {
        let canonical: Vec<Option<String>> = incoming
            .iter()
            .map(|entry| entry.id.as_deref().and_then(parse_block_id))
            .collect();

        // Last occurrence of each id wins
        let mut last_seen: HashMap<&str, usize> = HashMap::new();
        for (index, id) in canonical.iter().enumerate() {
            if let Some(id) = id {
                last_seen.insert(id.as_str(), index);
            }
        }

        let mut planned = Vec::with_capacity(incoming.len());
        for (index, entry) in incoming.into_iter().enumerate() {
            let existing = match canonical[index].as_deref() {
                Some(id) if last_seen.get(id) != Some(&index) => {
                    log::debug!("Dropping stale duplicate of block {id} at position {index}");
                    continue;
                }
                Some(id) => self.store.get_block(id)?,
                None => None,
            };

            let block = match existing {
                Some(mut block) => {
                    block.kind = entry.kind;
                    block.data = entry.data;
                    block
                }
                None => ContentBlock::new(new_block_id(), entry.kind, entry.data),
            };
            planned.push(block);
        }

        Ok(planned)
    }

    // ─── Single-block primitives ──────────────────────────────────────

    /// Persist a standalone block for `document_id`.
    ///
    /// The block is **not** spliced into the document's chain; it becomes
    /// part of it when a later sync names its id. A well-formed client id
    /// that is not yet stored is kept.
    pub fn create_block(&self, document_id: &str, input: BlockInput) -> Result<ContentBlock> {
        input.validate(0)?;
        if self.store.get_document(document_id)?.is_none() {
            return Err(SyncError::DocumentNotFound(document_id.to_string()));
        }

        let id = match input.id.as_deref().and_then(parse_block_id) {
            Some(id) if self.store.contains_block(&id)? => return Err(SyncError::BlockExists(id)),
            Some(id) => id,
            None => new_block_id(),
        };

        let block = ContentBlock::new(id, input.kind, input.data);
        self.store.save_block(&block)?;
        log::debug!("Created unlinked block {} for document {document_id}", block.id);
        Ok(block)
    }

    /// Replace the type and/or data of a stored block. Links are preserved.
    pub fn update_block(&self, id: &str, patch: BlockPatch) -> Result<ContentBlock> {
        let mut block = self.get_block(id)?;

        if let Some(kind) = patch.kind {
            if kind.trim().is_empty() {
                return Err(SyncError::Malformed(format!("empty type for block {id}")));
            }
            block.kind = kind;
        }
        if let Some(data) = patch.data {
            block.data = data;
        }

        self.store.save_block(&block)?;
        Ok(block)
    }

    /// Remove a stored block. Neighbours keep pointing at it until the next sync.
    pub fn delete_block(&self, id: &str) -> Result<()> {
        let key = parse_block_id(id).unwrap_or_else(|| id.to_string());
        if self.store.delete_block(&key)? {
            Ok(())
        } else {
            Err(SyncError::BlockNotFound(id.to_string()))
        }
    }

    pub fn get_block(&self, id: &str) -> Result<ContentBlock> {
        let key = parse_block_id(id).unwrap_or_else(|| id.to_string());
        self.store
            .get_block(&key)?
            .ok_or_else(|| SyncError::BlockNotFound(id.to_string()))
    }

    // ─── Document records ─────────────────────────────────────────────

    /// Provision the document for a file, or return the one it already has.
    pub fn create_document(&self, request: NewDocument) -> Result<SuperObject> {
        let file_id = request
            .file_id
            .ok_or_else(|| SyncError::Malformed("fileId must be provided".into()))?;

        let mut doc = SuperObject::new(
            file_id,
            request.service_type.unwrap_or_default(),
            request.name.unwrap_or_default(),
        );
        doc.checksum = request.checksum;
        doc.template = request.template;
        doc.decoration = request.decoration;

        let stored = self.store.insert_document_if_absent(&doc)?;
        if stored.id == doc.id {
            log::info!("Created document {} for file {file_id}", stored.id);
        } else {
            log::debug!("File {file_id} already has document {}", stored.id);
        }
        Ok(stored)
    }

    pub fn get_document(&self, id: &str) -> Result<SuperObject> {
        self.store
            .get_document(id)?
            .ok_or_else(|| SyncError::DocumentNotFound(id.to_string()))
    }

    pub fn document_by_file_id(&self, file_id: i64) -> Result<Option<SuperObject>> {
        self.store.find_by_file_id(file_id)
    }

    /// Patch name, service type, checksum, template and decoration.
    /// Head and tail are left alone.
    pub fn update_metadata(&self, id: &str, patch: DocumentPatch) -> Result<SuperObject> {
        let mut doc = self.get_document(id)?;
        if let Some(name) = patch.name {
            doc.name = name;
        }
        if let Some(service_type) = patch.service_type {
            doc.service_type = service_type;
        }
        if let Some(checksum) = patch.checksum {
            doc.checksum = Some(checksum);
        }
        if let Some(template) = patch.template {
            doc.template = Some(template);
        }
        if let Some(decoration) = patch.decoration {
            doc.decoration = Some(decoration);
        }
        doc.touch();
        self.store.save_document(&doc)?;
        Ok(doc)
    }

    pub fn blocks_for_document(&self, document_id: &str) -> Result<Vec<ContentBlock>> {
        self.store.blocks_for_document(document_id)
    }

    pub fn verify_chain(&self, document_id: &str) -> Result<usize> {
        chain::verify_chain(self.store.as_ref(), document_id)
    }
}
