//! Bounded walks over a document's block chain.
//!
//! Pointers are never trusted: every walk tracks visited ids and stops with
//! `ChainCycleDetected` on the first repeat instead of looping.

use std::collections::HashSet;

use crate::error::{Result, SyncError};
use crate::model::{ContentBlock, SuperObject};
use crate::store::{BlockStore, DocumentStore};

/// Blocks of `document_id` in chain order.
pub fn blocks_for_document<S>(store: &S, document_id: &str) -> Result<Vec<ContentBlock>>
where
    S: BlockStore + DocumentStore + ?Sized,
{
    let doc = store
        .get_document(document_id)?
        .ok_or_else(|| SyncError::DocumentNotFound(document_id.to_string()))?;
    walk_forward(store, &doc)
}

/// Follow `next` from `doc.first_item` until it runs out.
pub fn walk_forward<S: BlockStore + ?Sized>(store: &S, doc: &SuperObject) -> Result<Vec<ContentBlock>> {
    let mut visited = HashSet::new();
    let mut blocks = Vec::new();
    let mut cursor = doc.first_item.clone();

    while let Some(id) = cursor {
        if !visited.insert(id.clone()) {
            return Err(SyncError::ChainCycleDetected {
                document_id: doc.id.clone(),
                block_id: id,
            });
        }
        let block = store.get_block(&id)?.ok_or_else(|| SyncError::ChainBroken {
            document_id: doc.id.clone(),
            reason: format!("next link points at missing block {id}"),
        })?;
        cursor = block.next.clone();
        blocks.push(block);
    }

    Ok(blocks)
}

/// Ids reachable from the head, stopping quietly at damage.
///
/// Used by sync to find the prior chain: a chain left inconsistent by an
/// interrupted sync must not prevent the next sync from repairing it.
pub(crate) fn reachable_ids<S: BlockStore + ?Sized>(store: &S, doc: &SuperObject) -> Result<Vec<String>> {
    lenient_walk(store, doc, Direction::Forward)
}

/// Ids reachable from the head or the tail, forward ids first.
///
/// A single-block delete leaves its neighbours pointing at a missing id, so
/// the forward walk alone loses everything after the gap.
pub(crate) fn prior_chain_ids<S: BlockStore + ?Sized>(store: &S, doc: &SuperObject) -> Result<Vec<String>> {
    let mut ids = reachable_ids(store, doc)?;
    let mut seen: HashSet<String> = ids.iter().cloned().collect();
    for id in lenient_walk(store, doc, Direction::Backward)? {
        if seen.insert(id.clone()) {
            ids.push(id);
        }
    }
    Ok(ids)
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Forward,
    Backward,
}

fn lenient_walk<S: BlockStore + ?Sized>(
    store: &S,
    doc: &SuperObject,
    direction: Direction,
) -> Result<Vec<String>> {
    let mut visited = HashSet::new();
    let mut ids = Vec::new();
    let mut cursor = match direction {
        Direction::Forward => doc.first_item.clone(),
        Direction::Backward => doc.last_item.clone(),
    };

    while let Some(id) = cursor {
        if !visited.insert(id.clone()) {
            log::warn!("Cycle at block {id} in document {} ({direction:?}); truncating prior chain", doc.id);
            break;
        }
        match store.get_block(&id)? {
            Some(block) => {
                cursor = match direction {
                    Direction::Forward => block.next,
                    Direction::Backward => block.prev,
                };
                ids.push(id);
            }
            None => {
                log::warn!("Dangling link to {id} in document {} ({direction:?}); truncating prior chain", doc.id);
                break;
            }
        }
    }

    Ok(ids)
}

/// Check that the chain is well formed in both directions.
///
/// Forward from `firstItem` must end at `lastItem` with every `prev`
/// pointing at its predecessor; backward from `lastItem` must reproduce the
/// reverse order. Returns the number of blocks.
pub fn verify_chain<S>(store: &S, document_id: &str) -> Result<usize>
where
    S: BlockStore + DocumentStore + ?Sized,
{
    let doc = store
        .get_document(document_id)?
        .ok_or_else(|| SyncError::DocumentNotFound(document_id.to_string()))?;
    let broken = |reason: String| SyncError::ChainBroken {
        document_id: doc.id.clone(),
        reason,
    };

    if doc.first_item.is_none() != doc.last_item.is_none() {
        return Err(broken("only one of firstItem/lastItem is set".into()));
    }

    let forward = walk_forward(store, &doc)?;

    let mut expected_prev: Option<&str> = None;
    for block in &forward {
        if block.prev.as_deref() != expected_prev {
            return Err(broken(format!(
                "block {} has prev {:?}, expected {:?}",
                block.id, block.prev, expected_prev
            )));
        }
        expected_prev = Some(&block.id);
    }
    if forward.last().map(|b| b.id.as_str()) != doc.last_item.as_deref() {
        return Err(broken(format!(
            "forward walk ends at {:?} but lastItem is {:?}",
            forward.last().map(|b| &b.id),
            doc.last_item
        )));
    }

    // Backward walk from the tail
    let mut visited = HashSet::new();
    let mut backward = Vec::with_capacity(forward.len());
    let mut cursor = doc.last_item.clone();
    while let Some(id) = cursor {
        if !visited.insert(id.clone()) {
            return Err(SyncError::ChainCycleDetected {
                document_id: doc.id.clone(),
                block_id: id,
            });
        }
        let block = store
            .get_block(&id)?
            .ok_or_else(|| broken(format!("prev link points at missing block {id}")))?;
        cursor = block.prev.clone();
        backward.push(block.id);
    }
    backward.reverse();

    let forward_ids: Vec<&str> = forward.iter().map(|b| b.id.as_str()).collect();
    if backward != forward_ids {
        return Err(broken("backward walk does not mirror forward walk".into()));
    }

    Ok(forward.len())
}

/// Rewrite `next`/`prev` so the slice order becomes the chain order.
pub(crate) fn link(blocks: &mut [ContentBlock]) {
    let ids: Vec<String> = blocks.iter().map(|b| b.id.clone()).collect();
    for (i, block) in blocks.iter_mut().enumerate() {
        block.prev = if i > 0 { Some(ids[i - 1].clone()) } else { None };
        block.next = ids.get(i + 1).cloned();
    }
}
