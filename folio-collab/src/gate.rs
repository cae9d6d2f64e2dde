//! Latest-wins admission for full-document syncs.
//!
//! Editors resend the whole block list on every debounce tick, so two
//! requests for the same document can race. Each request takes a ticket;
//! after the optional debounce it waits for the document's lane and gives
//! up if a newer ticket was issued meanwhile. Only the newest list is ever
//! written.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use folio_core::{BlockInput, Result, SuperObject, SyncError, Synchronizer};
use tokio::sync::Mutex;

/// Result of a gated sync.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    Applied(SuperObject),
    /// A newer sync for the same document arrived first; nothing was written.
    Superseded,
}

#[derive(Default)]
struct Lane {
    latest: AtomicU64,
    write: Mutex<()>,
}

pub struct SyncGate {
    synchronizer: Synchronizer,
    debounce: Duration,
    lanes: Mutex<HashMap<String, Arc<Lane>>>,
}

impl SyncGate {
    pub fn new(synchronizer: Synchronizer, debounce: Duration) -> Self {
        Self {
            synchronizer,
            debounce,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    pub fn synchronizer(&self) -> &Synchronizer {
        &self.synchronizer
    }

    pub async fn submit(&self, document_id: &str, incoming: Vec<BlockInput>) -> Result<GateOutcome> {
        let lane = {
            let mut lanes = self.lanes.lock().await;
            lanes.entry(document_id.to_string()).or_default().clone()
        };
        let ticket = lane.latest.fetch_add(1, Ordering::SeqCst) + 1;

        if !self.debounce.is_zero() {
            tokio::time::sleep(self.debounce).await;
        }

        let outcome = {
            let _guard = lane.write.lock().await;
            if lane.latest.load(Ordering::SeqCst) != ticket {
                log::debug!("Sync ticket {ticket} for {document_id} superseded");
                Ok(GateOutcome::Superseded)
            } else {
                let synchronizer = self.synchronizer.clone();
                let id = document_id.to_string();
                tokio::task::spawn_blocking(move || synchronizer.sync(&id, incoming))
                    .await
                    .map_err(SyncError::persistence)?
                    .map(GateOutcome::Applied)
            }
        };

        self.release(document_id, &lane).await;
        outcome
    }

    /// Forget the lane once nobody else holds it.
    async fn release(&self, document_id: &str, lane: &Arc<Lane>) {
        let mut lanes = self.lanes.lock().await;
        // One reference in the map, one held by the caller
        if Arc::strong_count(lane) == 2 {
            lanes.remove(document_id);
        }
    }

    /// Documents with a sync in flight.
    pub async fn pending_documents(&self) -> usize {
        self.lanes.lock().await.len()
    }
}
