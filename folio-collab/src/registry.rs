//! Session registry: which live connections watch which document.
//!
//! Each connection owns a bounded outbound queue drained by its socket
//! writer. Broadcast never awaits a subscriber: it `try_send`s into every
//! queue, so one slow peer cannot hold up the others.
//!
//! ```text
//!   broadcast(doc, payload, excluding: A)
//!        │
//!        ├──▸ B queue ── ok
//!        ├──▸ C queue ── full   → dropped, C stays
//!        └──▸ D queue ── closed → D evicted from every document
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Frames queued for one connection's writer.
pub type Outbound = Arc<str>;

/// Handle to one live connection.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: ConnectionId,
    outbound: mpsc::Sender<Outbound>,
}

impl SessionHandle {
    /// New handle plus the receiver its socket writer should drain.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (outbound, rx) = mpsc::channel(capacity.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            outbound,
        };
        (handle, rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn try_deliver(&self, payload: Outbound) -> Result<(), TrySendError<Outbound>> {
        self.outbound.try_send(payload)
    }
}

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistryStats {
    pub messages_sent: u64,
    pub messages_dropped: u64,
    pub sessions_evicted: u64,
    pub active_sessions: usize,
    pub active_documents: usize,
}

/// Result of one broadcast.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BroadcastReport {
    pub delivered: usize,
    /// Subscribers whose queue was full
    pub dropped: usize,
    /// Subscribers found closed and removed
    pub evicted: Vec<ConnectionId>,
}

/// Lock-free counters; read via `stats()`.
#[derive(Default)]
struct AtomicRegistryStats {
    messages_sent: AtomicU64,
    messages_dropped: AtomicU64,
    sessions_evicted: AtomicU64,
}

/// Document id → subscribed connections.
///
/// Membership changes take the write lock; broadcast iterates under the
/// read lock, so concurrent subscribe/unsubscribe/broadcast never observe a
/// half-updated set.
#[derive(Default)]
pub struct SessionRegistry {
    documents: RwLock<HashMap<String, HashMap<ConnectionId, SessionHandle>>>,
    stats: AtomicRegistryStats,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `session` for `document_id`. Returns `false` if it already was.
    pub async fn subscribe(&self, document_id: &str, session: &SessionHandle) -> bool {
        // Fast path: read lock
        {
            let documents = self.documents.read().await;
            if documents
                .get(document_id)
                .is_some_and(|subs| subs.contains_key(&session.id))
            {
                return false;
            }
        }

        let mut documents = self.documents.write().await;
        let subscribers = documents.entry(document_id.to_string()).or_default();
        let added = subscribers.insert(session.id, session.clone()).is_none();
        if added {
            log::debug!("Session {} subscribed to document {document_id}", session.id);
        }
        added
    }

    /// Remove a connection from every document. Returns how many it left.
    pub async fn unsubscribe(&self, id: ConnectionId) -> usize {
        let mut documents = self.documents.write().await;
        Self::remove_locked(&mut documents, &[id])
    }

    fn remove_locked(
        documents: &mut HashMap<String, HashMap<ConnectionId, SessionHandle>>,
        ids: &[ConnectionId],
    ) -> usize {
        let mut removed = 0;
        documents.retain(|_, subscribers| {
            for id in ids {
                if subscribers.remove(id).is_some() {
                    removed += 1;
                }
            }
            !subscribers.is_empty()
        });
        removed
    }

    /// Deliver `payload` to every subscriber of `document_id` except `excluding`.
    ///
    /// Best-effort: a full queue drops the frame for that subscriber only;
    /// a closed queue evicts the subscriber from the registry.
    pub async fn broadcast(
        &self,
        document_id: &str,
        payload: Outbound,
        excluding: Option<ConnectionId>,
    ) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        {
            let documents = self.documents.read().await;
            let Some(subscribers) = documents.get(document_id) else {
                return report;
            };
            for session in subscribers.values() {
                if Some(session.id) == excluding {
                    continue;
                }
                match session.try_deliver(payload.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        log::warn!("Session {} is lagging; dropped frame for {document_id}", session.id);
                        report.dropped += 1;
                    }
                    Err(TrySendError::Closed(_)) => report.evicted.push(session.id),
                }
            }
        }

        if !report.evicted.is_empty() {
            let mut documents = self.documents.write().await;
            Self::remove_locked(&mut documents, &report.evicted);
            log::info!(
                "Evicted {} closed session(s) while broadcasting to {document_id}",
                report.evicted.len()
            );
        }

        self.stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.stats
            .messages_dropped
            .fetch_add(report.dropped as u64, Ordering::Relaxed);
        self.stats
            .sessions_evicted
            .fetch_add(report.evicted.len() as u64, Ordering::Relaxed);
        report
    }

    pub async fn subscriber_count(&self, document_id: &str) -> usize {
        self.documents
            .read()
            .await
            .get(document_id)
            .map_or(0, |subs| subs.len())
    }

    pub async fn is_subscribed(&self, document_id: &str, id: ConnectionId) -> bool {
        self.documents
            .read()
            .await
            .get(document_id)
            .is_some_and(|subs| subs.contains_key(&id))
    }

    /// Documents with at least one subscriber.
    pub async fn active_documents(&self) -> Vec<String> {
        self.documents.read().await.keys().cloned().collect()
    }

    pub async fn stats(&self) -> RegistryStats {
        let documents = self.documents.read().await;
        let mut sessions: Vec<ConnectionId> =
            documents.values().flat_map(|subs| subs.keys().copied()).collect();
        sessions.sort_unstable();
        sessions.dedup();
        RegistryStats {
            messages_sent: self.stats.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.stats.messages_dropped.load(Ordering::Relaxed),
            sessions_evicted: self.stats.sessions_evicted.load(Ordering::Relaxed),
            active_sessions: sessions.len(),
            active_documents: documents.len(),
        }
    }
}
