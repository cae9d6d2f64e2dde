//! Applies inbound edit events and relays them to the document's other viewers.
//!
//! One call to [`Broadcaster::handle_message`] per inbound frame, awaited in
//! receipt order by the connection task:
//!
//! ```text
//!   raw text ── parse ──✗──▸ error reply to sender
//!                 │
//!             subscribe(doc, sender)
//!                 │
//!             apply (create / edit / delete) ──✗──▸ logged, nothing sent
//!                 │
//!             broadcast(doc, raw, excluding sender)
//! ```

use std::sync::Arc;

use folio_core::{ContentBlock, ErrorKind, SyncError, Synchronizer};

use crate::protocol::{EditEvent, EditKind, ErrorReply, ProtocolError};
use crate::registry::{BroadcastReport, ConnectionId, SessionHandle, SessionRegistry};

/// What happened to one inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    /// Persisted and relayed to the other subscribers.
    Broadcast(BroadcastReport),
    /// Not understood; `reply` goes back to the sender only.
    Rejected { reply: String },
    /// Understood but not applied. Logged; nothing is sent.
    Failed(SyncError),
}

impl MessageOutcome {
    /// Frame to send back to the sender, if any.
    pub fn reply(&self) -> Option<&str> {
        match self {
            Self::Rejected { reply } => Some(reply),
            _ => None,
        }
    }
}

#[derive(Clone)]
pub struct Broadcaster {
    synchronizer: Synchronizer,
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub fn new(synchronizer: Synchronizer, registry: Arc<SessionRegistry>) -> Self {
        Self {
            synchronizer,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    pub async fn handle_message(&self, session: &SessionHandle, raw: &str) -> MessageOutcome {
        let event = match EditEvent::parse(raw) {
            Ok(event) => event,
            Err(e) => return Self::reject(session, &e),
        };

        self.registry.subscribe(&event.document_id, session).await;

        match self.apply(&event).await {
            Ok(block) => {
                log::debug!(
                    "{} on block {} in document {} from session {}",
                    event.kind.as_str(),
                    block.map_or_else(|| "-".to_string(), |b| b.id),
                    event.document_id,
                    session.id()
                );
            }
            Err(e) if e.kind() == ErrorKind::Malformed => {
                let reply = ErrorReply {
                    error: "bad event format".to_string(),
                    detail: e.to_string(),
                };
                return MessageOutcome::Rejected {
                    reply: reply.to_json(),
                };
            }
            Err(e) => {
                log::warn!(
                    "Dropping {} for document {} from session {}: {e}",
                    event.kind.as_str(),
                    event.document_id,
                    session.id()
                );
                return MessageOutcome::Failed(e);
            }
        }

        let report = self
            .registry
            .broadcast(&event.document_id, Arc::from(raw), Some(session.id()))
            .await;
        MessageOutcome::Broadcast(report)
    }

    /// Frames that are not UTF-8 text.
    pub fn reject_binary(&self, session: &SessionHandle) -> MessageOutcome {
        Self::reject(session, &ProtocolError::NotText)
    }

    fn reject(session: &SessionHandle, err: &ProtocolError) -> MessageOutcome {
        log::debug!("Rejected frame from session {}: {err}", session.id());
        MessageOutcome::Rejected {
            reply: ErrorReply::bad_format(err).to_json(),
        }
    }

    /// Persist one event through the single-block primitives.
    async fn apply(&self, event: &EditEvent) -> Result<Option<ContentBlock>, SyncError> {
        let synchronizer = self.synchronizer.clone();
        let event = event.clone();

        // Store calls block; keep them off the reactor
        tokio::task::spawn_blocking(move || match event.kind {
            EditKind::Create => {
                let input = event
                    .create_input()
                    .ok_or_else(|| SyncError::Malformed("block-create without block".into()))?;
                synchronizer.create_block(&event.document_id, input).map(Some)
            }
            EditKind::Edit => {
                let id = event
                    .target_block_id()
                    .ok_or_else(|| SyncError::Malformed("block-edit without block id".into()))?;
                let patch = event.edit_patch().unwrap_or_default();
                synchronizer.update_block(id, patch).map(Some)
            }
            EditKind::Delete => {
                let id = event
                    .target_block_id()
                    .ok_or_else(|| SyncError::Malformed("block-delete without blockId".into()))?;
                synchronizer.delete_block(id).map(|()| None)
            }
        })
        .await
        .map_err(SyncError::persistence)?
    }

    /// Drop a closed connection from every document.
    pub async fn disconnect(&self, id: ConnectionId) {
        let removed = self.registry.unsubscribe(id).await;
        if removed > 0 {
            log::debug!("Session {id} left {removed} document(s)");
        }
    }
}
