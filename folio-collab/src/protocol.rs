//! JSON wire protocol for single-block edit events.
//!
//! Inbound text frame:
//! ```text
//! {"documentId": "...", "actorId": 7, "kind": "block-edit",
//!  "block": {"id": "...", "type": "paragraph", "data": {...}}}
//! ```
//!
//! `noteId`, `userId` and `type` are accepted as aliases for the editor
//! client. Outbound broadcast frames are the sender's raw text, unchanged.

use folio_core::{BlockData, BlockInput, BlockPatch};
use serde::{Deserialize, Serialize};

/// Event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditKind {
    #[serde(rename = "block-create")]
    Create,
    #[serde(rename = "block-edit")]
    Edit,
    #[serde(rename = "block-delete")]
    Delete,
}

impl EditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "block-create",
            Self::Edit => "block-edit",
            Self::Delete => "block-delete",
        }
    }
}

/// Block as carried inside an event. Linkage fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventBlock {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<BlockData>,
}

/// A single block-level edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditEvent {
    #[serde(alias = "noteId")]
    pub document_id: String,
    /// Opaque to this layer; identity is enforced elsewhere.
    #[serde(default, alias = "userId")]
    pub actor_id: Option<serde_json::Value>,
    #[serde(alias = "type")]
    pub kind: EditKind,
    #[serde(default)]
    pub block: Option<EventBlock>,
    #[serde(default)]
    pub block_id: Option<String>,
}

impl EditEvent {
    /// Parse and check that the fields required by `kind` are present.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let event: Self =
            serde_json::from_str(raw).map_err(|e| ProtocolError::InvalidJson(e.to_string()))?;
        event.validate()?;
        Ok(event)
    }

    fn validate(&self) -> Result<(), ProtocolError> {
        if self.document_id.trim().is_empty() {
            return Err(ProtocolError::EmptyDocumentId);
        }
        let missing = |field| ProtocolError::MissingField {
            kind: self.kind,
            field,
        };
        match self.kind {
            EditKind::Create => {
                let block = self.block.as_ref().ok_or_else(|| missing("block"))?;
                if block.kind.as_deref().map_or(true, |k| k.trim().is_empty()) {
                    return Err(missing("block.type"));
                }
            }
            EditKind::Edit => {
                let block = self.block.as_ref().ok_or_else(|| missing("block"))?;
                if block.id.is_none() {
                    return Err(missing("block.id"));
                }
            }
            EditKind::Delete => {
                if self.target_block_id().is_none() {
                    return Err(missing("blockId"));
                }
            }
        }
        Ok(())
    }

    /// Block addressed by the event.
    ///
    /// Edits are keyed on `block.id` only; a stray `blockId` never redirects
    /// them. Deletes take `blockId`, else `block.id`.
    pub fn target_block_id(&self) -> Option<&str> {
        let embedded = self.block.as_ref().and_then(|b| b.id.as_deref());
        match self.kind {
            EditKind::Delete => self.block_id.as_deref().or(embedded),
            EditKind::Create | EditKind::Edit => embedded,
        }
    }

    /// Creation request carried by a `block-create` event.
    pub fn create_input(&self) -> Option<BlockInput> {
        let block = self.block.as_ref()?;
        Some(BlockInput {
            id: block.id.clone(),
            kind: block.kind.clone()?,
            data: block.data.clone().unwrap_or_default(),
        })
    }

    /// Patch carried by a `block-edit` event.
    pub fn edit_patch(&self) -> Option<BlockPatch> {
        let block = self.block.as_ref()?;
        Some(BlockPatch {
            kind: block.kind.clone(),
            data: block.data.clone(),
        })
    }
}

/// Reply sent to the sender only, for events that could not be understood.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
    pub detail: String,
}

impl ErrorReply {
    pub fn bad_format(err: &ProtocolError) -> Self {
        Self {
            error: "bad event format".to_string(),
            detail: err.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| "{\"error\":\"bad event format\"}".to_string())
    }
}

/// Protocol errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ProtocolError {
    InvalidJson(String),
    EmptyDocumentId,
    MissingField { kind: EditKind, field: &'static str },
    NotText,
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidJson(e) => write!(f, "Invalid JSON: {e}"),
            Self::EmptyDocumentId => write!(f, "Empty documentId"),
            Self::MissingField { kind, field } => {
                write!(f, "{} event is missing {field}", kind.as_str())
            }
            Self::NotText => write!(f, "Frame is not UTF-8 text"),
        }
    }
}

impl std::error::Error for ProtocolError {}
