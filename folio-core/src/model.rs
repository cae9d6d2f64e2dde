//! Persistent records and request shapes.
//!
//! A document (`SuperObject`) owns head/tail pointers into an intrusive
//! doubly-linked chain of `ContentBlock`s. Chain membership is encoded only
//! through the blocks' `next`/`prev` ids; there is no owner field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Block-type-specific payload. Never interpreted by the synchronizer.
pub type BlockData = Map<String, Value>;

/// Generate a fresh server-side block id.
pub fn new_block_id() -> String {
    Uuid::new_v4().to_string()
}

/// Canonical form of a client-supplied block id.
///
/// Returns `None` for anything that is not a server-issued id format,
/// which callers treat the same as an absent id.
pub fn parse_block_id(raw: &str) -> Option<String> {
    Uuid::parse_str(raw).ok().map(|id| id.to_string())
}

/// One node of a document's block chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    /// Tool/block kind, e.g. "paragraph", "header", "image"
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: BlockData,
    pub next: Option<String>,
    pub prev: Option<String>,
}

impl ContentBlock {
    /// An unlinked block.
    pub fn new(id: impl Into<String>, kind: impl Into<String>, data: BlockData) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            data,
            next: None,
            prev: None,
        }
    }

    /// Whether this block has neither neighbour set.
    pub fn is_unlinked(&self) -> bool {
        self.next.is_none() && self.prev.is_none()
    }
}

/// Document metadata plus the head/tail of its block chain.
///
/// `first_item` is `None` iff the document has no blocks; same for `last_item`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperObject {
    pub id: String,
    /// External file this document belongs to. Unique across documents.
    pub file_id: i64,
    pub service_type: String,
    pub name: String,
    pub first_item: Option<String>,
    pub last_item: Option<String>,
    pub last_change_date: DateTime<Utc>,
    /// Opaque client-managed version/checksum, passed through untouched.
    pub checksum: Option<i64>,
    #[serde(default)]
    pub template: Option<Template>,
    #[serde(default)]
    pub decoration: Option<Decoration>,
}

/// Presentation template chosen for a document. Stored, never interpreted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

/// Page margins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decoration {
    #[serde(default)]
    pub margin_top: Option<i32>,
    #[serde(default)]
    pub margin_right: Option<i32>,
    #[serde(default)]
    pub margin_bottom: Option<i32>,
    #[serde(default)]
    pub margin_left: Option<i32>,
}

impl SuperObject {
    /// A fresh, empty document with a server-generated id.
    pub fn new(file_id: i64, service_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            file_id,
            service_type: service_type.into(),
            name: name.into(),
            first_item: None,
            last_item: None,
            last_change_date: Utc::now(),
            checksum: None,
            template: None,
            decoration: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_item.is_none()
    }

    pub fn touch(&mut self) {
        self.last_change_date = Utc::now();
    }
}

/// One entry of a full-document sync payload, as sent by the editor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockInput {
    /// Client's idea of the block id; may be missing, unknown or not ours.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: BlockData,
}

impl BlockInput {
    pub fn new(kind: impl Into<String>, data: BlockData) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            data,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Parse a JSON sync payload. Any malformed entry rejects the whole list.
    pub fn parse_list(bytes: &[u8]) -> Result<Vec<Self>> {
        let list: Vec<Self> = serde_json::from_slice(bytes)
            .map_err(|e| SyncError::Malformed(format!("invalid block list: {e}")))?;
        for (index, entry) in list.iter().enumerate() {
            entry.validate(index)?;
        }
        Ok(list)
    }

    pub(crate) fn validate(&self, index: usize) -> Result<()> {
        if self.kind.trim().is_empty() {
            return Err(SyncError::Malformed(format!("block #{index} has an empty type")));
        }
        Ok(())
    }
}

/// Partial update of a single block. Linkage is never touched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BlockPatch {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub data: Option<BlockData>,
}

/// Request to provision a document for an external file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewDocument {
    pub file_id: Option<i64>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub checksum: Option<i64>,
    #[serde(default)]
    pub template: Option<Template>,
    #[serde(default)]
    pub decoration: Option<Decoration>,
}

/// Metadata-only update. Head/tail pointers are owned by sync.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub checksum: Option<i64>,
    /// Replaces the whole template when present.
    #[serde(default)]
    pub template: Option<Template>,
    #[serde(default)]
    pub decoration: Option<Decoration>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(text: &str) -> BlockData {
        let mut map = BlockData::new();
        map.insert("text".into(), json!(text));
        map
    }

    #[test]
    fn test_parse_block_id_canonicalizes() {
        let id = Uuid::new_v4();
        let upper = id.to_string().to_uppercase();
        assert_eq!(parse_block_id(&upper), Some(id.to_string()));
    }

    #[test]
    fn test_parse_block_id_rejects_foreign_ids() {
        assert_eq!(parse_block_id("b1"), None);
        assert_eq!(parse_block_id(""), None);
        // Editor-generated short ids
        assert_eq!(parse_block_id("mhTl6ghSkV"), None);
    }

    #[test]
    fn test_content_block_wire_shape() {
        let block = ContentBlock::new("abc", "paragraph", data("hi"));
        let value = serde_json::to_value(&block).unwrap();
        assert_eq!(value["type"], "paragraph");
        assert_eq!(value["data"]["text"], "hi");
        assert!(value["next"].is_null());
        assert!(block.is_unlinked());
    }

    #[test]
    fn test_super_object_camel_case() {
        let doc = SuperObject::new(7, "note", "Draft");
        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["fileId"], 7);
        assert_eq!(value["serviceType"], "note");
        assert!(value["firstItem"].is_null());
        assert!(doc.is_empty());
    }

    #[test]
    fn test_document_presentation_fields() {
        let body = br##"{"fileId": 3, "template": {"type": "report", "color": "#fff"},
                        "decoration": {"marginTop": 12, "marginLeft": 8}}"##;
        let request: NewDocument = serde_json::from_slice(body).unwrap();
        let template = request.template.unwrap();
        assert_eq!(template.kind.as_deref(), Some("report"));
        assert!(template.image.is_none());
        let decoration = request.decoration.unwrap();
        assert_eq!(decoration.margin_top, Some(12));
        assert_eq!(decoration.margin_right, None);

        // Older records without the fields still load
        let mut value = serde_json::to_value(SuperObject::new(1, "note", "x")).unwrap();
        let map = value.as_object_mut().unwrap();
        map.remove("template");
        map.remove("decoration");
        let doc: SuperObject = serde_json::from_value(value).unwrap();
        assert!(doc.template.is_none());
    }

    #[test]
    fn test_parse_list_accepts_editor_payload() {
        let body = br#"[
            {"id": "mhTl6ghSkV", "type": "paragraph", "data": {"text": "a"}},
            {"type": "header", "data": {"text": "b", "level": 2}}
        ]"#;
        let list = BlockInput::parse_list(body).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].id.as_deref(), Some("mhTl6ghSkV"));
        assert_eq!(list[1].kind, "header");
        assert_eq!(list[1].data["level"], 2);
    }

    #[test]
    fn test_parse_list_rejects_missing_data() {
        let body = br#"[{"type": "paragraph", "data": {}}, {"type": "paragraph"}]"#;
        let err = BlockInput::parse_list(body).unwrap_err();
        assert!(matches!(err, SyncError::Malformed(_)));
    }

    #[test]
    fn test_parse_list_rejects_blank_type() {
        let body = br#"[{"type": "  ", "data": {}}]"#;
        let err = BlockInput::parse_list(body).unwrap_err();
        assert!(err.to_string().contains("#0"));
    }

    #[test]
    fn test_parse_list_rejects_non_array() {
        assert!(BlockInput::parse_list(br#"{"type": "paragraph"}"#).is_err());
        assert!(BlockInput::parse_list(b"not json").is_err());
    }

    #[test]
    fn test_empty_list_is_valid() {
        assert!(BlockInput::parse_list(b"[]").unwrap().is_empty());
    }
}
