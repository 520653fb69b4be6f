//! Batched write operations
//!
//! A [`BulkOperation`] is one entry of a batch-write request. `upsert` is not
//! a wire action of its own: it is rewritten at construction into an
//! `update` whose payload carries `doc_as_upsert: true`.

use elastic_core::{Document, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Kind of a batched write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    /// Create or replace a whole document
    Index,
    /// Create a document, failing if it exists
    Create,
    /// Partially update an existing document
    Update,
    /// Update, creating the document from the payload if absent
    Upsert,
    /// Remove a document
    Delete,
}

impl BulkAction {
    /// Lowercase action name
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Create => "create",
            BulkAction::Update => "update",
            BulkAction::Upsert => "upsert",
            BulkAction::Delete => "delete",
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BulkAction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "index" => Ok(BulkAction::Index),
            "create" => Ok(BulkAction::Create),
            "update" => Ok(BulkAction::Update),
            "upsert" => Ok(BulkAction::Upsert),
            "delete" => Ok(BulkAction::Delete),
            other => Err(Error::invalid_name(format!("unknown bulk action '{}'", other))),
        }
    }
}

/// One entry of a batch-write request
#[derive(Debug, Clone, PartialEq)]
pub struct BulkOperation {
    /// Wire action; never `Upsert`
    pub action: BulkAction,
    /// Target collection
    pub index: String,
    /// Target document id
    pub id: String,
    /// Payload, omitted when empty
    pub data: Option<Document>,
    /// Extra per-operation parameters (`_retry_on_conflict`, ...)
    pub params: Document,
}

impl BulkOperation {
    /// Build an operation.
    ///
    /// `Upsert` becomes `Update` with `doc_as_upsert: true` added to the
    /// payload. An empty payload is dropped.
    pub fn new(
        action: BulkAction,
        index: impl Into<String>,
        id: impl Into<String>,
        data: Option<Document>,
    ) -> Self {
        let (action, data) = match action {
            BulkAction::Upsert => {
                let mut data = data.unwrap_or_default();
                data.insert("doc_as_upsert".to_string(), Value::Bool(true));
                (BulkAction::Update, Some(data))
            }
            other => (other, data),
        };

        BulkOperation {
            action,
            index: index.into(),
            id: id.into(),
            data: data.filter(|d| !d.is_empty()),
            params: Document::new(),
        }
    }

    /// Add one extra parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Merge a set of extra parameters
    pub fn with_params(mut self, params: Document) -> Self {
        self.params.extend(params);
        self
    }

    /// Conflict-retry hint attached to this operation, if any
    pub fn retry_on_conflict(&self) -> Option<u64> {
        self.params.get("_retry_on_conflict").and_then(Value::as_u64)
    }

    /// Wire form: `{"<action>": {"_index", "_id", ...params, "data"}}`
    pub fn to_value(&self) -> Value {
        let mut metadata = Document::new();
        metadata.insert("_index".to_string(), json!(self.index));
        metadata.insert("_id".to_string(), json!(self.id));
        metadata.extend(self.params.clone());
        if let Some(data) = &self.data {
            metadata.insert("data".to_string(), Value::Object(data.clone()));
        }
        let mut wrapper = Document::new();
        wrapper.insert(self.action.as_str().to_string(), Value::Object(metadata));
        Value::Object(wrapper)
    }
}

// ============================================================================
// Response
// ============================================================================

/// Per-operation outcome of a batch write
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItem {
    /// Action that was applied
    pub action: BulkAction,
    /// Collection written to
    pub index: String,
    /// Document id
    pub id: String,
    /// HTTP-like status of this item
    pub status: u16,
    /// Engine error body for failed items
    pub error: Option<Value>,
}

/// Outcome of a batch write
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    /// True if any item failed
    pub errors: bool,
    /// Item outcomes in request order
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    /// Items that failed
    pub fn failed_items(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|item| item.error.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elastic_core::as_document;

    fn doc(value: Value) -> Option<Document> {
        as_document(value)
    }

    #[test]
    fn test_delete_operation() {
        let op = BulkOperation::new(BulkAction::Delete, "people-1", "id", None);
        assert_eq!(
            op.to_value(),
            json!({"delete": {"_index": "people-1", "_id": "id"}})
        );
    }

    #[test]
    fn test_index_operation_with_params() {
        let op = BulkOperation::new(BulkAction::Index, "people-1", "id", doc(json!({"foo": "bar"})))
            .with_param("_retry_on_conflict", 3);
        assert_eq!(
            op.to_value(),
            json!({"index": {
                "_index": "people-1",
                "_id": "id",
                "_retry_on_conflict": 3,
                "data": {"foo": "bar"}
            }})
        );
        assert_eq!(op.retry_on_conflict(), Some(3));
    }

    #[test]
    fn test_upsert_rewritten_to_update() {
        let op = BulkOperation::new(
            BulkAction::Upsert,
            "people-1",
            "id",
            doc(json!({"doc": {"foo": "bar"}})),
        );
        assert_eq!(op.action, BulkAction::Update);
        assert_eq!(
            op.data.map(Value::Object),
            Some(json!({"doc_as_upsert": true, "doc": {"foo": "bar"}}))
        );
    }

    #[test]
    fn test_upsert_without_payload_still_flags() {
        let op = BulkOperation::new(BulkAction::Upsert, "people-1", "id", None);
        assert_eq!(
            op.data.map(Value::Object),
            Some(json!({"doc_as_upsert": true}))
        );
    }

    #[test]
    fn test_empty_payload_dropped() {
        let op = BulkOperation::new(BulkAction::Index, "people-1", "id", Some(Document::new()));
        assert!(op.data.is_none());
    }

    #[test]
    fn test_action_from_str() {
        assert_eq!("upsert".parse::<BulkAction>().unwrap(), BulkAction::Upsert);
        assert_eq!("delete".parse::<BulkAction>().unwrap(), BulkAction::Delete);
        assert!("merge".parse::<BulkAction>().is_err());
        assert_eq!(BulkAction::Create.to_string(), "create");
    }

    #[test]
    fn test_failed_items() {
        let response = BulkResponse {
            errors: true,
            items: vec![
                BulkItem {
                    action: BulkAction::Index,
                    index: "i".into(),
                    id: "1".into(),
                    status: 201,
                    error: None,
                },
                BulkItem {
                    action: BulkAction::Update,
                    index: "i".into(),
                    id: "2".into(),
                    status: 404,
                    error: Some(json!({"type": "document_missing_exception"})),
                },
            ],
        };
        let failed: Vec<_> = response.failed_items().map(|i| i.id.as_str()).collect();
        assert_eq!(failed, vec!["2"]);
    }
}
