//! Document shape shared by reads and writes
//!
//! Documents are opaque JSON objects. Reads hand them back with the
//! engine-assigned id merged in under the reserved [`ID_FIELD`] key.

use serde_json::{Map, Value};

/// A stored document body (JSON object)
pub type Document = Map<String, Value>;

/// Reserved key carrying a document's id in read results
pub const ID_FIELD: &str = "_id";

/// Merge `id` into `source` under [`ID_FIELD`].
///
/// A missing source yields a document holding only the id. An `_id` key
/// already present in the source is overwritten.
pub fn source_with_id(source: Option<Document>, id: &str) -> Document {
    let mut doc = source.unwrap_or_default();
    doc.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    doc
}

/// Convert a JSON value into a document, if it is an object
pub fn as_document(value: Value) -> Option<Document> {
    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}
