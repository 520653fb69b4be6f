//! Request and response shapes exchanged with the search engine
//!
//! Field names follow the engine's JSON (`_id`, `_source`, `_scroll_id`), so a
//! transport can deserialize response bodies straight into these types.

use elastic_core::{source_with_id, Document};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// ============================================================================
// Hit
// ============================================================================

/// One document returned by a search, scroll or multi-get
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hit {
    /// Physical collection the document lives in
    #[serde(rename = "_index")]
    pub index: String,
    /// Document id
    #[serde(rename = "_id")]
    pub id: String,
    /// Stored body; absent when a field projection was requested
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Document>,
}

impl Hit {
    /// Create a hit
    pub fn new(index: impl Into<String>, id: impl Into<String>, source: Option<Document>) -> Self {
        Hit {
            index: index.into(),
            id: id.into(),
            source,
        }
    }

    /// Stored body merged with the id under `_id`
    pub fn into_document(self) -> Document {
        source_with_id(self.source, &self.id)
    }
}

/// Result of a point lookup; `found` is false for missing ids
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetResult {
    /// Physical collection that was asked
    #[serde(rename = "_index")]
    pub index: String,
    /// Requested id
    #[serde(rename = "_id")]
    pub id: String,
    /// Whether the document exists
    #[serde(default)]
    pub found: bool,
    /// Stored body when found
    #[serde(rename = "_source", default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Document>,
}

impl GetResult {
    /// Convert into a hit, dropping results that were not found
    pub fn into_hit(self) -> Option<Hit> {
        if self.found {
            Some(Hit::new(self.index, self.id, self.source))
        } else {
            None
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// Initial search request.
///
/// Every optional field left as `None` is omitted from the wire request so
/// the engine's defaults apply.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchRequest {
    /// Collection or alias to search
    pub index: String,
    /// Page size
    pub size: Option<usize>,
    /// Keep-alive for a scroll cursor (e.g. `"5m"`); opens a cursor when set
    pub scroll: Option<String>,
    /// Query body (`query`, `sort`, ...)
    pub body: Option<Value>,
    /// Field projection; hits carry no `_source` when non-empty
    pub stored_fields: Option<Vec<String>>,
}

impl SearchRequest {
    /// Search over `index` with engine defaults
    pub fn new(index: impl Into<String>) -> Self {
        SearchRequest {
            index: index.into(),
            ..Default::default()
        }
    }

    /// Set the page size
    pub fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Open a scroll cursor with the given keep-alive
    pub fn scroll(mut self, ttl: impl Into<String>) -> Self {
        self.scroll = Some(ttl.into());
        self
    }

    /// Set the query body
    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Restrict the returned fields
    pub fn stored_fields(mut self, fields: Vec<String>) -> Self {
        self.stored_fields = Some(fields);
        self
    }

    /// Wire parameters, omitting everything that is absent
    pub fn to_params(&self) -> Value {
        let mut params = json!({ "index": self.index });
        if let Some(size) = self.size {
            params["size"] = json!(size);
        }
        if let Some(scroll) = &self.scroll {
            params["scroll"] = json!(scroll);
        }
        if let Some(body) = &self.body {
            params["body"] = body.clone();
        }
        if let Some(fields) = &self.stored_fields {
            params["stored_fields"] = json!(fields);
        }
        params
    }
}

/// Hits section of a search response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HitList {
    /// The page of hits
    #[serde(default)]
    pub hits: Vec<Hit>,
}

/// Page returned by a search or scroll request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Continuation token for the next page, when a cursor is open
    #[serde(rename = "_scroll_id", default, skip_serializing_if = "Option::is_none")]
    pub scroll_id: Option<String>,
    /// Hits on this page
    #[serde(default)]
    pub hits: HitList,
}

impl SearchResponse {
    /// Build a response page
    pub fn new(scroll_id: Option<String>, hits: Vec<Hit>) -> Self {
        SearchResponse {
            scroll_id,
            hits: HitList { hits },
        }
    }

    /// Hits on this page
    pub fn hits(&self) -> &[Hit] {
        &self.hits.hits
    }

    /// Take the hits out of the response
    pub fn into_hits(self) -> Vec<Hit> {
        self.hits.hits
    }
}

// ============================================================================
// Aliases
// ============================================================================

/// One step of an atomic alias update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AliasAction {
    /// Point `alias` at `index`
    Add {
        /// Alias name
        alias: String,
        /// Physical collection
        index: String,
    },
    /// Stop pointing `alias` at `index`
    Remove {
        /// Alias name
        alias: String,
        /// Physical collection
        index: String,
    },
}

impl AliasAction {
    /// Add action
    pub fn add(alias: impl Into<String>, index: impl Into<String>) -> Self {
        AliasAction::Add {
            alias: alias.into(),
            index: index.into(),
        }
    }

    /// Remove action
    pub fn remove(alias: impl Into<String>, index: impl Into<String>) -> Self {
        AliasAction::Remove {
            alias: alias.into(),
            index: index.into(),
        }
    }

    /// Wire form: `{"add": {"alias": ..., "index": ...}}`
    pub fn to_value(&self) -> Value {
        match self {
            AliasAction::Add { alias, index } => json!({ "add": { "alias": alias, "index": index } }),
            AliasAction::Remove { alias, index } => {
                json!({ "remove": { "alias": alias, "index": index } })
            }
        }
    }
}

// ============================================================================
// Collections
// ============================================================================

/// Row of a collection listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Physical collection name
    pub index: String,
    /// Number of searchable documents
    #[serde(rename = "docs.count", default)]
    pub docs_count: u64,
}
