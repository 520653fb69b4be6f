//! The remote search engine boundary
//!
//! [`SearchEngine`] is the set of raw operations this layer consumes from a
//! transport client. Implementations issue the requests; they apply no
//! policy (no error swallowing, no result filtering). Policy lives in
//! [`Client`](crate::Client).
//!
//! # Implementations
//!
//! - `MemoryEngine`: in-process engine for tests and embedding, behind the
//!   `memory` feature

use crate::bulk::{BulkOperation, BulkResponse};
use crate::types::{AliasAction, CollectionInfo, GetResult, SearchRequest, SearchResponse};
use elastic_core::{Document, EngineResult};
use serde_json::Value;
use std::collections::BTreeSet;

/// Raw operations of a remote search engine.
///
/// Every method blocks the calling thread for the duration of the request.
/// The trait is object-safe for use as `Arc<dyn SearchEngine>`.
pub trait SearchEngine: Send + Sync {
    /// Create a physical collection with the given settings and mappings
    fn create_collection(&self, name: &str, settings: &Value, mappings: &Value) -> EngineResult<()>;

    /// Delete a physical collection
    fn delete_collection(&self, name: &str) -> EngineResult<()>;

    /// Whether a collection (or alias) with this name exists
    fn collection_exists(&self, name: &str) -> EngineResult<bool>;

    /// Make all prior writes visible to search
    fn refresh_collection(&self, name: &str) -> EngineResult<()>;

    /// List collections matching a `*` wildcard pattern
    fn list_collections(&self, pattern: &str) -> EngineResult<Vec<CollectionInfo>>;

    /// Whether the alias exists
    fn alias_exists(&self, alias: &str) -> EngineResult<bool>;

    /// Collections the alias points at (404 when the alias is absent)
    fn get_alias_targets(&self, alias: &str) -> EngineResult<BTreeSet<String>>;

    /// Apply all actions atomically: either every action takes effect or none
    fn update_aliases(&self, actions: &[AliasAction]) -> EngineResult<()>;

    /// Point `alias` at `collection` (single-target convenience)
    fn put_alias(&self, alias: &str, collection: &str) -> EngineResult<()>;

    /// Submit a batch of writes in one request
    fn bulk_write(&self, operations: &[BulkOperation]) -> EngineResult<BulkResponse>;

    /// Fetch one document
    fn get(&self, collection: &str, id: &str) -> EngineResult<GetResult>;

    /// Fetch many documents; one result per requested id, in request order.
    ///
    /// `params` carries per-request options such as `routing` or `_source`.
    fn multi_get(
        &self,
        collection: &str,
        ids: &[String],
        params: &Document,
    ) -> EngineResult<Vec<GetResult>>;

    /// Run a search, opening a scroll cursor when `request.scroll` is set
    fn search(&self, request: &SearchRequest) -> EngineResult<SearchResponse>;

    /// Count documents matching an optional query body
    fn count(&self, collection: &str, query: Option<&Value>) -> EngineResult<u64>;

    /// Fetch the next page of an open cursor, extending its keep-alive
    fn scroll_next(&self, scroll_id: &str, ttl: &str) -> EngineResult<SearchResponse>;

    /// Release a cursor's server-side state
    fn scroll_release(&self, scroll_id: &str) -> EngineResult<()>;
}
