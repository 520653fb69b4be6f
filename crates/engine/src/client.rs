//! Policy layer over a raw search engine
//!
//! [`Client`] adds the behaviors callers rely on but the raw engine does not
//! provide:
//! - 404 on collection listing becomes an empty list
//! - alias resolution and the combined remove/add promotion request
//! - multi-get drops ids that were not found
//! - cursor release never fails
//!
//! Every request is logged at `debug` under the `elastic::client` target.

use crate::bulk::{BulkAction, BulkOperation, BulkResponse};
use crate::engine::SearchEngine;
use crate::types::{AliasAction, CollectionInfo, Hit, SearchRequest, SearchResponse};
use elastic_core::{Document, EngineResult, Result};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Handle to one search engine cluster
#[derive(Clone)]
pub struct Client {
    engine: Arc<dyn SearchEngine>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client").finish_non_exhaustive()
    }
}

impl Client {
    /// Wrap an engine
    pub fn new(engine: Arc<dyn SearchEngine>) -> Self {
        Client { engine }
    }

    /// The underlying engine
    pub fn engine(&self) -> &Arc<dyn SearchEngine> {
        &self.engine
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Collections matching `pattern`; empty when nothing matches
    pub fn indices(&self, pattern: &str) -> Result<Vec<CollectionInfo>> {
        match self.engine.list_collections(pattern) {
            Ok(indices) => Ok(indices),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a physical collection
    pub fn create_index(&self, index: &str, settings: &Value, mappings: &Value) -> Result<()> {
        self.execute("create_index", index, |e| {
            e.create_collection(index, settings, mappings)
        })?;
        info!(target: "elastic::client", index, "Index created");
        Ok(())
    }

    /// Delete a physical collection
    pub fn delete_index(&self, index: &str) -> Result<()> {
        self.execute("delete_index", index, |e| e.delete_collection(index))?;
        info!(target: "elastic::client", index, "Index deleted");
        Ok(())
    }

    /// Make prior writes visible to search
    pub fn refresh_index(&self, index: &str) -> Result<()> {
        self.execute("refresh_index", index, |e| e.refresh_collection(index))
    }

    /// Whether the collection exists
    pub fn index_exists(&self, index: &str) -> Result<bool> {
        self.execute("index_exists", index, |e| e.collection_exists(index))
    }

    // ========================================================================
    // Aliases
    // ========================================================================

    /// Whether the alias exists
    pub fn alias_exists(&self, alias: &str) -> Result<bool> {
        self.execute("alias_exists", alias, |e| e.alias_exists(alias))
    }

    /// Collections behind an existing alias
    pub fn get_alias(&self, alias: &str) -> Result<BTreeSet<String>> {
        self.execute("get_alias", alias, |e| e.get_alias_targets(alias))
    }

    /// Collections behind the alias, or none if it does not exist
    pub fn resolve_alias(&self, alias: &str) -> Result<Vec<String>> {
        if self.alias_exists(alias)? {
            Ok(self.get_alias(alias)?.into_iter().collect())
        } else {
            Ok(Vec::new())
        }
    }

    /// Make `index` the alias's only target.
    ///
    /// A missing alias is created with one request. An existing alias is
    /// moved with a single atomic request that removes it from every current
    /// target and adds it to `index`, so readers of the alias never see zero
    /// or two targets.
    pub fn alias_index(&self, alias: &str, index: &str) -> Result<()> {
        if self.alias_exists(alias)? {
            let current = self.resolve_alias(alias)?;
            let mut actions: Vec<AliasAction> = current
                .iter()
                .map(|target| AliasAction::remove(alias, target.as_str()))
                .collect();
            actions.push(AliasAction::add(alias, index));

            self.execute("update_aliases", alias, |e| e.update_aliases(&actions))?;
            info!(target: "elastic::client", alias, index, previous = ?current, "Alias moved");
        } else {
            self.execute("put_alias", alias, |e| e.put_alias(alias, index))?;
            info!(target: "elastic::client", alias, index, "Alias created");
        }
        Ok(())
    }

    /// Whether the alias currently points at `index`
    pub fn index_aliased(&self, alias: &str, index: &str) -> Result<bool> {
        if self.alias_exists(alias)? {
            Ok(self.get_alias(alias)?.contains(index))
        } else {
            Ok(false)
        }
    }

    // ========================================================================
    // Documents
    // ========================================================================

    /// Submit a batch of writes
    pub fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse> {
        debug!(target: "elastic::client", op = "bulk", count = operations.len(), "Request");
        let response = self.engine.bulk_write(operations)?;
        if response.errors {
            let failed = response.failed_items().count();
            warn!(target: "elastic::client", failed, total = response.items.len(), "Bulk request reported item errors");
        }
        Ok(response)
    }

    /// Build a raw batched write (no conflict-retry hint)
    pub fn bulk_operation(
        &self,
        action: BulkAction,
        index: &str,
        id: &str,
        data: Option<Document>,
        params: Document,
    ) -> BulkOperation {
        BulkOperation::new(action, index, id, data).with_params(params)
    }

    /// Fetch one document; `None` when it does not exist
    pub fn get(&self, index: &str, id: &str) -> Result<Option<Hit>> {
        let result = self.execute("get", index, |e| e.get(index, id))?;
        Ok(result.into_hit())
    }

    /// Fetch many documents, silently dropping ids that were not found
    pub fn mget<S: AsRef<str>>(&self, index: &str, ids: &[S]) -> Result<Vec<Hit>> {
        self.mget_with_params(index, ids, &Document::new())
    }

    /// [`Client::mget`] with per-request parameters such as `routing`
    pub fn mget_with_params<S: AsRef<str>>(
        &self,
        index: &str,
        ids: &[S],
        params: &Document,
    ) -> Result<Vec<Hit>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.as_ref().to_string()).collect();
        let results = self.execute("mget", index, |e| e.multi_get(index, &ids, params))?;
        Ok(results.into_iter().filter_map(|r| r.into_hit()).collect())
    }

    /// Run a search
    pub fn search(&self, request: &SearchRequest) -> Result<SearchResponse> {
        self.execute("search", &request.index, |e| e.search(request))
    }

    /// Count documents, optionally filtered by a query body
    pub fn count(&self, index: &str, query: Option<&Value>) -> Result<u64> {
        self.execute("count", index, |e| e.count(index, query))
    }

    /// Fetch the next page of a cursor
    pub fn scroll(&self, scroll_id: &str, ttl: &str) -> Result<SearchResponse> {
        debug!(target: "elastic::client", op = "scroll", ttl, "Request");
        Ok(self.engine.scroll_next(scroll_id, ttl)?)
    }

    /// Release a cursor. Failures are logged and discarded.
    pub fn clear_scroll(&self, scroll_id: &str) {
        debug!(target: "elastic::client", op = "clear_scroll", "Request");
        if let Err(e) = self.engine.scroll_release(scroll_id) {
            warn!(target: "elastic::client", error = %e, "Failed to release scroll cursor");
        }
    }

    fn execute<T>(
        &self,
        op: &'static str,
        name: &str,
        request: impl FnOnce(&dyn SearchEngine) -> EngineResult<T>,
    ) -> Result<T> {
        debug!(target: "elastic::client", op, name, "Request");
        request(self.engine.as_ref()).map_err(|e| {
            debug!(target: "elastic::client", op, name, error = %e, "Request failed");
            e.into()
        })
    }
}
