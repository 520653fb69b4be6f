//! Versioned collections behind a stable alias
//!
//! An [`IndexDefinition`] is the immutable description of a dataset: its
//! alias name, settings and mappings. An [`Index`] is one physical version of
//! that dataset, named either explicitly or `<alias>-<unix timestamp>`.
//!
//! Traffic is cut over between versions by repointing the alias:
//!
//! ```text
//! let next = Index::new(definition, client);
//! next.create()?;
//! // ... write documents, flush, refresh ...
//! next.promote()?;   // one atomic request: remove old targets, add this one
//! ```
//!
//! Writes go through a lazily created [`Buffer`] of bulk operations. Each
//! successful flush marks the index dirty until the next [`Index::refresh`].

use crate::buffer::{Buffer, DEFAULT_CAPACITY};
use crate::scroll::{Scroll, ScrollOptions};
use chrono::Utc;
use elastic_core::{to_alias_name, Document, Error, Result, ID_FIELD};
use elastic_engine::{BulkAction, BulkOperation, Client, Hit};
use once_cell::sync::OnceCell;
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Conflict-retry hint attached to every buffered write
pub const RETRY_ON_CONFLICT: u64 = 3;

// ============================================================================
// IndexDefinition
// ============================================================================

/// Immutable configuration shared by every version of a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    alias_name: String,
    settings: Value,
    mappings: Value,
}

impl IndexDefinition {
    /// Define a dataset addressed by `alias_name`, with empty settings and
    /// mappings. A blank alias name is rejected.
    pub fn new(alias_name: impl Into<String>) -> Result<Self> {
        let alias_name = alias_name.into();
        if alias_name.trim().is_empty() {
            return Err(Error::invalid_name("alias name can't be blank"));
        }
        Ok(IndexDefinition {
            alias_name,
            settings: json!({}),
            mappings: json!({}),
        })
    }

    /// Define a dataset whose alias is derived from the type name of `T`
    /// (`shop::ProductIndex` -> `product_index`)
    pub fn named_after<T: ?Sized>() -> Self {
        IndexDefinition {
            alias_name: to_alias_name(std::any::type_name::<T>()),
            settings: json!({}),
            mappings: json!({}),
        }
    }

    /// Set the engine settings used at creation
    pub fn with_settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    /// Set the field mappings used at creation
    pub fn with_mappings(mut self, mappings: Value) -> Self {
        self.mappings = mappings;
        self
    }

    /// Stable logical name
    pub fn alias_name(&self) -> &str {
        &self.alias_name
    }

    /// Engine settings
    pub fn settings(&self) -> &Value {
        &self.settings
    }

    /// Field mappings
    pub fn mappings(&self) -> &Value {
        &self.mappings
    }

    /// `<alias>-<unix timestamp>`, lowercased.
    ///
    /// Two calls within the same second return the same name; the engine
    /// rejects the second create.
    pub fn generate_index_name(&self) -> String {
        format!("{}-{}", self.alias_name, Utc::now().timestamp()).to_lowercase()
    }
}

// ============================================================================
// Index
// ============================================================================

/// One physical version of a dataset
pub struct Index {
    definition: Arc<IndexDefinition>,
    client: Arc<Client>,
    index_name: String,
    dirty: Arc<AtomicBool>,
    buffer: OnceCell<Buffer<BulkOperation, Error>>,
}

impl Index {
    /// New version with a generated name. Nothing is sent to the engine.
    pub fn new(definition: Arc<IndexDefinition>, client: Arc<Client>) -> Self {
        let index_name = definition.generate_index_name();
        Self::with_name(definition, client, index_name)
    }

    /// Version with an explicit physical name (lowercased)
    pub fn with_name(
        definition: Arc<IndexDefinition>,
        client: Arc<Client>,
        index_name: impl Into<String>,
    ) -> Self {
        Index {
            definition,
            client,
            index_name: index_name.into().to_lowercase(),
            dirty: Arc::new(AtomicBool::new(false)),
            buffer: OnceCell::new(),
        }
    }

    /// The version the alias currently points at, if any
    pub fn resolve(definition: Arc<IndexDefinition>, client: Arc<Client>) -> Result<Option<Self>> {
        let targets = client.resolve_alias(definition.alias_name())?;
        Ok(targets
            .into_iter()
            .next()
            .map(|name| Self::with_name(definition, client, name)))
    }

    /// Physical collection name
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Alias of the dataset
    pub fn alias_name(&self) -> &str {
        self.definition.alias_name()
    }

    /// Dataset configuration
    pub fn definition(&self) -> &Arc<IndexDefinition> {
        &self.definition
    }

    /// Client used for every request
    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create the physical collection with the definition's settings and
    /// mappings. Fails with an already-exists error on a name collision.
    pub fn create(&self) -> Result<()> {
        self.client.create_index(
            &self.index_name,
            self.definition.settings(),
            self.definition.mappings(),
        )
    }

    /// Delete the physical collection
    pub fn delete(&self) -> Result<()> {
        self.client.delete_index(&self.index_name)
    }

    /// Whether the physical collection exists
    pub fn exists(&self) -> Result<bool> {
        self.client.index_exists(&self.index_name)
    }

    /// Make this version the alias's only target
    pub fn promote(&self) -> Result<()> {
        self.client.alias_index(self.alias_name(), &self.index_name)?;
        info!(target: "elastic::index", alias = self.alias_name(), index = %self.index_name, "Index promoted");
        Ok(())
    }

    /// Whether the alias currently points at this version
    pub fn promoted(&self) -> Result<bool> {
        self.client.index_aliased(self.alias_name(), &self.index_name)
    }

    /// Make prior writes visible to search and clear the dirty flag
    pub fn refresh(&self) -> Result<()> {
        self.client.refresh_index(&self.index_name)?;
        self.dirty.store(false, Ordering::SeqCst);
        Ok(())
    }

    /// True once a batch has been flushed since the last refresh
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Count documents, optionally filtered by a query body
    pub fn count(&self, query: Option<&Value>) -> Result<u64> {
        self.client.count(&self.index_name, query)
    }

    /// Fetch one document with its id merged in
    pub fn get(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.mget(&[id])?.into_iter().next())
    }

    /// Fetch many documents with their ids merged in. Ids that do not exist
    /// are dropped, so the result may be shorter than `ids`.
    pub fn mget<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<Document>> {
        let hits = self.client.mget(&self.index_name, ids)?;
        Ok(hits.into_iter().map(Hit::into_document).collect())
    }

    /// Stream documents matching `query` with their ids merged in.
    ///
    /// A non-empty body already set on `options` takes precedence over
    /// `query`.
    pub fn documents(
        &self,
        query: Value,
        options: ScrollOptions,
    ) -> impl Iterator<Item = Result<Document>> {
        self.scroll(with_query(options, query))
            .hits()
            .map(|hit| hit.map(Hit::into_document))
    }

    /// Stream the ids of documents matching `query`.
    ///
    /// Only the id field is requested, whatever projection `options` holds.
    /// As with [`Index::documents`], a body set on `options` wins over `query`.
    pub fn document_ids(
        &self,
        query: Value,
        options: ScrollOptions,
    ) -> impl Iterator<Item = Result<String>> {
        self.scroll(with_query(options, query).stored_fields([ID_FIELD]))
            .hits()
            .map(|hit| hit.map(|h| h.id))
    }

    /// Scroll reader over this version
    pub fn scroll(&self, options: ScrollOptions) -> Scroll {
        Scroll::new(Arc::clone(&self.client), self.index_name.clone(), options)
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Buffer a write; the batch is sent once the buffer fills or on
    /// [`Index::flush`]
    pub fn bulk(&self, action: BulkAction, id: &str, data: Option<Document>) -> Result<()> {
        self.buffer().push(self.bulk_operation(action, id, data))
    }

    /// Buffer a write carrying extra per-operation parameters
    pub fn bulk_with_params(
        &self,
        action: BulkAction,
        id: &str,
        data: Option<Document>,
        params: Document,
    ) -> Result<()> {
        let operation = self.bulk_operation(action, id, data).with_params(params);
        self.buffer().push(operation)
    }

    /// Build a write targeting this version with the conflict-retry hint.
    ///
    /// `Upsert` becomes `Update` with `doc_as_upsert: true`.
    pub fn bulk_operation(&self, action: BulkAction, id: &str, data: Option<Document>) -> BulkOperation {
        BulkOperation::new(action, self.index_name.as_str(), id, data)
            .with_param("_retry_on_conflict", RETRY_ON_CONFLICT)
    }

    /// Send pending buffered writes
    pub fn flush(&self) -> Result<()> {
        match self.buffer.get() {
            Some(buffer) => buffer.flush(),
            None => Ok(()),
        }
    }

    /// Write buffer, created on first use
    pub fn buffer(&self) -> &Buffer<BulkOperation, Error> {
        self.buffer.get_or_init(|| {
            let client = Arc::clone(&self.client);
            let dirty = Arc::clone(&self.dirty);
            let index = self.index_name.clone();
            Buffer::new(DEFAULT_CAPACITY, move |operations: Vec<BulkOperation>| {
                debug!(target: "elastic::index", index = %index, count = operations.len(), "Writing batch");
                client.bulk(&operations)?;
                dirty.store(true, Ordering::SeqCst);
                Ok(())
            })
        })
    }
}

fn with_query(options: ScrollOptions, query: Value) -> ScrollOptions {
    if options.has_body() {
        options
    } else {
        options.body(query)
    }
}

impl PartialEq for Index {
    fn eq(&self, other: &Self) -> bool {
        self.definition == other.definition && self.index_name == other.index_name
    }
}

impl fmt::Debug for Index {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("alias_name", &self.alias_name())
            .field("index_name", &self.index_name)
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elastic_engine::MemoryEngine;
    use serde_json::json;

    struct ProductIndex;

    fn client() -> Arc<Client> {
        Arc::new(Client::new(Arc::new(MemoryEngine::new())))
    }

    fn definition() -> Arc<IndexDefinition> {
        Arc::new(IndexDefinition::new("people").unwrap())
    }

    #[test]
    fn test_blank_alias_rejected() {
        assert!(matches!(
            IndexDefinition::new("  "),
            Err(Error::InvalidName { .. })
        ));
    }

    #[test]
    fn test_named_after_type() {
        let definition = IndexDefinition::named_after::<ProductIndex>();
        assert_eq!(definition.alias_name(), "product_index");
        assert_eq!(definition.settings(), &json!({}));
        assert_eq!(definition.mappings(), &json!({}));
    }

    #[test]
    fn test_generated_name_is_alias_dash_timestamp() {
        let definition = IndexDefinition::new("People").unwrap();
        let before = Utc::now().timestamp();
        let name = definition.generate_index_name();
        let after = Utc::now().timestamp();

        let (alias, ts) = name.rsplit_once('-').unwrap();
        assert_eq!(alias, "people");
        let ts: i64 = ts.parse().unwrap();
        assert!(before <= ts && ts <= after);
    }

    #[test]
    fn test_explicit_name_lowercased() {
        let index = Index::with_name(definition(), client(), "People-V2");
        assert_eq!(index.index_name(), "people-v2");
        assert_eq!(index.alias_name(), "people");
    }

    #[test]
    fn test_equality_by_definition_and_name() {
        let shared = client();
        let a = Index::with_name(definition(), Arc::clone(&shared), "people-1");
        let b = Index::with_name(definition(), Arc::clone(&shared), "people-1");
        let c = Index::with_name(definition(), Arc::clone(&shared), "people-2");
        let other = Arc::new(IndexDefinition::new("places").unwrap());
        let d = Index::with_name(other, shared, "people-1");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_bulk_operation_carries_retry_hint() {
        let index = Index::with_name(definition(), client(), "people-1");
        let op = index.bulk_operation(BulkAction::Index, "1", None);
        assert_eq!(op.retry_on_conflict(), Some(RETRY_ON_CONFLICT));
        assert_eq!(op.index, "people-1");
    }

    #[test]
    fn test_bulk_operation_upsert() {
        let index = Index::with_name(definition(), client(), "people-1");
        let op = index.bulk_operation(
            BulkAction::Upsert,
            "id",
            elastic_core::as_document(json!({"doc": {"foo": "bar"}})),
        );
        assert_eq!(
            op.to_value(),
            json!({"update": {
                "_index": "people-1",
                "_id": "id",
                "_retry_on_conflict": 3,
                "data": {"doc_as_upsert": true, "doc": {"foo": "bar"}}
            }})
        );
    }

    #[test]
    fn test_flush_without_buffer_is_noop() {
        let index = Index::with_name(definition(), client(), "people-1");
        index.flush().unwrap();
        assert!(!index.is_dirty());
    }
}
