//! In-process search engine
//!
//! [`MemoryEngine`] implements [`SearchEngine`] entirely in memory so the
//! whole stack can run without a cluster. It reproduces the engine
//! behaviors the upper layers depend on:
//!
//! - **Near-real-time visibility**: writes are visible to `get`/`multi_get`
//!   immediately but to `search`/`count` only after a refresh
//! - **Atomic alias updates**: every action of an `update_aliases` request is
//!   validated before any is applied
//! - **Scroll cursors**: a search with a keep-alive snapshots its result set;
//!   pages are served from the snapshot until the cursor is released
//! - **Auto-creation**: `index`/`create`/upsert writes to a missing
//!   collection create it with empty settings
//!
//! Queries understand `match_all`, `ids` and `term`, plus `sort` on source
//! fields. Anything else is rejected with a 400 `parsing_exception`.
//!
//! Failures can be injected per operation with [`MemoryEngine::fail_next`].

use crate::bulk::{BulkAction, BulkItem, BulkOperation, BulkResponse};
use crate::engine::SearchEngine;
use crate::types::{AliasAction, CollectionInfo, GetResult, Hit, SearchRequest, SearchResponse};
use elastic_core::{Document, EngineError, EngineResult};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use tracing::debug;

/// Page size used when a search does not specify one
pub const DEFAULT_SEARCH_SIZE: usize = 10;

/// Engine operation, used to target injected failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    /// `create_collection`
    CreateCollection,
    /// `delete_collection`
    DeleteCollection,
    /// `collection_exists`
    CollectionExists,
    /// `refresh_collection`
    RefreshCollection,
    /// `list_collections`
    ListCollections,
    /// `alias_exists`
    AliasExists,
    /// `get_alias_targets`
    GetAliasTargets,
    /// `update_aliases`
    UpdateAliases,
    /// `put_alias`
    PutAlias,
    /// `bulk_write`
    BulkWrite,
    /// `get`
    Get,
    /// `multi_get`
    MultiGet,
    /// `search`
    Search,
    /// `count`
    Count,
    /// `scroll_next`
    ScrollNext,
    /// `scroll_release`
    ScrollRelease,
}

struct Collection {
    settings: Value,
    mappings: Value,
    docs: BTreeMap<String, Document>,
    searchable: BTreeMap<String, Document>,
}

impl Collection {
    fn new(settings: Value, mappings: Value) -> Self {
        Collection {
            settings,
            mappings,
            docs: BTreeMap::new(),
            searchable: BTreeMap::new(),
        }
    }
}

struct ScrollContext {
    remaining: VecDeque<Hit>,
    size: usize,
}

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    aliases: BTreeMap<String, BTreeSet<String>>,
    scrolls: HashMap<String, ScrollContext>,
    next_scroll: u64,
    cleared_scrolls: u64,
    failures: HashMap<EngineOp, VecDeque<EngineError>>,
}

/// In-memory [`SearchEngine`]
#[derive(Default)]
pub struct MemoryEngine {
    state: Mutex<State>,
}

impl MemoryEngine {
    /// Create an empty engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `op` fail with `error`.
    ///
    /// Injected failures queue up: each call consumes one.
    pub fn fail_next(&self, op: EngineOp, error: EngineError) {
        self.state.lock().failures.entry(op).or_default().push_back(error);
    }

    /// Number of cursors not yet released
    pub fn open_scrolls(&self) -> usize {
        self.state.lock().scrolls.len()
    }

    /// Number of successful cursor releases
    pub fn cleared_scrolls(&self) -> u64 {
        self.state.lock().cleared_scrolls
    }

    /// Settings and mappings a collection was created with
    pub fn collection_config(&self, name: &str) -> Option<(Value, Value)> {
        self.state
            .lock()
            .collections
            .get(name)
            .map(|c| (c.settings.clone(), c.mappings.clone()))
    }

    /// Number of documents written to a collection, visible or not
    pub fn document_count(&self, name: &str) -> usize {
        self.state
            .lock()
            .collections
            .get(name)
            .map_or(0, |c| c.docs.len())
    }
}

impl State {
    fn take_failure(&mut self, op: EngineOp) -> EngineResult<()> {
        match self.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Collections a name reads from: itself, or every target of an alias
    fn resolve_read(&self, name: &str) -> EngineResult<Vec<String>> {
        if self.collections.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }
        match self.aliases.get(name) {
            Some(targets) if !targets.is_empty() => Ok(targets.iter().cloned().collect()),
            _ => Err(index_not_found(name)),
        }
    }

    /// Collection a name writes to: itself, or the single target of an alias
    fn resolve_write(&self, name: &str) -> EngineResult<Option<String>> {
        if self.collections.contains_key(name) {
            return Ok(Some(name.to_string()));
        }
        match self.aliases.get(name) {
            Some(targets) if targets.len() == 1 => Ok(targets.iter().next().cloned()),
            Some(targets) if targets.len() > 1 => Err(EngineError::with_response(
                400,
                json!({"error": {
                    "type": "illegal_argument_exception",
                    "reason": format!("alias [{}] has more than one index associated with it", name)
                }}),
            )),
            _ => Ok(None),
        }
    }

    fn collection(&self, name: &str) -> EngineResult<&Collection> {
        let target = self.resolve_write(name)?.ok_or_else(|| index_not_found(name))?;
        self.collections
            .get(&target)
            .ok_or_else(|| index_not_found(name))
    }

    fn alias_exists(&self, alias: &str) -> bool {
        self.aliases.get(alias).is_some_and(|t| !t.is_empty())
    }

    fn create(&mut self, name: &str, settings: Value, mappings: Value) -> EngineResult<()> {
        if self.collections.contains_key(name) {
            return Err(EngineError::with_response(
                400,
                json!({"error": {
                    "type": "resource_already_exists_exception",
                    "reason": format!("index [{}] already exists", name)
                }}),
            ));
        }
        if self.alias_exists(name) {
            return Err(invalid_index_name(name, "an alias with the same name already exists"));
        }
        if name.is_empty() || name.chars().any(|c| c.is_ascii_uppercase()) {
            return Err(invalid_index_name(name, "must be lowercase"));
        }
        self.collections
            .insert(name.to_string(), Collection::new(settings, mappings));
        Ok(())
    }

    fn apply(&mut self, op: &BulkOperation) -> BulkItem {
        let mut item = BulkItem {
            action: op.action,
            index: op.index.clone(),
            id: op.id.clone(),
            status: 200,
            error: None,
        };

        let creates = matches!(op.action, BulkAction::Index | BulkAction::Create)
            || is_upsert(op);
        let target = match self.resolve_write(&op.index) {
            Ok(Some(target)) => target,
            Ok(None) if creates => {
                if let Err(e) = self.create(&op.index, json!({}), json!({})) {
                    return failed(item, e.status.unwrap_or(400), e.response);
                }
                op.index.clone()
            }
            Ok(None) => return failed(item, 404, index_not_found(&op.index).response),
            Err(e) => return failed(item, e.status.unwrap_or(400), e.response),
        };
        item.index = target.clone();

        let Some(collection) = self.collections.get_mut(&target) else {
            return failed(item, 404, index_not_found(&target).response);
        };
        let exists = collection.docs.contains_key(&op.id);

        match op.action {
            BulkAction::Index => {
                let doc = op.data.clone().unwrap_or_default();
                collection.docs.insert(op.id.clone(), doc);
                item.status = if exists { 200 } else { 201 };
            }
            BulkAction::Create => {
                if exists {
                    return failed(
                        item,
                        409,
                        Some(error_body(
                            "version_conflict_engine_exception",
                            &format!("[{}]: document already exists", op.id),
                        )),
                    );
                }
                collection
                    .docs
                    .insert(op.id.clone(), op.data.clone().unwrap_or_default());
                item.status = 201;
            }
            BulkAction::Update | BulkAction::Upsert => {
                let data = op.data.clone().unwrap_or_default();
                let partial = data
                    .get("doc")
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                match collection.docs.get_mut(&op.id) {
                    Some(existing) => {
                        merge(existing, partial);
                        item.status = 200;
                    }
                    None if is_upsert(op) => {
                        let initial = data
                            .get("upsert")
                            .and_then(Value::as_object)
                            .cloned()
                            .unwrap_or(partial);
                        collection.docs.insert(op.id.clone(), initial);
                        item.status = 201;
                    }
                    None => {
                        return failed(
                            item,
                            404,
                            Some(error_body(
                                "document_missing_exception",
                                &format!("[{}]: document missing", op.id),
                            )),
                        );
                    }
                }
            }
            BulkAction::Delete => {
                // A delete of a missing document is a not-found result, not an error.
                item.status = if collection.docs.remove(&op.id).is_some() {
                    200
                } else {
                    404
                };
            }
        }
        item
    }

    fn matching_hits(&self, index: &str, body: Option<&Value>) -> EngineResult<Vec<Hit>> {
        let query = body.and_then(|b| b.get("query"));
        let mut hits = Vec::new();
        for target in self.resolve_read(index)? {
            let Some(collection) = self.collections.get(&target) else {
                continue;
            };
            for (id, doc) in &collection.searchable {
                if matches_query(query, id, doc)? {
                    hits.push(Hit::new(target.clone(), id.clone(), Some(doc.clone())));
                }
            }
        }

        if let Some(sort) = body.and_then(|b| b.get("sort")) {
            let keys = parse_sort(sort)?;
            hits.sort_by(|a, b| compare_hits(a, b, &keys));
        }
        Ok(hits)
    }
}

impl SearchEngine for MemoryEngine {
    fn create_collection(&self, name: &str, settings: &Value, mappings: &Value) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::CreateCollection)?;
        state.create(name, settings.clone(), mappings.clone())?;
        debug!(target: "elastic::memory", collection = name, "Collection created");
        Ok(())
    }

    fn delete_collection(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::DeleteCollection)?;
        if state.collections.remove(name).is_none() {
            return Err(index_not_found(name));
        }
        for targets in state.aliases.values_mut() {
            targets.remove(name);
        }
        state.aliases.retain(|_, targets| !targets.is_empty());
        debug!(target: "elastic::memory", collection = name, "Collection deleted");
        Ok(())
    }

    fn collection_exists(&self, name: &str) -> EngineResult<bool> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::CollectionExists)?;
        Ok(state.collections.contains_key(name) || state.alias_exists(name))
    }

    fn refresh_collection(&self, name: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::RefreshCollection)?;
        for target in state.resolve_read(name)? {
            if let Some(collection) = state.collections.get_mut(&target) {
                collection.searchable = collection.docs.clone();
            }
        }
        Ok(())
    }

    fn list_collections(&self, pattern: &str) -> EngineResult<Vec<CollectionInfo>> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::ListCollections)?;
        let listed: Vec<CollectionInfo> = state
            .collections
            .iter()
            .filter(|(name, _)| wildcard_match(pattern, name))
            .map(|(name, c)| CollectionInfo {
                index: name.clone(),
                docs_count: c.searchable.len() as u64,
            })
            .collect();
        if listed.is_empty() && !pattern.contains('*') {
            return Err(index_not_found(pattern));
        }
        Ok(listed)
    }

    fn alias_exists(&self, alias: &str) -> EngineResult<bool> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::AliasExists)?;
        Ok(state.alias_exists(alias))
    }

    fn get_alias_targets(&self, alias: &str) -> EngineResult<BTreeSet<String>> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::GetAliasTargets)?;
        match state.aliases.get(alias) {
            Some(targets) if !targets.is_empty() => Ok(targets.clone()),
            _ => Err(EngineError::with_response(
                404,
                json!({"error": {
                    "type": "aliases_not_found_exception",
                    "reason": format!("alias [{}] missing", alias)
                }}),
            )),
        }
    }

    fn update_aliases(&self, actions: &[AliasAction]) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::UpdateAliases)?;

        // Validate against a copy; commit only if every action succeeds.
        let mut aliases = state.aliases.clone();
        for action in actions {
            match action {
                AliasAction::Add { alias, index } => {
                    if !state.collections.contains_key(index) {
                        return Err(index_not_found(index));
                    }
                    if state.collections.contains_key(alias) {
                        return Err(invalid_alias_name(alias));
                    }
                    aliases.entry(alias.clone()).or_default().insert(index.clone());
                }
                AliasAction::Remove { alias, index } => {
                    let removed = aliases.get_mut(alias).is_some_and(|t| t.remove(index));
                    if !removed {
                        return Err(EngineError::with_response(
                            404,
                            json!({"error": {
                                "type": "aliases_not_found_exception",
                                "reason": format!("alias [{}] missing on [{}]", alias, index)
                            }}),
                        ));
                    }
                }
            }
        }
        aliases.retain(|_, targets| !targets.is_empty());
        state.aliases = aliases;
        debug!(target: "elastic::memory", actions = actions.len(), "Aliases updated");
        Ok(())
    }

    fn put_alias(&self, alias: &str, collection: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::PutAlias)?;
        if !state.collections.contains_key(collection) {
            return Err(index_not_found(collection));
        }
        if state.collections.contains_key(alias) {
            return Err(invalid_alias_name(alias));
        }
        state
            .aliases
            .entry(alias.to_string())
            .or_default()
            .insert(collection.to_string());
        Ok(())
    }

    fn bulk_write(&self, operations: &[BulkOperation]) -> EngineResult<BulkResponse> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::BulkWrite)?;
        let items: Vec<BulkItem> = operations.iter().map(|op| state.apply(op)).collect();
        let errors = items.iter().any(|item| item.error.is_some());
        debug!(target: "elastic::memory", count = items.len(), errors, "Bulk applied");
        Ok(BulkResponse { errors, items })
    }

    fn get(&self, collection: &str, id: &str) -> EngineResult<GetResult> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::Get)?;
        lookup(&state, collection, id)
    }

    fn multi_get(
        &self,
        collection: &str,
        ids: &[String],
        params: &Document,
    ) -> EngineResult<Vec<GetResult>> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::MultiGet)?;
        let with_source = params.get("_source").and_then(Value::as_bool).unwrap_or(true);
        ids.iter()
            .map(|id| {
                let mut result = lookup(&state, collection, id)?;
                if !with_source {
                    result.source = None;
                }
                Ok(result)
            })
            .collect()
    }

    fn search(&self, request: &SearchRequest) -> EngineResult<SearchResponse> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::Search)?;

        let mut hits = state.matching_hits(&request.index, request.body.as_ref())?;
        if request.stored_fields.as_ref().is_some_and(|f| !f.is_empty()) {
            for hit in &mut hits {
                hit.source = None;
            }
        }

        let size = request.size.unwrap_or(DEFAULT_SEARCH_SIZE);
        let take = size.min(hits.len());
        let mut remaining: VecDeque<Hit> = hits.into();
        let page: Vec<Hit> = remaining.drain(..take).collect();

        let scroll_id = if request.scroll.is_some() {
            state.next_scroll += 1;
            let scroll_id = format!("scroll-{}", state.next_scroll);
            state
                .scrolls
                .insert(scroll_id.clone(), ScrollContext { remaining, size });
            Some(scroll_id)
        } else {
            None
        };

        Ok(SearchResponse::new(scroll_id, page))
    }

    fn count(&self, collection: &str, query: Option<&Value>) -> EngineResult<u64> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::Count)?;
        let hits = state.matching_hits(collection, query)?;
        Ok(hits.len() as u64)
    }

    fn scroll_next(&self, scroll_id: &str, _ttl: &str) -> EngineResult<SearchResponse> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::ScrollNext)?;
        let context = state
            .scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| search_context_missing(scroll_id))?;
        let take = context.size.min(context.remaining.len());
        let page: Vec<Hit> = context.remaining.drain(..take).collect();
        Ok(SearchResponse::new(Some(scroll_id.to_string()), page))
    }

    fn scroll_release(&self, scroll_id: &str) -> EngineResult<()> {
        let mut state = self.state.lock();
        state.take_failure(EngineOp::ScrollRelease)?;
        if state.scrolls.remove(scroll_id).is_none() {
            return Err(search_context_missing(scroll_id));
        }
        state.cleared_scrolls += 1;
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn lookup(state: &State, collection: &str, id: &str) -> EngineResult<GetResult> {
    let target = state.collection(collection)?;
    let source = target.docs.get(id).cloned();
    let index = state
        .resolve_write(collection)?
        .unwrap_or_else(|| collection.to_string());
    Ok(GetResult {
        index,
        id: id.to_string(),
        found: source.is_some(),
        source,
    })
}

fn is_upsert(op: &BulkOperation) -> bool {
    op.action == BulkAction::Upsert
        || (op.action == BulkAction::Update
            && op
                .data
                .as_ref()
                .and_then(|d| d.get("doc_as_upsert"))
                .and_then(Value::as_bool)
                .unwrap_or(false))
}

/// Recursive object merge, as partial updates do
fn merge(target: &mut Document, patch: Document) {
    for (key, value) in patch {
        match (target.get_mut(&key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge(existing, incoming),
            (_, value) => {
                target.insert(key, value);
            }
        }
    }
}

fn failed(mut item: BulkItem, status: u16, error: Option<Value>) -> BulkItem {
    item.status = status;
    item.error = Some(
        error
            .and_then(|e| e.get("error").cloned())
            .unwrap_or_else(|| json!({"type": "exception"})),
    );
    item
}

fn error_body(kind: &str, reason: &str) -> Value {
    json!({"error": {"type": kind, "reason": reason}})
}

fn index_not_found(name: &str) -> EngineError {
    EngineError::with_response(
        404,
        json!({"error": {
            "type": "index_not_found_exception",
            "reason": format!("no such index [{}]", name)
        }, "status": 404}),
    )
}

fn invalid_index_name(name: &str, why: &str) -> EngineError {
    EngineError::with_response(
        400,
        error_body("invalid_index_name_exception", &format!("Invalid index name [{}], {}", name, why)),
    )
}

fn invalid_alias_name(alias: &str) -> EngineError {
    EngineError::with_response(
        400,
        error_body(
            "invalid_alias_name_exception",
            &format!("an index exists with the same name as the alias [{}]", alias),
        ),
    )
}

fn search_context_missing(scroll_id: &str) -> EngineError {
    EngineError::with_response(
        404,
        error_body(
            "search_context_missing_exception",
            &format!("No search context found for id [{}]", scroll_id),
        ),
    )
}

fn parsing_exception(reason: String) -> EngineError {
    EngineError::with_response(400, error_body("parsing_exception", &reason))
}

fn wildcard_match(pattern: &str, name: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return pattern == name;
    }

    let mut rest = name;
    for (i, part) in parts.iter().enumerate() {
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

fn id_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn matches_query(query: Option<&Value>, id: &str, doc: &Document) -> EngineResult<bool> {
    let Some(query) = query else {
        return Ok(true);
    };
    let Some((kind, params)) = query.as_object().and_then(|q| q.iter().next()) else {
        return Err(parsing_exception("query must be an object".to_string()));
    };

    match kind.as_str() {
        "match_all" => Ok(true),
        "ids" => {
            let values = params
                .get("values")
                .and_then(Value::as_array)
                .ok_or_else(|| parsing_exception("[ids] requires [values]".to_string()))?;
            Ok(values.iter().any(|v| id_string(v) == id))
        }
        "term" => {
            let Some((field, expected)) = params.as_object().and_then(|p| p.iter().next()) else {
                return Err(parsing_exception("[term] requires a field".to_string()));
            };
            let expected = expected.get("value").unwrap_or(expected);
            if field == elastic_core::ID_FIELD {
                return Ok(id_string(expected) == id);
            }
            Ok(doc.get(field) == Some(expected))
        }
        other => Err(parsing_exception(format!("unknown query [{}]", other))),
    }
}

fn parse_sort(sort: &Value) -> EngineResult<Vec<(String, bool)>> {
    let entries: Vec<&Value> = match sort {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };

    let mut keys = Vec::new();
    for entry in entries {
        match entry {
            Value::String(field) => keys.push((field.clone(), false)),
            Value::Object(fields) => {
                for (field, order) in fields {
                    let order = order.get("order").unwrap_or(order);
                    let descending = match order.as_str() {
                        Some("asc") => false,
                        Some("desc") => true,
                        _ => {
                            return Err(parsing_exception(format!(
                                "invalid sort order for [{}]",
                                field
                            )))
                        }
                    };
                    keys.push((field.clone(), descending));
                }
            }
            _ => return Err(parsing_exception("malformed [sort]".to_string())),
        }
    }
    Ok(keys)
}

fn compare_hits(a: &Hit, b: &Hit, keys: &[(String, bool)]) -> Ordering {
    for (field, descending) in keys {
        let left = a.source.as_ref().and_then(|s| s.get(field));
        let right = b.source.as_ref().and_then(|s| s.get(field));
        let ordering = match (left, right) {
            (Some(l), Some(r)) => {
                let ord = compare_values(l, r);
                if *descending {
                    ord.reverse()
                } else {
                    ord
                }
            }
            // Missing values sort last in both directions.
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => Ordering::Equal,
    }
}
