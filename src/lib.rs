//! Elastic - versioned index management over a remote search engine
//!
//! Manages document collections hosted by a search engine: creating dataset
//! versions, batching writes, streaming reads through scroll cursors and
//! cutting traffic over between versions with one atomic alias update.
//!
//! # Quick Start
//!
//! ```
//! use elastic::{BulkAction, Client, Index, IndexDefinition, MemoryEngine};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # fn main() -> elastic::Result<()> {
//! let client = Arc::new(Client::new(Arc::new(MemoryEngine::new())));
//! let products = Arc::new(IndexDefinition::new("products")?);
//!
//! let index = Index::new(Arc::clone(&products), Arc::clone(&client));
//! index.create()?;
//! index.bulk(BulkAction::Index, "1", elastic::as_document(json!({"name": "Lamp"})))?;
//! index.flush()?;
//! index.refresh()?;
//! index.promote()?;
//!
//! let live = Index::resolve(products, client)?.expect("promoted");
//! assert_eq!(live, index);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - `elastic-core`: errors, configuration, naming and document helpers
//! - `elastic-engine`: the [`SearchEngine`] boundary, [`Client`] policies,
//!   [`ClientRegistry`] and the in-memory engine (`memory` feature)
//! - `elastic-index`: [`Buffer`], [`Scroll`] and [`Index`]

pub use elastic_core::*;
pub use elastic_engine::*;
pub use elastic_index::*;
