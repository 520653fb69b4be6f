//! Search engine access for elastic index management
//!
//! This crate sits between the index layer and a remote search engine:
//! - SearchEngine: The raw operations a transport provides
//! - Client: Policies over the raw engine (404 handling, alias moves, mget filtering)
//! - ClientRegistry: One client per named cluster
//! - MemoryEngine: In-process engine with near-real-time semantics (`memory`
//!   feature)
//!
//! Request and response shapes live in [`types`] and [`bulk`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bulk;
pub mod client;
pub mod engine;
#[cfg(any(test, feature = "memory"))]
pub mod memory;
pub mod registry;
pub mod types;

pub use bulk::{BulkAction, BulkItem, BulkOperation, BulkResponse};
pub use client::Client;
pub use engine::SearchEngine;
#[cfg(any(test, feature = "memory"))]
pub use memory::{EngineOp, MemoryEngine};
pub use registry::{ClientRegistry, Connector};
pub use types::{
    AliasAction, CollectionInfo, GetResult, Hit, HitList, SearchRequest, SearchResponse,
};
