//! Versioned indices, batched writes and scrolled reads
//!
//! This crate provides the index management layer:
//! - Buffer: Thread-safe write batching with a flush sink
//! - Scroll: Lazy, single-pass pagination over a scroll cursor
//! - IndexDefinition / Index: Dataset versions and the atomic alias cutover
//!
//! All remote work goes through [`elastic_engine::Client`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod buffer;
pub mod index;
pub mod scroll;

pub use buffer::{Buffer, DEFAULT_CAPACITY};
pub use index::{Index, IndexDefinition, RETRY_ON_CONFLICT};
pub use scroll::{Hits, Scroll, ScrollOptions, DEFAULT_PAGE_SIZE, DEFAULT_TTL};
