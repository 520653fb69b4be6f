//! Core types for elastic index management
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: Error taxonomy, including the engine failure shape
//! - Configuration: Namespace and cluster hosts
//! - Document: Opaque JSON document bodies and the reserved id field
//! - Naming: Alias names derived from type names

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod document;
pub mod error;
pub mod naming;

pub use config::{Configuration, DEFAULT_CLUSTER, DEFAULT_NAMESPACE, HOST_ENV_VAR};
pub use document::{as_document, source_with_id, Document, ID_FIELD};
pub use error::{EngineError, EngineResult, Error, Result};
pub use naming::to_alias_name;
