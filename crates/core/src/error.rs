//! Error types for the index management layer
//!
//! This module defines the error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.
//!
//! ## Taxonomy
//!
//! | Class | Representation |
//! |-------|----------------|
//! | NotFound | `EngineError` with status 404 (`is_not_found()`) |
//! | Conflict | `EngineError` with status 409 (`is_conflict()`) |
//! | AlreadyExists | `EngineError` whose response type is `resource_already_exists_exception` |
//! | Engine failure | any other `EngineError` |
//! | Argument validation | `Error::InvalidConfig`, `Error::InvalidName` |

use serde_json::Value;
use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for index management operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for raw engine calls
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Error types for the index management layer
#[derive(Debug, Error)]
pub enum Error {
    /// The remote engine rejected or failed a request
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Structurally invalid configuration (e.g. blank namespace)
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What was wrong with the configuration
        reason: String,
    },

    /// Structurally invalid index or alias name
    #[error("invalid name: {reason}")]
    InvalidName {
        /// What was wrong with the name
        reason: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {reason}")]
    Serialization {
        /// Underlying parser message
        reason: String,
    },

    /// I/O error (reading configuration files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create an `InvalidConfig` error
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an `InvalidName` error
    pub fn invalid_name(reason: impl Into<String>) -> Self {
        Error::InvalidName {
            reason: reason.into(),
        }
    }

    /// The engine error behind this error, if any
    pub fn as_engine(&self) -> Option<&EngineError> {
        match self {
            Error::Engine(e) => Some(e),
            _ => None,
        }
    }

    /// True if this wraps an engine 404
    pub fn is_not_found(&self) -> bool {
        self.as_engine().is_some_and(EngineError::is_not_found)
    }

    /// True if this wraps an engine 409
    pub fn is_conflict(&self) -> bool {
        self.as_engine().is_some_and(EngineError::is_conflict)
    }

    /// True if this wraps an "already exists" rejection
    pub fn is_already_exists(&self) -> bool {
        self.as_engine().is_some_and(EngineError::is_already_exists)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization {
            reason: e.to_string(),
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Serialization {
            reason: e.to_string(),
        }
    }
}

// ============================================================================
// EngineError
// ============================================================================

/// Failure reported by the remote search engine or its transport.
///
/// Carries an HTTP-like status code and the parsed response body when the
/// transport provided them. Transports that only surface a message string
/// (`"[404] {\"error\":...}"`) can use [`EngineError::from_message`], which
/// recovers both pieces from the message.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineError {
    /// HTTP-like status code, if known
    pub status: Option<u16>,
    /// Human-readable message
    pub message: String,
    /// Parsed response body, if any
    pub response: Option<Value>,
}

impl EngineError {
    /// Create an error with a status code and message
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        EngineError {
            status: Some(status),
            message: message.into(),
            response: None,
        }
    }

    /// Create an error with a status code and a structured response body.
    ///
    /// The message is derived from the body's `error.reason` when present.
    pub fn with_response(status: u16, response: Value) -> Self {
        let message = response
            .pointer("/error/reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| response.to_string());
        EngineError {
            status: Some(status),
            message,
            response: Some(response),
        }
    }

    /// Build an error from a raw transport message.
    ///
    /// A leading `[NNN]` is taken as the status code and a trailing `{...}`
    /// object is parsed as the response body. Either part may be missing.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        let status = parse_status(&message);
        let response = parse_response(&message);
        EngineError {
            status,
            message,
            response,
        }
    }

    /// Engine error type from the response body (`error.type`)
    pub fn error_type(&self) -> Option<&str> {
        self.response
            .as_ref()
            .and_then(|r| r.pointer("/error/type"))
            .and_then(Value::as_str)
    }

    /// Collection, alias or document absent
    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    /// Version conflict
    pub fn is_conflict(&self) -> bool {
        self.status == Some(409)
    }

    /// Create rejected because the collection already exists
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self.error_type(),
            Some("resource_already_exists_exception") | Some("index_already_exists_exception")
        )
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) if !self.message.starts_with('[') => {
                write!(f, "[{}] {}", status, self.message)
            }
            _ => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for EngineError {}

fn parse_status(message: &str) -> Option<u16> {
    let rest = message.strip_prefix('[')?;
    let end = rest.find(']')?;
    rest[..end].parse().ok()
}

fn parse_response(message: &str) -> Option<Value> {
    if !message.ends_with('}') {
        return None;
    }
    // Try each opening brace from the left so the outermost object wins.
    message
        .match_indices('{')
        .find_map(|(start, _)| serde_json::from_str::<Value>(&message[start..]).ok())
        .filter(Value::is_object)
}
