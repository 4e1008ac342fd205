//! Error types for the Watari engine.
//!
//! This module defines the error taxonomy shared by the source layer, the
//! library store, and the migration engine, along with conversions from the
//! underlying crate errors.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the Watari engine.
#[derive(Debug, Error)]
pub enum WatariError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    // Source errors
    #[error("Source not found: {id}")]
    SourceNotFound { id: String },

    #[error("Source API error from {source_id}: {message}")]
    SourceApi {
        source_id: String,
        message: String,
        status_code: Option<u16>,
    },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Session errors
    #[error("Migration session is already running a phase")]
    SessionBusy,

    #[error("Session is not ready for migration: {state}")]
    SessionNotReady { state: String },

    #[error("Migration item not found: {key}")]
    ItemNotFound { key: String },

    #[error("Search cancelled")]
    SearchCancelled,

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for Watari operations.
pub type Result<T> = std::result::Result<T, WatariError>;

// Conversion implementations for common error types

impl From<std::io::Error> for WatariError {
    fn from(err: std::io::Error) -> Self {
        WatariError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for WatariError {
    fn from(err: serde_json::Error) -> Self {
        WatariError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for WatariError {
    fn from(err: rusqlite::Error) -> Self {
        WatariError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for WatariError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            WatariError::Timeout(std::time::Duration::from_secs(0))
        } else {
            WatariError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl WatariError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        WatariError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Standard JSON-RPC error codes:
    /// - -32700: Parse error
    /// - -32600: Invalid Request
    /// - -32601: Method not found
    /// - -32602: Invalid params
    /// - -32603: Internal error
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32000: Network/connectivity error
    /// - -32001: Source not found
    /// - -32002: Migration item not found
    /// - -32003: Session busy or not ready
    /// - -32004: Cancelled by user
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            WatariError::Network { .. }
            | WatariError::Timeout(_)
            | WatariError::SourceApi { .. } => -32000,

            WatariError::SourceNotFound { .. } => -32001,

            WatariError::ItemNotFound { .. } => -32002,

            WatariError::SessionBusy | WatariError::SessionNotReady { .. } => -32003,

            WatariError::SearchCancelled => -32004,

            WatariError::InvalidParams { .. } => -32602,

            // All other errors are internal errors
            _ => -32603,
        }
    }

    /// Check if this error is transient enough that a later attempt could
    /// succeed with no other change.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WatariError::Network { .. } | WatariError::Timeout(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WatariError::SourceNotFound {
            id: "mangadex".into(),
        };
        assert_eq!(err.to_string(), "Source not found: mangadex");
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            WatariError::SourceNotFound {
                id: "mangadex".into()
            }
            .to_rpc_error_code(),
            -32001
        );
        assert_eq!(WatariError::SearchCancelled.to_rpc_error_code(), -32004);
        assert_eq!(
            WatariError::InvalidParams {
                message: "missing".into()
            }
            .to_rpc_error_code(),
            -32602
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(WatariError::Timeout(std::time::Duration::from_secs(5)).is_retryable());
        assert!(!WatariError::ItemNotFound { key: "abc".into() }.is_retryable());
    }
}
