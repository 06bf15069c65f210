//! Custom error types for scholarfetch.
//!
//! This module defines all error types used throughout the retrieval pipeline.
//! All fallible functions return `Result<T, HarvestError>` instead of panicking.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for scholarfetch operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum HarvestError {
    /// Identifier could not be routed to any lookup scheme
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Transport-level failure (DNS, connection, TLS, body read)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Remote service answered with a non-success status
    #[error("HTTP error: {status} - {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Error text reported by the service, or the status reason
        message: String,
    },

    /// HTTP 403 from the remote host
    #[error("Access denied (HTTP 403) for {url}")]
    AccessDenied {
        /// The URL that refused access
        url: String,
    },

    /// Response body was not the JSON document we expected
    #[error("JSON decode error: {0}")]
    JsonDecode(#[from] serde_json::Error),

    /// Cache or PDF write failure
    #[error("Filesystem error at {path}: {source}")]
    Filesystem {
        /// File or directory involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Browser-driven download produced no file in time
    #[error("Browser download did not complete within {seconds}s")]
    AutomationTimeout {
        /// Seconds waited before giving up
        seconds: u64,
    },

    /// Browser could not be launched or driven
    #[error("Browser automation failed: {0}")]
    AutomationFailure(String),

    /// Invalid options
    #[error("Config error: {0}")]
    Config(String),
}

impl HarvestError {
    /// Wrap an I/O error with the path it occurred on.
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Serializable classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            Self::Network(_) => ErrorKind::NetworkError,
            Self::Http { status, .. } => ErrorKind::HttpError { status: *status },
            Self::AccessDenied { .. } => ErrorKind::AccessDenied,
            Self::JsonDecode(_) => ErrorKind::JsonDecodeError,
            Self::Filesystem { .. } => ErrorKind::FilesystemError,
            Self::AutomationTimeout { .. } => ErrorKind::AutomationTimeout,
            Self::AutomationFailure(_) => ErrorKind::AutomationFailure,
            Self::Config(_) => ErrorKind::ConfigError,
        }
    }

    /// HTTP status carried by this error, if any. `AccessDenied` is a 403.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::AccessDenied { .. } => Some(403),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Error classification recorded in failed calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ErrorKind {
    InvalidIdentifier,
    NetworkError,
    HttpError { status: u16 },
    AccessDenied,
    JsonDecodeError,
    FilesystemError,
    AutomationTimeout,
    AutomationFailure,
    ConfigError,
}

/// Result type alias using `HarvestError`
pub type Result<T> = std::result::Result<T, HarvestError>;
