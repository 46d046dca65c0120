//! Error types for IP interface discovery
//!
//! Only input validation and configuration discovery errors are meant to
//! reach the show-command caller. Everything raised while visiting a single
//! namespace is logged and swallowed by the aggregator.
//!
//! # NIST 800-53 Rev 5 Control Mappings
//! - SI-11: Error Handling - Failure classes kept distinct for the caller
//! - AU-3: Content of Audit Records - Errors name the path or namespace involved

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while resolving IP interfaces
#[derive(Debug, Error)]
pub enum IpIntfError {
    /// Address family other than "ipv4" or "ipv6"
    #[error("unsupported address family: {0}")]
    UnsupportedAddressFamily(String),

    /// Explicit namespace not known on this device
    #[error("unknown namespace {0}")]
    UnknownNamespace(String),

    /// asic.conf could not be opened or read
    #[error("failed to read asic config file {path}: {source}")]
    AsicConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// num_asic present but not an integer
    #[error("invalid num_asic value '{value}': {source}")]
    InvalidAsicCount {
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// Opening or switching a network namespace failed
    /// NIST: SC-7 (Boundary Protection) - Namespace isolation errors
    #[error("namespace '{namespace}': failed to {operation}: {source}")]
    Namespace {
        namespace: String,
        operation: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Route socket could not be created or used
    /// NIST: SC-7 (Boundary Protection) - Kernel interface errors
    #[error("Netlink error: {0}")]
    Netlink(String),

    /// A link or address dump request failed
    #[error("failed to dump {request}: {message}")]
    Dump {
        request: &'static str,
        message: String,
    },

    /// Table query failed
    #[error("Database error: {0}")]
    Database(String),

    /// No table query function was supplied
    #[error("DBQuery is not configured")]
    QueryNotConfigured,

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Whole resolution exceeded the caller's deadline
    #[error("interface resolution timed out after {0:?}")]
    Timeout(Duration),

    /// Resolution thread could not be started or exited without a result
    #[error("interface resolution task failed: {0}")]
    TaskJoin(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IpIntfError {
    /// Returns true for errors caused by the caller's arguments.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            IpIntfError::UnsupportedAddressFamily(_) | IpIntfError::UnknownNamespace(_)
        )
    }

    pub(crate) fn namespace(
        namespace: &str,
        operation: &'static str,
        source: std::io::Error,
    ) -> Self {
        Self::Namespace {
            namespace: namespace.to_string(),
            operation,
            source,
        }
    }
}

/// Result type alias for interface discovery operations
pub type Result<T> = std::result::Result<T, IpIntfError>;
