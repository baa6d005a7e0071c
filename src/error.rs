//! Error types for bridge decoding and request handling.
//!
//! All errors implement `std::error::Error` and carry enough structured
//! context to tell a malformed reply apart from a caller asking for the
//! wrong type.
//!
//! ## Error Categories
//!
//! - **Protocol Errors**: the reply violates the bridge wire format; the whole
//!   `next()` call fails and no partial package is returned
//! - **Cast Errors**: a typed accessor was asked for an incompatible type
//!   (`CastMismatch`, `TypeMismatch`, `SizeMismatch`); local to one value
//! - **Transport Errors**: the request/reply socket failed
//! - **Timeout / Cancellation**: no reply in time, or the wait was interrupted
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use karabo_bridge::BridgeError;
//!
//! let error = BridgeError::transport_failed("connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

use crate::types::Dtype;

/// Result type alias for bridge operations.
pub type Result<T, E = BridgeError> = std::result::Result<T, E>;

/// Main error type for bridge operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BridgeError {
    #[error("Protocol violation: {reason}")]
    Protocol { reason: String },

    #[error("Cannot cast {found} value to {requested}")]
    CastMismatch { requested: &'static str, found: String },

    #[error("Array of {found} cannot be read as {requested}")]
    TypeMismatch { requested: Dtype, found: Dtype },

    #[error("Requested {requested} elements but the value holds {actual}")]
    SizeMismatch { requested: usize, actual: usize },

    #[error("Array shape {shape:?} overflows the addressable element count")]
    ShapeOverflow { shape: Vec<usize> },

    #[error("Array data is not aligned for {dtype}")]
    Misaligned { dtype: Dtype },

    #[error("Field '{field}' not found in source record")]
    FieldNotFound { field: String },

    #[error("No reply received within {duration:?}")]
    Timeout { duration: Duration },

    #[error("Transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Request cancelled while awaiting reply")]
    Cancelled,

    #[error("Invalid client configuration: {details}")]
    Config { details: String },
}

impl BridgeError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            BridgeError::Timeout { .. } => true,
            BridgeError::Transport { .. } => true,
            BridgeError::Cancelled => false,
            BridgeError::Protocol { .. } => false,
            BridgeError::CastMismatch { .. } => false,
            BridgeError::TypeMismatch { .. } => false,
            BridgeError::SizeMismatch { .. } => false,
            BridgeError::ShapeOverflow { .. } => false,
            BridgeError::Misaligned { .. } => false,
            BridgeError::FieldNotFound { .. } => false,
            BridgeError::Config { .. } => false,
        }
    }

    /// Returns whether the failure concerns a single value rather than the reply.
    ///
    /// Cast failures leave the owning source record fully usable.
    pub fn is_cast_error(&self) -> bool {
        matches!(
            self,
            BridgeError::CastMismatch { .. }
                | BridgeError::TypeMismatch { .. }
                | BridgeError::SizeMismatch { .. }
                | BridgeError::Misaligned { .. }
        )
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            BridgeError::Protocol { .. } => vec![
                "Check that the server speaks the Karabo bridge protocol",
                "Verify the server serializes with msgpack",
                "Inspect the raw reply with show_msg",
            ],
            BridgeError::CastMismatch { .. } => vec![
                "Check dtype() and container_type() before casting",
                "Cast unsigned integers to u64 and negative integers to i64",
                "Use the exact float width the server sent",
            ],
            BridgeError::TypeMismatch { .. } => vec![
                "Check the array dtype() before casting",
                "Request the element type matching the declared dtype",
            ],
            BridgeError::SizeMismatch { .. } => vec![
                "Check size() before casting to a fixed-length array",
                "Use Vec<T> when the length is not known in advance",
            ],
            BridgeError::ShapeOverflow { .. } => vec![
                "Verify the array header shape sent by the server",
                "Check server-side array serialization",
            ],
            BridgeError::Misaligned { .. } => vec![
                "Use a copying cast such as Vec<T> instead of data()",
                "Read the raw bytes with raw() and decode manually",
            ],
            BridgeError::FieldNotFound { .. } => vec![
                "Check field name spelling",
                "List available keys with fields() or metadata()",
            ],
            BridgeError::Timeout { .. } => vec![
                "Increase the receive timeout",
                "Verify the server is running and producing data",
                "Retry; the pending request is kept and will not be resent",
            ],
            BridgeError::Transport { .. } => vec![
                "Check the endpoint address and port",
                "Verify the server is reachable",
                "Recreate the client to obtain a fresh socket",
            ],
            BridgeError::Cancelled => vec![
                "Cancellation is permanent for the client that was cancelled",
                "Create a new client to issue further requests",
            ],
            BridgeError::Config { .. } => vec![
                "Check configuration values",
                "Use a full endpoint address such as tcp://host:port",
            ],
        }
    }

    /// Helper constructor for protocol violations.
    pub fn protocol(reason: impl Into<String>) -> Self {
        BridgeError::Protocol { reason: reason.into() }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        BridgeError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for transport errors with source.
    pub fn transport_failed_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        BridgeError::Transport { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for configuration errors.
    pub fn config(details: impl Into<String>) -> Self {
        BridgeError::Config { details: details.into() }
    }
}

#[cfg(feature = "zeromq")]
impl From<zeromq::ZmqError> for BridgeError {
    fn from(err: zeromq::ZmqError) -> Self {
        BridgeError::Transport {
            reason: "ZeroMQ socket operation failed".to_string(),
            source: Some(Box::new(err)),
        }
    }
}
