//! Adapter error types.
//!
//! Setup problems (a malformed workflow URL, an unwritable spool directory)
//! surface as [`AdapterError`].  Once an adapter is running it reports
//! through the engine's own error type, since that is what the
//! `WorkflowInvoker` and `EmailSource` traits return.

/// Unified error type for Synapse adapters.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// An I/O operation failed within the adapter.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    /// A workflow route points at something that is not an HTTP(S) URL.
    #[error("invalid url for workflow `{workflow}`: {reason}")]
    InvalidUrl { workflow: String, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Configuration error in adapter setup.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

/// Convenience alias used throughout the adapters crate.
pub type Result<T> = std::result::Result<T, AdapterError>;
