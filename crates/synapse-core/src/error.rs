//! Engine error types.
//!
//! Every subsystem of the engine surfaces errors through [`SynapseError`].
//! Only configuration and registration problems are returned to callers;
//! failures that happen while flushing batches or firing triggers are
//! recorded in stats and logged instead of being propagated.

/// Unified error type for the Synapse engine.
#[derive(Debug, thiserror::Error)]
pub enum SynapseError {
    // -- Trigger errors -------------------------------------------------------
    /// An email trigger was rejected at registration time.  The registry is
    /// left untouched.
    #[error("invalid trigger config `{id}`: {reason}")]
    InvalidTriggerConfig { id: String, reason: String },

    // -- Workflow errors ------------------------------------------------------
    /// The workflow invoker rejected or failed an invocation.
    #[error("workflow `{workflow}` invocation failed: {reason}")]
    WorkflowInvocationFailed { workflow: String, reason: String },

    // -- Email source errors --------------------------------------------------
    /// The email source could not be queried.  The poll pass is skipped and
    /// the cursor stays where it was.
    #[error("email source unavailable: {reason}")]
    EmailSourceUnavailable { reason: String },

    // -- Configuration ------------------------------------------------------
    /// Engine configuration failed validation or could not be loaded.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// TOML deserialization failed.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    // -- Serialization -------------------------------------------------------
    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    // -- Generic -------------------------------------------------------------
    /// Catch-all for unexpected internal errors.
    #[error("internal engine error: {0}")]
    Internal(String),
}

impl SynapseError {
    /// Shorthand for a [`SynapseError::WorkflowInvocationFailed`].
    pub fn invocation_failed(workflow: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WorkflowInvocationFailed {
            workflow: workflow.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`SynapseError::EmailSourceUnavailable`].
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::EmailSourceUnavailable {
            reason: reason.into(),
        }
    }
}

/// Convenience alias used throughout the engine crate.
pub type Result<T> = std::result::Result<T, SynapseError>;
