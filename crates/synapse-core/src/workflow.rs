//! Workflow invocation capability.
//!
//! The engine never runs workflows itself.  Flushed batches and fired
//! triggers are handed to a [`WorkflowInvoker`] supplied by the host, which
//! resolves a [`WorkflowRef`] to whatever actually executes it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::change::Batch;
use crate::email::Email;
use crate::error::Result;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Identifier of a workflow known to the invoker (e.g. `"orderChanged"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowRef(String);

impl WorkflowRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkflowRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowRef {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for WorkflowRef {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// The input a workflow receives from the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum WorkflowInput {
    /// A flushed batch of state changes.
    StateChangeBatch(Batch),

    /// An email that satisfied a registered trigger.
    EmailTrigger {
        /// The trigger that matched.
        trigger_id: String,
        /// The matching email.
        email: Email,
        /// Context stored on the trigger at registration time.
        context: serde_json::Value,
    },
}

impl WorkflowInput {
    /// Short label used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StateChangeBatch(_) => "state_change_batch",
            Self::EmailTrigger { .. } => "email_trigger",
        }
    }
}

// ---------------------------------------------------------------------------
// Invoker trait
// ---------------------------------------------------------------------------

/// Runs workflows on behalf of the engine.
///
/// Implementations must tolerate concurrent calls for different batch keys
/// and triggers.
#[async_trait]
pub trait WorkflowInvoker: Send + Sync {
    /// Whether `workflow` names something this invoker can run.  Trigger
    /// registration is rejected for workflows that do not resolve.
    fn resolves(&self, _workflow: &WorkflowRef) -> bool {
        true
    }

    /// Run `workflow` with `input`.
    ///
    /// Errors are reported as
    /// [`SynapseError::WorkflowInvocationFailed`](crate::SynapseError::WorkflowInvocationFailed).
    async fn invoke(&self, workflow: &WorkflowRef, input: WorkflowInput) -> Result<()>;
}
