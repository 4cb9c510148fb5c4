//! State-change records and the batches they are grouped into.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// StateChange
// ---------------------------------------------------------------------------

/// A single observed change in some piece of state.
///
/// The batcher only looks at `key`; the payload is carried through to the
/// workflow untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    /// Groups related changes into one batch (e.g. `"order-1"`).
    pub key: String,
    /// What changed.  Opaque to the engine.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// When the change was observed.
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl StateChange {
    /// Create a change observed now.
    pub fn new(key: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// Build a change from a source/type pair as reported by a vertical.
    ///
    /// The batch key is `"{source}:{state_type}"` and the payload keeps all
    /// three parts so the workflow can tell them apart.
    pub fn from_source(
        source: impl Into<String>,
        state_type: impl Into<String>,
        state_data: serde_json::Value,
    ) -> Self {
        let source = source.into();
        let state_type = state_type.into();
        let key = format!("{source}:{state_type}");
        let payload = serde_json::json!({
            "source": source,
            "state_type": state_type,
            "state_data": state_data,
        });
        Self::new(key, payload)
    }

    /// Override the observation timestamp.
    pub fn with_occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// The ordered set of changes for one key, handed to the workflow on flush.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    /// The key shared by every change in the batch.
    pub key: String,
    /// Changes in the order they were recorded.
    pub changes: Vec<StateChange>,
    /// When the first change of the batch was recorded.
    pub window_started_at: DateTime<Utc>,
    /// The deadline that was in effect when the batch was flushed.
    pub window_deadline: DateTime<Utc>,
}

impl Batch {
    /// Number of changes in the batch.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// Whether the batch holds no changes.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}
