//! Dry-run invoker that only logs.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::info;

use synapse_core::{WorkflowInput, WorkflowInvoker, WorkflowRef};

/// Logs every invocation and reports success.  Resolves any workflow.
#[derive(Debug, Default)]
pub struct LoggingInvoker {
    invocations: AtomicU64,
}

impl LoggingInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of invocations logged so far.
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl WorkflowInvoker for LoggingInvoker {
    async fn invoke(&self, workflow: &WorkflowRef, input: WorkflowInput) -> synapse_core::Result<()> {
        self.invocations.fetch_add(1, Ordering::Relaxed);
        match &input {
            WorkflowInput::StateChangeBatch(batch) => info!(
                workflow = %workflow,
                key = %batch.key,
                changes = batch.len(),
                "dry run: would flush state-change batch"
            ),
            WorkflowInput::EmailTrigger {
                trigger_id, email, ..
            } => info!(
                workflow = %workflow,
                trigger_id = %trigger_id,
                uid = email.uid,
                from = %email.from,
                subject = %email.subject,
                "dry run: would fire email trigger"
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use synapse_core::Batch;

    #[tokio::test]
    async fn always_succeeds_and_counts() {
        let invoker = LoggingInvoker::new();
        assert!(invoker.resolves(&WorkflowRef::new("anything")));

        let now = chrono::Utc::now();
        let batch = Batch {
            key: "k".into(),
            changes: vec![],
            window_started_at: now,
            window_deadline: now,
        };
        invoker
            .invoke(&"wf".into(), WorkflowInput::StateChangeBatch(batch))
            .await
            .unwrap();
        assert_eq!(invoker.invocations(), 1);
    }
}
