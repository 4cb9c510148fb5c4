//! In-memory collaborators shared by the unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use crate::change::Batch;
use crate::email::{Email, EmailCursor, EmailSource};
use crate::error::{Result, SynapseError};
use crate::workflow::{WorkflowInput, WorkflowInvoker, WorkflowRef};

/// Records every successful invocation; fails on demand.
#[derive(Default)]
pub(crate) struct RecordingInvoker {
    calls: Mutex<Vec<(WorkflowRef, WorkflowInput)>>,
    attempts: Mutex<Vec<WorkflowRef>>,
    failing_keys: Mutex<HashSet<String>>,
    failing_workflows: Mutex<HashSet<String>>,
    unknown_workflows: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingInvoker {
    /// Fail flushes of batches with this key.
    pub(crate) fn fail_key(&self, key: &str) {
        self.failing_keys.lock().unwrap().insert(key.to_string());
    }

    /// Fail every invocation of this workflow.
    pub(crate) fn fail_workflow(&self, workflow: &str) {
        self.failing_workflows
            .lock()
            .unwrap()
            .insert(workflow.to_string());
    }

    /// Report this workflow as unresolvable.
    pub(crate) fn forget_workflow(&self, workflow: &str) {
        self.unknown_workflows
            .lock()
            .unwrap()
            .insert(workflow.to_string());
    }

    /// Make every invocation take `latency` before it completes.
    pub(crate) fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    /// Highest number of invocations that were running at once.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Completed invocations, in completion order.
    pub(crate) fn calls(&self) -> Vec<(WorkflowRef, WorkflowInput)> {
        self.calls.lock().unwrap().clone()
    }

    /// Every invocation attempt, successful or not.
    pub(crate) fn attempts(&self) -> Vec<WorkflowRef> {
        self.attempts.lock().unwrap().clone()
    }

    pub(crate) fn batches(&self) -> Vec<Batch> {
        self.calls()
            .into_iter()
            .filter_map(|(_, input)| match input {
                WorkflowInput::StateChangeBatch(batch) => Some(batch),
                WorkflowInput::EmailTrigger { .. } => None,
            })
            .collect()
    }

    /// `(trigger_id, email uid)` for every successful trigger fire.
    pub(crate) fn fires(&self) -> Vec<(String, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|(_, input)| match input {
                WorkflowInput::EmailTrigger {
                    trigger_id, email, ..
                } => Some((trigger_id, email.uid)),
                WorkflowInput::StateChangeBatch(_) => None,
            })
            .collect()
    }
}

#[async_trait]
impl WorkflowInvoker for RecordingInvoker {
    fn resolves(&self, workflow: &WorkflowRef) -> bool {
        !self.unknown_workflows.lock().unwrap().contains(workflow.as_str())
    }

    async fn invoke(&self, workflow: &WorkflowRef, input: WorkflowInput) -> Result<()> {
        self.attempts.lock().unwrap().push(workflow.clone());

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self
            .failing_workflows
            .lock()
            .unwrap()
            .contains(workflow.as_str())
        {
            return Err(SynapseError::invocation_failed(workflow.as_str(), "boom"));
        }
        if let WorkflowInput::StateChangeBatch(batch) = &input
            && self.failing_keys.lock().unwrap().contains(&batch.key)
        {
            return Err(SynapseError::invocation_failed(workflow.as_str(), "boom"));
        }
        self.calls.lock().unwrap().push((workflow.clone(), input));
        Ok(())
    }
}

/// Mailbox held in memory.  Honors the cursor like a real source would.
#[derive(Default)]
pub(crate) struct MemoryMailbox {
    emails: Mutex<Vec<Email>>,
    offline: Mutex<bool>,
    fetches: Mutex<Vec<EmailCursor>>,
}

impl MemoryMailbox {
    pub(crate) fn deliver(&self, email: Email) {
        self.emails.lock().unwrap().push(email);
    }

    pub(crate) fn set_offline(&self, offline: bool) {
        *self.offline.lock().unwrap() = offline;
    }

    /// Cursors passed to `fetch_since`, in call order.
    pub(crate) fn fetches(&self) -> Vec<EmailCursor> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmailSource for MemoryMailbox {
    async fn fetch_since(&self, cursor: EmailCursor) -> Result<Vec<Email>> {
        self.fetches.lock().unwrap().push(cursor);
        if *self.offline.lock().unwrap() {
            return Err(SynapseError::source_unavailable("mailbox offline"));
        }
        let mut emails: Vec<Email> = self
            .emails
            .lock()
            .unwrap()
            .iter()
            .filter(|e| cursor.is_new(e))
            .cloned()
            .collect();
        emails.sort_by_key(|e| e.uid);
        Ok(emails)
    }
}

/// Build an email with the fields the matchers look at.
pub(crate) fn email(uid: u64, from: &str, subject: &str, thread: Option<&str>) -> Email {
    Email {
        uid,
        message_id: format!("<{uid}@mail.test>"),
        thread_id: thread.map(str::to_string),
        from: from.to_string(),
        from_name: None,
        subject: subject.to_string(),
        snippet: String::new(),
        body: None,
        received_at: Utc::now(),
    }
}
