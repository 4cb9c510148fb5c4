//! Email trigger registry — watch for incoming mail and fire workflows.
//!
//! Verticals register an [`EmailTriggerConfig`] describing which emails they
//! care about (a reply on a thread, a notification from a shop) and which
//! workflow should run when one arrives.  A poll pass asks the
//! [`EmailSource`] for everything newer than the cursor and evaluates each
//! email against the registered triggers.
//!
//! ```text
//! active ──> matched ──> fired        (removed first if one-shot)
//!        └─> expired                  (purged on next mutating access)
//!        └─> unregistered
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::email::{Email, EmailCursor, EmailSource};
use crate::error::{Result, SynapseError};
use crate::matcher::{CompiledMatcher, EmailMatcher};
use crate::stats::{TriggerCounters, TriggerStats};
use crate::workflow::{WorkflowInput, WorkflowInvoker, WorkflowRef};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Registration request for an email trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTriggerConfig {
    /// Unique trigger id.  Registering the same id again replaces the trigger.
    pub id: String,
    /// Which emails fire the trigger.
    pub matcher: EmailMatcher,
    /// Workflow invoked with the matching email.
    pub workflow: WorkflowRef,
    /// Remove the trigger after its first match.
    #[serde(default)]
    pub one_shot: bool,
    /// Passed to the workflow alongside the email.
    #[serde(default)]
    pub context: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    /// After this instant the trigger no longer matches.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl EmailTriggerConfig {
    /// Create a persistent trigger.
    pub fn new(id: impl Into<String>, matcher: EmailMatcher, workflow: impl Into<WorkflowRef>) -> Self {
        Self {
            id: id.into(),
            matcher,
            workflow: workflow.into(),
            one_shot: false,
            context: serde_json::Value::Null,
            created_at: Utc::now(),
            expires_at: None,
        }
    }

    /// Create a trigger with a freshly generated id.
    pub fn with_generated_id(matcher: EmailMatcher, workflow: impl Into<WorkflowRef>) -> Self {
        Self::new(format!("email-trigger-{}", Uuid::now_v7()), matcher, workflow)
    }

    /// Deregister after the first match.
    pub fn one_shot(mut self) -> Self {
        self.one_shot = true;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    /// Expire `ttl` after now.
    pub fn expires_in(self, ttl: chrono::Duration) -> Self {
        self.expires_at(Utc::now() + ttl)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// Derived lifecycle state of a registered trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    Active,
    Expired,
}

impl std::fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Read-only view of a registered trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredEmailTrigger {
    #[serde(flatten)]
    pub config: EmailTriggerConfig,
    pub status: TriggerStatus,
}

/// Result of one `check_for_new_emails` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// New emails evaluated in this pass.
    pub emails_seen: usize,
    /// Triggers whose workflow ran successfully, in firing order.
    pub fired: Vec<String>,
    /// Cursor after the pass.
    pub cursor: EmailCursor,
}

/// A trigger together with its compiled matcher.
#[derive(Debug)]
struct TriggerEntry {
    config: EmailTriggerConfig,
    matcher: CompiledMatcher,
}

/// A fire decided under the lock and executed after releasing it.
struct PendingFire {
    id: String,
    workflow: WorkflowRef,
    context: serde_json::Value,
    one_shot: bool,
}

struct RegistryInner {
    invoker: Arc<dyn WorkflowInvoker>,
    source: Arc<dyn EmailSource>,
    /// Registered triggers in insertion order.
    triggers: RwLock<Vec<TriggerEntry>>,
    /// Held for a whole poll pass so passes never overlap.
    cursor: Mutex<EmailCursor>,
    counters: TriggerCounters,
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Registry of email triggers and the poll pass that fires them.
///
/// Cheap to clone; clones share the same triggers, cursor and stats.
#[derive(Clone)]
pub struct TriggerRegistry {
    inner: Arc<RegistryInner>,
}

impl TriggerRegistry {
    /// Create an empty registry reading from `source` and firing through
    /// `invoker`.
    pub fn new(invoker: Arc<dyn WorkflowInvoker>, source: Arc<dyn EmailSource>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                invoker,
                source,
                triggers: RwLock::new(Vec::new()),
                cursor: Mutex::new(EmailCursor::START),
                counters: TriggerCounters::default(),
            }),
        }
    }

    /// Register or replace a trigger.
    ///
    /// Fails with [`SynapseError::InvalidTriggerConfig`] when the id is blank,
    /// the matcher is empty or malformed, the workflow does not resolve, or
    /// the trigger is already expired.  The registry is unchanged on error.
    pub async fn register_email_trigger(&self, config: EmailTriggerConfig) -> Result<()> {
        let entry = self.validate(config)?;
        let id = entry.config.id.clone();

        let mut triggers = self.inner.triggers.write().await;
        purge_expired(&mut triggers, Utc::now());

        info!(
            trigger_id = %id,
            workflow = %entry.config.workflow,
            one_shot = entry.config.one_shot,
            "registering email trigger"
        );

        match triggers.iter_mut().find(|t| t.config.id == id) {
            Some(existing) => {
                *existing = entry;
                debug!(trigger_id = %id, "replaced existing trigger");
            }
            None => triggers.push(entry),
        }
        Ok(())
    }

    /// Remove a trigger.  Returns whether it was registered.
    pub async fn unregister_email_trigger(&self, id: &str) -> bool {
        let mut triggers = self.inner.triggers.write().await;
        purge_expired(&mut triggers, Utc::now());

        let before = triggers.len();
        triggers.retain(|t| t.config.id != id);
        let removed = triggers.len() != before;
        if removed {
            info!(trigger_id = %id, "email trigger unregistered");
        } else {
            debug!(trigger_id = %id, "unregister: trigger not found");
        }
        removed
    }

    /// Snapshot of all registered triggers in insertion order.
    ///
    /// Triggers past their expiry are reported as [`TriggerStatus::Expired`]
    /// until the next mutating call purges them.
    pub async fn get_registered_email_triggers(&self) -> Vec<RegisteredEmailTrigger> {
        let now = Utc::now();
        self.inner
            .triggers
            .read()
            .await
            .iter()
            .map(|t| RegisteredEmailTrigger {
                config: t.config.clone(),
                status: if t.config.is_expired_at(now) {
                    TriggerStatus::Expired
                } else {
                    TriggerStatus::Active
                },
            })
            .collect()
    }

    /// Remove every trigger.
    pub async fn clear_email_triggers(&self) {
        let mut triggers = self.inner.triggers.write().await;
        let count = triggers.len();
        triggers.clear();
        info!(count, "cleared all email triggers");
    }

    /// Number of registered triggers, expired ones included.
    pub async fn count(&self) -> usize {
        self.inner.triggers.read().await.len()
    }

    /// Number of triggers that can still fire.
    pub async fn active_count(&self) -> usize {
        let now = Utc::now();
        self.inner
            .triggers
            .read()
            .await
            .iter()
            .filter(|t| !t.config.is_expired_at(now))
            .count()
    }

    /// Current cursor.  Waits for a running pass to finish.
    pub async fn cursor(&self) -> EmailCursor {
        *self.inner.cursor.lock().await
    }

    /// Resume from a cursor saved by an earlier run.  Never moves the cursor
    /// backwards.
    pub async fn restore_cursor(&self, saved: EmailCursor) {
        let mut cursor = self.inner.cursor.lock().await;
        *cursor = (*cursor).max(saved);
        let at = *cursor;
        debug!(cursor = %at, "email cursor restored");
    }

    /// Fetch emails newer than the cursor and evaluate each against the
    /// registry.
    ///
    /// Passes are serialized: a call made while another pass runs waits for
    /// it and then starts from the advanced cursor.  If the source fails the
    /// pass is skipped, the cursor stays put, and
    /// [`SynapseError::EmailSourceUnavailable`] is returned.
    pub async fn check_for_new_emails(&self) -> Result<CheckOutcome> {
        let inner = &self.inner;
        let mut cursor = inner.cursor.lock().await;

        let mut emails = match inner.source.fetch_since(*cursor).await {
            Ok(emails) => emails,
            Err(e) => {
                TriggerCounters::bump(&inner.counters.source_failures);
                let at = *cursor;
                warn!(cursor = %at, error = %e, "email source unavailable, skipping pass");
                return Err(match e {
                    SynapseError::EmailSourceUnavailable { .. } => e,
                    other => SynapseError::source_unavailable(other.to_string()),
                });
            }
        };

        emails.retain(|e| cursor.is_new(e));
        emails.sort_by_key(|e| e.uid);

        let mut outcome = CheckOutcome {
            emails_seen: emails.len(),
            ..CheckOutcome::default()
        };
        for email in &emails {
            // Advance before evaluating so an interrupted pass never
            // re-evaluates an email.
            *cursor = cursor.advance(email);
            outcome.fired.extend(self.process_email(email).await);
        }
        outcome.cursor = *cursor;

        TriggerCounters::bump(&inner.counters.passes);
        if outcome.emails_seen > 0 {
            info!(
                emails = outcome.emails_seen,
                fired = outcome.fired.len(),
                cursor = %outcome.cursor,
                "email check complete"
            );
        } else {
            debug!(cursor = %outcome.cursor, "no new emails");
        }
        Ok(outcome)
    }

    /// Evaluate a single email against the registry and fire every matching
    /// trigger.
    ///
    /// One-shot triggers are removed before their workflow runs and are not
    /// re-armed if it fails.  Returns the ids of triggers whose workflow ran
    /// successfully.
    pub async fn process_email(&self, email: &Email) -> Vec<String> {
        let inner = &self.inner;
        TriggerCounters::bump(&inner.counters.emails_evaluated);

        let pending: Vec<PendingFire> = {
            let mut triggers = inner.triggers.write().await;
            purge_expired(&mut triggers, Utc::now());

            let pending: Vec<PendingFire> = triggers
                .iter()
                .filter(|t| t.matcher.matches(email))
                .map(|t| PendingFire {
                    id: t.config.id.clone(),
                    workflow: t.config.workflow.clone(),
                    context: t.config.context.clone(),
                    one_shot: t.config.one_shot,
                })
                .collect();

            triggers.retain(|t| {
                !(t.config.one_shot && pending.iter().any(|p| p.id == t.config.id))
            });
            pending
        };

        let mut fired = Vec::with_capacity(pending.len());
        for fire in pending {
            info!(
                trigger_id = %fire.id,
                workflow = %fire.workflow,
                uid = email.uid,
                subject = %email.subject,
                "email trigger matched"
            );
            let input = WorkflowInput::EmailTrigger {
                trigger_id: fire.id.clone(),
                email: email.clone(),
                context: fire.context,
            };
            match inner.invoker.invoke(&fire.workflow, input).await {
                Ok(()) => {
                    TriggerCounters::bump(&inner.counters.fires);
                    fired.push(fire.id);
                }
                Err(e) => {
                    TriggerCounters::bump(&inner.counters.fire_failures);
                    warn!(
                        trigger_id = %fire.id,
                        workflow = %fire.workflow,
                        one_shot = fire.one_shot,
                        error = %e,
                        "trigger workflow failed"
                    );
                }
            }
        }
        fired
    }

    /// Snapshot of the registry's counters.
    pub fn get_trigger_stats(&self) -> TriggerStats {
        self.inner.counters.snapshot()
    }

    // -- Internals -----------------------------------------------------------

    fn validate(&self, config: EmailTriggerConfig) -> Result<TriggerEntry> {
        let invalid = |reason: String| SynapseError::InvalidTriggerConfig {
            id: config.id.clone(),
            reason,
        };

        if config.id.trim().is_empty() {
            return Err(invalid("trigger id must not be empty".into()));
        }
        let matcher = config.matcher.compile().map_err(invalid)?;
        if config.workflow.as_str().trim().is_empty() {
            return Err(invalid("workflow must not be empty".into()));
        }
        if !self.inner.invoker.resolves(&config.workflow) {
            return Err(invalid(format!(
                "workflow `{}` is not known to the invoker",
                config.workflow
            )));
        }
        if config.is_expired_at(Utc::now()) {
            return Err(invalid("trigger is already expired".into()));
        }
        Ok(TriggerEntry { config, matcher })
    }
}

/// Drop triggers whose expiry has passed.
fn purge_expired(triggers: &mut Vec<TriggerEntry>, now: DateTime<Utc>) {
    triggers.retain(|t| {
        let expired = t.config.is_expired_at(now);
        if expired {
            info!(trigger_id = %t.config.id, "email trigger expired");
        }
        !expired
    });
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use serde_json::json;

    use crate::testing::{MemoryMailbox, RecordingInvoker, email};

    fn registry() -> (TriggerRegistry, Arc<RecordingInvoker>, Arc<MemoryMailbox>) {
        let invoker = Arc::new(RecordingInvoker::default());
        let mailbox = Arc::new(MemoryMailbox::default());
        let registry = TriggerRegistry::new(invoker.clone(), mailbox.clone());
        (registry, invoker, mailbox)
    }

    fn ids(triggers: &[RegisteredEmailTrigger]) -> Vec<&str> {
        triggers.iter().map(|t| t.config.id.as_str()).collect()
    }

    #[tokio::test]
    async fn one_shot_thread_reply_fires_once_and_disappears() {
        let (registry, invoker, mailbox) = registry();
        registry
            .register_email_trigger(
                EmailTriggerConfig::new("t1", EmailMatcher::thread("abc"), "replyWF").one_shot(),
            )
            .await
            .unwrap();

        mailbox.deliver(email(1, "friend@example.com", "Re: plans", Some("abc")));
        mailbox.deliver(email(2, "friend@example.com", "Re: plans again", Some("abc")));

        let outcome = registry.check_for_new_emails().await.unwrap();
        assert_eq!(outcome.fired, vec!["t1".to_string()]);
        assert_eq!(outcome.emails_seen, 2);
        assert_eq!(invoker.fires(), vec![("t1".to_string(), 1)]);
        assert_eq!(invoker.calls()[0].0.as_str(), "replyWF");
        assert!(registry.get_registered_email_triggers().await.is_empty());

        mailbox.deliver(email(3, "friend@example.com", "Re: plans", Some("abc")));
        registry.check_for_new_emails().await.unwrap();
        assert_eq!(invoker.fires().len(), 1);
    }

    #[tokio::test]
    async fn persistent_trigger_fires_per_matching_email() {
        let (registry, invoker, mailbox) = registry();
        registry
            .register_email_trigger(
                EmailTriggerConfig::new(
                    "bilka",
                    EmailMatcher::sender("info@kundeservice.bilkatogo.dk")
                        .with_subject_containing("Din ordre er klar"),
                    "orderChanged",
                )
                .with_context(json!({"vertical": "shopping"})),
            )
            .await
            .unwrap();

        mailbox.deliver(email(1, "INFO@kundeservice.bilkatogo.dk", "Din ordre er klar med følgende ændringer", None));
        mailbox.deliver(email(2, "info@kundeservice.bilkatogo.dk", "Nyhedsbrev", None));
        mailbox.deliver(email(3, "info@kundeservice.bilkatogo.dk", "Din ordre er klar med følgende ændringer", None));

        let outcome = registry.check_for_new_emails().await.unwrap();
        assert_eq!(outcome.fired.len(), 2);
        assert_eq!(
            invoker.fires(),
            vec![("bilka".to_string(), 1), ("bilka".to_string(), 3)]
        );
        match &invoker.calls()[0].1 {
            WorkflowInput::EmailTrigger { context, .. } => {
                assert_eq!(context["vertical"], "shopping");
            }
            other => panic!("unexpected input: {other:?}"),
        }
        assert_eq!(registry.count().await, 1);
    }

    #[tokio::test]
    async fn reregistering_same_id_replaces_in_place() {
        let (registry, _invoker, _mailbox) = registry();
        for (id, thread) in [("a", "1"), ("b", "2"), ("a", "3")] {
            registry
                .register_email_trigger(EmailTriggerConfig::new(id, EmailMatcher::thread(thread), "wf"))
                .await
                .unwrap();
        }

        let triggers = registry.get_registered_email_triggers().await;
        assert_eq!(ids(&triggers), vec!["a", "b"]);
        assert_eq!(triggers[0].config.matcher.thread_id.as_deref(), Some("3"));
        assert_eq!(triggers[0].status, TriggerStatus::Active);
    }

    #[tokio::test]
    async fn invalid_configs_leave_registry_unchanged() {
        let (registry, invoker, _mailbox) = registry();
        invoker.forget_workflow("ghost");
        registry
            .register_email_trigger(EmailTriggerConfig::new("keep", EmailMatcher::thread("x"), "wf"))
            .await
            .unwrap();

        let bad = [
            EmailTriggerConfig::new("  ", EmailMatcher::thread("x"), "wf"),
            EmailTriggerConfig::new("empty", EmailMatcher::default(), "wf"),
            EmailTriggerConfig::new("ghost", EmailMatcher::thread("x"), "ghost"),
            EmailTriggerConfig::new("blank-wf", EmailMatcher::thread("x"), ""),
            EmailTriggerConfig::new("old", EmailMatcher::thread("x"), "wf")
                .expires_at(Utc::now() - chrono::Duration::seconds(1)),
            // Replacing a valid trigger with an invalid one must not clobber it.
            EmailTriggerConfig::new("keep", EmailMatcher::default(), "wf"),
        ];
        for config in bad {
            let err = registry.register_email_trigger(config).await.unwrap_err();
            assert!(matches!(err, SynapseError::InvalidTriggerConfig { .. }), "{err}");
        }

        let triggers = registry.get_registered_email_triggers().await;
        assert_eq!(ids(&triggers), vec!["keep"]);
        assert_eq!(triggers[0].config.matcher, EmailMatcher::thread("x"));
    }

    #[tokio::test]
    async fn unregister_missing_is_not_an_error() {
        let (registry, _invoker, _mailbox) = registry();
        registry
            .register_email_trigger(EmailTriggerConfig::new("t", EmailMatcher::thread("x"), "wf"))
            .await
            .unwrap();

        assert!(!registry.unregister_email_trigger("nope").await);
        assert!(registry.unregister_email_trigger("t").await);
        assert!(!registry.unregister_email_trigger("t").await);
        assert_eq!(registry.count().await, 0);
    }

    #[tokio::test]
    async fn clear_removes_everything() {
        let (registry, _invoker, _mailbox) = registry();
        for i in 0..3 {
            registry
                .register_email_trigger(EmailTriggerConfig::with_generated_id(
                    EmailMatcher::thread(format!("t{i}")),
                    "wf",
                ))
                .await
                .unwrap();
        }
        assert_eq!(registry.count().await, 3);
        registry.clear_email_triggers().await;
        assert!(registry.get_registered_email_triggers().await.is_empty());
    }

    #[tokio::test]
    async fn already_seen_emails_are_never_reevaluated() {
        let (registry, invoker, mailbox) = registry();
        mailbox.deliver(email(1, "a@example.com", "hello", Some("abc")));

        let first = registry.check_for_new_emails().await.unwrap();
        assert_eq!(first.emails_seen, 1);
        assert!(first.fired.is_empty());
        assert_eq!(first.cursor, EmailCursor(1));

        // A trigger registered afterwards must not see the old email.
        registry
            .register_email_trigger(EmailTriggerConfig::new("late", EmailMatcher::thread("abc"), "wf"))
            .await
            .unwrap();
        let second = registry.check_for_new_emails().await.unwrap();
        assert_eq!(second.emails_seen, 0);
        assert!(invoker.fires().is_empty());
        assert_eq!(mailbox.fetches(), vec![EmailCursor(0), EmailCursor(1)]);
        assert_eq!(registry.get_trigger_stats().emails_evaluated, 1);
    }

    #[tokio::test]
    async fn restored_cursor_skips_emails_seen_by_an_earlier_run() {
        let (registry, invoker, mailbox) = registry();
        registry
            .register_email_trigger(EmailTriggerConfig::new("t", EmailMatcher::thread("abc"), "wf"))
            .await
            .unwrap();
        mailbox.deliver(email(1, "a@example.com", "old", Some("abc")));
        mailbox.deliver(email(2, "a@example.com", "new", Some("abc")));

        registry.restore_cursor(EmailCursor(1)).await;
        let outcome = registry.check_for_new_emails().await.unwrap();
        assert_eq!(outcome.emails_seen, 1);
        assert_eq!(invoker.fires(), vec![("t".to_string(), 2)]);

        // An older saved cursor cannot rewind.
        registry.restore_cursor(EmailCursor(1)).await;
        assert_eq!(registry.cursor().await, EmailCursor(2));
    }

    #[tokio::test]
    async fn source_failure_keeps_cursor_and_retries() {
        let (registry, invoker, mailbox) = registry();
        registry
            .register_email_trigger(EmailTriggerConfig::new("t", EmailMatcher::thread("abc"), "wf"))
            .await
            .unwrap();
        mailbox.deliver(email(5, "a@example.com", "x", Some("abc")));
        mailbox.set_offline(true);

        let err = registry.check_for_new_emails().await.unwrap_err();
        assert!(matches!(err, SynapseError::EmailSourceUnavailable { .. }));
        assert_eq!(registry.cursor().await, EmailCursor::START);
        assert_eq!(registry.get_trigger_stats().source_failures, 1);

        mailbox.set_offline(false);
        let outcome = registry.check_for_new_emails().await.unwrap();
        assert_eq!(outcome.fired, vec!["t".to_string()]);
        assert_eq!(outcome.cursor, EmailCursor(5));
        assert_eq!(invoker.fires().len(), 1);
    }

    #[tokio::test]
    async fn failed_one_shot_stays_deregistered() {
        let (registry, invoker, mailbox) = registry();
        invoker.fail_workflow("flaky");
        registry
            .register_email_trigger(
                EmailTriggerConfig::new("once", EmailMatcher::thread("abc"), "flaky").one_shot(),
            )
            .await
            .unwrap();
        mailbox.deliver(email(1, "a@example.com", "x", Some("abc")));

        let outcome = registry.check_for_new_emails().await.unwrap();
        assert!(outcome.fired.is_empty());
        assert_eq!(invoker.attempts().len(), 1);
        assert_eq!(registry.count().await, 0);

        let stats = registry.get_trigger_stats();
        assert_eq!(stats.fire_failures, 1);
        assert_eq!(stats.fires, 0);
    }

    #[tokio::test]
    async fn one_trigger_failing_does_not_block_others() {
        let (registry, invoker, _mailbox) = registry();
        invoker.fail_workflow("broken");
        registry
            .register_email_trigger(EmailTriggerConfig::new("bad", EmailMatcher::thread("abc"), "broken"))
            .await
            .unwrap();
        registry
            .register_email_trigger(EmailTriggerConfig::new("good", EmailMatcher::thread("abc"), "fine"))
            .await
            .unwrap();

        let fired = registry
            .process_email(&email(9, "a@example.com", "x", Some("abc")))
            .await;
        assert_eq!(fired, vec!["good".to_string()]);
        assert_eq!(invoker.attempts().len(), 2);
    }

    #[tokio::test]
    async fn expired_trigger_never_fires_and_is_purged() {
        let (registry, invoker, _mailbox) = registry();
        registry
            .register_email_trigger(
                EmailTriggerConfig::new("short", EmailMatcher::thread("abc"), "wf")
                    .expires_in(chrono::Duration::milliseconds(30)),
            )
            .await
            .unwrap();
        assert_eq!(registry.active_count().await, 1);

        tokio::time::sleep(Duration::from_millis(60)).await;

        let triggers = registry.get_registered_email_triggers().await;
        assert_eq!(triggers.len(), 1);
        assert_eq!(triggers[0].status, TriggerStatus::Expired);
        assert_eq!(registry.active_count().await, 0);

        let fired = registry
            .process_email(&email(1, "a@example.com", "x", Some("abc")))
            .await;
        assert!(fired.is_empty());
        assert!(invoker.attempts().is_empty());
        assert!(registry.get_registered_email_triggers().await.is_empty());
    }

    #[tokio::test]
    async fn concurrent_passes_do_not_double_fire() {
        let (registry, invoker, mailbox) = registry();
        registry
            .register_email_trigger(EmailTriggerConfig::new("t", EmailMatcher::thread("abc"), "wf"))
            .await
            .unwrap();
        mailbox.deliver(email(1, "a@example.com", "x", Some("abc")));

        let (a, b) = tokio::join!(
            registry.check_for_new_emails(),
            registry.check_for_new_emails()
        );
        let total = a.unwrap().fired.len() + b.unwrap().fired.len();
        assert_eq!(total, 1);
        assert_eq!(invoker.fires().len(), 1);
    }

    #[test]
    fn config_deserializes_from_toml() {
        let config: EmailTriggerConfig = toml::from_str(
            r#"
            id = "bilka-order-changed"
            workflow = "orderChangedWorkflow"
            one_shot = false

            [matcher]
            sender = "info@kundeservice.bilkatogo.dk"
            subject_contains = "Din ordre er klar"
            "#,
        )
        .unwrap();
        assert_eq!(config.id, "bilka-order-changed");
        assert_eq!(config.workflow.as_str(), "orderChangedWorkflow");
        assert!(config.expires_at.is_none());
        assert!(config.context.is_null());
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = EmailTriggerConfig::with_generated_id(EmailMatcher::thread("x"), "wf");
        let b = EmailTriggerConfig::with_generated_id(EmailMatcher::thread("x"), "wf");
        assert!(a.id.starts_with("email-trigger-"));
        assert_ne!(a.id, b.id);
    }
}
