//! Engine facade.
//!
//! [`SynapseEngine`] owns one batcher, one trigger registry and one poller.
//! Hosts build it once with their invoker and email source and keep it for
//! the life of the process; nothing here is global.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::batcher::StateChangeBatcher;
use crate::change::StateChange;
use crate::config::EngineConfig;
use crate::email::{Email, EmailCursor, EmailSource};
use crate::error::Result;
use crate::poller::EmailPoller;
use crate::stats::{BatcherStats, TriggerStats};
use crate::trigger::{CheckOutcome, EmailTriggerConfig, RegisteredEmailTrigger, TriggerRegistry};
use crate::workflow::WorkflowInvoker;

/// Entry point tying batching and email triggers together.
pub struct SynapseEngine {
    config: EngineConfig,
    batcher: StateChangeBatcher,
    registry: TriggerRegistry,
    poller: Mutex<EmailPoller>,
}

impl SynapseEngine {
    /// Build an engine.  Fails if `config` does not validate.
    pub fn new(
        config: EngineConfig,
        invoker: Arc<dyn WorkflowInvoker>,
        source: Arc<dyn EmailSource>,
    ) -> Result<Self> {
        config.validate()?;

        let batcher = StateChangeBatcher::new(config.batcher.clone(), Arc::clone(&invoker));
        let registry = TriggerRegistry::new(invoker, source);
        let poller = Mutex::new(EmailPoller::new(registry.clone()));

        Ok(Self {
            config,
            batcher,
            registry,
            poller,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn batcher(&self) -> &StateChangeBatcher {
        &self.batcher
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    // -- Batching ------------------------------------------------------------

    pub async fn record_state_change(&self, change: StateChange) {
        self.batcher.record(change).await;
    }

    pub async fn flush_state_changes(&self, key: Option<&str>) -> usize {
        self.batcher.flush_state_changes(key).await
    }

    pub fn get_stats(&self) -> BatcherStats {
        self.batcher.get_stats()
    }

    pub fn pending_count(&self) -> usize {
        self.batcher.pending_count()
    }

    // -- Email triggers ------------------------------------------------------

    pub async fn register_email_trigger(&self, config: EmailTriggerConfig) -> Result<()> {
        self.registry.register_email_trigger(config).await
    }

    /// Register every trigger from a config file.  Stops at the first
    /// invalid one; triggers before it stay registered.
    pub async fn register_configured_triggers(&self, triggers: &[EmailTriggerConfig]) -> Result<()> {
        for trigger in triggers {
            self.registry.register_email_trigger(trigger.clone()).await?;
        }
        info!(count = triggers.len(), "configured email triggers registered");
        Ok(())
    }

    pub async fn unregister_email_trigger(&self, id: &str) -> bool {
        self.registry.unregister_email_trigger(id).await
    }

    pub async fn get_registered_email_triggers(&self) -> Vec<RegisteredEmailTrigger> {
        self.registry.get_registered_email_triggers().await
    }

    pub async fn clear_email_triggers(&self) {
        self.registry.clear_email_triggers().await;
    }

    pub async fn check_for_new_emails(&self) -> Result<CheckOutcome> {
        self.registry.check_for_new_emails().await
    }

    pub async fn process_email(&self, email: &Email) -> Vec<String> {
        self.registry.process_email(email).await
    }

    pub fn get_trigger_stats(&self) -> TriggerStats {
        self.registry.get_trigger_stats()
    }

    pub async fn email_cursor(&self) -> EmailCursor {
        self.registry.cursor().await
    }

    pub async fn restore_email_cursor(&self, saved: EmailCursor) {
        self.registry.restore_cursor(saved).await;
    }

    // -- Lifecycle -----------------------------------------------------------

    /// Start the background poll loop at the configured interval.
    ///
    /// Does nothing when polling is disabled in the config.
    pub async fn start_polling(&self) -> Result<()> {
        if !self.config.poller.enabled {
            info!("email polling disabled by config");
            return Ok(());
        }
        self.poller.lock().await.start(self.config.poller.interval())
    }

    pub async fn is_polling(&self) -> bool {
        self.poller.lock().await.is_running()
    }

    /// Stop polling and flush every open batch.  Returns the number of
    /// batches flushed.
    pub async fn shutdown(&self) -> usize {
        self.poller.lock().await.stop().await;
        let flushed = self.batcher.flush_state_changes(None).await;
        let stats = self.batcher.get_stats();
        if stats.flush_failures > 0 {
            warn!(failures = stats.flush_failures, "some batches failed to flush");
        }
        info!(flushed, "synapse engine shut down");
        flushed
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
