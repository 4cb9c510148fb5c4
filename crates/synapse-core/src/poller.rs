//! Background email poll loop.
//!
//! [`EmailPoller`] drives [`TriggerRegistry::check_for_new_emails`] on a
//! fixed interval.  The first pass runs as soon as the loop starts.  Each
//! tick awaits the whole pass before waiting for the next one, and ticks
//! missed while a slow pass was running are skipped rather than replayed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::{Result, SynapseError};
use crate::trigger::TriggerRegistry;

/// Runs poll passes for a [`TriggerRegistry`] in a background task.
pub struct EmailPoller {
    registry: TriggerRegistry,
    /// Set while the background loop is alive.
    running: Arc<AtomicBool>,
    /// Wakes the loop when `stop` is called.
    shutdown: Arc<Notify>,
    handle: Option<JoinHandle<()>>,
}

impl EmailPoller {
    pub fn new(registry: TriggerRegistry) -> Self {
        Self {
            registry,
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
            handle: None,
        }
    }

    /// Start polling every `interval`.
    ///
    /// Fails if the loop is already running or `interval` is zero.
    pub fn start(&mut self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(SynapseError::InvalidConfig {
                reason: "poll interval must be greater than 0".to_string(),
            });
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(SynapseError::Internal("email poller is already running".to_string()));
        }

        // Fresh notifier: a permit left over from an earlier stop must not
        // end the new loop.
        self.shutdown = Arc::new(Notify::new());
        let running = Arc::clone(&self.running);
        let shutdown = Arc::clone(&self.shutdown);
        let registry = self.registry.clone();

        let handle = tokio::spawn(async move {
            info!(interval_secs = interval.as_secs_f64(), "email poller started");

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while running.load(Ordering::SeqCst) {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.notified() => break,
                }
                match registry.check_for_new_emails().await {
                    Ok(outcome) => {
                        debug!(
                            emails = outcome.emails_seen,
                            fired = outcome.fired.len(),
                            "poll pass finished"
                        );
                    }
                    Err(e) => warn!(error = %e, "poll pass failed, retrying next tick"),
                }
            }

            running.store(false, Ordering::SeqCst);
            info!("email poller stopped");
        });

        self.handle = Some(handle);
        Ok(())
    }

    /// Stop the loop and wait for an in-flight pass to finish.
    pub async fn stop(&mut self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            debug!("stop called but email poller is not running");
            return;
        }
        // Stores a permit if the loop is mid-pass, so it exits right after.
        self.shutdown.notify_one();

        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            error!(error = %e, "email poller task panicked during shutdown");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for EmailPoller {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
