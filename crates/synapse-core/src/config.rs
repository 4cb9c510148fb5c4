//! Engine configuration.
//!
//! Settings are read from the `[batcher]` and `[poller]` tables of a TOML
//! file.  Missing tables or keys fall back to defaults, and a handful of
//! `SYNAPSE_*` environment variables override the file.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, SynapseError};
use crate::workflow::WorkflowRef;

/// Environment variable overriding [`BatcherConfig::window_ms`].
pub const ENV_BATCH_WINDOW_MS: &str = "SYNAPSE_BATCH_WINDOW_MS";
/// Environment variable overriding [`BatcherConfig::max_window_ms`].
pub const ENV_BATCH_MAX_WINDOW_MS: &str = "SYNAPSE_BATCH_MAX_WINDOW_MS";
/// Environment variable overriding [`BatcherConfig::max_batch_size`].
pub const ENV_BATCH_MAX_SIZE: &str = "SYNAPSE_BATCH_MAX_SIZE";
/// Environment variable overriding [`PollerConfig::interval_secs`].
pub const ENV_POLL_INTERVAL_SECS: &str = "SYNAPSE_POLL_INTERVAL_SECS";

// ---------------------------------------------------------------------------
// Batcher
// ---------------------------------------------------------------------------

/// Debounce policy and target workflow for state-change batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    /// Idle time after the last change before a batch flushes.
    pub window_ms: u64,
    /// Maximum age of a batch, regardless of ongoing activity.
    pub max_window_ms: u64,
    /// A batch holding this many changes flushes immediately.
    pub max_batch_size: usize,
    /// Workflow that receives flushed batches.
    pub workflow: WorkflowRef,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            window_ms: 5_000,
            max_window_ms: 30_000,
            max_batch_size: 10,
            workflow: WorkflowRef::new("stateChangeReactor"),
        }
    }
}

impl BatcherConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn max_window(&self) -> Duration {
        Duration::from_millis(self.max_window_ms)
    }

    /// Check the policy is usable.
    pub fn validate(&self) -> Result<()> {
        if self.window_ms == 0 {
            return Err(invalid("batcher.window_ms must be greater than 0"));
        }
        if self.max_window_ms < self.window_ms {
            return Err(invalid(format!(
                "batcher.max_window_ms ({}) must be at least window_ms ({})",
                self.max_window_ms, self.window_ms
            )));
        }
        if self.max_batch_size == 0 {
            return Err(invalid("batcher.max_batch_size must be at least 1"));
        }
        if self.workflow.as_str().trim().is_empty() {
            return Err(invalid("batcher.workflow must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Poller
// ---------------------------------------------------------------------------

/// How often the email poll loop runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Seconds between two poll passes.
    pub interval_secs: u64,
    /// Whether the poll loop is started at all.
    pub enabled: bool,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            enabled: true,
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(invalid("poller.interval_secs must be greater than 0"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Top-level engine settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub batcher: BatcherConfig,
    #[serde(default)]
    pub poller: PollerConfig,
}

impl EngineConfig {
    /// Parse from a TOML document.  Unknown tables are ignored so the same
    /// file can carry host-specific sections.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load from `path`, falling back to defaults when the file is missing.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| SynapseError::InvalidConfig {
            reason: format!("failed to read {}: {e}", path.display()),
        })?;
        let config = Self::from_toml_str(&content)?;
        debug!(path = %path.display(), "engine config loaded");
        Ok(config)
    }

    /// Apply `SYNAPSE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup.  Split out so tests do not
    /// have to touch the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup(ENV_BATCH_WINDOW_MS) {
            self.batcher.window_ms = parse_override(ENV_BATCH_WINDOW_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_BATCH_MAX_WINDOW_MS) {
            self.batcher.max_window_ms = parse_override(ENV_BATCH_MAX_WINDOW_MS, &v)?;
        }
        if let Some(v) = lookup(ENV_BATCH_MAX_SIZE) {
            self.batcher.max_batch_size = parse_override(ENV_BATCH_MAX_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_POLL_INTERVAL_SECS) {
            self.poller.interval_secs = parse_override(ENV_POLL_INTERVAL_SECS, &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        self.batcher.validate()?;
        self.poller.validate()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn invalid(reason: impl Into<String>) -> SynapseError {
    SynapseError::InvalidConfig {
        reason: reason.into(),
    }
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| invalid(format!("{name}={value:?}: {e}")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
