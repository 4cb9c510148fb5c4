//! Host settings loaded from the config file.
//!
//! The engine reads `[batcher]` and `[poller]`.  The binary additionally
//! reads `[workflows]` (workflow name to endpoint URL), `[mail]` and the
//! `[[email_triggers]]` array.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, warn};

use synapse_core::{EmailTriggerConfig, EngineConfig};

use crate::helpers::env_non_empty;

/// Environment variable overriding `[mail] spool_dir`.
pub const ENV_SPOOL_DIR: &str = "SYNAPSE_SPOOL_DIR";

/// Default spool directory, relative to the working directory.
const DEFAULT_SPOOL_DIR: &str = "data/mail";

/// Everything the binary needs to build and run an engine.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub workflows: BTreeMap<String, String>,
    pub mail: MailSettings,
    pub email_triggers: Vec<EmailTriggerConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    /// Directory the spool email source reads from.
    pub spool_dir: PathBuf,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            spool_dir: PathBuf::from(DEFAULT_SPOOL_DIR),
        }
    }
}

/// Tables the engine ignores.
#[derive(Debug, Default, Deserialize)]
struct HostTables {
    #[serde(default)]
    workflows: BTreeMap<String, String>,
    #[serde(default)]
    mail: MailSettings,
    #[serde(default)]
    email_triggers: Vec<EmailTriggerConfig>,
}

impl Settings {
    /// Parse settings from a TOML document.  No environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let engine = EngineConfig::from_toml_str(content).context("invalid engine tables")?;
        let host: HostTables = toml::from_str(content).context("invalid host tables")?;
        Ok(Self {
            engine,
            workflows: host.workflows,
            mail: host.mail,
            email_triggers: host.email_triggers,
        })
    }

    /// Load from `path`, apply `SYNAPSE_*` environment overrides and
    /// validate.  A missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut settings = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let settings = Self::from_toml_str(&content)
                .with_context(|| format!("failed to parse {}", path.display()))?;
            debug!(path = %path.display(), "settings loaded");
            settings
        } else {
            warn!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        settings.engine.apply_env_overrides()?;
        if let Some(dir) = env_non_empty(ENV_SPOOL_DIR) {
            settings.mail.spool_dir = PathBuf::from(dir);
        }
        settings.engine.validate()?;
        Ok(settings)
    }
}
