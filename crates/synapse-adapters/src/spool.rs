//! Spool-directory email source.
//!
//! A mail fetcher (or a test) drops each message as a JSON file into a
//! directory.  A file holds either one [`Email`] object or an array of them.
//! Only files ending in `.json` are considered; anything that fails to parse
//! is logged and skipped so one bad file cannot stall the poll loop.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, warn};

use synapse_core::{Email, EmailCursor, EmailSource, SynapseError};

use crate::error::Result;

/// Reads emails from `*.json` files in a directory.
#[derive(Debug, Clone)]
pub struct SpoolEmailSource {
    dir: PathBuf,
}

impl SpoolEmailSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `email` into the spool as `<uid>.json`, creating the directory
    /// if needed.  Returns the file path.
    pub async fn deliver(&self, email: &Email) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(format!("{}.json", email.uid));
        let content = serde_json::to_vec_pretty(email)?;
        tokio::fs::write(&path, content).await?;
        debug!(path = %path.display(), uid = email.uid, "email spooled");
        Ok(path)
    }

    async fn read_file(path: &Path) -> Option<Vec<Email>> {
        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read spooled email");
                return None;
            }
        };
        match serde_json::from_slice::<SpoolFile>(&content) {
            Ok(SpoolFile::One(email)) => Some(vec![*email]),
            Ok(SpoolFile::Many(emails)) => Some(emails),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed spooled email");
                None
            }
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum SpoolFile {
    One(Box<Email>),
    Many(Vec<Email>),
}

#[async_trait]
impl EmailSource for SpoolEmailSource {
    async fn fetch_since(&self, cursor: EmailCursor) -> synapse_core::Result<Vec<Email>> {
        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(|e| {
            SynapseError::source_unavailable(format!("{}: {e}", self.dir.display()))
        })?;

        let mut emails = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    return Err(SynapseError::source_unavailable(format!(
                        "{}: {e}",
                        self.dir.display()
                    )));
                }
            };
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(batch) = Self::read_file(&path).await {
                emails.extend(batch.into_iter().filter(|e| cursor.is_new(e)));
            }
        }

        emails.sort_by_key(|e| e.uid);
        emails.dedup_by_key(|e| e.uid);
        debug!(dir = %self.dir.display(), cursor = %cursor, count = emails.len(), "spool scanned");
        Ok(emails)
    }
}
