//! Email cursor persisted between runs.
//!
//! The engine keeps its cursor in memory only.  A host that runs in short
//! bursts (`synapse check` from cron) saves it here so the next run resumes
//! where the last one stopped instead of re-reading the whole mailbox.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use synapse_core::EmailCursor;

use crate::error::Result;

/// File name used inside a spool directory.
pub const CURSOR_FILE_NAME: &str = ".cursor";

#[derive(Serialize, Deserialize)]
struct SavedCursor {
    last_seen_uid: u64,
}

/// A cursor stored as a small JSON file.
#[derive(Debug, Clone)]
pub struct CursorFile {
    path: PathBuf,
}

impl CursorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The cursor file kept alongside the spooled emails in `dir`.  The name
    /// does not end in `.json`, so the spool source never reads it as mail.
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CURSOR_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the saved cursor.  `None` when nothing was saved yet.
    pub async fn load(&self) -> Result<Option<EmailCursor>> {
        let content = match tokio::fs::read(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let saved: SavedCursor = serde_json::from_slice(&content)?;
        debug!(path = %self.path.display(), uid = saved.last_seen_uid, "cursor loaded");
        Ok(Some(EmailCursor(saved.last_seen_uid)))
    }

    /// Save `cursor`, replacing the previous file in one rename.
    pub async fn save(&self, cursor: EmailCursor) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_vec(&SavedCursor {
            last_seen_uid: cursor.0,
        })?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, content).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!(path = %self.path.display(), uid = cursor.0, "cursor saved");
        Ok(())
    }
}
