//! Incoming email model and the source capability the registry polls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// An email as seen by the trigger registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    /// Mailbox-unique id that only grows (an IMAP UID, a spool sequence).
    pub uid: u64,
    /// The `Message-ID` header.
    #[serde(default)]
    pub message_id: String,
    /// Conversation/thread correlation id, if the transport provides one.
    #[serde(default)]
    pub thread_id: Option<String>,
    /// Sender address.
    pub from: String,
    /// Sender display name.
    #[serde(default)]
    pub from_name: Option<String>,
    pub subject: String,
    /// Short preview of the body.
    #[serde(default)]
    pub snippet: String,
    /// Full body, when the source fetched it.
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

/// Watermark over [`Email::uid`] marking what has already been evaluated.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct EmailCursor(pub u64);

impl EmailCursor {
    /// The cursor before anything was fetched.
    pub const START: Self = Self(0);

    /// Whether `email` lies beyond this cursor.
    pub fn is_new(&self, email: &Email) -> bool {
        email.uid > self.0
    }

    /// The cursor after observing `email`.  Never moves backwards.
    pub fn advance(self, email: &Email) -> Self {
        Self(self.0.max(email.uid))
    }
}

impl std::fmt::Display for EmailCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "uid:{}", self.0)
    }
}

/// Something that can be asked for emails newer than a cursor.
#[async_trait]
pub trait EmailSource: Send + Sync {
    /// Return emails with a uid greater than `cursor`, oldest first.
    ///
    /// Fails with [`SynapseError::EmailSourceUnavailable`] when the mailbox
    /// cannot be reached.
    ///
    /// [`SynapseError::EmailSourceUnavailable`]: crate::SynapseError::EmailSourceUnavailable
    async fn fetch_since(&self, cursor: EmailCursor) -> Result<Vec<Email>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(uid: u64) -> Email {
        Email {
            uid,
            message_id: format!("<{uid}@example.com>"),
            thread_id: None,
            from: "a@example.com".into(),
            from_name: None,
            subject: "hi".into(),
            snippet: String::new(),
            body: None,
            received_at: Utc::now(),
        }
    }

    #[test]
    fn cursor_only_moves_forward() {
        let cursor = EmailCursor::START.advance(&email(7));
        assert_eq!(cursor, EmailCursor(7));
        assert_eq!(cursor.advance(&email(3)), EmailCursor(7));
        assert!(!cursor.is_new(&email(7)));
        assert!(cursor.is_new(&email(8)));
    }

    #[test]
    fn email_deserializes_with_minimal_fields() {
        let parsed: Email = serde_json::from_str(
            r#"{"uid": 4, "from": "shop@example.com", "subject": "Order ready"}"#,
        )
        .unwrap();
        assert_eq!(parsed.uid, 4);
        assert!(parsed.thread_id.is_none());
        assert!(parsed.snippet.is_empty());
    }
}
