//! Structured email predicates.
//!
//! A matcher is a conjunction of up to three predicates.  Keeping the set
//! closed means triggers can be declared in config files and compared in
//! tests, and no caller-supplied code runs during a poll pass.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::email::Email;

/// Which emails satisfy a trigger.  Every predicate that is set must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMatcher {
    /// Exact thread/correlation id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,

    /// Sender address, compared case-insensitively.  `*` matches any run of
    /// characters, so `*@shop.example` accepts every address at that domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,

    /// Substring the subject must contain (case-sensitive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject_contains: Option<String>,
}

impl EmailMatcher {
    /// Match a conversation thread.
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Self::default()
        }
    }

    /// Match a sender address or wildcard pattern.
    pub fn sender(pattern: impl Into<String>) -> Self {
        Self {
            sender: Some(pattern.into()),
            ..Self::default()
        }
    }

    /// Additionally require the subject to contain `needle`.
    pub fn with_subject_containing(mut self, needle: impl Into<String>) -> Self {
        self.subject_contains = Some(needle.into());
        self
    }

    /// Additionally require a sender address or pattern.
    pub fn with_sender(mut self, pattern: impl Into<String>) -> Self {
        self.sender = Some(pattern.into());
        self
    }

    /// Whether no predicate is set.  Blank strings count as unset.
    pub fn is_empty(&self) -> bool {
        [&self.thread_id, &self.sender, &self.subject_contains]
            .iter()
            .all(|p| p.as_deref().is_none_or(|s| s.trim().is_empty()))
    }

    /// Validate and precompile the sender pattern.
    pub fn compile(&self) -> Result<CompiledMatcher, String> {
        if self.is_empty() {
            return Err("matcher must set at least one of thread_id, sender, subject_contains"
                .to_string());
        }
        let sender = match self.sender.as_deref().map(str::trim) {
            Some(pattern) if !pattern.is_empty() => Some(sender_regex(pattern)?),
            _ => None,
        };
        Ok(CompiledMatcher {
            thread_id: non_blank(&self.thread_id),
            sender,
            subject_contains: non_blank(&self.subject_contains),
        })
    }
}

/// An [`EmailMatcher`] ready to evaluate emails.
#[derive(Debug, Clone)]
pub struct CompiledMatcher {
    thread_id: Option<String>,
    sender: Option<Regex>,
    subject_contains: Option<String>,
}

impl CompiledMatcher {
    /// Whether `email` satisfies every configured predicate.
    pub fn matches(&self, email: &Email) -> bool {
        if let Some(thread) = &self.thread_id
            && email.thread_id.as_deref() != Some(thread.as_str())
        {
            return false;
        }
        if let Some(sender) = &self.sender
            && !sender.is_match(email.from.trim())
        {
            return false;
        }
        if let Some(needle) = &self.subject_contains
            && !email.subject.contains(needle.as_str())
        {
            return false;
        }
        true
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Translate a `*` wildcard address pattern into an anchored,
/// case-insensitive regex.
fn sender_regex(pattern: &str) -> Result<Regex, String> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    Regex::new(&format!("(?i)^{body}$")).map_err(|e| format!("invalid sender pattern `{pattern}`: {e}"))
}
