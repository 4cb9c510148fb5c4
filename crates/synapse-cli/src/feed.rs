//! Line protocol for `synapse run`.
//!
//! Each stdin line is either a command word or a JSON state change.  A
//! change is written either with an explicit key,
//! `{"key": "cart:42", "payload": {...}}`, or in source form,
//! `{"source": "bilka", "stateType": "order", "stateData": {...}}`, which
//! batches under `"bilka:order"`.

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use serde_json::Value;

use synapse_core::StateChange;

/// One parsed input line.
#[derive(Debug, Clone, PartialEq)]
pub enum FeedCommand {
    Record(StateChange),
    /// Flush one key, or every open batch.
    Flush(Option<String>),
    Stats,
    Triggers,
    Quit,
    /// Blank line or comment.
    Skip,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ChangeLine {
    Keyed {
        key: String,
        #[serde(default)]
        payload: Value,
    },
    Sourced {
        source: String,
        #[serde(alias = "stateType")]
        state_type: String,
        #[serde(default, alias = "stateData")]
        state_data: Value,
    },
}

/// Parse one line of input.
pub fn parse_line(line: &str) -> Result<FeedCommand> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(FeedCommand::Skip);
    }
    if line.starts_with('{') {
        let change: ChangeLine =
            serde_json::from_str(line).context("expected {key, payload} or {source, stateType, stateData}")?;
        return Ok(FeedCommand::Record(match change {
            ChangeLine::Keyed { key, payload } => StateChange::new(key, payload),
            ChangeLine::Sourced {
                source,
                state_type,
                state_data,
            } => StateChange::from_source(source, state_type, state_data),
        }));
    }

    let mut words = line.split_whitespace();
    let command = match (words.next(), words.next()) {
        (Some("flush"), key) => FeedCommand::Flush(key.map(str::to_string)),
        (Some("stats"), None) => FeedCommand::Stats,
        (Some("triggers"), None) => FeedCommand::Triggers,
        (Some("quit" | "exit"), None) => FeedCommand::Quit,
        _ => bail!("unknown command `{line}` (try flush [key], stats, triggers, quit)"),
    };
    if words.next().is_some() {
        bail!("too many arguments in `{line}`");
    }
    Ok(command)
}
