//! Reactive core of Synapse.
//!
//! This crate provides:
//!
//! - **State-change batching**: bursts of changes for the same key are
//!   debounced into one workflow invocation via
//!   [`batcher::StateChangeBatcher`].
//! - **Email triggers**: workflows fired by incoming mail that matches a
//!   registered predicate, via [`trigger::TriggerRegistry`] and the
//!   background [`poller::EmailPoller`].
//! - **Engine facade**: [`engine::SynapseEngine`] wires both together around
//!   an injected [`WorkflowInvoker`] and [`EmailSource`].

pub mod batcher;
pub mod change;
pub mod config;
pub mod email;
pub mod engine;
pub mod error;
pub mod matcher;
pub mod poller;
pub mod stats;
pub mod timer;
pub mod trigger;
pub mod workflow;

#[cfg(test)]
mod testing;

pub use batcher::StateChangeBatcher;
pub use change::{Batch, StateChange};
pub use config::{BatcherConfig, EngineConfig, PollerConfig};
pub use email::{Email, EmailCursor, EmailSource};
pub use engine::SynapseEngine;
pub use error::{Result, SynapseError};
pub use matcher::{CompiledMatcher, EmailMatcher};
pub use poller::EmailPoller;
pub use stats::{BatcherStats, KeyStats, TriggerStats};
pub use timer::ScheduledTask;
pub use trigger::{
    CheckOutcome, EmailTriggerConfig, RegisteredEmailTrigger, TriggerRegistry, TriggerStatus,
};
pub use workflow::{WorkflowInput, WorkflowInvoker, WorkflowRef};
