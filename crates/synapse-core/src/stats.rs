//! Counters exposed by the batcher and the trigger registry.
//!
//! Both components own a `*Counters` value that they mutate, and hand out
//! plain `*Stats` snapshots that callers can keep or serialize.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Batcher
// ---------------------------------------------------------------------------

/// Flush counters for a single batch key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStats {
    pub batches_flushed: u64,
    pub changes_recorded: u64,
    pub flush_failures: u64,
    pub last_flush_at: Option<DateTime<Utc>>,
}

/// Snapshot of the batcher's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatcherStats {
    /// Batches delivered to the workflow successfully.
    pub batches_flushed: u64,
    /// Changes contained in successfully delivered batches.
    pub changes_recorded: u64,
    /// Flushes whose workflow invocation failed.
    pub flush_failures: u64,
    /// Every change passed to `record`, delivered or not.
    pub changes_received: u64,
    /// Changes sitting in open batches right now.
    pub pending_changes: u64,
    /// Keys with an open batch right now.
    pub open_batches: u64,
    /// Flushes currently waiting on the workflow invoker.
    pub in_flight_flushes: u64,
    /// Most recent successful flush across all keys.
    pub last_flush_at: Option<DateTime<Utc>>,
    /// Per-key breakdown, ordered by key.
    pub per_key: BTreeMap<String, KeyStats>,
}

#[derive(Debug, Default)]
pub(crate) struct BatcherCounters {
    batches_flushed: AtomicU64,
    changes_recorded: AtomicU64,
    flush_failures: AtomicU64,
    changes_received: AtomicU64,
    in_flight: AtomicU64,
    per_key: DashMap<String, KeyStats>,
}

impl BatcherCounters {
    pub(crate) fn record_received(&self) {
        self.changes_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn flush_started(&self) {
        self.in_flight.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn flush_succeeded(&self, key: &str, changes: usize) {
        let now = Utc::now();
        self.batches_flushed.fetch_add(1, Ordering::Relaxed);
        self.changes_recorded
            .fetch_add(changes as u64, Ordering::Relaxed);
        let mut entry = self.per_key.entry(key.to_string()).or_default();
        entry.batches_flushed += 1;
        entry.changes_recorded += changes as u64;
        entry.last_flush_at = Some(now);
        drop(entry);
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub(crate) fn flush_failed(&self, key: &str) {
        self.flush_failures.fetch_add(1, Ordering::Relaxed);
        self.per_key.entry(key.to_string()).or_default().flush_failures += 1;
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    /// Build a snapshot.  Live batch figures are supplied by the caller.
    pub(crate) fn snapshot(&self, pending_changes: u64, open_batches: u64) -> BatcherStats {
        let per_key: BTreeMap<String, KeyStats> = self
            .per_key
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        let last_flush_at = per_key.values().filter_map(|k| k.last_flush_at).max();

        BatcherStats {
            batches_flushed: self.batches_flushed.load(Ordering::Relaxed),
            changes_recorded: self.changes_recorded.load(Ordering::Relaxed),
            flush_failures: self.flush_failures.load(Ordering::Relaxed),
            changes_received: self.changes_received.load(Ordering::Relaxed),
            pending_changes,
            open_batches,
            in_flight_flushes: self.in_flight.load(Ordering::Acquire),
            last_flush_at,
            per_key,
        }
    }
}

// ---------------------------------------------------------------------------
// Trigger registry
// ---------------------------------------------------------------------------

/// Snapshot of the trigger registry's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerStats {
    /// Completed `check_for_new_emails` passes.
    pub passes: u64,
    /// Emails evaluated against the registry (polled or pushed).
    pub emails_evaluated: u64,
    /// Workflow invocations that succeeded.
    pub fires: u64,
    /// Workflow invocations that failed.
    pub fire_failures: u64,
    /// Passes skipped because the email source could not be reached.
    pub source_failures: u64,
}

#[derive(Debug, Default)]
pub(crate) struct TriggerCounters {
    pub(crate) passes: AtomicU64,
    pub(crate) emails_evaluated: AtomicU64,
    pub(crate) fires: AtomicU64,
    pub(crate) fire_failures: AtomicU64,
    pub(crate) source_failures: AtomicU64,
}

impl TriggerCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> TriggerStats {
        TriggerStats {
            passes: self.passes.load(Ordering::Relaxed),
            emails_evaluated: self.emails_evaluated.load(Ordering::Relaxed),
            fires: self.fires.load(Ordering::Relaxed),
            fire_failures: self.fire_failures.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
        }
    }
}
