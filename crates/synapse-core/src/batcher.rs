//! State-change batcher.
//!
//! Turns a noisy stream of fine-grained [`StateChange`]s into coarse batches,
//! one per key, and hands each batch to the bound workflow exactly once.
//!
//! # Flush policy
//!
//! ```text
//! record(k) ──> no open batch ──> open, deadline = now + window
//!          └──> open batch    ──> append
//!                                 ├─ age >= max_window  -> flush now
//!                                 ├─ len >= max_batch   -> flush now
//!                                 └─ deadline = min(now + window, start + max_window)
//! ```
//!
//! A flush first removes the batch from the live map and only then awaits the
//! invoker, so a record racing with a flush starts a fresh batch and two
//! flushes can never claim the same batch.  Invocations for one key run one
//! at a time, in the order their batches were claimed; each claim queues
//! behind the previous one for its key.  Failed flushes are counted and
//! logged but never retried.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::change::{Batch, StateChange};
use crate::config::BatcherConfig;
use crate::stats::{BatcherCounters, BatcherStats};
use crate::timer::ScheduledTask;
use crate::workflow::{WorkflowInput, WorkflowInvoker};

// ---------------------------------------------------------------------------
// Internal types
// ---------------------------------------------------------------------------

/// A batch that is still accepting changes.
struct OpenBatch {
    /// Distinguishes this batch from later batches for the same key.
    id: u64,
    changes: Vec<StateChange>,
    started: Instant,
    started_at: DateTime<Utc>,
    deadline: Instant,
    timer: Option<ScheduledTask>,
}

impl OpenBatch {
    fn into_batch(self, key: String) -> Batch {
        let window_deadline = self.started_at
            + chrono::Duration::from_std(self.deadline.saturating_duration_since(self.started))
                .unwrap_or_else(|_| chrono::Duration::zero());
        Batch {
            key,
            changes: self.changes,
            window_started_at: self.started_at,
            window_deadline,
        }
    }
}

/// Why a batch is being flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlushCause {
    /// The debounce timer expired.
    Window,
    /// The batch reached `max_window_ms`.
    HardCap,
    /// The batch reached `max_batch_size`.
    Full,
    /// `flush_state_changes` was called.
    Manual,
}

impl FlushCause {
    fn as_str(self) -> &'static str {
        match self {
            Self::Window => "window",
            Self::HardCap => "hard_cap",
            Self::Full => "full",
            Self::Manual => "manual",
        }
    }
}

/// A claimed batch's place in its key's flush queue.
struct FlushTurn {
    /// Completes once the previous flush for the key has finished.
    prev: Option<oneshot::Receiver<()>>,
    /// Dropped when this flush finishes, releasing the next one.
    done: oneshot::Sender<()>,
}

/// Outcome of a timer checking on its batch.
enum Claim {
    /// The deadline passed; the batch now belongs to the timer.
    Ready(OpenBatch, FlushTurn),
    /// The deadline moved; sleep until the new one.
    Extended(Instant),
    /// The batch was flushed by someone else.
    Gone,
}

struct BatcherInner {
    config: BatcherConfig,
    invoker: Arc<dyn WorkflowInvoker>,
    open: DashMap<String, OpenBatch>,
    /// Tail of each key's flush queue: the last claimed batch id and a
    /// receiver that completes when its flush is done.
    queues: DashMap<String, (u64, oneshot::Receiver<()>)>,
    next_batch_id: AtomicU64,
    counters: BatcherCounters,
}

// ---------------------------------------------------------------------------
// Batcher
// ---------------------------------------------------------------------------

/// Debounced, per-key batcher of state changes.
///
/// Cheap to clone; clones share the same open batches and stats.  Must be
/// used from within a tokio runtime because debounce timers are spawned
/// tasks.
#[derive(Clone)]
pub struct StateChangeBatcher {
    inner: Arc<BatcherInner>,
}

impl StateChangeBatcher {
    /// Create a batcher that delivers batches to `config.workflow` through
    /// `invoker`.
    pub fn new(config: BatcherConfig, invoker: Arc<dyn WorkflowInvoker>) -> Self {
        Self {
            inner: Arc::new(BatcherInner {
                config,
                invoker,
                open: DashMap::new(),
                queues: DashMap::new(),
                next_batch_id: AtomicU64::new(1),
                counters: BatcherCounters::default(),
            }),
        }
    }

    /// The policy this batcher was built with.
    pub fn config(&self) -> &BatcherConfig {
        &self.inner.config
    }

    /// Add a change to the open batch for its key.
    ///
    /// Returns once the change is accumulated.  If the change pushes its batch
    /// over the hard cap or the size limit, the batch is flushed before this
    /// returns.
    pub async fn record(&self, change: StateChange) {
        let inner = &self.inner;
        inner.counters.record_received();

        let key = change.key.clone();
        let now = Instant::now();
        let window = inner.config.window();
        let max_window = inner.config.max_window();

        let claimed = match inner.open.entry(key.clone()) {
            Entry::Vacant(slot) => {
                let id = inner.next_batch_id.fetch_add(1, Ordering::Relaxed);
                let deadline = now + window.min(max_window);
                let mut batch = OpenBatch {
                    id,
                    changes: vec![change],
                    started: now,
                    started_at: Utc::now(),
                    deadline,
                    timer: None,
                };
                if batch.changes.len() >= inner.config.max_batch_size {
                    let turn = inner.take_turn(&key, id);
                    Some((batch, FlushCause::Full, turn))
                } else {
                    batch.timer = Some(BatcherInner::schedule(inner, key.clone(), id, deadline));
                    debug!(key = %key, batch_id = id, "batch opened");
                    slot.insert(batch);
                    None
                }
            }
            Entry::Occupied(mut slot) => {
                let batch = slot.get_mut();
                batch.changes.push(change);
                let age = now.saturating_duration_since(batch.started);

                let cause = if age >= max_window {
                    Some(FlushCause::HardCap)
                } else if batch.changes.len() >= inner.config.max_batch_size {
                    Some(FlushCause::Full)
                } else {
                    None
                };
                if let Some(cause) = cause {
                    let turn = inner.take_turn(&key, batch.id);
                    Some((slot.remove(), cause, turn))
                } else {
                    batch.deadline = (now + window).min(batch.started + max_window);
                    debug!(
                        key = %key,
                        batch_id = batch.id,
                        size = batch.changes.len(),
                        "batch extended"
                    );
                    None
                }
            }
        };

        if let Some((batch, cause, turn)) = claimed {
            inner.deliver(key, batch, cause, turn).await;
        }
    }

    /// Force-flush open batches.
    ///
    /// With a key, flushes that key's batch (no-op when none is open).  Without
    /// one, flushes every open batch concurrently; a failing key does not hold
    /// up or undo the others.  Returns the number of batches claimed; a batch
    /// already claimed by its timer is not counted.
    pub async fn flush_state_changes(&self, key: Option<&str>) -> usize {
        let inner = &self.inner;
        match key {
            Some(key) => match inner.claim(key) {
                Some((key, batch, turn)) => {
                    inner.deliver(key, batch, FlushCause::Manual, turn).await;
                    1
                }
                None => {
                    debug!(key = %key, "no open batch to flush");
                    0
                }
            },
            None => {
                // Collect keys first: removing while iterating a DashMap
                // deadlocks on the shard lock.
                let keys: Vec<String> = inner.open.iter().map(|e| e.key().clone()).collect();
                let claimed: Vec<_> = keys.iter().filter_map(|key| inner.claim(key)).collect();
                let count = claimed.len();
                futures::future::join_all(
                    claimed.into_iter().map(|(key, batch, turn)| {
                        inner.deliver(key, batch, FlushCause::Manual, turn)
                    }),
                )
                .await;
                count
            }
        }
    }

    /// Snapshot of the counters and live batch figures.
    pub fn get_stats(&self) -> BatcherStats {
        let inner = &self.inner;
        let (pending, open) = inner
            .open
            .iter()
            .fold((0u64, 0u64), |(pending, open), e| {
                (pending + e.value().changes.len() as u64, open + 1)
            });
        inner.counters.snapshot(pending, open)
    }

    /// Number of changes waiting in open batches.
    pub fn pending_count(&self) -> usize {
        self.inner.open.iter().map(|e| e.value().changes.len()).sum()
    }
}

impl BatcherInner {
    /// Arm the debounce timer for batch `id` of `key`.
    ///
    /// The timer holds only a weak reference so a dropped batcher does not
    /// linger until its last deadline.
    fn schedule(this: &Arc<Self>, key: String, id: u64, deadline: Instant) -> ScheduledTask {
        let weak: Weak<Self> = Arc::downgrade(this);
        ScheduledTask::at(deadline, async move {
            loop {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                match inner.claim_expired(&key, id) {
                    Claim::Ready(batch, turn) => {
                        inner.deliver(key, batch, FlushCause::Window, turn).await;
                        return;
                    }
                    Claim::Extended(next) => {
                        drop(inner);
                        tokio::time::sleep_until(next).await;
                    }
                    Claim::Gone => return,
                }
            }
        })
    }

    /// Take batch `id` of `key` out of the live map if its deadline passed.
    fn claim_expired(&self, key: &str, id: u64) -> Claim {
        match self.open.entry(key.to_string()) {
            Entry::Occupied(slot) if slot.get().id == id => {
                let deadline = slot.get().deadline;
                if Instant::now() >= deadline {
                    let turn = self.take_turn(key, id);
                    Claim::Ready(slot.remove(), turn)
                } else {
                    Claim::Extended(deadline)
                }
            }
            _ => Claim::Gone,
        }
    }

    /// Take the open batch for `key` out of the live map, if there is one.
    fn claim(&self, key: &str) -> Option<(String, OpenBatch, FlushTurn)> {
        match self.open.entry(key.to_string()) {
            Entry::Occupied(slot) => {
                let turn = self.take_turn(key, slot.get().id);
                let (key, batch) = slot.remove_entry();
                Some((key, batch, turn))
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Queue batch `id` behind the last flush claimed for `key`.
    ///
    /// Must be called while the batch's entry in `open` is still held, so the
    /// queue order is the claim order.
    fn take_turn(&self, key: &str, id: u64) -> FlushTurn {
        let (done, finished) = oneshot::channel();
        let prev = self
            .queues
            .insert(key.to_string(), (id, finished))
            .map(|(_, prev)| prev);
        FlushTurn { prev, done }
    }

    /// Hand a claimed batch to the workflow and record the outcome.
    ///
    /// Waits for the previous flush of the same key to finish first.
    async fn deliver(
        &self,
        key: String,
        mut batch: OpenBatch,
        cause: FlushCause,
        turn: FlushTurn,
    ) -> bool {
        if let Some(timer) = batch.timer.take() {
            // A window flush runs on this very timer; aborting it would
            // cancel the invocation below.
            if cause == FlushCause::Window {
                timer.detach();
            } else {
                timer.cancel();
            }
        }

        let batch_id = batch.id;
        let batch = batch.into_batch(key.clone());
        let size = batch.len();
        let workflow = &self.config.workflow;

        let FlushTurn { prev, done } = turn;
        if let Some(prev) = prev {
            debug!(key = %key, batch_id, "waiting for previous flush of key");
            // An error only means the previous flush was dropped; either way
            // it is no longer running.
            let _ = prev.await;
        }

        self.counters.flush_started();
        debug!(
            key = %key,
            batch_id,
            size,
            cause = cause.as_str(),
            workflow = %workflow,
            "flushing batch"
        );

        let result = self
            .invoker
            .invoke(workflow, WorkflowInput::StateChangeBatch(batch))
            .await;

        self.queues.remove_if(&key, |_, (tail, _)| *tail == batch_id);
        drop(done);

        match result {
            Ok(()) => {
                self.counters.flush_succeeded(&key, size);
                info!(
                    key = %key,
                    batch_id,
                    size,
                    cause = cause.as_str(),
                    "batch flushed"
                );
                true
            }
            Err(e) => {
                self.counters.flush_failed(&key);
                warn!(
                    key = %key,
                    batch_id,
                    size,
                    error = %e,
                    "batch flush failed, changes dropped"
                );
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
