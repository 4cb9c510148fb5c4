//! Scheduled tasks backing debounce windows.
//!
//! A [`ScheduledTask`] owns a spawned tokio task that waits until a deadline
//! and then runs a future.  Dropping or cancelling the handle aborts the task,
//! so a batch that is flushed early never leaves a timer behind.  Deadlines are
//! expressed with [`tokio::time::Instant`], which lets tests drive them with a
//! paused clock.

use std::future::Future;

use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Handle to a future that runs once a deadline is reached.
#[derive(Debug)]
pub struct ScheduledTask {
    handle: Option<JoinHandle<()>>,
}

impl ScheduledTask {
    /// Spawn `task` to run at `deadline`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn at<F>(deadline: Instant, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            task.await;
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Abort the task if it has not completed yet.
    pub fn cancel(mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Release the handle without aborting the task.
    ///
    /// Used by a task that removes its own handle from shared state: aborting
    /// itself would cancel the work it is about to do.
    pub fn detach(mut self) {
        self.handle.take();
    }

    /// Whether the underlying task has finished (completed or aborted).
    #[cfg(test)]
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
