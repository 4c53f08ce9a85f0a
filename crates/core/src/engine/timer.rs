//! Cancellable periodic task.
//!
//! The task sleeps on the engine's [`TimeSource`], checks the shared active
//! flag and only then runs the tick and schedules the next one. Cancelling
//! clears the flag and aborts the task, so a tick can never outlive its owner.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::simulation::TimeSource;

/// Handle to a running periodic task. Dropping the handle cancels the task.
#[derive(Debug)]
pub struct PeriodicTimer {
    active: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

impl PeriodicTimer {
    /// Spawn `tick` every `period` on the current tokio runtime.
    ///
    /// The task stops for good once `tick` returns `false` or the handle is
    /// cancelled. Returns `None` when called outside a runtime.
    pub fn spawn<T, F>(time_source: T, period: Duration, mut tick: F) -> Option<Self>
    where
        T: TimeSource,
        F: FnMut() -> bool + Send + 'static,
    {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No tokio runtime available - periodic updates not started");
            return None;
        };

        let active = Arc::new(AtomicBool::new(true));
        let still_active = active.clone();
        let task = handle.spawn(async move {
            loop {
                time_source.sleep(period).await;
                if !still_active.load(Ordering::Acquire) {
                    break;
                }
                if !tick() {
                    still_active.store(false, Ordering::Release);
                    break;
                }
            }
            tracing::trace!("periodic timer finished");
        });

        Some(Self {
            active,
            task: Some(task),
        })
    }

    /// Whether the task will run another tick.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Stop the task. Idempotent.
    pub fn cancel(&mut self) {
        self.active.store(false, Ordering::Release);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}
