//! Debounced execution of an [`AsyncOperation`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use weave_core::defaults;

use crate::operation::AsyncOperation;

/// Collapses bursts of triggers into one execution after a quiet period.
///
/// Every [`trigger`](Self::trigger) restarts the delay; only the last
/// trigger of a burst executes the operation. Only the timer is
/// cancellable here: once the delay elapses the execution runs on its own
/// task and finishes (or is superseded by the next one).
pub struct DebouncedOperation<T> {
    operation: Arc<AsyncOperation<T>>,
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl<T> DebouncedOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Debounce with the default 500 ms delay.
    pub fn new(operation: Arc<AsyncOperation<T>>) -> Self {
        Self::with_delay(operation, Duration::from_millis(defaults::DEBOUNCE_MS))
    }

    pub fn with_delay(operation: Arc<AsyncOperation<T>>, delay: Duration) -> Self {
        Self {
            operation,
            delay,
            pending: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Schedule an execution, replacing any pending one. Must be called
    /// from within a tokio runtime.
    pub fn trigger(&self) {
        let operation = self.operation.clone();
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(async move {
                // The outcome lands in the operation's state.
                let _ = operation.execute().await;
            });
        });

        if let Some(previous) = self.lock().replace(handle) {
            previous.abort();
            debug!(subsystem = "operation", "Debounced trigger replaced pending run");
        }
    }

    /// Drop a pending (not yet started) execution. A started execution is
    /// left to finish.
    pub fn cancel_pending(&self) {
        if let Some(pending) = self.lock().take() {
            pending.abort();
        }
    }

    /// Drop a pending execution and cancel one in flight.
    pub fn cancel(&self) {
        self.cancel_pending();
        self.operation.cancel();
    }

    pub fn operation(&self) -> &Arc<AsyncOperation<T>> {
        &self.operation
    }
}

impl<T> Drop for DebouncedOperation<T> {
    fn drop(&mut self) {
        let pending = self.pending.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = pending.take() {
            handle.abort();
        }
    }
}
