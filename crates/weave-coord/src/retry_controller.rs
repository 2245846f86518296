//! Reconnect retry controller.
//!
//! Watches network transitions and, when connectivity comes back after an
//! outage, re-runs a caller-supplied retry function with exponential
//! backoff. A new outage cancels a sequence in progress.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use weave_core::{CoordinatorEvent, Error, EventBus, Notification, Result, RetryConfig};

use crate::error_registry::panic_message;
use crate::network::{NetworkMonitor, NetworkTransition};

/// The work re-run after reconnecting.
pub type RetryFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

#[derive(Default)]
struct ControllerState {
    was_offline: bool,
    is_retrying: bool,
    retry_count: u32,
    /// Bumped whenever a sequence starts or is cancelled; a sequence only
    /// writes state while its epoch is current.
    epoch: u64,
    sequence: Option<JoinHandle<()>>,
}

struct ControllerInner {
    retry_fn: RetryFn,
    config: RetryConfig,
    network: NetworkMonitor,
    bus: Arc<EventBus>,
    state: Mutex<ControllerState>,
}

impl ControllerInner {
    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_offline(&self) {
        let mut state = self.lock();
        state.was_offline = true;
        state.is_retrying = false;
        state.epoch += 1;
        if let Some(sequence) = state.sequence.take() {
            sequence.abort();
            debug!(subsystem = "retry", "Outage cancelled pending reconnect retry");
        }
    }

    fn on_restored(self: &Arc<Self>) {
        if self.lock().was_offline {
            self.start_sequence();
        }
    }

    fn start_sequence(self: &Arc<Self>) {
        let mut state = self.lock();
        if let Some(previous) = state.sequence.take() {
            previous.abort();
        }
        state.epoch += 1;
        let epoch = state.epoch;
        let inner = self.clone();
        state.sequence = Some(tokio::spawn(async move {
            inner.run_sequence(epoch).await;
        }));
    }

    /// Apply `f` if `epoch` is still current.
    fn update(&self, epoch: u64, f: impl FnOnce(&mut ControllerState)) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            return false;
        }
        f(&mut state);
        true
    }

    async fn run_sequence(&self, epoch: u64) {
        let max_attempts = self.config.max_attempts;

        for attempt in 0..max_attempts {
            let number = attempt + 1;
            if !self.update(epoch, |s| {
                s.is_retrying = true;
                s.retry_count = number;
            }) {
                return;
            }
            info!(subsystem = "retry", attempt = number, max_attempts, "Reconnect retry attempt");
            self.bus.emit(CoordinatorEvent::ReconnectRetry {
                attempt: number,
                max_attempts,
            });

            let outcome = AssertUnwindSafe((self.retry_fn)())
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(Error::Internal(panic_message(panic))));

            match outcome {
                Ok(()) => {
                    if self.update(epoch, |s| {
                        s.is_retrying = false;
                        s.retry_count = 0;
                        s.was_offline = false;
                        s.sequence = None;
                    }) {
                        info!(subsystem = "retry", attempt = number, success = true, "Reconnect retry succeeded");
                        self.bus
                            .notify(Notification::success("Operation completed successfully"));
                    }
                    return;
                }
                Err(err) if number < max_attempts => {
                    let delay = self.config.backoff.delay_for(attempt);
                    warn!(
                        subsystem = "retry",
                        attempt = number,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Reconnect retry failed"
                    );
                    self.bus.notify(Notification::warning(format!(
                        "Retry {number}/{max_attempts} failed. Retrying in {}s...",
                        delay.as_secs_f64()
                    )));
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    warn!(subsystem = "retry", attempt = number, error = %err, "Final reconnect retry failed");
                }
            }
        }

        if self.update(epoch, |s| {
            s.is_retrying = false;
            s.sequence = None;
        }) {
            error!(subsystem = "retry", max_attempts, "Reconnect retries exhausted");
            self.bus
                .emit(CoordinatorEvent::ReconnectRetryExhausted { max_attempts });
            self.bus.notify(Notification::error(
                "Maximum retry attempts reached. Please try again manually.",
            ));
        }
    }
}

/// Runs a retry function whenever connectivity is restored after an outage.
///
/// Dropping the controller stops watching and aborts a sequence in
/// progress.
pub struct NetworkRetryController {
    inner: Arc<ControllerInner>,
    watcher: JoinHandle<()>,
}

impl NetworkRetryController {
    /// Start watching `network`. Must be called from within a tokio runtime.
    pub fn spawn(
        network: NetworkMonitor,
        bus: Arc<EventBus>,
        config: RetryConfig,
        retry_fn: RetryFn,
    ) -> Self {
        let mut transitions = network.subscribe_transitions();
        let inner = Arc::new(ControllerInner {
            retry_fn,
            config,
            state: Mutex::new(ControllerState {
                was_offline: !network.is_online(),
                ..ControllerState::default()
            }),
            network,
            bus,
        });

        let watcher_inner = inner.clone();
        let watcher = tokio::spawn(async move {
            loop {
                match transitions.recv().await {
                    Ok(NetworkTransition::WentOffline) => watcher_inner.on_offline(),
                    Ok(NetworkTransition::Restored) => watcher_inner.on_restored(),
                    Ok(NetworkTransition::BecameSlow) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(subsystem = "retry", skipped, "Missed network transitions; resyncing");
                        if watcher_inner.network.is_online() {
                            watcher_inner.on_restored();
                        } else {
                            watcher_inner.on_offline();
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        Self { inner, watcher }
    }

    /// Start a sequence now. Ignored (returns `false`) while offline or while
    /// a sequence is already running.
    pub fn manual_retry(&self) -> bool {
        if !self.inner.network.is_online() || self.inner.lock().is_retrying {
            return false;
        }
        self.inner.start_sequence();
        true
    }

    pub fn is_retrying(&self) -> bool {
        self.inner.lock().is_retrying
    }

    /// 1-based number of the current attempt, 0 when idle.
    pub fn retry_count(&self) -> u32 {
        self.inner.lock().retry_count
    }

    pub fn was_offline(&self) -> bool {
        self.inner.lock().was_offline
    }

    pub fn max_attempts(&self) -> u32 {
        self.inner.config.max_attempts
    }
}

impl Drop for NetworkRetryController {
    fn drop(&mut self) {
        self.watcher.abort();
        let mut state = self.inner.lock();
        state.epoch += 1;
        if let Some(sequence) = state.sequence.take() {
            sequence.abort();
        }
    }
}
