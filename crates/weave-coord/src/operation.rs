//! Async operation wrapper.
//!
//! [`AsyncOperation`] runs a unit of work with a per-attempt timeout, local
//! retries with exponential backoff, an offline short-circuit, optimistic
//! data with rollback, and single-flight supersession: starting a new
//! execution aborts the one in flight, and a superseded execution never
//! writes state.
//!
//! ```ignore
//! let op = coordinator
//!     .operation(|| async { api.load_board().await })
//!     .label("load-board")
//!     .retries(2)
//!     .success_message("Board loaded")
//!     .build();
//! let board = op.execute().await?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::{AbortHandle, AbortRegistration, Abortable, BoxFuture, FutureExt};
use tracing::{debug, error, info, warn};

use weave_core::defaults;
use weave_core::{
    AsyncOperationState, BackoffPolicy, CoordinatorEvent, Error, EventBus, Notification,
    OperationPhase, Result,
};

use crate::error_registry::ErrorRegistry;
use crate::network::NetworkMonitor;

/// A re-invocable unit of work.
pub type OperationFn<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Boxes a closure returning a future into an [`OperationFn`].
pub fn operation_fn<T, F, Fut>(f: F) -> OperationFn<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// A notification message, either fixed or derived from a value.
pub enum Message<A: ?Sized> {
    Static(String),
    Dynamic(Arc<dyn Fn(&A) -> String + Send + Sync>),
}

impl<A: ?Sized> Message<A> {
    pub fn render(&self, value: &A) -> String {
        match self {
            Message::Static(text) => text.clone(),
            Message::Dynamic(f) => f(value),
        }
    }
}

impl<A: ?Sized> Clone for Message<A> {
    fn clone(&self) -> Self {
        match self {
            Message::Static(text) => Message::Static(text.clone()),
            Message::Dynamic(f) => Message::Dynamic(f.clone()),
        }
    }
}

impl<A: ?Sized> fmt::Debug for Message<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Static(text) => f.debug_tuple("Static").field(text).finish(),
            Message::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

type ValueCallback<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;
type RetryCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Options for an [`AsyncOperation`].
pub struct OperationOptions<T> {
    /// Name used in logs, events and as the error-registry context.
    pub label: Option<String>,
    pub show_success_notification: bool,
    pub show_error_notification: bool,
    pub success_message: Message<T>,
    /// Falls back to the error's display text.
    pub error_message: Option<Message<Error>>,
    /// Retries after the first attempt.
    pub retry_count: u32,
    pub backoff: BackoffPolicy,
    /// Per-attempt deadline; `None` disables it.
    pub timeout: Option<Duration>,
    /// Short-circuit with a network error while offline. Retries always
    /// wait for an online connection regardless of this flag.
    pub network_retry: bool,
    /// Seeded into `data` at the start of each execution; a failure then
    /// clears `data`.
    pub optimistic: Option<T>,
    pub on_success: Option<ValueCallback<T>>,
    pub on_error: Option<ErrorCallback>,
    pub on_retry: Option<RetryCallback>,
}

impl<T> Default for OperationOptions<T> {
    fn default() -> Self {
        Self {
            label: None,
            show_success_notification: false,
            show_error_notification: true,
            success_message: Message::Static(defaults::OPERATION_SUCCESS_MESSAGE.to_string()),
            error_message: None,
            retry_count: defaults::OPERATION_RETRY_COUNT,
            backoff: BackoffPolicy::default(),
            timeout: Some(Duration::from_secs(defaults::OPERATION_TIMEOUT_SECS)),
            network_retry: true,
            optimistic: None,
            on_success: None,
            on_error: None,
            on_retry: None,
        }
    }
}

struct OperationInner<T> {
    state: AsyncOperationState<T>,
    /// Bumped on every execute and cancel; only the current generation may
    /// write `state`.
    generation: u64,
    abort: Option<AbortHandle>,
}

/// Single-flight wrapper around a unit of work.
pub struct AsyncOperation<T> {
    operation: OperationFn<T>,
    options: OperationOptions<T>,
    network: NetworkMonitor,
    errors: Option<ErrorRegistry>,
    bus: Arc<EventBus>,
    inner: Mutex<OperationInner<T>>,
}

impl<T> AsyncOperation<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(
        operation: OperationFn<T>,
        options: OperationOptions<T>,
        network: NetworkMonitor,
        errors: Option<ErrorRegistry>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            operation,
            options,
            network,
            errors,
            bus,
            inner: Mutex::new(OperationInner {
                state: AsyncOperationState::default(),
                generation: 0,
                abort: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, OperationInner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn label(&self) -> &str {
        self.options.label.as_deref().unwrap_or("operation")
    }

    /// Run the operation, superseding any execution still in flight.
    ///
    /// Returns `Err(Error::Aborted)` when this execution is superseded or
    /// cancelled; state is then left to the newer execution.
    pub async fn execute(&self) -> Result<T> {
        let (generation, registration) = self.supersede();

        if self.options.network_retry && !self.network.is_online() {
            return self.fail_offline(generation);
        }

        if !self.begin(generation) {
            return Err(Error::Aborted);
        }
        let _in_flight = InFlight {
            operation: self,
            generation,
        };

        match Abortable::new(self.run_attempts(generation), registration).await {
            Ok(result) => result,
            Err(_) => {
                debug!(
                    subsystem = "operation",
                    op = self.label(),
                    generation,
                    "Execution superseded"
                );
                Err(Error::Aborted)
            }
        }
    }

    /// Re-run with the same configuration.
    pub async fn retry(&self) -> Result<T> {
        self.execute().await
    }

    /// Abort any in-flight execution and clear `loading`.
    pub fn cancel(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        if let Some(handle) = inner.abort.take() {
            handle.abort();
        }
        inner.state.cancel();
        debug!(subsystem = "operation", op = self.label(), "Operation cancelled");
    }

    /// Cancel and return to the initial state.
    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        if let Some(handle) = inner.abort.take() {
            handle.abort();
        }
        inner.state = AsyncOperationState::default();
    }

    /// Snapshot of the observable state.
    pub fn state(&self) -> AsyncOperationState<T> {
        self.lock().state.clone()
    }

    pub fn phase(&self) -> OperationPhase {
        self.lock().state.phase
    }

    pub fn is_loading(&self) -> bool {
        self.lock().state.loading
    }

    pub fn data(&self) -> Option<T> {
        self.lock().state.data.clone()
    }

    pub fn error(&self) -> Option<Error> {
        self.lock().state.error.clone()
    }

    pub fn options(&self) -> &OperationOptions<T> {
        &self.options
    }

    fn supersede(&self) -> (u64, AbortRegistration) {
        let (handle, registration) = AbortHandle::new_pair();
        let mut inner = self.lock();
        if let Some(previous) = inner.abort.replace(handle) {
            previous.abort();
        }
        inner.generation += 1;
        (inner.generation, registration)
    }

    fn begin(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.state.begin(self.options.optimistic.clone());
        true
    }

    fn fail_offline(&self, generation: u64) -> Result<T> {
        let err = Error::no_connection();
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return Err(Error::Aborted);
            }
            inner.abort = None;
            inner.state.execution_count += 1;
            inner.state.fail(err.clone(), false);
        }

        warn!(subsystem = "operation", op = self.label(), "Operation attempted while offline");
        if self.options.show_error_notification {
            self.bus.notify(Notification::network_lost());
        }
        self.report(&err);
        if let Some(on_error) = &self.options.on_error {
            on_error(&err);
        }
        Err(err)
    }

    async fn run_attempts(&self, generation: u64) -> Result<T> {
        let started = Instant::now();
        let total_attempts = self.options.retry_count + 1;
        let mut attempt = 0u32;

        loop {
            let outcome = match self.options.timeout {
                Some(limit) => tokio::time::timeout(limit, (self.operation)())
                    .await
                    .unwrap_or(Err(Error::Timeout(limit))),
                None => (self.operation)().await,
            };

            let err = match outcome {
                Ok(value) => return self.commit_success(generation, value, started),
                Err(err) if err.is_abort() => return self.commit_abort(generation),
                Err(err) => err,
            };

            let can_retry = attempt < self.options.retry_count && self.network.is_online();
            if !can_retry {
                return self.commit_failure(generation, err, started);
            }

            let delay = self.options.backoff.delay_for(attempt);
            attempt += 1;
            warn!(
                subsystem = "operation",
                op = self.label(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Attempt failed; retrying"
            );
            if let Some(on_retry) = &self.options.on_retry {
                on_retry(attempt);
            }
            self.bus.emit(CoordinatorEvent::OperationRetryScheduled {
                label: self.options.label.clone(),
                attempt,
                delay_ms: delay.as_millis() as u64,
            });
            self.bus.notify(
                Notification::info(format!(
                    "Retrying in {}s... ({}/{})",
                    delay.as_secs_f64(),
                    attempt,
                    total_attempts
                ))
                .with_duration(delay),
            );

            tokio::time::sleep(delay).await;
            if !self.record_retry(generation) {
                return Err(Error::Aborted);
            }
        }
    }

    fn record_retry(&self, generation: u64) -> bool {
        let mut inner = self.lock();
        if inner.generation != generation {
            return false;
        }
        inner.state.record_attempt();
        true
    }

    fn commit_success(&self, generation: u64, value: T, started: Instant) -> Result<T> {
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return Err(Error::Aborted);
            }
            inner.abort = None;
            inner.state.succeed(value.clone());
        }

        info!(
            subsystem = "operation",
            op = self.label(),
            duration_ms = started.elapsed().as_millis() as u64,
            success = true,
            "Operation succeeded"
        );
        self.bus.emit(CoordinatorEvent::OperationSucceeded {
            label: self.options.label.clone(),
        });
        if self.options.show_success_notification {
            self.bus
                .notify(Notification::success(self.options.success_message.render(&value)));
        }
        if let Some(on_success) = &self.options.on_success {
            on_success(&value);
        }
        Ok(value)
    }

    fn commit_abort(&self, generation: u64) -> Result<T> {
        let mut inner = self.lock();
        if inner.generation == generation {
            inner.abort = None;
            inner.state.cancel();
        }
        Err(Error::Aborted)
    }

    fn commit_failure(&self, generation: u64, err: Error, started: Instant) -> Result<T> {
        {
            let mut inner = self.lock();
            if inner.generation != generation {
                return Err(Error::Aborted);
            }
            inner.abort = None;
            inner
                .state
                .fail(err.clone(), self.options.optimistic.is_some());
        }

        error!(
            subsystem = "operation",
            op = self.label(),
            duration_ms = started.elapsed().as_millis() as u64,
            error_kind = err.kind(),
            error = %err,
            "Operation failed"
        );
        self.bus.emit(CoordinatorEvent::OperationFailed {
            label: self.options.label.clone(),
            kind: err.kind().to_string(),
            message: err.to_string(),
        });
        if self.options.show_error_notification {
            let message = match &self.options.error_message {
                Some(message) => message.render(&err),
                None => err.to_string(),
            };
            self.bus.notify(Notification::error(message));
        }
        self.report(&err);
        if let Some(on_error) = &self.options.on_error {
            on_error(&err);
        }
        Err(err)
    }

    fn report(&self, err: &Error) {
        if let Some(errors) = &self.errors {
            errors.report_error(err.clone(), self.options.label.as_deref());
        }
    }
}

/// Settles the state of an execution whose future is dropped before it
/// commits. A superseded or already committed execution is left alone.
struct InFlight<'a, T> {
    operation: &'a AsyncOperation<T>,
    generation: u64,
}

impl<T> Drop for InFlight<'_, T> {
    fn drop(&mut self) {
        let mut inner = self
            .operation
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if inner.generation == self.generation && inner.state.phase == OperationPhase::Running {
            inner.abort = None;
            inner.state.cancel();
            debug!(
                subsystem = "operation",
                generation = self.generation,
                "Execution dropped before completion"
            );
        }
    }
}

impl<T> Drop for AsyncOperation<T> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = inner.abort.take() {
            handle.abort();
        }
    }
}

/// Builder for [`AsyncOperation`], usually obtained from
/// `Coordinator::operation`.
pub struct OperationBuilder<T> {
    operation: OperationFn<T>,
    options: OperationOptions<T>,
    network: NetworkMonitor,
    errors: Option<ErrorRegistry>,
    bus: Arc<EventBus>,
}

impl<T> OperationBuilder<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(operation: OperationFn<T>, network: NetworkMonitor, bus: Arc<EventBus>) -> Self {
        Self {
            operation,
            options: OperationOptions::default(),
            network,
            errors: None,
            bus,
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.options.label = Some(label.into());
        self
    }

    pub fn retries(mut self, count: u32) -> Self {
        self.options.retry_count = count;
        self
    }

    /// Base delay for the doubling backoff between local retries.
    pub fn retry_delay(mut self, base: Duration) -> Self {
        self.options.backoff = BackoffPolicy::exponential(base);
        self
    }

    pub fn backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.options.backoff = backoff;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.options.timeout = Some(timeout);
        self
    }

    pub fn no_timeout(mut self) -> Self {
        self.options.timeout = None;
        self
    }

    pub fn network_retry(mut self, enabled: bool) -> Self {
        self.options.network_retry = enabled;
        self
    }

    pub fn optimistic(mut self, value: T) -> Self {
        self.options.optimistic = Some(value);
        self
    }

    pub fn notify_success(mut self, show: bool) -> Self {
        self.options.show_success_notification = show;
        self
    }

    pub fn notify_errors(mut self, show: bool) -> Self {
        self.options.show_error_notification = show;
        self
    }

    /// Fixed success message; also turns success notifications on.
    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.options.success_message = Message::Static(message.into());
        self.options.show_success_notification = true;
        self
    }

    /// Success message derived from the result; also turns success
    /// notifications on.
    pub fn success_message_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) -> String + Send + Sync + 'static,
    {
        self.options.success_message = Message::Dynamic(Arc::new(f));
        self.options.show_success_notification = true;
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.options.error_message = Some(Message::Static(message.into()));
        self
    }

    pub fn error_message_with<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) -> String + Send + Sync + 'static,
    {
        self.options.error_message = Some(Message::Dynamic(Arc::new(f)));
        self
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.options.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&Error) + Send + Sync + 'static,
    {
        self.options.on_error = Some(Arc::new(f));
        self
    }

    /// Called with the 1-based retry number before each retry.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        self.options.on_retry = Some(Arc::new(f));
        self
    }

    /// Report terminal failures to the registry, using the label as context.
    pub fn report_to(mut self, errors: ErrorRegistry) -> Self {
        self.errors = Some(errors);
        self
    }

    pub fn without_reporting(mut self) -> Self {
        self.errors = None;
        self
    }

    pub fn build(self) -> AsyncOperation<T> {
        AsyncOperation::new(
            self.operation,
            self.options,
            self.network,
            self.errors,
            self.bus,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use weave_core::ConnectionHints;

    fn monitor(online: bool) -> (NetworkMonitor, Arc<EventBus>) {
        let bus = Arc::new(EventBus::default());
        let hints = if online {
            ConnectionHints::online()
        } else {
            ConnectionHints::offline()
        };
        (NetworkMonitor::new(hints, bus.clone()), bus)
    }

    fn counting<T: Clone + Send + Sync + 'static>(
        calls: Arc<AtomicU32>,
        f: impl Fn(u32) -> Result<T> + Send + Sync + 'static,
    ) -> OperationFn<T> {
        let f = Arc::new(f);
        operation_fn(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            let f = f.clone();
            async move { f(n) }
        })
    }

    #[tokio::test]
    async fn test_success_updates_state() {
        let (network, bus) = monitor(true);
        let op = OperationBuilder::new(operation_fn(|| async { Ok(42) }), network, bus).build();

        assert_eq!(op.execute().await.unwrap(), 42);
        let state = op.state();
        assert_eq!(state.data, Some(42));
        assert!(!state.loading);
        assert!(state.error.is_none());
        assert_eq!(state.execution_count, 1);
        assert_eq!(state.phase, OperationPhase::Succeeded);
        assert!(state.last_executed_at.is_some());
    }

    #[tokio::test]
    async fn test_offline_makes_no_attempt() {
        let (network, bus) = monitor(false);
        let calls = Arc::new(AtomicU32::new(0));
        let op = OperationBuilder::new(counting(calls.clone(), |_| Ok(1)), network, bus)
            .retries(3)
            .build();

        let err = op.execute().await.unwrap_err();
        assert_eq!(err, Error::no_connection());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(op.phase(), OperationPhase::Failed);
        assert!(!op.is_loading());
    }

    #[tokio::test]
    async fn test_offline_ignored_without_network_retry() {
        let (network, bus) = monitor(false);
        let op = OperationBuilder::new(operation_fn(|| async { Ok("local") }), network, bus)
            .network_retry(false)
            .build();
        assert_eq!(op.execute().await.unwrap(), "local");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_with_backoff_then_succeeds() {
        let (network, bus) = monitor(true);
        let calls = Arc::new(AtomicU32::new(0));
        let retries = Arc::new(AtomicU32::new(0));
        let r = retries.clone();
        let op = OperationBuilder::new(
            counting(calls.clone(), |n| {
                if n < 3 {
                    Err(Error::operation("flaky"))
                } else {
                    Ok(n)
                }
            }),
            network,
            bus,
        )
        .retries(2)
        .on_retry(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        })
        .build();

        let started = tokio::time::Instant::now();
        assert_eq!(op.execute().await.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retries.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() >= Duration::from_millis(3000));
        assert_eq!(op.state().execution_count, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_restamps_last_executed() {
        let (network, bus) = monitor(true);
        let calls = Arc::new(AtomicU32::new(0));
        let op = OperationBuilder::new(
            counting(calls.clone(), |n| {
                if n < 2 {
                    Err(Error::operation("flaky"))
                } else {
                    Ok(n)
                }
            }),
            network,
            bus,
        )
        .retries(1)
        .build();

        op.execute().await.unwrap();
        let first_run = op.state();
        assert_eq!(first_run.execution_count, 2);

        op.execute().await.unwrap();
        let second_run = op.state();
        assert_eq!(second_run.execution_count, 3);
        assert!(second_run.last_executed_at >= first_run.last_executed_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_local_retry_while_offline_even_without_network_retry() {
        let (network, bus) = monitor(true);
        let calls = Arc::new(AtomicU32::new(0));
        let net = network.clone();
        let c = calls.clone();
        let op = OperationBuilder::new(
            operation_fn(move || {
                c.fetch_add(1, Ordering::SeqCst);
                net.set_online(false);
                async { Err::<u32, _>(Error::operation("connection dropped")) }
            }),
            network,
            bus,
        )
        .network_retry(false)
        .retries(3)
        .build();

        let err = op.execute().await.unwrap_err();
        assert_eq!(err, Error::operation("connection dropped"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_non_abort_failure_is_retried() {
        let (network, bus) = monitor(true);
        let calls = Arc::new(AtomicU32::new(0));
        let op = OperationBuilder::new(
            counting(calls.clone(), |_| {
                Err::<u32, _>(Error::InvalidInput("bad column".into()))
            }),
            network,
            bus,
        )
        .retries(2)
        .build();

        op.execute().await.unwrap_err();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(op.phase(), OperationPhase::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_execution_settles_state() {
        let (network, bus) = monitor(true);
        let op = OperationBuilder::new(
            operation_fn(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(1)
            }),
            network,
            bus,
        )
        .build();

        let outcome = tokio::time::timeout(Duration::from_millis(100), op.execute()).await;
        assert!(outcome.is_err());
        assert!(!op.is_loading());
        assert_eq!(op.phase(), OperationPhase::Cancelled);

        assert_eq!(op.execute().await.unwrap(), 1);
        assert_eq!(op.phase(), OperationPhase::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail() {
        let (network, bus) = monitor(true);
        let calls = Arc::new(AtomicU32::new(0));
        let op = OperationBuilder::new(
            counting(calls.clone(), |_| Err::<u32, _>(Error::operation("down"))),
            network,
            bus,
        )
        .retries(1)
        .error_message("Could not load")
        .build();

        let err = op.execute().await.unwrap_err();
        assert_eq!(err, Error::operation("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(op.error(), Some(Error::operation("down")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried_then_reported() {
        let (network, bus) = monitor(true);
        let op = OperationBuilder::new(
            operation_fn(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            }),
            network,
            bus,
        )
        .timeout(Duration::from_secs(1))
        .retries(1)
        .build();

        let err = op.execute().await.unwrap_err();
        assert_eq!(err, Error::Timeout(Duration::from_secs(1)));
        assert_eq!(err.to_string(), "Operation timed out after 1 seconds");
    }

    #[tokio::test]
    async fn test_optimistic_value_rolls_back_to_none() {
        let (network, bus) = monitor(true);
        let fail = Arc::new(AtomicU32::new(0));
        let f = fail.clone();
        let op = OperationBuilder::new(
            operation_fn(move || {
                let should_fail = f.load(Ordering::SeqCst) > 0;
                async move {
                    if should_fail {
                        Err(Error::operation("rejected"))
                    } else {
                        Ok(1)
                    }
                }
            }),
            network,
            bus,
        )
        .optimistic(99)
        .build();

        op.execute().await.unwrap();
        assert_eq!(op.data(), Some(1));

        fail.store(1, Ordering::SeqCst);
        op.execute().await.unwrap_err();
        assert_eq!(op.data(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_execute_supersedes() {
        let (network, bus) = monitor(true);
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let op = OperationBuilder::new(
            operation_fn(move || {
                let n = c.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok(n)
                }
            }),
            network,
            bus,
        )
        .build();

        let (first, second) = tokio::join!(op.execute(), op.execute());
        assert_eq!(first.unwrap_err(), Error::Aborted);
        assert_eq!(second.unwrap(), 2);

        let state = op.state();
        assert_eq!(state.data, Some(2));
        assert_eq!(state.phase, OperationPhase::Succeeded);
        assert_eq!(state.execution_count, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_clears_loading_and_aborts() {
        let (network, bus) = monitor(true);
        let op = Arc::new(
            OperationBuilder::new(
                operation_fn(|| async {
                    tokio::time::sleep(Duration::from_secs(10)).await;
                    Ok(1)
                }),
                network,
                bus,
            )
            .build(),
        );

        let runner = op.clone();
        let task = tokio::spawn(async move { runner.execute().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(op.is_loading());

        op.cancel();
        assert!(!op.is_loading());
        assert_eq!(op.phase(), OperationPhase::Cancelled);
        assert_eq!(task.await.unwrap().unwrap_err(), Error::Aborted);
        assert_eq!(op.data(), None);
    }

    #[tokio::test]
    async fn test_operation_abort_error_is_silent() {
        let (network, bus) = monitor(true);
        let mut rx = bus.subscribe();
        let op = OperationBuilder::new(
            operation_fn(|| async { Err::<(), _>(Error::Aborted) }),
            network,
            bus,
        )
        .build();

        assert_eq!(op.execute().await.unwrap_err(), Error::Aborted);
        assert!(op.error().is_none());
        while let Ok(env) = rx.try_recv() {
            assert_ne!(env.event_type, "operation.failed");
        }
    }

    #[tokio::test]
    async fn test_failure_is_reported_with_label() {
        let (network, bus) = monitor(true);
        let errors = ErrorRegistry::new(
            weave_core::ErrorRegistryConfig::default().with_auto_resolve(Duration::ZERO),
            bus.clone(),
        );
        let op = OperationBuilder::new(
            operation_fn(|| async { Err::<(), _>(Error::operation("bad")) }),
            network,
            bus,
        )
        .label("save-board")
        .report_to(errors.clone())
        .build();

        op.execute().await.unwrap_err();
        let records = errors.errors();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].context.as_deref(), Some("save-board"));
    }

    #[tokio::test]
    async fn test_reset_returns_to_idle() {
        let (network, bus) = monitor(true);
        let op = OperationBuilder::new(operation_fn(|| async { Ok(5) }), network, bus).build();
        op.execute().await.unwrap();
        op.reset();
        let state = op.state();
        assert_eq!(state.phase, OperationPhase::Idle);
        assert_eq!(state.data, None);
        assert_eq!(state.execution_count, 0);
    }

    #[test]
    fn test_message_render() {
        let fixed: Message<u32> = Message::Static("done".into());
        assert_eq!(fixed.render(&1), "done");
        let dynamic: Message<u32> = Message::Dynamic(Arc::new(|n| format!("loaded {n}")));
        assert_eq!(dynamic.render(&3), "loaded 3");
        assert_eq!(format!("{dynamic:?}"), "Dynamic(..)");
    }
}
