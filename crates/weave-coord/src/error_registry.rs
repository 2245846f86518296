//! Central error registry.
//!
//! Holds the most recent errors newest-first in a bounded buffer, notifies
//! on every report, resolves records automatically after a delay, and runs
//! user-initiated retries against a recorded error.

use std::any::Any;
use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock, Weak};

use futures::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use weave_core::defaults;
use weave_core::{
    CoordinatorEvent, Error, ErrorRecord, ErrorRegistryConfig, EventBus, Notification, Result,
};

/// Result of [`ErrorRegistry::retry_error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// The retry succeeded and the record is now resolved.
    Succeeded,
    /// The retry failed; the failure was reported as a new record.
    Failed { new_error_id: Uuid },
    /// No record with that id exists (evicted or never reported).
    NotFound,
}

struct RegistryInner {
    records: RwLock<VecDeque<ErrorRecord>>,
    config: ErrorRegistryConfig,
    bus: Arc<EventBus>,
}

/// Shared handle to the error registry. Cheap to clone.
#[derive(Clone)]
pub struct ErrorRegistry {
    inner: Arc<RegistryInner>,
}

impl ErrorRegistry {
    pub fn new(config: ErrorRegistryConfig, bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                records: RwLock::new(VecDeque::with_capacity(config.max_errors)),
                config,
                bus,
            }),
        }
    }

    /// Record an error and notify. Returns the new record id.
    ///
    /// The registry keeps at most `max_errors` records; the oldest are
    /// evicted first.
    pub fn report_error(&self, err: Error, context: Option<&str>) -> Uuid {
        let record = ErrorRecord::new(err.clone(), context.map(String::from));
        let id = record.id;

        if let Ok(mut records) = self.inner.records.write() {
            records.push_front(record);
            records.truncate(self.inner.config.max_errors);
        }

        error!(
            subsystem = "errors",
            error_id = %id,
            error_kind = err.kind(),
            context = context.unwrap_or(defaults::UNKNOWN_ERROR_CONTEXT),
            error = %err,
            "Error reported"
        );

        self.inner.bus.emit(CoordinatorEvent::ErrorReported {
            error_id: id,
            kind: err.kind().to_string(),
            message: err.to_string(),
            context: context.map(String::from),
        });
        self.inner.bus.notify(Notification::error(err.to_string()));

        self.schedule_auto_resolve(id);
        id
    }

    fn schedule_auto_resolve(&self, id: Uuid) {
        let after = self.inner.config.auto_resolve_after;
        if after.is_zero() {
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            debug!(subsystem = "errors", error_id = %id, "No runtime; auto-resolve skipped");
            return;
        };
        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                ErrorRegistry { inner }.resolve_error(id);
            }
        });
    }

    /// Mark a record resolved. Returns `true` when the record existed and was
    /// unresolved; unknown ids are ignored.
    pub fn resolve_error(&self, id: Uuid) -> bool {
        let changed = match self.inner.records.write() {
            Ok(mut records) => match records.iter_mut().find(|r| r.id == id) {
                Some(record) if !record.resolved => {
                    record.resolved = true;
                    true
                }
                _ => false,
            },
            Err(_) => false,
        };

        if changed {
            debug!(subsystem = "errors", error_id = %id, "Error resolved");
            self.inner
                .bus
                .emit(CoordinatorEvent::ErrorResolved { error_id: id });
        }
        changed
    }

    /// Re-run the work behind a recorded error.
    ///
    /// Increments the record's retry count, then awaits `retry_fn`. On
    /// success the record is resolved; on failure (including a panic inside
    /// `retry_fn`) the failure is reported as a new record with context
    /// `"Retry failed for: <original context>"`. Never propagates the
    /// failure to the caller.
    pub async fn retry_error<F, Fut>(&self, id: Uuid, retry_fn: F) -> RetryOutcome
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let Some(context) = self.begin_retry(id) else {
            warn!(subsystem = "errors", error_id = %id, "Retry requested for unknown error");
            return RetryOutcome::NotFound;
        };

        let outcome = AssertUnwindSafe(async move { retry_fn().await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(Error::Internal(panic_message(panic))));

        match outcome {
            Ok(()) => {
                self.resolve_error(id);
                info!(subsystem = "errors", error_id = %id, success = true, "Error retry succeeded");
                self.inner
                    .bus
                    .notify(Notification::success("Operation completed successfully after retry"));
                self.inner.bus.emit(CoordinatorEvent::ErrorRetried {
                    error_id: id,
                    success: true,
                    new_error_id: None,
                });
                RetryOutcome::Succeeded
            }
            Err(err) => {
                let retry_context = format!(
                    "Retry failed for: {}",
                    context.as_deref().unwrap_or(defaults::UNKNOWN_ERROR_CONTEXT)
                );
                let new_error_id = self.report_error(err.clone(), Some(&retry_context));
                self.inner
                    .bus
                    .notify(Notification::error(format!("Retry failed: {err}")));
                self.inner.bus.emit(CoordinatorEvent::ErrorRetried {
                    error_id: id,
                    success: false,
                    new_error_id: Some(new_error_id),
                });
                RetryOutcome::Failed { new_error_id }
            }
        }
    }

    /// Bump the retry count; returns the record's context, or `None` when
    /// the record is gone.
    fn begin_retry(&self, id: Uuid) -> Option<Option<String>> {
        let mut records = self.inner.records.write().ok()?;
        let record = records.iter_mut().find(|r| r.id == id)?;
        record.retry_count += 1;
        debug!(
            subsystem = "errors",
            error_id = %id,
            attempt = record.retry_count,
            "Retrying recorded error"
        );
        Some(record.context.clone())
    }

    /// Drop every record.
    pub fn clear_errors(&self) {
        if let Ok(mut records) = self.inner.records.write() {
            let count = records.len();
            records.clear();
            debug!(subsystem = "errors", entry_count = count, "Errors cleared");
        }
    }

    /// Snapshot of all records, newest first.
    pub fn errors(&self) -> Vec<ErrorRecord> {
        self.inner
            .records
            .read()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn unresolved_errors(&self) -> Vec<ErrorRecord> {
        self.inner
            .records
            .read()
            .map(|records| records.iter().filter(|r| !r.resolved).cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_unresolved_errors(&self) -> bool {
        self.inner
            .records
            .read()
            .map(|records| records.iter().any(|r| !r.resolved))
            .unwrap_or(false)
    }

    pub fn get(&self, id: Uuid) -> Option<ErrorRecord> {
        self.inner
            .records
            .read()
            .ok()?
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Await `fut`, reporting any failure under `context` and returning
    /// `None` in its place. Aborts are swallowed without a report.
    pub async fn guard<T, Fut>(&self, context: &str, fut: Fut) -> Option<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match fut.await {
            Ok(value) => Some(value),
            Err(err) if err.is_abort() => None,
            Err(err) => {
                self.report_error(err, Some(context));
                None
            }
        }
    }

    /// Like [`guard`](Self::guard) but substitutes `fallback` on failure.
    pub async fn guard_or<T, Fut>(&self, context: &str, fut: Fut, fallback: T) -> T
    where
        Fut: Future<Output = Result<T>>,
    {
        self.guard(context, fut).await.unwrap_or(fallback)
    }
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "retry callback panicked".to_string()
    }
}
