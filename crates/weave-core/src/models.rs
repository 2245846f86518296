//! Core data models for the coordination layer.
//!
//! These types are shared between the registries, the operation wrapper and
//! anything that renders their state. All of them are in-memory and live for
//! the session only.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Error;

// =============================================================================
// ERROR REGISTRY
// =============================================================================

/// A reported error with retry bookkeeping.
#[derive(Debug, Clone)]
pub struct ErrorRecord {
    /// Unique id generated at report time (UUIDv7, time-ordered).
    pub id: Uuid,
    pub error: Error,
    pub context: Option<String>,
    pub reported_at: DateTime<Utc>,
    pub resolved: bool,
    pub retry_count: u32,
}

impl ErrorRecord {
    /// Create an unresolved record with a fresh id.
    pub fn new(error: Error, context: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            error,
            context,
            reported_at: Utc::now(),
            resolved: false,
            retry_count: 0,
        }
    }
}

// =============================================================================
// LOADING REGISTRY
// =============================================================================

/// Callback invoked when the user cancels a loading entry.
pub type CancelCallback = Arc<dyn Fn() + Send + Sync>;

/// A named in-flight operation.
///
/// The id is caller-supplied and used as the registry key; two callers using
/// the same id share one entry and the last write wins.
#[derive(Clone)]
pub struct LoadingEntry {
    pub id: String,
    pub message: Option<String>,
    /// Progress percentage, 0 through 100.
    pub progress: Option<u8>,
    pub cancelable: bool,
    pub on_cancel: Option<CancelCallback>,
}

impl LoadingEntry {
    pub fn new(id: impl Into<String>, message: Option<String>) -> Self {
        Self {
            id: id.into(),
            message,
            progress: None,
            cancelable: false,
            on_cancel: None,
        }
    }

    /// Merge a partial update into this entry. Progress is clamped to 100.
    pub fn apply(&mut self, update: LoadingUpdate) {
        if let Some(message) = update.message {
            self.message = Some(message);
        }
        if let Some(progress) = update.progress {
            self.progress = Some(progress.min(100));
        }
        if let Some(cancelable) = update.cancelable {
            self.cancelable = cancelable;
        }
        if let Some(on_cancel) = update.on_cancel {
            self.on_cancel = Some(on_cancel);
        }
    }
}

impl fmt::Debug for LoadingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingEntry")
            .field("id", &self.id)
            .field("message", &self.message)
            .field("progress", &self.progress)
            .field("cancelable", &self.cancelable)
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}

/// Partial update for a loading entry; `None` fields are left untouched.
#[derive(Clone, Default)]
pub struct LoadingUpdate {
    pub message: Option<String>,
    pub progress: Option<u8>,
    pub cancelable: Option<bool>,
    pub on_cancel: Option<CancelCallback>,
}

impl LoadingUpdate {
    pub fn progress(progress: u8) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Mark the entry cancelable with the given callback.
    pub fn cancel_with<F>(mut self, callback: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cancelable = Some(true);
        self.on_cancel = Some(Arc::new(callback));
        self
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl fmt::Debug for LoadingUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingUpdate")
            .field("message", &self.message)
            .field("progress", &self.progress)
            .field("cancelable", &self.cancelable)
            .field("on_cancel", &self.on_cancel.is_some())
            .finish()
    }
}

/// What the global (blocking) loader displays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalIndicator {
    /// Id of the first-registered entry.
    pub primary_id: String,
    pub message: Option<String>,
    pub progress: Option<u8>,
    pub cancelable: bool,
    /// Number of other entries in progress.
    pub additional: usize,
}

impl GlobalIndicator {
    /// "N more operation(s) in progress..." or `None` for a single entry.
    pub fn additional_label(&self) -> Option<String> {
        match self.additional {
            0 => None,
            1 => Some("1 more operation in progress...".to_string()),
            n => Some(format!("{n} more operations in progress...")),
        }
    }
}

// =============================================================================
// ASYNC OPERATIONS
// =============================================================================

/// Lifecycle of a wrapped operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationPhase {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

/// Observable state of an async operation.
#[derive(Debug, Clone)]
pub struct AsyncOperationState<T> {
    pub data: Option<T>,
    pub loading: bool,
    pub error: Option<Error>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub execution_count: u32,
    pub phase: OperationPhase,
}

impl<T> Default for AsyncOperationState<T> {
    fn default() -> Self {
        Self {
            data: None,
            loading: false,
            error: None,
            last_executed_at: None,
            execution_count: 0,
            phase: OperationPhase::Idle,
        }
    }
}

impl<T> AsyncOperationState<T> {
    /// Enter `Running`, seeding data with the optimistic value when given.
    pub fn begin(&mut self, optimistic: Option<T>) {
        self.loading = true;
        self.error = None;
        if optimistic.is_some() {
            self.data = optimistic;
        }
        self.record_attempt();
        self.phase = OperationPhase::Running;
    }

    /// Count one invocation of the wrapped unit and restamp
    /// `last_executed_at`. Retries count as invocations.
    pub fn record_attempt(&mut self) {
        self.last_executed_at = Some(Utc::now());
        self.execution_count += 1;
    }

    pub fn succeed(&mut self, data: T) {
        self.data = Some(data);
        self.loading = false;
        self.error = None;
        self.phase = OperationPhase::Succeeded;
    }

    /// Enter `Failed`. With `rollback`, optimistic data is cleared to `None`
    /// (previous data is not restored).
    pub fn fail(&mut self, error: Error, rollback: bool) {
        if rollback {
            self.data = None;
        }
        self.loading = false;
        self.error = Some(error);
        self.phase = OperationPhase::Failed;
    }

    pub fn cancel(&mut self) {
        self.loading = false;
        if self.phase == OperationPhase::Running {
            self.phase = OperationPhase::Cancelled;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_error_record_new_is_unresolved() {
        let record = ErrorRecord::new(Error::operation("boom"), Some("ctx-A".into()));
        assert!(!record.resolved);
        assert_eq!(record.retry_count, 0);
        assert_eq!(record.id.get_version_num(), 7);
    }

    #[test]
    fn test_error_record_ids_are_unique() {
        let a = ErrorRecord::new(Error::operation("a"), None);
        let b = ErrorRecord::new(Error::operation("b"), None);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_loading_entry_apply_merges() {
        let mut entry = LoadingEntry::new("save", Some("Saving".into()));
        entry.apply(LoadingUpdate::progress(40));
        assert_eq!(entry.progress, Some(40));
        assert_eq!(entry.message.as_deref(), Some("Saving"));

        entry.apply(LoadingUpdate::message("Almost there").with_progress(250));
        assert_eq!(entry.progress, Some(100));
        assert_eq!(entry.message.as_deref(), Some("Almost there"));
    }

    #[test]
    fn test_loading_update_cancel_with() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let mut entry = LoadingEntry::new("upload", None);
        entry.apply(LoadingUpdate::default().cancel_with(move || {
            h.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(entry.cancelable);
        (entry.on_cancel.as_ref().unwrap())();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(format!("{entry:?}").contains("on_cancel: true"));
    }

    #[test]
    fn test_global_indicator_label() {
        let mut indicator = GlobalIndicator {
            primary_id: "a".into(),
            message: None,
            progress: None,
            cancelable: false,
            additional: 0,
        };
        assert_eq!(indicator.additional_label(), None);
        indicator.additional = 1;
        assert_eq!(
            indicator.additional_label().unwrap(),
            "1 more operation in progress..."
        );
        indicator.additional = 3;
        assert_eq!(
            indicator.additional_label().unwrap(),
            "3 more operations in progress..."
        );
    }

    #[test]
    fn test_state_optimistic_rollback_clears_data() {
        let mut state: AsyncOperationState<i32> = AsyncOperationState::default();
        state.succeed(1);
        state.begin(Some(2));
        assert_eq!(state.data, Some(2));
        state.fail(Error::operation("nope"), true);
        assert_eq!(state.data, None);
        assert_eq!(state.phase, OperationPhase::Failed);
    }

    #[test]
    fn test_state_failure_without_optimistic_keeps_data() {
        let mut state: AsyncOperationState<i32> = AsyncOperationState::default();
        state.succeed(7);
        state.begin(None);
        assert_eq!(state.data, Some(7));
        state.fail(Error::operation("nope"), false);
        assert_eq!(state.data, Some(7));
        assert_eq!(state.execution_count, 1);
    }

    #[test]
    fn test_record_attempt_counts_retries() {
        let mut state: AsyncOperationState<i32> = AsyncOperationState::default();
        state.begin(None);
        state.record_attempt();
        state.record_attempt();
        assert_eq!(state.execution_count, 3);
        assert_eq!(state.phase, OperationPhase::Running);
        assert!(state.last_executed_at.is_some());
    }

    #[test]
    fn test_state_cancel_only_marks_running() {
        let mut state: AsyncOperationState<i32> = AsyncOperationState::default();
        state.cancel();
        assert_eq!(state.phase, OperationPhase::Idle);
        state.begin(None);
        state.cancel();
        assert_eq!(state.phase, OperationPhase::Cancelled);
        assert!(!state.loading);
        assert!(state.error.is_none());
    }
}
