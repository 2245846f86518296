//! Loading registry and global loader.
//!
//! Tracks named in-flight operations in registration order. The global
//! (blocking) loader appears only after an entry has stayed registered for
//! the configured threshold, so short operations never flash it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use weave_core::defaults;
use weave_core::{
    CoordinatorEvent, EventBus, GlobalIndicator, LoadingConfig, LoadingEntry, LoadingUpdate,
    Result,
};

#[derive(Default)]
struct LoadingState {
    entries: Vec<LoadingEntry>,
    global_visible: bool,
}

impl LoadingState {
    fn indicator(&self) -> Option<GlobalIndicator> {
        let primary = self.entries.first()?;
        Some(GlobalIndicator {
            primary_id: primary.id.clone(),
            message: primary.message.clone(),
            progress: primary.progress,
            cancelable: primary.cancelable,
            additional: self.entries.len() - 1,
        })
    }
}

struct LoadingInner {
    state: Mutex<LoadingState>,
    config: LoadingConfig,
    bus: Arc<EventBus>,
}

impl LoadingInner {
    fn lock(&self) -> MutexGuard<'_, LoadingState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One unit of work for [`LoadingRegistry::run_batch`].
pub struct BatchItem<T> {
    pub id: String,
    pub message: Option<String>,
    pub operation: BoxFuture<'static, Result<T>>,
}

impl<T> BatchItem<T> {
    pub fn new<F>(id: impl Into<String>, operation: F) -> Self
    where
        F: Future<Output = Result<T>> + Send + 'static,
    {
        Self {
            id: id.into(),
            message: None,
            operation: Box::pin(operation),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Shared handle to the loading registry. Cheap to clone.
#[derive(Clone)]
pub struct LoadingRegistry {
    inner: Arc<LoadingInner>,
}

impl LoadingRegistry {
    pub fn new(config: LoadingConfig, bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(LoadingInner {
                state: Mutex::new(LoadingState::default()),
                config,
                bus,
            }),
        }
    }

    /// Register (or replace) an entry.
    ///
    /// An existing entry with the same id is replaced in place and keeps its
    /// position. When the global loader is enabled, a threshold timer starts;
    /// if the entry is still registered when it fires, the global loader
    /// becomes visible.
    pub fn start_loading(&self, id: &str, message: Option<&str>, options: LoadingUpdate) {
        let mut entry = LoadingEntry::new(id, message.map(String::from));
        entry.apply(options);

        let count = {
            let mut state = self.inner.lock();
            match state.entries.iter_mut().find(|e| e.id == id) {
                Some(existing) => *existing = entry,
                None => state.entries.push(entry),
            }
            state.entries.len()
        };
        debug!(subsystem = "loading", loading_id = id, entry_count = count, "Loading started");

        if self.inner.config.show_global_loader {
            self.schedule_global_check(id);
        }
    }

    fn schedule_global_check(&self, id: &str) {
        let Ok(handle) = Handle::try_current() else {
            debug!(subsystem = "loading", loading_id = id, "No runtime; global loader check skipped");
            return;
        };
        let threshold = self.inner.config.global_loader_threshold;
        let weak: Weak<LoadingInner> = Arc::downgrade(&self.inner);
        let id = id.to_string();
        handle.spawn(async move {
            tokio::time::sleep(threshold).await;
            if let Some(inner) = weak.upgrade() {
                LoadingRegistry { inner }.show_global_if_present(&id);
            }
        });
    }

    fn show_global_if_present(&self, id: &str) {
        let shown = {
            let mut state = self.inner.lock();
            if state.global_visible || !state.entries.iter().any(|e| e.id == id) {
                None
            } else {
                state.global_visible = true;
                state.indicator()
            }
        };

        if let Some(indicator) = shown {
            debug!(
                subsystem = "loading",
                loading_id = %indicator.primary_id,
                entry_count = indicator.additional + 1,
                "Global loader shown"
            );
            self.inner.bus.emit(CoordinatorEvent::GlobalLoaderShown {
                primary_id: indicator.primary_id,
                message: indicator.message,
                additional: indicator.additional,
            });
        }
    }

    /// Merge a partial update into an existing entry. Returns `false` (and
    /// does nothing) when no entry has that id.
    pub fn update_loading(&self, id: &str, update: LoadingUpdate) -> bool {
        let mut state = self.inner.lock();
        match state.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.apply(update);
                true
            }
            None => false,
        }
    }

    /// Remove an entry. When the registry becomes empty the global loader is
    /// hidden.
    pub fn stop_loading(&self, id: &str) {
        let hidden = {
            let mut state = self.inner.lock();
            state.entries.retain(|e| e.id != id);
            if state.entries.is_empty() {
                std::mem::replace(&mut state.global_visible, false)
            } else {
                false
            }
        };
        debug!(subsystem = "loading", loading_id = id, "Loading stopped");
        if hidden {
            self.emit_hidden();
        }
    }

    /// Remove every entry and hide the global loader.
    pub fn clear_all_loading(&self) {
        let was_visible = {
            let mut state = self.inner.lock();
            state.entries.clear();
            std::mem::replace(&mut state.global_visible, false)
        };
        if was_visible {
            self.emit_hidden();
        }
    }

    fn emit_hidden(&self) {
        debug!(subsystem = "loading", "Global loader hidden");
        self.inner.bus.emit(CoordinatorEvent::GlobalLoaderHidden);
    }

    /// With an id: whether that entry exists. Without: whether any does.
    pub fn is_loading(&self, id: Option<&str>) -> bool {
        let state = self.inner.lock();
        match id {
            Some(id) => state.entries.iter().any(|e| e.id == id),
            None => !state.entries.is_empty(),
        }
    }

    pub fn get_loading_state(&self, id: &str) -> Option<LoadingEntry> {
        self.inner.lock().entries.iter().find(|e| e.id == id).cloned()
    }

    /// Entries in registration order.
    pub fn entries(&self) -> Vec<LoadingEntry> {
        self.inner.lock().entries.clone()
    }

    pub fn is_global_visible(&self) -> bool {
        self.inner.lock().global_visible
    }

    /// What the global loader displays, if it is visible.
    pub fn global_indicator(&self) -> Option<GlobalIndicator> {
        let state = self.inner.lock();
        if state.global_visible {
            state.indicator()
        } else {
            None
        }
    }

    /// Invoke the entry's cancel callback. Returns `false` when the entry is
    /// missing or not cancelable. The entry stays registered; the owner
    /// stops it.
    pub fn cancel(&self, id: &str) -> bool {
        let callback = {
            let state = self.inner.lock();
            state
                .entries
                .iter()
                .find(|e| e.id == id && e.cancelable)
                .and_then(|e| e.on_cancel.clone())
        };
        match callback {
            Some(callback) => {
                debug!(subsystem = "loading", loading_id = id, "Loading cancel requested");
                callback();
                true
            }
            None => false,
        }
    }

    /// Run `fut` under a loading entry.
    ///
    /// With `show_progress`, a successful run sets progress to 100 and pauses
    /// briefly before the entry is removed. The entry is removed on every
    /// path.
    pub async fn track<T, Fut>(
        &self,
        id: &str,
        message: Option<&str>,
        show_progress: bool,
        fut: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let options = if show_progress {
            LoadingUpdate::progress(0)
        } else {
            LoadingUpdate::default()
        };
        self.start_loading(id, message, options);
        let _entry = EntryGuard::new(self, vec![id.to_string()]);

        let result = fut.await;
        if result.is_ok() && show_progress {
            self.update_loading(id, LoadingUpdate::progress(100));
            tokio::time::sleep(Duration::from_millis(defaults::PROGRESS_COMPLETE_PAUSE_MS)).await;
        }

        result
    }

    /// Register every item up front, then run them one after another.
    ///
    /// Each entry is removed as its item finishes and `on_progress(done,
    /// total)` is called after each success. The first failure removes the
    /// remaining entries and is returned.
    pub async fn run_batch<T, P>(&self, items: Vec<BatchItem<T>>, mut on_progress: P) -> Result<Vec<T>>
    where
        P: FnMut(usize, usize),
    {
        let total = items.len();
        for item in &items {
            self.start_loading(&item.id, item.message.as_deref(), LoadingUpdate::default());
        }
        let mut pending = EntryGuard::new(self, items.iter().map(|item| item.id.clone()).collect());
        let mut results = Vec::with_capacity(total);

        for (index, item) in items.into_iter().enumerate() {
            let outcome = item.operation.await;
            pending.release(&item.id);

            match outcome {
                Ok(value) => {
                    results.push(value);
                    on_progress(index + 1, total);
                }
                Err(err) => {
                    warn!(
                        subsystem = "loading",
                        loading_id = %item.id,
                        error = %err,
                        "Batch item failed; aborting batch"
                    );
                    return Err(err);
                }
            }
        }

        Ok(results)
    }
}

/// Removes the entries it still holds when dropped, including when the
/// owning future is cancelled mid-flight.
struct EntryGuard<'a> {
    registry: &'a LoadingRegistry,
    ids: Vec<String>,
}

impl<'a> EntryGuard<'a> {
    fn new(registry: &'a LoadingRegistry, ids: Vec<String>) -> Self {
        Self { registry, ids }
    }

    /// Stop one entry now and stop tracking it.
    fn release(&mut self, id: &str) {
        self.ids.retain(|held| held != id);
        self.registry.stop_loading(id);
    }
}

impl Drop for EntryGuard<'_> {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.registry.stop_loading(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use weave_core::Error;

    fn registry() -> LoadingRegistry {
        LoadingRegistry::new(LoadingConfig::default(), Arc::new(EventBus::default()))
    }

    #[tokio::test]
    async fn test_same_id_last_write_wins_in_place() {
        let reg = registry();
        reg.start_loading("a", Some("first"), LoadingUpdate::default());
        reg.start_loading("b", None, LoadingUpdate::default());
        reg.start_loading("a", Some("second"), LoadingUpdate::progress(10));

        let entries = reg.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "a");
        assert_eq!(entries[0].message.as_deref(), Some("second"));
        assert_eq!(entries[0].progress, Some(10));

        reg.stop_loading("a");
        assert!(!reg.is_loading(Some("a")));
        assert!(reg.is_loading(None));
    }

    #[tokio::test]
    async fn test_update_missing_entry_is_noop() {
        let reg = registry();
        assert!(!reg.update_loading("ghost", LoadingUpdate::progress(50)));
        assert!(!reg.is_loading(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_operation_never_shows_global() {
        let reg = registry();
        reg.start_loading("quick", None, LoadingUpdate::default());
        tokio::time::sleep(Duration::from_millis(500)).await;
        reg.stop_loading("quick");
        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(!reg.is_global_visible());
        assert!(reg.global_indicator().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_operation_shows_global_with_count() {
        let reg = registry();
        reg.start_loading("first", Some("Syncing"), LoadingUpdate::default());
        reg.start_loading("second", None, LoadingUpdate::default());
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let indicator = reg.global_indicator().unwrap();
        assert_eq!(indicator.primary_id, "first");
        assert_eq!(indicator.message.as_deref(), Some("Syncing"));
        assert_eq!(indicator.additional, 1);

        reg.stop_loading("first");
        assert!(reg.is_global_visible());
        reg.stop_loading("second");
        assert!(!reg.is_global_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_loader_disabled() {
        let reg = LoadingRegistry::new(
            LoadingConfig::default().with_global_loader(false),
            Arc::new(EventBus::default()),
        );
        reg.start_loading("a", None, LoadingUpdate::default());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!reg.is_global_visible());
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_all_hides_global() {
        let reg = registry();
        reg.start_loading("a", None, LoadingUpdate::default());
        tokio::time::sleep(Duration::from_millis(1001)).await;
        assert!(reg.is_global_visible());
        reg.clear_all_loading();
        assert!(!reg.is_global_visible());
        assert!(!reg.is_loading(None));
    }

    #[tokio::test]
    async fn test_cancel_invokes_callback() {
        let reg = registry();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        reg.start_loading(
            "upload",
            None,
            LoadingUpdate::default().cancel_with(move || {
                h.fetch_add(1, Ordering::SeqCst);
            }),
        );
        reg.start_loading("plain", None, LoadingUpdate::default());

        assert!(reg.cancel("upload"));
        assert!(!reg.cancel("plain"));
        assert!(!reg.cancel("ghost"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_removes_entry_on_both_paths() {
        let reg = registry();
        let value = reg
            .track("t", Some("Working"), true, async { Ok::<_, Error>(5) })
            .await
            .unwrap();
        assert_eq!(value, 5);
        assert!(!reg.is_loading(Some("t")));

        let err = reg
            .track("t", None, true, async { Err::<i32, _>(Error::operation("x")) })
            .await
            .unwrap_err();
        assert_eq!(err, Error::operation("x"));
        assert!(!reg.is_loading(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_track_removes_entry() {
        let reg = registry();
        let slow = reg.track("slow", Some("Uploading"), true, async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok::<_, Error>(())
        });
        let outcome = tokio::time::timeout(Duration::from_millis(100), slow).await;
        assert!(outcome.is_err());
        assert!(!reg.is_loading(Some("slow")));
        assert!(!reg.is_loading(None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_batch_removes_remaining_entries() {
        let reg = registry();
        let items = vec![
            BatchItem::new("one", async { Ok::<_, Error>(1) }),
            BatchItem::new("two", async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                Ok(2)
            }),
            BatchItem::new("three", async { Ok(3) }),
        ];
        let batch = reg.run_batch(items, |_, _| {});
        let outcome = tokio::time::timeout(Duration::from_millis(100), batch).await;
        assert!(outcome.is_err());
        assert!(!reg.is_loading(None));
    }

    #[tokio::test]
    async fn test_run_batch_reports_progress_and_stops_on_failure() {
        let reg = registry();
        let mut seen = Vec::new();
        let items = vec![
            BatchItem::new("one", async { Ok::<_, Error>(1) }),
            BatchItem::new("two", async { Ok(2) }).with_message("Second"),
        ];
        let results = reg
            .run_batch(items, |done, total| seen.push((done, total)))
            .await
            .unwrap();
        assert_eq!(results, vec![1, 2]);
        assert_eq!(seen, vec![(1, 2), (2, 2)]);

        let items = vec![
            BatchItem::new("one", async { Ok::<_, Error>(1) }),
            BatchItem::new("two", async { Err(Error::operation("boom")) }),
            BatchItem::new("three", async { Ok(3) }),
        ];
        let err = reg.run_batch(items, |_, _| {}).await.unwrap_err();
        assert_eq!(err.to_string(), "boom");
        assert!(!reg.is_loading(None));
    }
}
