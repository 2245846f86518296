//! Keyed operation tracking.
//!
//! [`OperationTracker`] keeps one [`AsyncOperationState`] per string key so
//! a screen can follow many independent operations (one per row, say)
//! without building an [`AsyncOperation`](crate::AsyncOperation) for each.
//! Each key is single-flight: a newer execution for the same key makes the
//! older one stale, and stale completions never write state.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use weave_core::{AsyncOperationState, Error, EventBus, Notification, OperationPhase, Result};

use crate::operation::Message;

/// Per-execution options for [`OperationTracker::execute`].
pub struct KeyedOptions<T> {
    pub optimistic: Option<T>,
    pub show_success_notification: bool,
    pub success_message: Option<Message<T>>,
    pub show_error_notification: bool,
    pub error_message: Option<Message<Error>>,
}

impl<T> Default for KeyedOptions<T> {
    fn default() -> Self {
        Self {
            optimistic: None,
            show_success_notification: false,
            success_message: None,
            show_error_notification: true,
            error_message: None,
        }
    }
}

impl<T> KeyedOptions<T> {
    pub fn optimistic(mut self, value: T) -> Self {
        self.optimistic = Some(value);
        self
    }

    pub fn success_message(mut self, message: impl Into<String>) -> Self {
        self.success_message = Some(Message::Static(message.into()));
        self.show_success_notification = true;
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(Message::Static(message.into()));
        self
    }

    pub fn quiet(mut self) -> Self {
        self.show_success_notification = false;
        self.show_error_notification = false;
        self
    }
}

struct Slot<T> {
    state: AsyncOperationState<T>,
    generation: u64,
}

/// Map of operation key to operation state.
pub struct OperationTracker<T> {
    slots: Mutex<HashMap<String, Slot<T>>>,
    bus: Arc<EventBus>,
}

impl<T: Clone> OperationTracker<T> {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            bus,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot<T>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `fut` as the current execution for `key`.
    ///
    /// Returns `Err(Error::Aborted)` when a newer execution for the same key
    /// started, or the key was cancelled or cleared, before `fut` finished.
    pub async fn execute<Fut>(&self, key: &str, fut: Fut, options: KeyedOptions<T>) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        let rollback = options.optimistic.is_some();
        let generation = self.begin(key, options.optimistic.clone());

        let outcome = fut.await;

        match outcome {
            Ok(value) => {
                if !self.commit(key, generation, |state| state.succeed(value.clone())) {
                    return Err(Error::Aborted);
                }
                debug!(subsystem = "operation", operation_key = key, success = true, "Keyed operation succeeded");
                if options.show_success_notification {
                    let message = options
                        .success_message
                        .as_ref()
                        .map(|m| m.render(&value))
                        .unwrap_or_else(|| weave_core::defaults::OPERATION_SUCCESS_MESSAGE.to_string());
                    self.bus.notify(Notification::success(message));
                }
                Ok(value)
            }
            Err(err) if err.is_abort() => {
                self.commit(key, generation, |state| state.cancel());
                Err(Error::Aborted)
            }
            Err(err) => {
                if !self.commit(key, generation, |state| state.fail(err.clone(), rollback)) {
                    return Err(Error::Aborted);
                }
                warn!(subsystem = "operation", operation_key = key, error = %err, "Keyed operation failed");
                if options.show_error_notification {
                    let message = match &options.error_message {
                        Some(message) => message.render(&err),
                        None => err.to_string(),
                    };
                    self.bus.notify(Notification::error(message));
                }
                Err(err)
            }
        }
    }

    fn begin(&self, key: &str, optimistic: Option<T>) -> u64 {
        let mut slots = self.lock();
        let slot = slots.entry(key.to_string()).or_insert_with(|| Slot {
            state: AsyncOperationState::default(),
            generation: 0,
        });
        slot.generation += 1;
        slot.state.begin(optimistic);
        slot.generation
    }

    fn commit(&self, key: &str, generation: u64, apply: impl FnOnce(&mut AsyncOperationState<T>)) -> bool {
        let mut slots = self.lock();
        match slots.get_mut(key) {
            Some(slot) if slot.generation == generation => {
                apply(&mut slot.state);
                true
            }
            _ => false,
        }
    }

    /// State for `key`; the initial state when the key was never run.
    pub fn state(&self, key: &str) -> AsyncOperationState<T> {
        self.lock()
            .get(key)
            .map(|slot| slot.state.clone())
            .unwrap_or_default()
    }

    pub fn is_loading(&self, key: &str) -> bool {
        self.lock().get(key).is_some_and(|slot| slot.state.loading)
    }

    pub fn is_any_loading(&self) -> bool {
        self.lock().values().any(|slot| slot.state.loading)
    }

    /// Keys whose latest execution is in the given phase.
    pub fn keys_in(&self, phase: OperationPhase) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .iter()
            .filter(|(_, slot)| slot.state.phase == phase)
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Stop tracking the in-flight execution for `key` and clear its
    /// loading flag. The work itself is not interrupted.
    pub fn cancel(&self, key: &str) {
        if let Some(slot) = self.lock().get_mut(key) {
            slot.generation += 1;
            slot.state.cancel();
        }
    }

    pub fn cancel_all(&self) {
        for slot in self.lock().values_mut() {
            slot.generation += 1;
            slot.state.cancel();
        }
    }

    /// Forget `key` entirely.
    pub fn clear(&self, key: &str) {
        self.lock().remove(key);
    }
}
