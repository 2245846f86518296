//! # weave-coord
//!
//! Runtime coordination of async work, errors and loading state for
//! TimeWeave.
//!
//! A [`Coordinator`] owns one of each shared component:
//!
//! - [`NetworkMonitor`]: connectivity status and transition notifications
//! - [`ErrorRegistry`]: bounded, newest-first error records with retry
//! - [`LoadingRegistry`]: named loading entries and the delayed global loader
//! - [`SessionContext`]: signed-in or demo session
//!
//! Work is wrapped in an [`AsyncOperation`] (timeout, backoff retries,
//! offline short-circuit, optimistic data, single-flight supersession).
//! [`NetworkRetryController`] re-runs work after an outage ends and
//! [`OfflineQueue`] holds work collected while offline.
//!
//! Everything is announced on the shared [`weave_core::EventBus`];
//! rendering notifications is left to subscribers.

pub mod coordinator;
pub mod debounce;
pub mod error_registry;
pub mod loading;
pub mod network;
pub mod offline_queue;
pub mod operation;
pub mod retry_controller;
pub mod session;
pub mod telemetry;
pub mod tracker;

pub use coordinator::Coordinator;
pub use debounce::DebouncedOperation;
pub use error_registry::{ErrorRegistry, RetryOutcome};
pub use loading::{BatchItem, LoadingRegistry};
pub use network::{NetworkMonitor, NetworkTransition};
pub use offline_queue::{OfflineQueue, QueueProcessor};
pub use operation::{
    operation_fn, AsyncOperation, Message, OperationBuilder, OperationFn, OperationOptions,
};
pub use retry_controller::{NetworkRetryController, RetryFn};
pub use session::{DemoUser, SessionContext, SessionEvent, SessionUser};
pub use telemetry::init_tracing;
pub use tracker::{KeyedOptions, OperationTracker};

pub use weave_core::{Error, Result};
