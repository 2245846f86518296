//! Coordinator bootstrap.
//!
//! Builds the event bus, network monitor, registries and session once and
//! hands out shared handles. Nothing else in the crate is a global.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use tracing::info;

use weave_core::{BackendConfig, ConnectionHints, CoordinatorConfig, EventBus, Result};

use crate::debounce::DebouncedOperation;
use crate::error_registry::ErrorRegistry;
use crate::loading::LoadingRegistry;
use crate::network::NetworkMonitor;
use crate::offline_queue::OfflineQueue;
use crate::operation::{operation_fn, OperationBuilder};
use crate::retry_controller::NetworkRetryController;
use crate::session::SessionContext;
use crate::tracker::OperationTracker;

/// Owner of every shared coordination component.
pub struct Coordinator {
    config: CoordinatorConfig,
    bus: Arc<EventBus>,
    network: NetworkMonitor,
    errors: ErrorRegistry,
    loading: LoadingRegistry,
    session: Arc<SessionContext>,
}

impl Coordinator {
    /// Build a coordinator. `initial` seeds the network monitor without
    /// producing notifications.
    pub fn new(config: CoordinatorConfig, backend: BackendConfig, initial: ConnectionHints) -> Self {
        let bus = Arc::new(EventBus::new(config.event_bus_capacity));
        let network = NetworkMonitor::new(initial, bus.clone());
        let errors = ErrorRegistry::new(config.errors.clone(), bus.clone());
        let loading = LoadingRegistry::new(config.loading.clone(), bus.clone());
        let session = Arc::new(SessionContext::new(backend, bus.clone()));

        info!(
            subsystem = "coordinator",
            max_errors = config.errors.max_errors,
            global_loader_threshold_ms = config.loading.global_loader_threshold.as_millis() as u64,
            retry_max_attempts = config.retry.max_attempts,
            "Coordinator initialized"
        );

        Self {
            config,
            bus,
            network,
            errors,
            loading,
            session,
        }
    }

    /// Build from `WEAVE_*` environment variables, assuming online.
    pub fn from_env() -> Self {
        Self::new(
            CoordinatorConfig::from_env(),
            BackendConfig::from_env(),
            ConnectionHints::online(),
        )
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn network(&self) -> &NetworkMonitor {
        &self.network
    }

    pub fn errors(&self) -> &ErrorRegistry {
        &self.errors
    }

    pub fn loading(&self) -> &LoadingRegistry {
        &self.loading
    }

    pub fn session(&self) -> &Arc<SessionContext> {
        &self.session
    }

    /// Start building an operation wired to this coordinator's monitor,
    /// bus and error registry, with the configured timeout.
    pub fn operation<T, F, Fut>(&self, f: F) -> OperationBuilder<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        OperationBuilder::new(operation_fn(f), self.network.clone(), self.bus.clone())
            .timeout(self.config.operation_timeout)
            .report_to(self.errors.clone())
    }

    /// Build an operation with default options and debounce it.
    pub fn debounced<T, F, Fut>(&self, f: F) -> DebouncedOperation<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        DebouncedOperation::new(Arc::new(self.operation(f).build()))
    }

    pub fn tracker<T: Clone>(&self) -> OperationTracker<T> {
        OperationTracker::new(self.bus.clone())
    }

    pub fn offline_queue<T: Clone + Send>(&self) -> OfflineQueue<T> {
        OfflineQueue::new(self.network.clone())
    }

    /// Re-run `f` with backoff whenever connectivity returns after an
    /// outage. Must be called from within a tokio runtime.
    pub fn retry_on_reconnect<F, Fut>(&self, f: F) -> NetworkRetryController
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        NetworkRetryController::spawn(
            self.network.clone(),
            self.bus.clone(),
            self.config.retry.clone(),
            Arc::new(move || f().boxed()),
        )
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(
            CoordinatorConfig::default(),
            BackendConfig::default(),
            ConnectionHints::online(),
        )
    }
}
