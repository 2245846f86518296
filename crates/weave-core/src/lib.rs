//! # weave-core
//!
//! Core types, errors, and defaults for the TimeWeave coordination layer.
//!
//! This crate holds the pieces every coordinator component shares: the error
//! taxonomy, the backoff policy, connection-quality classification, registry
//! records, the event bus, configuration, and the pure action-folding
//! computation. It performs no I/O.

pub mod backoff;
pub mod config;
pub mod defaults;
pub mod error;
pub mod events;
pub mod folding;
pub mod logging;
pub mod models;
pub mod network;

// Re-export commonly used types at crate root
pub use backoff::BackoffPolicy;
pub use config::{BackendConfig, CoordinatorConfig, ErrorRegistryConfig, LoadingConfig, RetryConfig};
pub use error::{Error, Result};
pub use events::{
    CoordinatorEvent, EventBus, EventEnvelope, Notification, NotificationLevel,
};
pub use folding::{
    fold_metrics, format_minutes, plan_fold, priority_label, ActionRecord, ActionStatus,
    FoldMetrics, FoldPlan, FoldedAction,
};
pub use models::*;
pub use network::{
    classify_quality, is_slow_connection, ConnectionHints, ConnectionQuality, EffectiveType,
    NetworkStatus,
};
