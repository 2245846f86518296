//! Configuration for the coordination layer.
//!
//! Every config has a `Default` built from [`crate::defaults`] and a
//! `from_env()` constructor. `from_env()` delegates to `from_lookup()` so the
//! parsing can be exercised without touching the process environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::backoff::BackoffPolicy;
use crate::defaults;

fn parse<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse::<T>().ok())
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    lookup(key).map(|v| v != "false" && v != "0")
}

/// Error registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRegistryConfig {
    /// Ring-buffer capacity.
    pub max_errors: usize,
    /// Auto-resolve delay; `Duration::ZERO` disables it.
    pub auto_resolve_after: Duration,
}

impl Default for ErrorRegistryConfig {
    fn default() -> Self {
        Self {
            max_errors: defaults::ERROR_REGISTRY_MAX,
            auto_resolve_after: Duration::from_secs(defaults::ERROR_AUTO_RESOLVE_SECS),
        }
    }
}

impl ErrorRegistryConfig {
    pub fn with_max_errors(mut self, max: usize) -> Self {
        self.max_errors = max;
        self
    }

    pub fn with_auto_resolve(mut self, after: Duration) -> Self {
        self.auto_resolve_after = after;
        self
    }
}

/// Loading registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingConfig {
    /// Whether the global loader is ever surfaced.
    pub show_global_loader: bool,
    /// How long an entry must stay registered before the global loader shows.
    pub global_loader_threshold: Duration,
}

impl Default for LoadingConfig {
    fn default() -> Self {
        Self {
            show_global_loader: true,
            global_loader_threshold: Duration::from_millis(defaults::GLOBAL_LOADER_THRESHOLD_MS),
        }
    }
}

impl LoadingConfig {
    pub fn with_threshold(mut self, threshold: Duration) -> Self {
        self.global_loader_threshold = threshold;
        self
    }

    pub fn with_global_loader(mut self, show: bool) -> Self {
        self.show_global_loader = show;
        self
    }
}

/// Reconnect retry controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::NETWORK_RETRY_MAX_ATTEMPTS,
            backoff: BackoffPolicy::default(),
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

/// Top-level configuration built once at bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub errors: ErrorRegistryConfig,
    pub loading: LoadingConfig,
    pub retry: RetryConfig,
    /// Default per-attempt timeout for wrapped operations.
    pub operation_timeout: Duration,
    pub event_bus_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            errors: ErrorRegistryConfig::default(),
            loading: LoadingConfig::default(),
            retry: RetryConfig::default(),
            operation_timeout: Duration::from_secs(defaults::OPERATION_TIMEOUT_SECS),
            event_bus_capacity: defaults::EVENT_BUS_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `WEAVE_MAX_ERRORS` | `50` | Error registry capacity |
    /// | `WEAVE_ERROR_AUTO_RESOLVE_SECS` | `300` | Auto-resolve delay, `0` disables |
    /// | `WEAVE_GLOBAL_LOADER` | `true` | Surface the global loader |
    /// | `WEAVE_GLOBAL_LOADER_THRESHOLD_MS` | `1000` | Global loader delay |
    /// | `WEAVE_RETRY_MAX_ATTEMPTS` | `3` | Reconnect retry attempts |
    /// | `WEAVE_RETRY_BASE_DELAY_MS` | `1000` | Backoff base delay |
    /// | `WEAVE_RETRY_MAX_DELAY_MS` | `10000` | Backoff cap |
    /// | `WEAVE_RETRY_BACKOFF_FACTOR` | `2` | Backoff multiplier |
    /// | `WEAVE_OPERATION_TIMEOUT_SECS` | `30` | Per-attempt timeout |
    /// | `WEAVE_EVENT_BUS_CAPACITY` | `256` | Broadcast buffer |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let d = Self::default();

        let errors = ErrorRegistryConfig {
            max_errors: parse(&lookup, "WEAVE_MAX_ERRORS")
                .unwrap_or(d.errors.max_errors)
                .max(1),
            auto_resolve_after: parse(&lookup, "WEAVE_ERROR_AUTO_RESOLVE_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.errors.auto_resolve_after),
        };

        let loading = LoadingConfig {
            show_global_loader: parse_bool(&lookup, "WEAVE_GLOBAL_LOADER")
                .unwrap_or(d.loading.show_global_loader),
            global_loader_threshold: parse(&lookup, "WEAVE_GLOBAL_LOADER_THRESHOLD_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.loading.global_loader_threshold),
        };

        let backoff = BackoffPolicy {
            base_delay: parse(&lookup, "WEAVE_RETRY_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.retry.backoff.base_delay),
            factor: parse(&lookup, "WEAVE_RETRY_BACKOFF_FACTOR")
                .unwrap_or(d.retry.backoff.factor)
                .max(1),
            max_delay: parse(&lookup, "WEAVE_RETRY_MAX_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(d.retry.backoff.max_delay),
        };

        let retry = RetryConfig {
            max_attempts: parse(&lookup, "WEAVE_RETRY_MAX_ATTEMPTS")
                .unwrap_or(d.retry.max_attempts),
            backoff,
        };

        Self {
            errors,
            loading,
            retry,
            operation_timeout: parse(&lookup, "WEAVE_OPERATION_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(d.operation_timeout),
            event_bus_capacity: parse(&lookup, "WEAVE_EVENT_BUS_CAPACITY")
                .unwrap_or(d.event_bus_capacity)
                .max(1),
        }
    }
}

/// Backend-as-a-service endpoint selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub url: Option<String>,
    pub anon_key: Option<String>,
}

impl BackendConfig {
    /// Read `WEAVE_BACKEND_URL` and `WEAVE_BACKEND_ANON_KEY`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            url: non_empty(defaults::ENV_BACKEND_URL),
            anon_key: non_empty(defaults::ENV_BACKEND_ANON_KEY),
        }
    }

    /// True when both values are present and not the sample placeholders.
    /// Without a configured backend the application runs demo-only.
    pub fn is_configured(&self) -> bool {
        match (&self.url, &self.anon_key) {
            (Some(url), Some(key)) => {
                url != defaults::PLACEHOLDER_BACKEND_URL
                    && key != defaults::PLACEHOLDER_BACKEND_ANON_KEY
            }
            _ => false,
        }
    }
}
