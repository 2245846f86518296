//! Centralized default constants for the TimeWeave coordination layer.
//!
//! **This module is the single source of truth** for shared default values.
//! Components and configuration loaders reference these constants instead of
//! defining their own magic numbers.
//!
//! Organized by component. When adding new constants, place them in the
//! appropriate section.

// =============================================================================
// ERROR REGISTRY
// =============================================================================

/// Maximum number of error records kept (oldest evicted first).
pub const ERROR_REGISTRY_MAX: usize = 50;

/// Delay before a reported error is automatically marked resolved (5 minutes).
/// Zero disables auto-resolution.
pub const ERROR_AUTO_RESOLVE_SECS: u64 = 300;

/// Context used for a failed retry when the original record had none.
pub const UNKNOWN_ERROR_CONTEXT: &str = "unknown";

// =============================================================================
// LOADING REGISTRY
// =============================================================================

/// Delay before a still-running operation surfaces the global loader.
pub const GLOBAL_LOADER_THRESHOLD_MS: u64 = 1000;

/// Pause after reporting 100% progress so completion is visible.
pub const PROGRESS_COMPLETE_PAUSE_MS: u64 = 200;

// =============================================================================
// ASYNC OPERATIONS
// =============================================================================

/// Per-attempt timeout for wrapped operations.
pub const OPERATION_TIMEOUT_SECS: u64 = 30;

/// Local retries after the first attempt (0 = single attempt).
pub const OPERATION_RETRY_COUNT: u32 = 0;

/// Default debounce window for debounced operations.
pub const DEBOUNCE_MS: u64 = 500;

/// Success notification text when none is configured.
pub const OPERATION_SUCCESS_MESSAGE: &str = "Operation completed successfully";

// =============================================================================
// BACKOFF / RETRY
// =============================================================================

/// Base delay for exponential backoff.
pub const RETRY_BASE_DELAY_MS: u64 = 1000;

/// Upper bound for a single backoff delay.
pub const RETRY_MAX_DELAY_MS: u64 = 10_000;

/// Multiplier applied per attempt.
pub const RETRY_BACKOFF_FACTOR: u32 = 2;

/// Maximum automatic attempts after a reconnect.
pub const NETWORK_RETRY_MAX_ATTEMPTS: u32 = 3;

// =============================================================================
// CONNECTION QUALITY
// =============================================================================

/// Downlink (Mbps) above which a 4g link is "excellent".
pub const EXCELLENT_DOWNLINK_MBPS: f64 = 10.0;

/// Round trip (ms) below which a 4g link is "excellent".
pub const EXCELLENT_RTT_MS: u32 = 100;

/// Downlink (Mbps) above which a link is "good".
pub const GOOD_DOWNLINK_MBPS: f64 = 1.5;

/// Round trip (ms) below which a link is "good".
pub const GOOD_RTT_MS: u32 = 300;

/// Downlink (Mbps) above which a link is "fair".
pub const FAIR_DOWNLINK_MBPS: f64 = 0.5;

/// Round trip (ms) below which a link is "fair".
pub const FAIR_RTT_MS: u32 = 1000;

/// Downlink (Mbps) below which a link counts as slow.
pub const SLOW_DOWNLINK_MBPS: f64 = 0.5;

/// Round trip (ms) above which a link counts as slow.
pub const SLOW_RTT_MS: u32 = 2000;

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Display duration for success notifications.
pub const NOTIFY_SUCCESS_MS: u64 = 4000;

/// Display duration for error notifications.
pub const NOTIFY_ERROR_MS: u64 = 6000;

/// Display duration for warning notifications.
pub const NOTIFY_WARNING_MS: u64 = 5000;

/// Display duration for info notifications.
pub const NOTIFY_INFO_MS: u64 = 4000;

/// Display duration for the "connection restored" notification.
pub const NOTIFY_RESTORED_MS: u64 = 3000;

/// Dedup key shared by network-lost notifications.
pub const NETWORK_ERROR_KEY: &str = "network-error";

/// Dedup key shared by network-restored notifications.
pub const NETWORK_RESTORED_KEY: &str = "network-restored";

/// Dedup key shared by slow-connection warnings.
pub const SLOW_CONNECTION_KEY: &str = "slow-connection";

// =============================================================================
// EVENT BUS
// =============================================================================

/// Default event bus broadcast channel capacity.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// BACKEND
// =============================================================================

/// Environment variable naming the backend-as-a-service endpoint.
pub const ENV_BACKEND_URL: &str = "WEAVE_BACKEND_URL";

/// Environment variable naming the backend anonymous key.
pub const ENV_BACKEND_ANON_KEY: &str = "WEAVE_BACKEND_ANON_KEY";

/// Placeholder URL shipped in sample env files.
pub const PLACEHOLDER_BACKEND_URL: &str = "your_supabase_url";

/// Placeholder key shipped in sample env files.
pub const PLACEHOLDER_BACKEND_ANON_KEY: &str = "your_supabase_anon_key";

// =============================================================================
// DEMO MODE
// =============================================================================

/// Identifier of the built-in demo user.
pub const DEMO_USER_ID: &str = "demo-user-id";

/// Email of the built-in demo user.
pub const DEMO_USER_EMAIL: &str = "demo@timeweave.app";

/// Display name of the built-in demo user.
pub const DEMO_USER_NAME: &str = "Demo User";
