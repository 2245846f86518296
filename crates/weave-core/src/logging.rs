//! Structured logging schema and field name constants.
//!
//! Components use these constants for consistent structured logging fields
//! so log tooling can query the same names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Terminal failure after retries are exhausted |
//! | WARN  | Recoverable failure, retry scheduled, connectivity lost |
//! | INFO  | Lifecycle events (bootstrap, reconnect, sign-in), completions |
//! | DEBUG | Decision points, state transitions, timer firings |
//! | TRACE | Per-entry iteration (loading entries, queue items) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "network", "errors", "loading", "operation", "retry", "session"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
pub const COMPONENT: &str = "component";

/// Logical operation name.
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Error registry record id.
pub const ERROR_ID: &str = "error_id";

/// Loading registry entry id.
pub const LOADING_ID: &str = "loading_id";

/// Keyed operation name in an operation tracker.
pub const OPERATION_KEY: &str = "operation_key";

/// Wrapper generation (increments on every `execute`).
pub const GENERATION: &str = "generation";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Zero-based attempt number.
pub const ATTEMPT: &str = "attempt";

/// Backoff delay in milliseconds.
pub const DELAY_MS: &str = "delay_ms";

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of entries in a registry or queue.
pub const ENTRY_COUNT: &str = "entry_count";

// ─── Network fields ────────────────────────────────────────────────────────

/// Derived connection quality class.
pub const QUALITY: &str = "quality";

/// Effective connection type reported by the environment.
pub const CONNECTION_TYPE: &str = "connection_type";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Error taxonomy kind ("network", "timeout", "abort", "operation").
pub const ERROR_KIND: &str = "error_kind";
