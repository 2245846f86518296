//! Coordinator event types, envelope schema, and event bus.
//!
//! Every component publishes onto one broadcast channel. Downstream consumers
//! (notification renderers, the global loader overlay, telemetry) subscribe
//! independently. Nothing here renders anything.
//!
//! Events are wrapped in an [`EventEnvelope`] carrying a time-ordered event id
//! and a dot-namespaced type such as `"network.offline"` or
//! `"loading.global_shown"`.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::defaults;
use crate::network::ConnectionQuality;

// ============================================================================
// Notifications
// ============================================================================

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A transient user-facing notification ("toast").
///
/// `duration` of `None` means sticky until dismissed. Notifications sharing a
/// `key` replace each other in the renderer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    #[serde(with = "duration_ms_opt")]
    pub duration: Option<Duration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl Notification {
    fn new(level: NotificationLevel, message: impl Into<String>, ms: u64) -> Self {
        Self {
            level,
            message: message.into(),
            duration: Some(Duration::from_millis(ms)),
            key: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, message, defaults::NOTIFY_SUCCESS_MS)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, message, defaults::NOTIFY_ERROR_MS)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, message, defaults::NOTIFY_WARNING_MS)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, message, defaults::NOTIFY_INFO_MS)
    }

    /// Sticky "connection lost" error.
    pub fn network_lost() -> Self {
        Self {
            level: NotificationLevel::Error,
            message: "Network connection lost. Please check your internet connection."
                .to_string(),
            duration: None,
            key: Some(defaults::NETWORK_ERROR_KEY.to_string()),
        }
    }

    /// "Connection restored"; renderers should dismiss the network-lost key.
    pub fn network_restored() -> Self {
        Self::new(
            NotificationLevel::Success,
            "Connection restored",
            defaults::NOTIFY_RESTORED_MS,
        )
        .with_key(defaults::NETWORK_RESTORED_KEY)
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

mod duration_ms_opt {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match d {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }
}

// ============================================================================
// Coordinator events
// ============================================================================

/// Everything the coordination layer announces.
///
/// Serialized with a `type` tag, e.g.
/// `{"type":"ErrorReported","error_id":"...","message":"boom"}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum CoordinatorEvent {
    /// Connectivity went from online to offline.
    NetworkOffline,
    /// Connectivity went from offline to online.
    NetworkRestored { quality: ConnectionQuality },
    /// The connection entered the slow state while online.
    SlowConnection { quality: ConnectionQuality },
    /// A record was added to the error registry.
    ErrorReported {
        error_id: Uuid,
        kind: String,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<String>,
    },
    /// A record was marked resolved.
    ErrorResolved { error_id: Uuid },
    /// A user retry of a recorded error finished.
    ErrorRetried {
        error_id: Uuid,
        success: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_error_id: Option<Uuid>,
    },
    /// The global loader became visible.
    GlobalLoaderShown {
        primary_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
        additional: usize,
    },
    /// The global loader was hidden.
    GlobalLoaderHidden,
    /// A wrapped operation scheduled a local retry.
    OperationRetryScheduled {
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        attempt: u32,
        delay_ms: u64,
    },
    /// A wrapped operation succeeded.
    OperationSucceeded {
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// A wrapped operation failed terminally.
    OperationFailed {
        #[serde(skip_serializing_if = "Option::is_none")]
        label: Option<String>,
        kind: String,
        message: String,
    },
    /// The reconnect retry controller started or continued a sequence.
    ReconnectRetry { attempt: u32, max_attempts: u32 },
    /// The reconnect retry controller gave up.
    ReconnectRetryExhausted { max_attempts: u32 },
    /// A user-facing notification.
    Notify(Notification),
}

impl CoordinatorEvent {
    /// Namespaced event type for the envelope (e.g., `"network.offline"`).
    pub fn namespaced_event_type(&self) -> &'static str {
        match self {
            CoordinatorEvent::NetworkOffline => "network.offline",
            CoordinatorEvent::NetworkRestored { .. } => "network.restored",
            CoordinatorEvent::SlowConnection { .. } => "network.slow",
            CoordinatorEvent::ErrorReported { .. } => "error.reported",
            CoordinatorEvent::ErrorResolved { .. } => "error.resolved",
            CoordinatorEvent::ErrorRetried { .. } => "error.retried",
            CoordinatorEvent::GlobalLoaderShown { .. } => "loading.global_shown",
            CoordinatorEvent::GlobalLoaderHidden => "loading.global_hidden",
            CoordinatorEvent::OperationRetryScheduled { .. } => "operation.retry_scheduled",
            CoordinatorEvent::OperationSucceeded { .. } => "operation.succeeded",
            CoordinatorEvent::OperationFailed { .. } => "operation.failed",
            CoordinatorEvent::ReconnectRetry { .. } => "retry.attempt",
            CoordinatorEvent::ReconnectRetryExhausted { .. } => "retry.exhausted",
            CoordinatorEvent::Notify(_) => "notify",
        }
    }

    /// The notification carried by this event, if any.
    pub fn notification(&self) -> Option<&Notification> {
        match self {
            CoordinatorEvent::Notify(n) => Some(n),
            _ => None,
        }
    }
}

/// Versioned envelope around a [`CoordinatorEvent`].
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type.
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// Payload schema version.
    pub payload_version: u32,
    pub payload: CoordinatorEvent,
}

impl EventEnvelope {
    pub fn new(event: CoordinatorEvent) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: event.namespaced_event_type().to_string(),
            occurred_at: Utc::now(),
            payload_version: 1,
            payload: event,
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Broadcast-based event bus shared by every coordinator component.
///
/// Slow receivers that fall behind get a `Lagged` error and miss events;
/// freshness matters more than completeness for UI state.
pub struct EventBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(defaults::EVENT_BUS_CAPACITY)
    }
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Emit an event to all subscribers. Dropped silently when nobody listens.
    pub fn emit(&self, event: CoordinatorEvent) {
        let envelope = EventEnvelope::new(event);
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "EventBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Shorthand for emitting a [`CoordinatorEvent::Notify`].
    pub fn notify(&self, notification: Notification) {
        self.emit(CoordinatorEvent::Notify(notification));
    }

    /// Subscribe to receive enveloped events.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_bus_emit_subscribe() {
        let bus = EventBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(CoordinatorEvent::NetworkOffline);

        let envelope = rx.recv().await.unwrap();
        assert!(matches!(envelope.payload, CoordinatorEvent::NetworkOffline));
        assert_eq!(envelope.event_type, "network.offline");
        assert_eq!(envelope.payload_version, 1);
        assert_eq!(envelope.event_id.get_version_num(), 7);
    }

    #[tokio::test]
    async fn test_event_bus_multiple_subscribers() {
        let bus = EventBus::new(32);
        let mut a = bus.subscribe();
        let mut b = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);

        bus.notify(Notification::info("hello"));

        for rx in [&mut a, &mut b] {
            let env = rx.recv().await.unwrap();
            let n = env.payload.notification().unwrap();
            assert_eq!(n.message, "hello");
            assert_eq!(n.level, NotificationLevel::Info);
        }
    }

    #[test]
    fn test_emit_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.emit(CoordinatorEvent::GlobalLoaderHidden);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_notification_durations() {
        assert_eq!(
            Notification::success("ok").duration,
            Some(Duration::from_millis(4000))
        );
        assert_eq!(
            Notification::error("bad").duration,
            Some(Duration::from_millis(6000))
        );
        assert_eq!(
            Notification::warning("hm").duration,
            Some(Duration::from_millis(5000))
        );
        assert_eq!(Notification::network_lost().duration, None);
        assert_eq!(
            Notification::network_restored().key.as_deref(),
            Some("network-restored")
        );
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let json = serde_json::to_value(CoordinatorEvent::ReconnectRetry {
            attempt: 1,
            max_attempts: 3,
        })
        .unwrap();
        assert_eq!(json["type"], "ReconnectRetry");
        assert_eq!(json["attempt"], 1);

        let json = serde_json::to_value(CoordinatorEvent::Notify(Notification::network_lost()))
            .unwrap();
        assert_eq!(json["type"], "Notify");
        assert_eq!(json["level"], "error");
        assert!(json["duration"].is_null());
    }
}
