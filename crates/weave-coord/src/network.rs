//! Network status monitor.
//!
//! The environment feeds connectivity observations in through
//! [`NetworkMonitor::observe`] (online/offline events and connection-change
//! events). The monitor derives a [`NetworkStatus`], publishes it on a
//! `watch` channel, and announces transitions exactly once each.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use weave_core::defaults;
use weave_core::{
    ConnectionHints, ConnectionQuality, CoordinatorEvent, EventBus, Notification, NetworkStatus,
};

/// A connectivity transition, published once per change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkTransition {
    WentOffline,
    Restored,
    BecameSlow,
}

struct MonitorInner {
    status_tx: watch::Sender<NetworkStatus>,
    transitions_tx: broadcast::Sender<NetworkTransition>,
    bus: Arc<EventBus>,
}

/// Shared handle to the network status monitor. Cheap to clone.
#[derive(Clone)]
pub struct NetworkMonitor {
    inner: Arc<MonitorInner>,
}

impl NetworkMonitor {
    /// Create a monitor seeded with the initial hints. The initial state does
    /// not produce notifications.
    pub fn new(initial: ConnectionHints, bus: Arc<EventBus>) -> Self {
        let (status_tx, _) = watch::channel(NetworkStatus::from_hints(&initial));
        let (transitions_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            inner: Arc::new(MonitorInner {
                status_tx,
                transitions_tx,
                bus,
            }),
        }
    }

    /// Record a new observation and return the derived status.
    pub fn observe(&self, hints: ConnectionHints) -> NetworkStatus {
        let next = NetworkStatus::from_hints(&hints);
        let prev = self.inner.status_tx.send_replace(next.clone());

        debug!(
            subsystem = "network",
            quality = %next.quality,
            connection_type = next.connection_type.map(|t| t.as_str()),
            is_online = next.is_online,
            "Network status observed"
        );

        if prev.is_online && !next.is_online {
            warn!(subsystem = "network", "Network connection lost");
            self.publish(NetworkTransition::WentOffline);
            self.inner.bus.emit(CoordinatorEvent::NetworkOffline);
            self.inner.bus.notify(Notification::network_lost());
        } else if !prev.is_online && next.is_online {
            info!(subsystem = "network", quality = %next.quality, "Network connection restored");
            self.publish(NetworkTransition::Restored);
            self.inner.bus.emit(CoordinatorEvent::NetworkRestored {
                quality: next.quality,
            });
            self.inner.bus.notify(Notification::network_restored());
        } else if next.is_online && next.is_slow && !prev.is_slow {
            warn!(subsystem = "network", quality = %next.quality, "Slow connection detected");
            self.publish(NetworkTransition::BecameSlow);
            self.inner.bus.emit(CoordinatorEvent::SlowConnection {
                quality: next.quality,
            });
            self.inner.bus.notify(
                Notification::warning("Slow connection detected. Some features may be limited.")
                    .with_key(defaults::SLOW_CONNECTION_KEY),
            );
        }

        next
    }

    /// Online/offline event without connection details. Keeps the last known
    /// connection hints.
    pub fn set_online(&self, online: bool) -> NetworkStatus {
        let current = self.status();
        self.observe(ConnectionHints {
            is_online: online,
            effective_type: current.connection_type,
            downlink_mbps: current.downlink_mbps,
            round_trip_ms: current.round_trip_ms,
            data_saver: current.data_saver,
        })
    }

    fn publish(&self, transition: NetworkTransition) {
        let _ = self.inner.transitions_tx.send(transition);
    }

    /// Current status snapshot.
    pub fn status(&self) -> NetworkStatus {
        self.inner.status_tx.borrow().clone()
    }

    pub fn is_online(&self) -> bool {
        self.inner.status_tx.borrow().is_online
    }

    pub fn quality(&self) -> ConnectionQuality {
        self.inner.status_tx.borrow().quality
    }

    /// Receiver that always holds the latest status.
    pub fn subscribe(&self) -> watch::Receiver<NetworkStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Receiver of every transition, in order.
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<NetworkTransition> {
        self.inner.transitions_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave_core::{EffectiveType, EventEnvelope};

    fn drain(rx: &mut broadcast::Receiver<EventEnvelope>) -> Vec<String> {
        let mut types = Vec::new();
        while let Ok(env) = rx.try_recv() {
            types.push(env.event_type);
        }
        types
    }

    fn monitor(initial: ConnectionHints) -> (NetworkMonitor, broadcast::Receiver<EventEnvelope>) {
        let bus = Arc::new(EventBus::new(64));
        let rx = bus.subscribe();
        (NetworkMonitor::new(initial, bus), rx)
    }

    #[test]
    fn test_initial_status_is_silent() {
        let (monitor, mut rx) = monitor(ConnectionHints::offline());
        assert!(!monitor.is_online());
        assert_eq!(monitor.quality(), ConnectionQuality::Offline);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn test_offline_notification_once_per_transition() {
        let (monitor, mut rx) = monitor(ConnectionHints::online());
        monitor.observe(ConnectionHints::offline());
        monitor.observe(ConnectionHints::offline());
        monitor.observe(ConnectionHints::offline());

        let events = drain(&mut rx);
        let offline = events.iter().filter(|t| *t == "network.offline").count();
        assert_eq!(offline, 1);
    }

    #[test]
    fn test_restored_notification_once_per_transition() {
        let (monitor, mut rx) = monitor(ConnectionHints::offline());
        monitor.observe(ConnectionHints::online());
        monitor.observe(ConnectionHints::online());
        monitor.observe(ConnectionHints::offline());
        monitor.observe(ConnectionHints::online());

        let events = drain(&mut rx);
        assert_eq!(events.iter().filter(|t| *t == "network.restored").count(), 2);
        assert_eq!(events.iter().filter(|t| *t == "network.offline").count(), 1);
    }

    #[test]
    fn test_slow_warning_fires_once_until_recovery() {
        let (monitor, mut rx) = monitor(ConnectionHints::online());
        let slow = ConnectionHints::online().with_effective_type(EffectiveType::TwoG);
        monitor.observe(slow.clone());
        monitor.observe(slow.clone());
        monitor.observe(slow.clone().with_rtt(3000));
        assert_eq!(
            drain(&mut rx).iter().filter(|t| *t == "network.slow").count(),
            1
        );

        monitor.observe(ConnectionHints::online().with_effective_type(EffectiveType::FourG));
        monitor.observe(slow);
        assert_eq!(
            drain(&mut rx).iter().filter(|t| *t == "network.slow").count(),
            1
        );
    }

    #[test]
    fn test_set_online_keeps_hints() {
        let (monitor, _rx) = monitor(
            ConnectionHints::online()
                .with_effective_type(EffectiveType::FourG)
                .with_downlink(20.0)
                .with_rtt(40),
        );
        assert_eq!(monitor.quality(), ConnectionQuality::Excellent);

        let status = monitor.set_online(false);
        assert_eq!(status.quality, ConnectionQuality::Offline);
        assert_eq!(status.connection_type, Some(EffectiveType::FourG));

        let status = monitor.set_online(true);
        assert_eq!(status.quality, ConnectionQuality::Excellent);
    }

    #[tokio::test]
    async fn test_transitions_are_delivered_in_order() {
        let (monitor, _rx) = monitor(ConnectionHints::online());
        let mut transitions = monitor.subscribe_transitions();

        monitor.set_online(false);
        monitor.set_online(true);

        assert_eq!(transitions.recv().await.unwrap(), NetworkTransition::WentOffline);
        assert_eq!(transitions.recv().await.unwrap(), NetworkTransition::Restored);
    }

    #[tokio::test]
    async fn test_watch_receiver_sees_latest() {
        let (monitor, _rx) = monitor(ConnectionHints::online());
        let mut status_rx = monitor.subscribe();
        monitor.set_online(false);
        status_rx.changed().await.unwrap();
        assert!(!status_rx.borrow().is_online);
    }
}
