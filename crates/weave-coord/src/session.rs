//! Session context and demo mode.
//!
//! The session is either signed out, signed in through the backend, or in
//! demo mode. Changes are announced on a broadcast channel so interested
//! components subscribe instead of listening for process-wide events.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use weave_core::defaults;
use weave_core::{BackendConfig, Error, EventBus, Notification, Result};

/// The fixed identity used in demo mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DemoUser {
    pub id: String,
    pub email: String,
    pub name: String,
}

impl Default for DemoUser {
    fn default() -> Self {
        Self {
            id: defaults::DEMO_USER_ID.to_string(),
            email: defaults::DEMO_USER_EMAIL.to_string(),
            name: defaults::DEMO_USER_NAME.to_string(),
        }
    }
}

/// Who the session belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionUser {
    Authenticated { id: String, email: String },
    Demo(DemoUser),
}

impl SessionUser {
    pub fn id(&self) -> &str {
        match self {
            SessionUser::Authenticated { id, .. } => id,
            SessionUser::Demo(demo) => &demo.id,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            SessionUser::Authenticated { email, .. } => email,
            SessionUser::Demo(demo) => &demo.email,
        }
    }
}

/// Session change announcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(SessionUser),
    SignedOut,
    DemoModeEnabled(DemoUser),
    DemoModeDisabled,
}

/// Current session plus change notifications.
pub struct SessionContext {
    user: RwLock<Option<SessionUser>>,
    tx: broadcast::Sender<SessionEvent>,
    bus: Arc<EventBus>,
    backend: BackendConfig,
}

impl SessionContext {
    pub fn new(backend: BackendConfig, bus: Arc<EventBus>) -> Self {
        if !backend.is_configured() {
            info!(subsystem = "session", "Backend not configured, running in demo-ready mode");
        }
        let (tx, _) = broadcast::channel(16);
        Self {
            user: RwLock::new(None),
            tx,
            bus,
            backend,
        }
    }

    pub fn backend(&self) -> &BackendConfig {
        &self.backend
    }

    fn set_user(&self, user: Option<SessionUser>) {
        if let Ok(mut current) = self.user.write() {
            *current = user;
        }
    }

    fn announce(&self, event: SessionEvent) {
        debug!(subsystem = "session", event = ?event, "Session changed");
        let _ = self.tx.send(event);
    }

    /// Enter demo mode with the fixed demo identity.
    pub fn enable_demo_mode(&self) -> DemoUser {
        let demo = DemoUser::default();
        self.set_user(Some(SessionUser::Demo(demo.clone())));
        info!(subsystem = "session", "Demo mode enabled");
        self.announce(SessionEvent::DemoModeEnabled(demo.clone()));
        demo
    }

    /// Leave demo mode. No-op unless the session is in demo mode.
    pub fn disable_demo_mode(&self) {
        if !self.is_demo_mode() {
            return;
        }
        self.set_user(None);
        info!(subsystem = "session", "Demo mode disabled");
        self.announce(SessionEvent::DemoModeDisabled);
    }

    /// Record a session the backend has authenticated.
    ///
    /// Fails with a configuration error when no backend is configured.
    pub fn sign_in(&self, id: impl Into<String>, email: impl Into<String>) -> Result<SessionUser> {
        if !self.backend.is_configured() {
            return Err(Error::Config(
                "Authentication is not configured. Please use demo mode.".to_string(),
            ));
        }
        let user = SessionUser::Authenticated {
            id: id.into(),
            email: email.into(),
        };
        self.set_user(Some(user.clone()));
        info!(subsystem = "session", user_id = user.id(), "Signed in");
        self.bus.notify(Notification::success("Successfully signed in!"));
        self.announce(SessionEvent::SignedIn(user.clone()));
        Ok(user)
    }

    /// End the session. Signing out of demo mode disables it.
    pub fn sign_out(&self) {
        if self.is_demo_mode() {
            self.disable_demo_mode();
            return;
        }
        if self.current().is_none() {
            return;
        }
        self.set_user(None);
        info!(subsystem = "session", "Signed out");
        self.bus.notify(Notification::info("Signed out successfully"));
        self.announce(SessionEvent::SignedOut);
    }

    pub fn current(&self) -> Option<SessionUser> {
        self.user.read().ok().and_then(|user| user.clone())
    }

    pub fn is_demo_mode(&self) -> bool {
        matches!(self.current(), Some(SessionUser::Demo(_)))
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.current(), Some(SessionUser::Authenticated { .. }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }
}
