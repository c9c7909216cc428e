//! Session-change events
//!
//! Sign in, sign out, refresh and expiry are broadcast on an [`EventBus`]
//! so listeners (the SSE endpoint, audit logging) can react without
//! polling the current session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Session lifecycle events
///
/// Serialized with a `type` tag for SSE transmission. Tokens are never
/// part of an event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    /// A user signed in and received a new session
    SignedIn {
        user_id: Uuid,
        email: String,
        expires_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A session was ended by its owner
    SignedOut {
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A session's expiry was pushed forward
    TokenRefreshed {
        user_id: Uuid,
        expires_at: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    /// A session reached its expiry and was removed
    SessionExpired {
        user_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl SessionEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            SessionEvent::SignedIn { .. } => "SignedIn",
            SessionEvent::SignedOut { .. } => "SignedOut",
            SessionEvent::TokenRefreshed { .. } => "TokenRefreshed",
            SessionEvent::SessionExpired { .. } => "SessionExpired",
        }
    }

    /// User the event concerns
    pub fn user_id(&self) -> Uuid {
        match self {
            SessionEvent::SignedIn { user_id, .. }
            | SessionEvent::SignedOut { user_id, .. }
            | SessionEvent::TokenRefreshed { user_id, .. }
            | SessionEvent::SessionExpired { user_id, .. } => *user_id,
        }
    }
}

/// Broadcast channel for [`SessionEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SessionEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// # Examples
    ///
    /// ```
    /// use alumnos_common::events::EventBus;
    ///
    /// let event_bus = EventBus::new(100);
    /// assert_eq!(event_bus.capacity(), 100);
    /// ```
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    ///
    /// Events emitted before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: SessionEvent,
    ) -> Result<usize, broadcast::error::SendError<SessionEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: SessionEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
