use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Live state of a confirmed booking's session. Not persisted.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    EnRoute,
    InSession { started_at: DateTime<Utc> },
}

impl SessionState {
    pub fn is_in_session(&self) -> bool {
        matches!(self, SessionState::InSession { .. })
    }
}

/// Ephemeral session tracker. A booking without an entry is EN_ROUTE.
#[derive(Debug, Default)]
pub struct SessionRuntime {
    sessions: RwLock<HashMap<Uuid, SessionState>>,
}

impl SessionRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn state(&self, booking_id: Uuid) -> SessionState {
        self.sessions
            .read()
            .await
            .get(&booking_id)
            .copied()
            .unwrap_or(SessionState::EnRoute)
    }

    /// EN_ROUTE -> IN_SESSION. Starting twice keeps the first start time.
    pub async fn begin(&self, booking_id: Uuid, at: DateTime<Utc>) -> SessionState {
        *self
            .sessions
            .write()
            .await
            .entry(booking_id)
            .or_insert(SessionState::InSession { started_at: at })
    }

    pub async fn clear(&self, booking_id: Uuid) {
        self.sessions.write().await.remove(&booking_id);
    }
}
