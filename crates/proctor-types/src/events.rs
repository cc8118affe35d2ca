use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{presence::PresenceReading, violation::Violation};

/// High-level event bus message kinds moving through the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Lifecycle,
    Violation,
    Presence,
    Alert,
}

/// Immutable event envelope for the live feed and the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemEvent {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    Lifecycle(LifecycleEvent),
    Violation(Violation),
    Presence(PresenceReading),
    Alert(AlertEvent),
}

/// Lifecycle states of a proctoring session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Initializing,
    Active,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleEvent {
    pub state: SessionState,
    pub details: Option<String>,
}

/// Condition shown to the candidate that is not part of the violation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    pub message: String,
    pub remediation: Option<String>,
}

impl SystemEvent {
    pub fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            payload,
        }
    }

    pub fn lifecycle(state: SessionState, details: impl Into<Option<String>>) -> Self {
        Self::new(
            EventKind::Lifecycle,
            EventPayload::Lifecycle(LifecycleEvent {
                state,
                details: details.into(),
            }),
        )
    }

    pub fn violation(violation: Violation) -> Self {
        let mut event = Self::new(EventKind::Violation, EventPayload::Violation(violation));
        if let EventPayload::Violation(v) = &event.payload {
            event.timestamp = v.timestamp;
        }
        event
    }

    pub fn presence(reading: PresenceReading) -> Self {
        Self::new(EventKind::Presence, EventPayload::Presence(reading))
    }

    pub fn alert(message: impl Into<String>, remediation: Option<String>) -> Self {
        Self::new(
            EventKind::Alert,
            EventPayload::Alert(AlertEvent {
                message: message.into(),
                remediation,
            }),
        )
    }
}
