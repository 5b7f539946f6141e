//! Push event types received on the event channel.
//!
//! Every message on the stream is a JSON object with a `type` discriminant,
//! an opaque `payload`, and an optional RFC 3339 `timestamp`:
//!
//! ```json
//! {"type": "transmutation.updated", "payload": {"id": 4, "status": "COMPLETED"}, "timestamp": "2026-01-31T22:00:00Z"}
//! {"type": "mission_created", "payload": {...}}
//! {"type": "connection", "payload": {"role": "supervisor", "email": "...", "name": "..."}}
//! ```
//!
//! Unknown discriminants decode to [`EventKind::Unknown`]; only structurally
//! broken messages (not JSON, not an object, no string `type`) are errors.

use chrono::{DateTime, Utc};
use serde_json::Value;

/// Discriminant of a push event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Welcome message sent when the stream opens
    Connection,
    AuditCreated,
    AuditUpdated,
    TransmutationUpdated,
    TransmutationDeleted,
    MissionCreated,
    MissionUpdated,
    /// Any discriminant this client does not recognize
    Unknown(String),
}

impl EventKind {
    pub fn from_discriminant(s: &str) -> Self {
        match s {
            "connection" => EventKind::Connection,
            "audit.created" => EventKind::AuditCreated,
            "audit.updated" => EventKind::AuditUpdated,
            "transmutation.updated" => EventKind::TransmutationUpdated,
            "transmutation.deleted" => EventKind::TransmutationDeleted,
            "mission_created" => EventKind::MissionCreated,
            "mission_updated" => EventKind::MissionUpdated,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventKind::Connection => "connection",
            EventKind::AuditCreated => "audit.created",
            EventKind::AuditUpdated => "audit.updated",
            EventKind::TransmutationUpdated => "transmutation.updated",
            EventKind::TransmutationDeleted => "transmutation.deleted",
            EventKind::MissionCreated => "mission_created",
            EventKind::MissionUpdated => "mission_updated",
            EventKind::Unknown(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, EventKind::Unknown(_))
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A decoded push message.
#[derive(Debug, Clone, PartialEq)]
pub struct PushEvent {
    pub kind: EventKind,
    /// Opaque event body (`null` when absent)
    pub payload: Value,
    /// Server emission time, when present and well-formed
    pub timestamp: Option<DateTime<Utc>>,
    /// The whole message as received
    pub raw: Value,
}

impl PushEvent {
    /// Build an event directly from a discriminant and payload.
    pub fn new(kind: EventKind, payload: Value) -> Self {
        let raw = serde_json::json!({ "type": kind.as_str(), "payload": payload });
        Self {
            kind,
            payload,
            timestamp: None,
            raw,
        }
    }

    /// Decode one message body.
    pub fn decode(text: &str) -> Result<Self, EventDecodeError> {
        let raw: Value = serde_json::from_str(text)?;
        let kind = raw
            .get("type")
            .and_then(|t| t.as_str())
            .map(EventKind::from_discriminant)
            .ok_or(EventDecodeError::MissingType)?;
        let payload = raw.get("payload").cloned().unwrap_or(Value::Null);
        let timestamp = raw
            .get("timestamp")
            .and_then(|t| t.as_str())
            .and_then(|t| t.parse::<DateTime<Utc>>().ok());

        Ok(Self {
            kind,
            payload,
            timestamp,
            raw,
        })
    }
}

/// Why a push message could not be decoded.
#[derive(Debug, thiserror::Error)]
pub enum EventDecodeError {
    #[error("message is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no string `type` field")]
    MissingType,
}
