use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Closed set of catalog-change notifications flowing through the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    #[serde(rename = "model.added")]
    ModelAdded,
    #[serde(rename = "model.updated")]
    ModelUpdated,
    #[serde(rename = "model.deleted")]
    ModelDeleted,
    #[serde(rename = "sync.started")]
    SyncStarted,
    #[serde(rename = "sync.completed")]
    SyncCompleted,
    #[serde(rename = "client.connected")]
    ClientConnected,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ModelAdded => "model.added",
            EventKind::ModelUpdated => "model.updated",
            EventKind::ModelDeleted => "model.deleted",
            EventKind::SyncStarted => "sync.started",
            EventKind::SyncCompleted => "sync.completed",
            EventKind::ClientConnected => "client.connected",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One catalog-change notification. Immutable once published; the same
/// serialized shape is the WebSocket wire format.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

impl Event {
    pub fn new(kind: EventKind, data: serde_json::Value) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            data,
        }
    }

    /// Unix-seconds timestamp, used as the SSE event id.
    pub fn unix_seconds(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("subscriber queue full")]
    Backpressure,
    #[error("transport closed")]
    Closed,
}

/// Transport-side receiver of broker events. `send` must never block:
/// implementations drop or skip under local backpressure and report it as
/// an error for the broker to log.
pub trait Subscriber: Send + Sync {
    fn name(&self) -> &'static str;
    fn send(&self, event: &Event) -> Result<(), TransportError>;
    fn close(&self) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_serializes_to_wire_shape() {
        let event = Event::new(EventKind::ModelAdded, json!({"id": "gpt-4o"}));
        let value = serde_json::to_value(&event).unwrap();

        assert_eq!(value["type"], "model.added");
        assert_eq!(value["data"]["id"], "gpt-4o");
        // RFC3339 timestamp
        let ts = value["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }

    #[test]
    fn kind_names_are_stable() {
        for (kind, name) in [
            (EventKind::ModelAdded, "model.added"),
            (EventKind::ModelUpdated, "model.updated"),
            (EventKind::ModelDeleted, "model.deleted"),
            (EventKind::SyncStarted, "sync.started"),
            (EventKind::SyncCompleted, "sync.completed"),
            (EventKind::ClientConnected, "client.connected"),
        ] {
            assert_eq!(kind.as_str(), name);
            assert_eq!(kind.to_string(), name);
        }
    }
}
