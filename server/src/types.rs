//! Wire types for the EventPlat gateway.
//!
//! Everything a connected client sends or receives is an [`Envelope`]: a
//! named JSON message carried as a WebSocket text frame. Two channels exist,
//! `message` (chat relay) and `eventCreated` (notification fan-out from the
//! CRUD layer). Field names use `camelCase` to match the JSON API contract
//! of the rest of the platform.

use serde::{Deserialize, Serialize};

/// Summary of a newly created event record, as handed over by the CRUD layer.
///
/// The gateway treats this as an opaque payload: it is deserialized from the
/// ingestion request and re-serialized verbatim to every connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventSummary {
    /// Database identifier of the event record.
    pub id: String,

    /// Event title.
    pub title: String,

    /// Event description.
    pub description: String,

    /// Event location.
    pub location: String,

    /// Identifier of the user who created the event.
    pub created_by: String,
}

/// A named broadcast message.
///
/// Serialized as `{"event": "<name>", "data": <payload>}`, e.g.:
///
/// ```json
/// {"event": "message", "data": "hi"}
/// {"event": "eventCreated", "data": {"id": "1", "title": "Meetup", ...}}
/// ```
///
/// Envelopes are ephemeral: delivery is best-effort, at-most-once per
/// connected peer, with no persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum Envelope {
    /// Chat relay: a string body rebroadcast to all connected clients.
    Message(String),

    /// Notification that a new event record was created.
    EventCreated(EventSummary),
}

impl Envelope {
    /// The wire name of this envelope's channel.
    #[must_use]
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::EventCreated(_) => "eventCreated",
        }
    }
}
