//! Wire and storage models
//!
//! Frames on the socket are JSON objects of the form `{"event": "<name>", "data": ...}`.
//! Event names follow the browser client shipped in `public/`.

use serde::{Deserialize, Serialize};

/// A connected participant as announced in presence lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub username: String,
    /// Routing address of the connection. Not required to be unique.
    #[serde(rename = "userID")]
    pub connection_id: String,
}

impl Identity {
    pub fn new(username: impl Into<String>, connection_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            connection_id: connection_id.into(),
        }
    }
}

/// A single persisted direct message. Immutable once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub from: String,
    pub message: String,
    pub time: String,
}

impl Message {
    pub fn new(
        from: impl Into<String>,
        message: impl Into<String>,
        time: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            message: message.into(),
            time: time.into(),
        }
    }
}

/// Handshake parameters supplied on the upgrade request
/// (`/ws?username=...&userID=...`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Handshake {
    pub username: Option<String>,
    #[serde(rename = "userID")]
    pub connection_id: Option<String>,
}

impl Handshake {
    pub fn new(username: impl Into<String>, connection_id: Option<&str>) -> Self {
        Self {
            username: Some(username.into()),
            connection_id: connection_id.map(str::to_string),
        }
    }
}

/// Payload of a send-message event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendMessage {
    pub to: String,
    pub message: String,
    pub time: String,
}

/// Payload of a fetch-history event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchHistory {
    pub receiver: String,
}

/// Message pushed to a recipient: the sender's payload plus the sender's id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveredMessage {
    pub from: String,
    pub to: String,
    pub message: String,
    pub time: String,
}

impl DeliveredMessage {
    pub fn new(from: impl Into<String>, payload: SendMessage) -> Self {
        Self {
            from: from.into(),
            to: payload.to,
            message: payload.message,
            time: payload.time,
        }
    }
}

impl From<&DeliveredMessage> for Message {
    fn from(delivered: &DeliveredMessage) -> Self {
        Message::new(&delivered.from, &delivered.message, &delivered.time)
    }
}

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    #[serde(rename = "message-to-server")]
    SendMessage(SendMessage),
    #[serde(rename = "fetch-messages")]
    FetchHistory(FetchHistory),
}

/// Events the relay pushes to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum OutboundEvent {
    /// Confirms the identity a connection was admitted under.
    #[serde(rename = "session")]
    Session(Identity),
    /// Current presence list, broadcast on every connect and disconnect.
    #[serde(rename = "users")]
    PresenceUpdate { users: Vec<Identity> },
    /// Connection id of a departing participant.
    #[serde(rename = "user-away")]
    UserDeparted(String),
    #[serde(rename = "message-to-user")]
    MessageDelivered(DeliveredMessage),
    #[serde(rename = "stored-messages")]
    HistoryResult { messages: Vec<Message> },
    #[serde(rename = "error")]
    Error { message: String },
}

impl OutboundEvent {
    /// Wire name of the event, used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::Session(_) => "session",
            OutboundEvent::PresenceUpdate { .. } => "users",
            OutboundEvent::UserDeparted(_) => "user-away",
            OutboundEvent::MessageDelivered(_) => "message-to-user",
            OutboundEvent::HistoryResult { .. } => "stored-messages",
            OutboundEvent::Error { .. } => "error",
        }
    }
}

/// Body of `POST /session`.
#[derive(Debug, Deserialize)]
pub struct SessionRequest {
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_inbound_send_message_wire_format() {
        let frame = json!({
            "event": "message-to-server",
            "data": { "from": "ignored", "to": "b1", "message": "hi", "time": "T1" }
        });
        let event: InboundEvent = serde_json::from_value(frame).unwrap();
        assert_eq!(
            event,
            InboundEvent::SendMessage(SendMessage {
                to: "b1".into(),
                message: "hi".into(),
                time: "T1".into(),
            })
        );
    }

    #[test]
    fn test_inbound_fetch_wire_format() {
        let event: InboundEvent =
            serde_json::from_str(r#"{"event":"fetch-messages","data":{"receiver":"b1"}}"#)
                .unwrap();
        assert_eq!(
            event,
            InboundEvent::FetchHistory(FetchHistory {
                receiver: "b1".into()
            })
        );
    }

    #[test]
    fn test_unknown_inbound_event_is_rejected() {
        let result = serde_json::from_str::<InboundEvent>(r#"{"event":"typing","data":{}}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_outbound_wire_format() {
        let presence = OutboundEvent::PresenceUpdate {
            users: vec![Identity::new("alice", "a1")],
        };
        assert_eq!(
            serde_json::to_value(&presence).unwrap(),
            json!({ "event": "users", "data": { "users": [{ "username": "alice", "userID": "a1" }] } })
        );

        let away = OutboundEvent::UserDeparted("a1".into());
        assert_eq!(
            serde_json::to_value(&away).unwrap(),
            json!({ "event": "user-away", "data": "a1" })
        );

        let delivered = OutboundEvent::MessageDelivered(DeliveredMessage::new(
            "a1",
            SendMessage {
                to: "b1".into(),
                message: "hi".into(),
                time: "T1".into(),
            },
        ));
        assert_eq!(
            serde_json::to_value(&delivered).unwrap(),
            json!({
                "event": "message-to-user",
                "data": { "from": "a1", "to": "b1", "message": "hi", "time": "T1" }
            })
        );
        assert_eq!(delivered.name(), "message-to-user");
    }
}
