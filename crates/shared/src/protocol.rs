//! Wire protocol between clients and the relay.
//!
//! Every frame is a JSON text frame holding a [`WsEnvelope`]. The payload is
//! adjacently tagged, so a frame looks like:
//!
//! ```json
//! { "id": "…", "type": "message.send", "data": { … }, "ts": "…" }
//! ```

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::lenient;
use crate::models::{ChatMessage, Identity};

// --- WebSocket ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    /// Empty when the sender left it out.
    #[serde(default, deserialize_with = "lenient::string")]
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    #[serde(default = "Utc::now", deserialize_with = "lenient::timestamp")]
    pub ts: DateTime<Utc>,
    #[serde(
        default,
        deserialize_with = "lenient::optional_string",
        skip_serializing_if = "Option::is_none"
    )]
    pub correlation_id: Option<String>,
}

impl<T> WsEnvelope<T> {
    /// Wrap a payload in a freshly stamped envelope.
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
            correlation_id: None,
        }
    }

    /// Wrap a payload produced in response to (or relayed from) `origin`.
    /// An origin without an id leaves the envelope uncorrelated.
    pub fn correlated(payload: T, origin: &str) -> Self {
        Self {
            correlation_id: (!origin.is_empty()).then(|| origin.to_string()),
            ..Self::new(payload)
        }
    }
}

impl<T: Serialize> WsEnvelope<T> {
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(ProtocolError::Encode)
    }
}

impl<T: DeserializeOwned> WsEnvelope<T> {
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}

/// Events a client emits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ClientCommand {
    /// Declare (or re-declare) the identity behind this connection.
    #[serde(rename = "user.join")]
    Join(Identity),
    #[serde(rename = "message.send")]
    SendMessage(ChatMessage),
    /// Remove a message by id.
    #[serde(rename = "message.delete")]
    DeleteMessage(String),
    #[serde(rename = "typing.start")]
    Typing(Identity),
    #[serde(rename = "typing.stop")]
    StopTyping(Identity),
}

impl ClientCommand {
    pub fn command_kind(&self) -> CommandKind {
        match self {
            ClientCommand::Join(_) => CommandKind::Join,
            ClientCommand::SendMessage(_) => CommandKind::SendMessage,
            ClientCommand::DeleteMessage(_) => CommandKind::DeleteMessage,
            ClientCommand::Typing(_) => CommandKind::Typing,
            ClientCommand::StopTyping(_) => CommandKind::StopTyping,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.command_kind().tag()
    }
}

/// The tag of a [`ClientCommand`] without its data, for forwarding frames
/// whose data is never decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Join,
    SendMessage,
    DeleteMessage,
    Typing,
    StopTyping,
}

impl CommandKind {
    pub const ALL: [CommandKind; 5] = [
        CommandKind::Join,
        CommandKind::SendMessage,
        CommandKind::DeleteMessage,
        CommandKind::Typing,
        CommandKind::StopTyping,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn tag(self) -> &'static str {
        match self {
            CommandKind::Join => "user.join",
            CommandKind::SendMessage => "message.send",
            CommandKind::DeleteMessage => "message.delete",
            CommandKind::Typing => "typing.start",
            CommandKind::StopTyping => "typing.stop",
        }
    }

    /// Tag of the [`ServerEvent`] this command is relayed as.
    pub fn event_tag(self) -> &'static str {
        match self {
            CommandKind::Join => "user.joined",
            CommandKind::SendMessage => "message.new",
            CommandKind::DeleteMessage => "message.deleted",
            CommandKind::Typing => "typing.start",
            CommandKind::StopTyping => "typing.stop",
        }
    }
}

/// Tag of the departure event the relay generates itself.
pub const USER_LEFT: &str = "user.left";

/// Events the relay delivers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "user.joined")]
    UserJoined(Identity),
    /// Generated by the relay when a joined connection goes away.
    #[serde(rename = "user.left")]
    UserLeft(Identity),
    #[serde(rename = "message.new")]
    MessageNew(ChatMessage),
    #[serde(rename = "message.deleted")]
    MessageDeleted(String),
    #[serde(rename = "typing.start")]
    Typing(Identity),
    #[serde(rename = "typing.stop")]
    StopTyping(Identity),
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::UserJoined(_) => "user.joined",
            ServerEvent::UserLeft(_) => USER_LEFT,
            ServerEvent::MessageNew(_) => "message.new",
            ServerEvent::MessageDeleted(_) => "message.deleted",
            ServerEvent::Typing(_) => "typing.start",
            ServerEvent::StopTyping(_) => "typing.stop",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_frame_shape() {
        let envelope = WsEnvelope::new(ClientCommand::DeleteMessage("m1".into()));
        let json: serde_json::Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();

        assert_eq!(json["type"], "message.delete");
        assert_eq!(json["data"], "m1");
        assert!(json.get("correlationId").is_none());
        assert!(json["id"].is_string());
    }

    #[test]
    fn test_decode_join_with_partial_identity() {
        let text = r#"{"id":"e1","type":"user.join","data":{"username":"Bob"}}"#;
        let envelope = WsEnvelope::<ClientCommand>::decode(text).unwrap();

        match envelope.payload {
            ClientCommand::Join(identity) => {
                assert_eq!(identity.username, "Bob");
                assert!(identity.user_id.is_empty());
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        let text = r#"{"id":"e1","type":"room.create","data":{},"ts":"2024-05-01T10:00:00Z"}"#;
        assert!(matches!(
            WsEnvelope::<ClientCommand>::decode(text),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_envelope_fields_are_optional() {
        let text = r#"{"type":"message.delete","data":"m1"}"#;
        let envelope = WsEnvelope::<ClientCommand>::decode(text).unwrap();
        assert!(envelope.id.is_empty());
        assert_eq!(envelope.payload, ClientCommand::DeleteMessage("m1".into()));

        let text =
            r#"{"id":null,"ts":"yesterday","correlationId":5,"type":"typing.stop","data":{}}"#;
        let envelope = WsEnvelope::<ServerEvent>::decode(text).unwrap();
        assert!(envelope.correlation_id.is_none());
        assert_eq!(envelope.payload, ServerEvent::StopTyping(Identity::default()));
    }

    #[test]
    fn test_uncorrelated_when_origin_has_no_id() {
        let event = WsEnvelope::correlated(ServerEvent::MessageDeleted("m1".into()), "");
        assert!(event.correlation_id.is_none());
    }

    #[test]
    fn test_command_kinds_match_wire_tags() {
        let who = Identity::default();
        let msg = ChatMessage::default();
        let commands = [
            (ClientCommand::Join(who.clone()), ServerEvent::UserJoined(who.clone())),
            (ClientCommand::SendMessage(msg.clone()), ServerEvent::MessageNew(msg)),
            (ClientCommand::DeleteMessage("m1".into()), ServerEvent::MessageDeleted("m1".into())),
            (ClientCommand::Typing(who.clone()), ServerEvent::Typing(who.clone())),
            (ClientCommand::StopTyping(who.clone()), ServerEvent::StopTyping(who)),
        ];
        for (cmd, event) in commands {
            let kind = cmd.command_kind();
            assert_eq!(CommandKind::from_tag(cmd.kind()), Some(kind));
            assert_eq!(kind.event_tag(), event.kind());
        }
        assert_eq!(CommandKind::from_tag("room.create"), None);
    }

    #[test]
    fn test_correlated_event_keeps_origin() {
        let event = WsEnvelope::correlated(ServerEvent::MessageDeleted("m1".into()), "e1");
        let json: serde_json::Value = serde_json::from_str(&event.encode().unwrap()).unwrap();
        assert_eq!(json["correlationId"], "e1");
        assert_eq!(json["type"], "message.deleted");

        let back = WsEnvelope::<ServerEvent>::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(back.payload, ServerEvent::MessageDeleted("m1".into()));
    }

    #[test]
    fn test_kind_matches_wire_tag() {
        let cmd = ClientCommand::Typing(Identity::default());
        let json = serde_json::to_value(&cmd).unwrap();
        assert_eq!(json["type"], cmd.kind());

        let event = ServerEvent::UserLeft(Identity::default());
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind());
    }
}
