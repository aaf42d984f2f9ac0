//! Typed event model.
//!
//! Events arrive from the homeserver as JSON. The well-known content shapes
//! that the host itself inspects (messages and memberships) are decoded into
//! typed structs; everything else is carried as [`EventContent::Generic`]
//! with the raw JSON intact, so plugins can still reach every field through
//! [`EventContent::get`].
//!
//! Events are immutable values. Anything that needs to *act* on an event
//! (reply, mark it read, ...) goes through a [`Client`](crate::Client).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::json;

/// Well-known event types.
pub mod types {
    /// Room message.
    pub const ROOM_MESSAGE: &str = "m.room.message";
    /// Room membership change.
    pub const ROOM_MEMBER: &str = "m.room.member";
    /// Room name.
    pub const ROOM_NAME: &str = "m.room.name";
    /// Room topic.
    pub const ROOM_TOPIC: &str = "m.room.topic";
    /// Redaction.
    pub const ROOM_REDACTION: &str = "m.room.redaction";
}

// ============================================================================
// Content
// ============================================================================

/// Membership state carried by `m.room.member` events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Join,
    Invite,
    Leave,
    Ban,
    Knock,
    #[serde(other)]
    Unknown,
}

/// Content of an `m.room.message` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageContent {
    /// `m.text`, `m.notice`, `m.emote`, ...
    pub msgtype: String,
    /// Plain-text body.
    pub body: String,
    /// Every other field (`format`, `formatted_body`, relations, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl MessageContent {
    /// Plain `m.text` content.
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            msgtype: "m.text".to_string(),
            body: body.into(),
            extra: Map::new(),
        }
    }

    /// Plain `m.notice` content, the msgtype bots are expected to use.
    pub fn notice(body: impl Into<String>) -> Self {
        Self {
            msgtype: "m.notice".to_string(),
            body: body.into(),
            extra: Map::new(),
        }
    }

    /// Marks this content as a reply to `event_id`.
    pub fn in_reply_to(mut self, event_id: &str) -> Self {
        self.extra.insert(
            "m.relates_to".to_string(),
            serde_json::json!({ "m.in_reply_to": { "event_id": event_id } }),
        );
        self
    }
}

/// Content of an `m.room.member` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberContent {
    pub membership: Membership,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub displayname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Decoded event content.
#[derive(Debug, Clone, PartialEq)]
pub enum EventContent {
    Message(MessageContent),
    Member(MemberContent),
    /// Any content the host does not decode, kept as raw JSON.
    Generic(Value),
}

impl EventContent {
    /// Decodes raw content according to the event type.
    ///
    /// Content that does not fit the expected shape (e.g. a redacted message
    /// without a body) falls back to [`EventContent::Generic`].
    pub fn parse(event_type: &str, raw: Value) -> Self {
        match event_type {
            types::ROOM_MESSAGE => match MessageContent::deserialize(&raw) {
                Ok(content) => Self::Message(content),
                Err(_) => Self::Generic(raw),
            },
            types::ROOM_MEMBER => match MemberContent::deserialize(&raw) {
                Ok(content) => Self::Member(content),
                Err(_) => Self::Generic(raw),
            },
            _ => Self::Generic(raw),
        }
    }

    /// Re-encodes the content as JSON.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Message(content) => serde_json::to_value(content).unwrap_or(Value::Null),
            Self::Member(content) => serde_json::to_value(content).unwrap_or(Value::Null),
            Self::Generic(raw) => raw.clone(),
        }
    }

    /// Deep-gets a field by dotted path (see [`json::resolve`]).
    pub fn get(&self, path: &str) -> Option<Value> {
        match self {
            Self::Message(content) if path == "body" => Some(Value::String(content.body.clone())),
            Self::Message(content) if path == "msgtype" => {
                Some(Value::String(content.msgtype.clone()))
            }
            Self::Generic(raw) => json::resolve(raw, path).cloned(),
            _ => json::resolve(&self.to_value(), path).cloned(),
        }
    }
}

impl Default for EventContent {
    fn default() -> Self {
        Self::Generic(Value::Object(Map::new()))
    }
}

// ============================================================================
// Event
// ============================================================================

/// Data the homeserver attaches outside the signed event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Unsigned {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces_state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
}

/// A single room event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawEvent", into = "RawEvent")]
pub struct Event {
    pub event_id: String,
    pub event_type: String,
    pub sender: String,
    /// Sync responses omit this; the room map key is filled in afterwards.
    pub room_id: String,
    /// Present exactly on state events.
    pub state_key: Option<String>,
    pub origin_server_ts: i64,
    pub content: EventContent,
    pub redacts: Option<String>,
    pub unsigned: Unsigned,
}

impl Event {
    /// Returns `true` for state events.
    pub fn is_state(&self) -> bool {
        self.state_key.is_some()
    }

    /// Returns the message body of `m.room.message` events.
    pub fn body(&self) -> Option<&str> {
        match &self.content {
            EventContent::Message(content) => Some(&content.body),
            _ => None,
        }
    }

    /// Returns the new membership of `m.room.member` events.
    pub fn membership(&self) -> Option<Membership> {
        match &self.content {
            EventContent::Member(content) => Some(content.membership),
            _ => None,
        }
    }

    /// Returns `true` if this is a membership event about `user_id`
    /// moving into `membership`.
    pub fn is_membership_of(&self, user_id: &str, membership: Membership) -> bool {
        self.event_type == types::ROOM_MEMBER
            && self.state_key.as_deref() == Some(user_id)
            && self.membership() == Some(membership)
    }

    /// Encodes the full event as JSON in wire shape.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(RawEvent::from(self.clone())).unwrap_or(Value::Null)
    }
}

/// Wire shape of an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawEvent {
    #[serde(default)]
    event_id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    sender: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    room_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    state_key: Option<String>,
    #[serde(default)]
    origin_server_ts: i64,
    #[serde(default)]
    content: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    redacts: Option<String>,
    #[serde(default)]
    unsigned: Unsigned,
}

impl From<RawEvent> for Event {
    fn from(raw: RawEvent) -> Self {
        let content = EventContent::parse(&raw.event_type, raw.content);
        Self {
            event_id: raw.event_id,
            event_type: raw.event_type,
            sender: raw.sender,
            room_id: raw.room_id,
            state_key: raw.state_key,
            origin_server_ts: raw.origin_server_ts,
            content,
            redacts: raw.redacts,
            unsigned: raw.unsigned,
        }
    }
}

impl From<Event> for RawEvent {
    fn from(event: Event) -> Self {
        Self {
            content: event.content.to_value(),
            event_id: event.event_id,
            event_type: event.event_type,
            sender: event.sender,
            room_id: event.room_id,
            state_key: event.state_key,
            origin_server_ts: event.origin_server_ts,
            redacts: event.redacts,
            unsigned: event.unsigned,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_message_event() {
        let event: Event = serde_json::from_value(json!({
            "type": "m.room.message",
            "event_id": "$1",
            "sender": "@alice:example.org",
            "origin_server_ts": 1000,
            "content": { "msgtype": "m.text", "body": "ping", "format": "org.matrix.custom.html" }
        }))
        .unwrap();

        assert_eq!(event.body(), Some("ping"));
        assert!(!event.is_state());
        assert_eq!(
            event.content.get("format"),
            Some(json!("org.matrix.custom.html"))
        );
    }

    #[test]
    fn test_parse_member_event() {
        let event: Event = serde_json::from_value(json!({
            "type": "m.room.member",
            "event_id": "$2",
            "sender": "@bot:example.org",
            "state_key": "@bot:example.org",
            "content": { "membership": "join", "displayname": "Bot" }
        }))
        .unwrap();

        assert!(event.is_state());
        assert_eq!(event.membership(), Some(Membership::Join));
        assert!(event.is_membership_of("@bot:example.org", Membership::Join));
        assert!(!event.is_membership_of("@other:example.org", Membership::Join));
    }

    #[test]
    fn test_malformed_message_falls_back_to_generic() {
        let event: Event = serde_json::from_value(json!({
            "type": "m.room.message",
            "event_id": "$3",
            "sender": "@alice:example.org",
            "content": {}
        }))
        .unwrap();

        assert!(matches!(event.content, EventContent::Generic(_)));
        assert_eq!(event.body(), None);
    }

    #[test]
    fn test_unknown_membership() {
        let content = EventContent::parse(types::ROOM_MEMBER, json!({ "membership": "weird" }));
        match content {
            EventContent::Member(member) => assert_eq!(member.membership, Membership::Unknown),
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn test_to_value_keeps_wire_shape() {
        let event: Event = serde_json::from_value(json!({
            "type": "m.room.message",
            "event_id": "$4",
            "sender": "@alice:example.org",
            "room_id": "!room:example.org",
            "content": { "msgtype": "m.notice", "body": "hi" }
        }))
        .unwrap();

        let value = event.to_value();
        assert_eq!(value["type"], "m.room.message");
        assert_eq!(value["content"]["msgtype"], "m.notice");
        assert_eq!(value["room_id"], "!room:example.org");
    }
}
