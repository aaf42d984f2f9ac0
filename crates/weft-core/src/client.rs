//! Outbound surface of one account.

use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{TransportError, TransportResult};
use crate::event::{Event, MessageContent, types};
use crate::transport::BoxedTransport;

/// The send/query handle of one account.
///
/// Cheap to clone. Plugins receive it through their account proxy and through
/// every [`EventContext`](../weft_framework/struct.EventContext.html) they
/// handle.
#[derive(Clone)]
pub struct Client {
    user_id: Arc<str>,
    transport: BoxedTransport,
}

impl Client {
    pub fn new(user_id: impl Into<Arc<str>>, transport: BoxedTransport) -> Self {
        Self {
            user_id: user_id.into(),
            transport,
        }
    }

    /// The account's own user id.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// The underlying transport.
    pub fn transport(&self) -> &BoxedTransport {
        &self.transport
    }

    /// Sends an arbitrary room event.
    pub async fn send_event(
        &self,
        room_id: &str,
        event_type: &str,
        content: Value,
    ) -> TransportResult<String> {
        debug!(account = %self.user_id, room_id, event_type, "Sending event");
        self.transport.send_event(room_id, event_type, content).await
    }

    /// Sends `m.room.message` content.
    pub async fn send_message(
        &self,
        room_id: &str,
        content: MessageContent,
    ) -> TransportResult<String> {
        let content = serde_json::to_value(content).map_err(TransportError::from)?;
        self.send_event(room_id, types::ROOM_MESSAGE, content).await
    }

    /// Sends a plain `m.text` message.
    pub async fn send_text(&self, room_id: &str, body: &str) -> TransportResult<String> {
        self.send_message(room_id, MessageContent::text(body)).await
    }

    /// Sends a plain `m.notice` message.
    pub async fn send_notice(&self, room_id: &str, body: &str) -> TransportResult<String> {
        self.send_message(room_id, MessageContent::notice(body))
            .await
    }

    /// Sends an `m.notice` into the event's room, without a reply relation.
    pub async fn respond(&self, event: &Event, body: &str) -> TransportResult<String> {
        self.send_notice(&event.room_id, body).await
    }

    /// Sends an `m.notice` as a reply to `event`.
    pub async fn reply(&self, event: &Event, body: &str) -> TransportResult<String> {
        let content = MessageContent::notice(body).in_reply_to(&event.event_id);
        self.send_message(&event.room_id, content).await
    }

    pub async fn join_room(&self, room_id_or_alias: &str) -> TransportResult<String> {
        self.transport.join_room(room_id_or_alias).await
    }

    /// Marks `event` as read.
    pub async fn mark_read(&self, event: &Event) -> TransportResult<()> {
        self.transport
            .mark_read(&event.room_id, &event.event_id)
            .await
    }

    pub async fn get_event(&self, room_id: &str, event_id: &str) -> TransportResult<Event> {
        self.transport.get_event(room_id, event_id).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}
