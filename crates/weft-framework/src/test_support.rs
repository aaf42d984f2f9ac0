//! Shared fixtures for unit tests.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use weft_core::{Event, SyncBatch, Transport, TransportError, TransportResult};

/// Transport that records sent events and never syncs anything.
#[derive(Default)]
pub(crate) struct MockTransport {
    pub sent: Mutex<Vec<(String, String, Value)>>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn whoami(&self) -> TransportResult<String> {
        Ok("@bot:hs".into())
    }

    async fn create_filter(&self, _user_id: &str, _filter: Value) -> TransportResult<String> {
        Ok("filter".into())
    }

    async fn sync(
        &self,
        _since: Option<&str>,
        _filter_id: Option<&str>,
        _timeout: Duration,
    ) -> TransportResult<SyncBatch> {
        Ok(SyncBatch::default())
    }

    async fn send_event(
        &self,
        room_id: &str,
        event_type: &str,
        content: Value,
    ) -> TransportResult<String> {
        let mut sent = self.sent.lock();
        sent.push((room_id.into(), event_type.into(), content));
        Ok(format!("$sent{}", sent.len()))
    }

    async fn join_room(&self, room_id_or_alias: &str) -> TransportResult<String> {
        Ok(room_id_or_alias.into())
    }

    async fn mark_read(&self, _room_id: &str, _event_id: &str) -> TransportResult<()> {
        Ok(())
    }

    async fn get_event(&self, _room_id: &str, event_id: &str) -> TransportResult<Event> {
        Err(TransportError::Http {
            status: 404,
            errcode: "M_NOT_FOUND".into(),
            message: format!("{event_id} not found"),
        })
    }
}

pub(crate) fn message_from(sender: &str, body: &str) -> Event {
    serde_json::from_value(json!({
        "type": "m.room.message",
        "event_id": "$event",
        "sender": sender,
        "room_id": "!room:hs",
        "content": { "msgtype": "m.text", "body": body }
    }))
    .unwrap()
}

pub(crate) fn message(body: &str) -> Event {
    message_from("@alice:hs", body)
}
