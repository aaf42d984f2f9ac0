//! The restricted account view a plugin works through.
//!
//! Every registration made through an [`AccountProxy`] is tagged with the
//! proxy's owner id, and every handler is wrapped so it ignores events the
//! account sent itself. Outbound calls pass straight through to the
//! account's [`Client`].

use std::sync::Arc;

use serde_json::Value;
use weft_core::{Client, CommandSpec, Event, StoreResult, TransportResult};

use crate::account::AccountHandle;
use crate::handler::{CommandHandler, IgnoreOwn, Listener};
use crate::spec::SpecUpdate;

/// One plugin's view of its account.
#[derive(Debug, Clone)]
pub struct AccountProxy {
    owner: Arc<str>,
    account: AccountHandle,
}

impl AccountProxy {
    pub(crate) fn new(owner: impl Into<Arc<str>>, account: AccountHandle) -> Self {
        Self {
            owner: owner.into(),
            account,
        }
    }

    /// The owner id every registration is scoped to.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn user_id(&self) -> &str {
        self.account.user_id()
    }

    pub fn client(&self) -> &Client {
        self.account.client()
    }

    // ─── Registration ───────────────────────────────────────────────────────

    /// Sets this owner's command spec on the account.
    pub async fn set_spec(&self, spec: CommandSpec) -> StoreResult<SpecUpdate> {
        self.account.specs().set_spec(&self.owner, spec).await
    }

    /// Appends a handler for an active command (by syntax) or a passive
    /// command (by name).
    pub fn add_command_handler(&self, command: &str, handler: impl CommandHandler) {
        self.account.dispatcher().add_command_handler(
            &self.owner,
            command,
            IgnoreOwn::new(self.user_id(), handler),
        );
    }

    /// Appends a listener for `event_type`, or `"*"` for every event.
    pub fn add_listener(&self, event_type: &str, listener: impl Listener) {
        self.account.dispatcher().add_listener(
            &self.owner,
            event_type,
            IgnoreOwn::new(self.user_id(), listener),
        );
    }

    // ─── Outbound ───────────────────────────────────────────────────────────

    pub async fn send_event(
        &self,
        room_id: &str,
        event_type: &str,
        content: Value,
    ) -> TransportResult<String> {
        self.client().send_event(room_id, event_type, content).await
    }

    pub async fn send_text(&self, room_id: &str, body: &str) -> TransportResult<String> {
        self.client().send_text(room_id, body).await
    }

    pub async fn send_notice(&self, room_id: &str, body: &str) -> TransportResult<String> {
        self.client().send_notice(room_id, body).await
    }

    pub async fn reply(&self, event: &Event, body: &str) -> TransportResult<String> {
        self.client().reply(event, body).await
    }

    pub async fn join_room(&self, room_id_or_alias: &str) -> TransportResult<String> {
        self.client().join_room(room_id_or_alias).await
    }

    pub async fn mark_read(&self, event: &Event) -> TransportResult<()> {
        self.client().mark_read(event).await
    }

    pub async fn get_event(&self, room_id: &str, event_id: &str) -> TransportResult<Event> {
        self.client().get_event(room_id, event_id).await
    }
}
