//! The messaging-backend collaborator.
//!
//! The host never encodes wire requests itself; it only consumes these
//! primitives and decides when to poll and how long to wait between
//! failures. `weft-transport` ships an HTTP implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportResult;
use crate::event::Event;
use crate::store::AccountRecord;
use crate::sync::SyncBatch;

/// Primitives one account needs from the homeserver.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Returns the user id the credentials belong to.
    async fn whoami(&self) -> TransportResult<String>;

    /// Uploads a feed filter and returns its identifier.
    async fn create_filter(&self, user_id: &str, filter: Value) -> TransportResult<String>;

    /// Long-polls the incremental feed.
    ///
    /// `since` is the cursor of the previous batch (`None` for an initial
    /// sync); `timeout` is how long the server may hold the request open.
    async fn sync(
        &self,
        since: Option<&str>,
        filter_id: Option<&str>,
        timeout: Duration,
    ) -> TransportResult<SyncBatch>;

    /// Sends a room event and returns its event id.
    async fn send_event(
        &self,
        room_id: &str,
        event_type: &str,
        content: Value,
    ) -> TransportResult<String>;

    /// Joins a room by id or alias and returns the room id.
    async fn join_room(&self, room_id_or_alias: &str) -> TransportResult<String>;

    /// Sends a read receipt.
    async fn mark_read(&self, room_id: &str, event_id: &str) -> TransportResult<()>;

    /// Fetches a single event.
    async fn get_event(&self, room_id: &str, event_id: &str) -> TransportResult<Event>;
}

/// Shared transport handle.
pub type BoxedTransport = Arc<dyn Transport>;

/// Builds a transport for a persisted account.
pub trait TransportFactory: Send + Sync {
    fn connect(&self, account: &AccountRecord) -> TransportResult<BoxedTransport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&AccountRecord) -> TransportResult<BoxedTransport> + Send + Sync,
{
    fn connect(&self, account: &AccountRecord) -> TransportResult<BoxedTransport> {
        self(account)
    }
}
