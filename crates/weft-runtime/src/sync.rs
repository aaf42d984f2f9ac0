//! Per-account sync loop.
//!
//! Each account with sync enabled runs one [`SyncProcessor`] task:
//!
//! ```text
//!   prepare (whoami, filter) ──▶ poll ──▶ process batch ──▶ persist cursor ─┐
//!                                 ▲                                         │
//!                                 └─────────────────────────────────────────┘
//! ```
//!
//! Batches of one account are processed strictly in sequence. A failed poll
//! or batch waits the retry delay and polls again with the cursor unchanged,
//! forever, until the loop is cancelled.

use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::{Value, json};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace, warn};
use weft_core::{
    AccountRecord, Event, Membership, RoomStateStore, Store, StoreError, SyncBatch,
    TransportError, TransportResult,
};
use weft_framework::AccountHandle;

use crate::account::Account;
use crate::config::SyncConfig;

/// Errors that end one iteration of the sync loop.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A handler panicked while the batch was being applied.
    #[error("batch processing panicked: {0}")]
    BatchPanicked(String),

    /// The access token belongs to a different user.
    #[error("access token belongs to {actual}, expected {expected}")]
    IdentityMismatch { expected: String, actual: String },
}

/// Timing and filter settings of the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    pub retry_delay: Duration,
    pub timeout: Duration,
    pub timeline_limit: u32,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self::from(&SyncConfig::default())
    }
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            retry_delay: config.retry_delay(),
            timeout: config.timeout(),
            timeline_limit: config.timeline_limit,
        }
    }
}

/// What processing one batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// The batch was the account's first and was dropped unseen.
    pub discarded: bool,
    /// Rooms whose data was dropped because the account joined them in this batch.
    pub joined_rooms_skipped: usize,
    pub dispatched: usize,
}

/// Feed filter created for accounts without one.
pub fn sync_filter(timeline_limit: u32) -> Value {
    json!({
        "room": {
            "timeline": { "limit": timeline_limit },
            "state": { "lazy_load_members": true }
        },
        "presence": { "not_types": ["*"] }
    })
}

// =============================================================================
// Batch ordering
// =============================================================================

/// Events of one batch in the order they are applied, after anti-replay.
#[derive(Debug, Default)]
pub struct OrderedBatch {
    pub events: Vec<Event>,
    /// Rooms dropped because the batch contains the account's own join.
    pub skipped_rooms: Vec<String>,
}

/// Flattens a batch into dispatch order.
///
/// A joined room whose timeline contains the account's own join is dropped
/// entirely, invite included: the join itself means the history in that
/// batch predates the account and must not be replayed at it.
///
/// The rest is emitted in four passes, each in room arrival order:
/// joined state, joined timeline, invite state, then the state events of
/// left-room timelines.
pub fn order_batch(user_id: &str, batch: SyncBatch) -> OrderedBatch {
    let rooms = batch.rooms;

    let skipped: HashSet<&str> = rooms
        .join
        .iter()
        .filter(|(_, room)| {
            room.timeline
                .events
                .iter()
                .rev()
                .any(|event| event.is_membership_of(user_id, Membership::Join))
        })
        .map(|(room_id, _)| room_id.as_str())
        .collect();
    let skipped_rooms: Vec<String> = rooms
        .join
        .keys()
        .filter(|id| skipped.contains(id.as_str()))
        .cloned()
        .collect();

    let mut events = Vec::new();
    let joined = || {
        rooms
            .join
            .iter()
            .filter(|(room_id, _)| !skipped.contains(room_id.as_str()))
            .map(|(_, room)| room)
    };

    for room in joined() {
        events.extend(room.state.events.iter().cloned());
    }
    for room in joined() {
        events.extend(room.timeline.events.iter().cloned());
    }
    for (room_id, room) in &rooms.invite {
        if !skipped.contains(room_id.as_str()) {
            events.extend(room.invite_state.events.iter().cloned());
        }
    }
    for room in rooms.leave.values() {
        events.extend(room.timeline.events.iter().filter(|e| e.is_state()).cloned());
    }

    OrderedBatch {
        events,
        skipped_rooms,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// =============================================================================
// SyncProcessor
// =============================================================================

/// Drives one account's incremental feed.
pub struct SyncProcessor {
    account: AccountHandle,
    record: AccountRecord,
    store: Arc<dyn Store>,
    room_state: Arc<dyn RoomStateStore>,
    settings: SyncSettings,
}

impl SyncProcessor {
    pub fn new(
        account: &Account,
        store: Arc<dyn Store>,
        room_state: Arc<dyn RoomStateStore>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            account: account.handle().clone(),
            record: account.record().clone(),
            store,
            room_state,
            settings,
        }
    }

    /// The account record as last persisted by this loop.
    pub fn record(&self) -> &AccountRecord {
        &self.record
    }

    fn user_id(&self) -> &str {
        &self.record.user_id
    }

    /// Checks the token's identity and makes sure a feed filter exists.
    pub async fn prepare(&mut self) -> Result<(), SyncError> {
        let transport = self.account.client().transport();

        let actual = transport.whoami().await?;
        if actual != self.record.user_id {
            return Err(SyncError::IdentityMismatch {
                expected: self.record.user_id.clone(),
                actual,
            });
        }

        if self.record.filter_id.is_empty() {
            let filter = sync_filter(self.settings.timeline_limit);
            let filter_id = transport.create_filter(&self.record.user_id, filter).await?;
            self.record.filter_id = filter_id;
            self.store.update_account(&self.record).await?;
            info!(filter_id = %self.record.filter_id, "Created feed filter");
        }
        Ok(())
    }

    /// Long-polls the next batch from the stored cursor.
    pub async fn poll(&self) -> TransportResult<SyncBatch> {
        let filter = (!self.record.filter_id.is_empty()).then_some(self.record.filter_id.as_str());
        self.account
            .client()
            .transport()
            .sync(self.record.cursor(), filter, self.settings.timeout)
            .await
    }

    /// Applies one batch and advances the cursor.
    ///
    /// The cursor only moves once every event of the batch has been
    /// dispatched. A handler panic leaves it where it was.
    pub async fn process_batch(&mut self, mut batch: SyncBatch) -> Result<BatchReport, SyncError> {
        batch.fill_room_ids();
        let next_batch = std::mem::take(&mut batch.next_batch);
        let span = info_span!("batch", next_batch = %next_batch);

        async move {
            let mut report = BatchReport::default();

            if self.record.cursor().is_none() {
                debug!("First batch, skipping its events");
                report.discarded = true;
            } else {
                let ordered = order_batch(self.user_id(), batch);
                for room_id in &ordered.skipped_rooms {
                    debug!(%room_id, "Room joined in this batch, skipping its history");
                }
                report.joined_rooms_skipped = ordered.skipped_rooms.len();

                report.dispatched = AssertUnwindSafe(self.apply(ordered.events))
                    .catch_unwind()
                    .await
                    .map_err(|payload| SyncError::BatchPanicked(panic_message(&*payload)))??;
            }

            self.record.next_batch = next_batch;
            self.store.update_account(&self.record).await?;
            trace!(dispatched = report.dispatched, "Batch applied");
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn apply(&self, events: Vec<Event>) -> Result<usize, SyncError> {
        let mut dispatched = 0;
        for event in events {
            if event.is_state() {
                self.room_state.apply(&event).await?;
            }
            self.account.dispatch(Arc::new(event)).await;
            dispatched += 1;
        }
        Ok(dispatched)
    }

    /// Polls and processes one batch.
    pub async fn step(&mut self) -> Result<BatchReport, SyncError> {
        let batch = self.poll().await?;
        self.process_batch(batch).await
    }

    /// Runs until `cancel` fires or the account turns out to belong to
    /// someone else.
    pub async fn run(mut self, cancel: CancellationToken) {
        let span = info_span!("sync", account = %self.record.user_id);
        async move {
            info!("Sync loop started");
            if self.prepare_until_ready(&cancel).await {
                self.poll_until_cancelled(&cancel).await;
            }
            info!("Sync loop stopped");
        }
        .instrument(span)
        .await
    }

    async fn prepare_until_ready(&mut self, cancel: &CancellationToken) -> bool {
        loop {
            let result = tokio::select! {
                _ = cancel.cancelled() => return false,
                result = self.prepare() => result,
            };
            match result {
                Ok(()) => return true,
                Err(SyncError::IdentityMismatch { expected, actual }) => {
                    error!(%expected, %actual, "Access token belongs to another user, disabling sync");
                    self.record.sync = false;
                    if let Err(e) = self.store.update_account(&self.record).await {
                        error!(error = %e, "Failed to persist disabled account");
                    }
                    return false;
                }
                Err(e) => {
                    warn!(error = %e, "Sync setup failed, retrying");
                    if !self.wait_retry(cancel).await {
                        return false;
                    }
                }
            }
        }
    }

    async fn poll_until_cancelled(&mut self, cancel: &CancellationToken) {
        loop {
            let batch = tokio::select! {
                _ = cancel.cancelled() => return,
                batch = self.poll() => batch,
            };

            let result = match batch {
                Ok(batch) => self.process_batch(batch).await,
                Err(e) => Err(e.into()),
            };

            match result {
                Ok(report) => {
                    if report.dispatched > 0 {
                        debug!(
                            dispatched = report.dispatched,
                            skipped_rooms = report.joined_rooms_skipped,
                            "Processed batch"
                        );
                    }
                }
                Err(e @ SyncError::BatchPanicked(_)) => {
                    error!(error = %e, cursor = %self.record.next_batch, "Batch aborted, retrying from cursor");
                    if !self.wait_retry(cancel).await {
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Sync failed, retrying");
                    if !self.wait_retry(cancel).await {
                        return;
                    }
                }
            }
        }
    }

    /// Sleeps the retry delay. Returns `false` if cancelled meanwhile.
    async fn wait_retry(&self, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.settings.retry_delay) => true,
        }
    }
}
