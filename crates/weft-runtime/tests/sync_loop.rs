//! Sync loop behaviour against a scripted transport.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use weft_core::event::types;
use weft_core::{
    AccountRecord, Event, MemoryRoomStateStore, MemoryStore, Membership, PluginRecord,
    RoomStateStore, Store, SyncBatch, Transport, TransportError, TransportResult,
};
use weft_framework::{EventContext, Propagation};
use weft_runtime::{Account, SyncError, SyncProcessor, SyncSettings};

const BOT: &str = "@bot:hs";

#[derive(Default)]
struct ScriptedTransport {
    whoami: String,
    batches: Mutex<VecDeque<TransportResult<SyncBatch>>>,
    polls: Mutex<Vec<Option<String>>>,
    filters: Mutex<Vec<Value>>,
    joined: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    fn new(batches: Vec<TransportResult<SyncBatch>>) -> Arc<Self> {
        Arc::new(Self {
            whoami: BOT.into(),
            batches: Mutex::new(batches.into()),
            ..Default::default()
        })
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn whoami(&self) -> TransportResult<String> {
        Ok(self.whoami.clone())
    }

    async fn create_filter(&self, _user_id: &str, filter: Value) -> TransportResult<String> {
        let mut filters = self.filters.lock();
        filters.push(filter);
        Ok(format!("f{}", filters.len()))
    }

    async fn sync(
        &self,
        since: Option<&str>,
        _filter_id: Option<&str>,
        _timeout: Duration,
    ) -> TransportResult<SyncBatch> {
        self.polls.lock().push(since.map(str::to_string));
        let next = self.batches.lock().pop_front();
        match next {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }

    async fn send_event(&self, _room: &str, _type: &str, _content: Value) -> TransportResult<String> {
        Ok("$sent".into())
    }

    async fn join_room(&self, room_id_or_alias: &str) -> TransportResult<String> {
        self.joined.lock().push(room_id_or_alias.to_string());
        Ok(room_id_or_alias.to_string())
    }

    async fn mark_read(&self, _room_id: &str, _event_id: &str) -> TransportResult<()> {
        Ok(())
    }

    async fn get_event(&self, _room_id: &str, _event_id: &str) -> TransportResult<Event> {
        Err(TransportError::InvalidResponse("not scripted".into()))
    }
}

struct Harness {
    transport: Arc<ScriptedTransport>,
    store: Arc<MemoryStore>,
    room_state: Arc<MemoryRoomStateStore>,
    account: Account,
    seen: Arc<Mutex<Vec<String>>>,
}

impl Harness {
    async fn new(record: AccountRecord, batches: Vec<TransportResult<SyncBatch>>) -> Self {
        let transport = ScriptedTransport::new(batches);
        Self::with_transport(record, transport).await
    }

    async fn with_transport(record: AccountRecord, transport: Arc<ScriptedTransport>) -> Self {
        let store = Arc::new(MemoryStore::seeded([record.clone()], Vec::<PluginRecord>::new()));
        let account = Account::new(record, transport.clone(), store.clone())
            .await
            .unwrap();

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        account
            .handle()
            .dispatcher()
            .add_listener("test", "*", move |ctx: EventContext| {
                let sink = sink.clone();
                async move {
                    if ctx.event().event_id == "$boom" {
                        panic!("listener exploded");
                    }
                    sink.lock().push(ctx.event().event_id.clone());
                    Propagation::Continue
                }
            });

        Self {
            transport,
            store,
            room_state: Arc::new(MemoryRoomStateStore::new()),
            account,
            seen,
        }
    }

    fn processor(&self) -> SyncProcessor {
        SyncProcessor::new(
            &self.account,
            self.store.clone(),
            self.room_state.clone(),
            SyncSettings {
                retry_delay: Duration::from_millis(10),
                timeout: Duration::from_secs(1),
                timeline_limit: 10,
            },
        )
    }

    fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }

    async fn stored(&self) -> AccountRecord {
        self.store.account(BOT).await.unwrap()
    }
}

fn record_with_cursor(cursor: &str) -> AccountRecord {
    let mut record = AccountRecord::new(BOT, "https://hs", "token");
    record.next_batch = cursor.into();
    record.filter_id = "f0".into();
    record
}

fn batch(value: Value) -> SyncBatch {
    serde_json::from_value(value).unwrap()
}

fn msg(id: &str) -> Value {
    json!({ "type": "m.room.message", "event_id": id, "sender": "@alice:hs",
            "content": { "msgtype": "m.text", "body": id } })
}

fn member(id: &str, user: &str, membership: &str) -> Value {
    json!({ "type": "m.room.member", "event_id": id, "sender": user, "state_key": user,
            "content": { "membership": membership } })
}

fn timeline_batch(next_batch: &str, events: Vec<Value>) -> SyncBatch {
    batch(json!({
        "next_batch": next_batch,
        "rooms": { "join": { "!room:hs": { "timeline": { "events": events } } } }
    }))
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn test_first_batch_is_discarded() {
    let harness = Harness::new(record_with_cursor(""), vec![]).await;
    let mut processor = harness.processor();

    let report = processor
        .process_batch(timeline_batch("s1", vec![msg("$old")]))
        .await
        .unwrap();

    assert!(report.discarded);
    assert!(harness.seen().is_empty());
    assert_eq!(harness.stored().await.next_batch, "s1");

    processor
        .process_batch(timeline_batch("s2", vec![msg("$new")]))
        .await
        .unwrap();
    assert_eq!(harness.seen(), ["$new"]);
    assert_eq!(harness.stored().await.next_batch, "s2");
}

#[tokio::test]
async fn test_passes_and_anti_replay() {
    let harness = Harness::new(record_with_cursor("s1"), vec![]).await;
    let mut processor = harness.processor();

    let report = processor
        .process_batch(batch(json!({
            "next_batch": "s2",
            "rooms": {
                "join": {
                    "!fresh:hs": {
                        "state": { "events": [member("$fresh-state", "@x:hs", "join")] },
                        "timeline": { "events": [msg("$history"), member("$me", BOT, "join")] }
                    },
                    "!known:hs": {
                        "state": { "events": [member("$known-state", "@y:hs", "join")] },
                        "timeline": { "events": [msg("$hello")] }
                    }
                },
                "invite": {
                    "!fresh:hs": { "invite_state": { "events": [member("$fresh-invite", BOT, "invite")] } },
                    "!other:hs": { "invite_state": { "events": [member("$invite", BOT, "invite")] } }
                },
                "leave": {
                    "!gone:hs": { "timeline": { "events": [msg("$gone-msg"), member("$left", BOT, "leave")] } }
                }
            }
        })))
        .await
        .unwrap();

    assert_eq!(report.joined_rooms_skipped, 1);
    assert_eq!(report.dispatched, 4);
    assert_eq!(
        harness.seen(),
        ["$known-state", "$hello", "$invite", "$left"]
    );
}

#[tokio::test]
async fn test_state_applied_before_dispatch() {
    let harness = Harness::new(record_with_cursor("s1"), vec![]).await;
    let room_state = harness.room_state.clone();
    let observed = Arc::new(Mutex::new(None));
    let sink = observed.clone();
    harness.account.handle().dispatcher().add_listener(
        "test",
        "m.room.member",
        move |ctx: EventContext| {
            let room_state = room_state.clone();
            let sink = sink.clone();
            async move {
                let state = room_state.load(&ctx.event().room_id).await.unwrap();
                *sink.lock() = state.membership("@carol:hs");
                Propagation::Continue
            }
        },
    );

    harness
        .processor()
        .process_batch(timeline_batch("s2", vec![member("$c", "@carol:hs", "join")]))
        .await
        .unwrap();

    assert_eq!(*observed.lock(), Some(Membership::Join));
}

#[tokio::test]
async fn test_panicking_batch_keeps_cursor() {
    let harness = Harness::new(record_with_cursor("s1"), vec![]).await;
    let mut processor = harness.processor();

    let err = processor
        .process_batch(timeline_batch("s2", vec![msg("$before"), msg("$boom")]))
        .await
        .unwrap_err();

    assert!(matches!(err, SyncError::BatchPanicked(ref m) if m == "listener exploded"));
    assert_eq!(processor.record().next_batch, "s1");
    assert_eq!(harness.stored().await.next_batch, "s1");
}

#[tokio::test]
async fn test_loop_retries_from_old_cursor() {
    let harness = Harness::new(
        record_with_cursor("s1"),
        vec![
            Ok(timeline_batch("s2", vec![msg("$boom")])),
            Err(TransportError::ConnectionFailed {
                url: "https://hs".into(),
                reason: "reset".into(),
            }),
            Ok(timeline_batch("s3", vec![msg("$fine")])),
        ],
    )
    .await;

    let cancel = CancellationToken::new();
    let task = tokio::spawn(harness.processor().run(cancel.clone()));

    let transport = harness.transport.clone();
    wait_for(|| transport.polls.lock().len() >= 4).await;
    cancel.cancel();
    task.await.unwrap();

    assert_eq!(
        *harness.transport.polls.lock(),
        [
            Some("s1".to_string()),
            Some("s1".to_string()),
            Some("s1".to_string()),
            Some("s3".to_string())
        ]
    );
    assert_eq!(harness.seen(), ["$fine"]);
    assert_eq!(harness.stored().await.next_batch, "s3");
}

#[tokio::test]
async fn test_identity_mismatch_disables_sync() {
    let transport = Arc::new(ScriptedTransport {
        whoami: "@someone-else:hs".into(),
        ..Default::default()
    });
    let harness = Harness::with_transport(record_with_cursor("s1"), transport).await;

    tokio::time::timeout(
        Duration::from_secs(5),
        harness.processor().run(CancellationToken::new()),
    )
    .await
    .expect("loop should exit on its own");

    assert!(!harness.stored().await.sync);
    assert!(harness.transport.polls.lock().is_empty());
}

#[tokio::test]
async fn test_filter_created_once_and_persisted() {
    let mut record = record_with_cursor("s1");
    record.filter_id.clear();
    let harness = Harness::new(record, vec![]).await;
    let mut processor = harness.processor();

    processor.prepare().await.unwrap();
    processor.prepare().await.unwrap();

    let filters = harness.transport.filters.lock().clone();
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0]["room"]["timeline"]["limit"], 10);
    assert_eq!(harness.stored().await.filter_id, "f1");
}

#[tokio::test]
async fn test_autojoin_on_invite() {
    let mut record = record_with_cursor("s1");
    record.autojoin = true;
    let harness = Harness::new(record, vec![]).await;

    harness
        .processor()
        .process_batch(batch(json!({
            "next_batch": "s2",
            "rooms": {
                "invite": {
                    "!party:hs": { "invite_state": { "events": [
                        { "type": "m.room.member", "event_id": "$inv", "sender": "@alice:hs",
                          "state_key": BOT, "content": { "membership": "invite" } }
                    ] } }
                }
            }
        })))
        .await
        .unwrap();

    assert_eq!(*harness.transport.joined.lock(), ["!party:hs"]);
}

#[tokio::test]
async fn test_autojoin_ends_member_chain_on_own_invite() {
    let mut record = record_with_cursor("s1");
    record.autojoin = true;
    let harness = Harness::new(record, vec![]).await;

    let later = Arc::new(Mutex::new(Vec::new()));
    let sink = later.clone();
    harness
        .account
        .handle()
        .proxy("later")
        .add_listener(types::ROOM_MEMBER, move |ctx: EventContext| {
            let sink = sink.clone();
            async move {
                sink.lock().push(ctx.event().event_id.clone());
                Propagation::Continue
            }
        });

    harness
        .processor()
        .process_batch(batch(json!({
            "next_batch": "s2",
            "rooms": {
                "join": {
                    "!room:hs": { "timeline": { "events": [member("$carol", "@carol:hs", "join")] } }
                },
                "invite": {
                    "!p:hs": { "invite_state": { "events": [
                        { "type": "m.room.member", "event_id": "$own-invite", "sender": "@alice:hs",
                          "state_key": BOT, "content": { "membership": "invite" } }
                    ] } }
                }
            }
        })))
        .await
        .unwrap();

    assert_eq!(*harness.transport.joined.lock(), ["!p:hs"]);
    assert_eq!(*later.lock(), ["$carol"]);
    assert_eq!(harness.seen(), ["$carol"]);
}
