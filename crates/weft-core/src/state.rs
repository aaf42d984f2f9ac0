//! Local projection of room state.
//!
//! The sync loop applies every state event it processes to the room's
//! projection before dispatching it, so handlers observe state that already
//! includes the event they were called for.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::StoreResult;
use crate::event::{Event, Membership, types};

/// Current state of one room, keyed by `(event type, state key)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomState {
    pub room_id: String,
    events: HashMap<(String, String), Event>,
}

impl RoomState {
    pub fn new(room_id: impl Into<String>) -> Self {
        Self {
            room_id: room_id.into(),
            events: HashMap::new(),
        }
    }

    /// Records a state event. Non-state events are ignored.
    ///
    /// Returns `true` if the event was applied.
    pub fn apply(&mut self, event: &Event) -> bool {
        let Some(state_key) = &event.state_key else {
            return false;
        };
        self.events.insert(
            (event.event_type.clone(), state_key.clone()),
            event.clone(),
        );
        true
    }

    pub fn get(&self, event_type: &str, state_key: &str) -> Option<&Event> {
        self.events
            .get(&(event_type.to_string(), state_key.to_string()))
    }

    /// Current membership of `user_id`, if known.
    pub fn membership(&self, user_id: &str) -> Option<Membership> {
        self.get(types::ROOM_MEMBER, user_id)
            .and_then(Event::membership)
    }

    /// Users whose current membership is `join`.
    pub fn joined_members(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|((ty, _), event)| {
                ty == types::ROOM_MEMBER && event.membership() == Some(Membership::Join)
            })
            .map(|((_, key), _)| key.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Persists room-state projections.
#[async_trait]
pub trait RoomStateStore: Send + Sync {
    /// Loads a room's state, empty if nothing is stored yet.
    async fn load(&self, room_id: &str) -> StoreResult<RoomState>;

    async fn save(&self, state: RoomState) -> StoreResult<()>;

    /// Loads, applies one state event and saves in one step.
    async fn apply(&self, event: &Event) -> StoreResult<()> {
        let mut state = self.load(&event.room_id).await?;
        if state.apply(event) {
            self.save(state).await?;
        }
        Ok(())
    }
}

/// In-process [`RoomStateStore`].
#[derive(Default)]
pub struct MemoryRoomStateStore {
    rooms: Mutex<HashMap<String, RoomState>>,
}

impl MemoryRoomStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RoomStateStore for MemoryRoomStateStore {
    async fn load(&self, room_id: &str) -> StoreResult<RoomState> {
        Ok(self
            .rooms
            .lock()
            .get(room_id)
            .cloned()
            .unwrap_or_else(|| RoomState::new(room_id)))
    }

    async fn save(&self, state: RoomState) -> StoreResult<()> {
        self.rooms.lock().insert(state.room_id.clone(), state);
        Ok(())
    }
}
