//! Shape of one incremental sync batch.
//!
//! Room maps keep the order the homeserver sent them in, so that batch
//! processing can honour arrival order.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::event::Event;

/// One response of the incremental feed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncBatch {
    /// Cursor to pass as `since` on the next poll.
    pub next_batch: String,
    #[serde(default)]
    pub rooms: Rooms,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Rooms {
    #[serde(default)]
    pub join: IndexMap<String, JoinedRoom>,
    #[serde(default)]
    pub invite: IndexMap<String, InvitedRoom>,
    #[serde(default)]
    pub leave: IndexMap<String, LeftRoom>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventList {
    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub limited: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev_batch: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JoinedRoom {
    #[serde(default)]
    pub state: EventList,
    #[serde(default)]
    pub timeline: Timeline,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvitedRoom {
    #[serde(default)]
    pub invite_state: EventList,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LeftRoom {
    #[serde(default)]
    pub state: EventList,
    #[serde(default)]
    pub timeline: Timeline,
}

impl SyncBatch {
    /// Stamps every event that lacks a `room_id` with the key of the room
    /// it was delivered under.
    pub fn fill_room_ids(&mut self) {
        fn stamp<'a>(room_id: &str, events: impl Iterator<Item = &'a mut Event>) {
            for event in events {
                if event.room_id.is_empty() {
                    event.room_id = room_id.to_string();
                }
            }
        }

        for (room_id, room) in &mut self.rooms.join {
            stamp(
                room_id,
                room.state.events.iter_mut().chain(&mut room.timeline.events),
            );
        }
        for (room_id, room) in &mut self.rooms.invite {
            stamp(room_id, room.invite_state.events.iter_mut());
        }
        for (room_id, room) in &mut self.rooms.leave {
            stamp(
                room_id,
                room.state.events.iter_mut().chain(&mut room.timeline.events),
            );
        }
    }

    /// Returns `true` if the batch carries no room data at all.
    pub fn is_empty(&self) -> bool {
        self.rooms.join.is_empty() && self.rooms.invite.is_empty() && self.rooms.leave.is_empty()
    }
}
