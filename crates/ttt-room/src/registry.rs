//! Room registry (C5): the base store rooms live in.
//!
//! Per-room mutation is serialized by the room's own lock (see `state`),
//! not by the registry — the registry's job is only atomic
//! insert-if-absent / delete-if-present over the `code -> room` map. An
//! optional read cache in front of this (documented in `config` as
//! `room_cache_timeout_hours` / `all_rooms_cache_timeout_minutes`) is not
//! implemented: at the scale a single process handles, a `Mutex<HashMap>`
//! lookup is already cheaper than a cache round-trip would be.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ttt_protocol::RoomCode;

use crate::error::RoomError;
use crate::state::Room;

pub type SharedRoom = Arc<Mutex<Room>>;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: Mutex<HashMap<RoomCode, SharedRoom>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `room`, failing if its code is already taken.
    pub fn create(&self, room: Room) -> Result<SharedRoom, RoomError> {
        let mut rooms = self.rooms.lock().unwrap();
        if rooms.contains_key(&room.code) {
            return Err(RoomError::Invalid(format!(
                "room code {} already exists",
                room.code
            )));
        }
        let code = room.code.clone();
        let shared = Arc::new(Mutex::new(room));
        rooms.insert(code, shared.clone());
        Ok(shared)
    }

    pub fn try_get_by_id(&self, code: &RoomCode) -> Option<SharedRoom> {
        self.rooms.lock().unwrap().get(code).cloned()
    }

    pub fn exists(&self, code: &RoomCode) -> bool {
        self.rooms.lock().unwrap().contains_key(code)
    }

    /// Removes `code`, returning `true` if a room was actually present.
    pub fn delete(&self, code: &RoomCode) -> bool {
        self.rooms.lock().unwrap().remove(code).is_some()
    }

    pub fn get_all(&self) -> Vec<SharedRoom> {
        self.rooms.lock().unwrap().values().cloned().collect()
    }

    pub fn get_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.rooms.lock().unwrap().clear();
    }
}
