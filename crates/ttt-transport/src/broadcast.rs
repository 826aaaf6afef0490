//! Group broadcaster: fan-out of encoded wire messages to the connections
//! sharing a room.
//!
//! Registration of a connection's outbox is separate from room membership:
//! a connection registers once on accept and is added to / removed from a
//! room's group as it joins, leaves, or disconnects. The internal lock only
//! ever guards plain map bookkeeping — it is never held across an `.await`,
//! so both request handlers and background timer tasks can call into a
//! shared `Broadcaster` without contending with in-flight room mutation.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use tokio::sync::mpsc;

use crate::ConnectionId;

/// Outbound sink registered for a connection. The transport's write loop
/// owns the receiving half and is responsible for actually writing bytes to
/// the socket; the broadcaster only ever pushes onto this channel.
pub type Outbox = mpsc::UnboundedSender<Vec<u8>>;

#[derive(Default)]
struct BroadcasterState {
    connections: HashMap<ConnectionId, Outbox>,
    groups: HashMap<String, HashSet<ConnectionId>>,
}

/// Fans encoded messages out to one connection, a named group (a room
/// code), or a group minus one excluded connection.
pub struct Broadcaster {
    state: Mutex<BroadcasterState>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BroadcasterState::default()),
        }
    }

    /// Registers a connection's outbox so it can receive broadcasts.
    pub fn register(&self, id: ConnectionId, outbox: Outbox) {
        self.state.lock().unwrap().connections.insert(id, outbox);
    }

    /// Drops a connection's outbox and removes it from every group it was in.
    pub fn unregister(&self, id: ConnectionId) {
        let mut state = self.state.lock().unwrap();
        state.connections.remove(&id);
        for members in state.groups.values_mut() {
            members.remove(&id);
        }
    }

    /// Adds a connection to a named group.
    pub fn join_group(&self, group: &str, id: ConnectionId) {
        self.state
            .lock()
            .unwrap()
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(id);
    }

    /// Removes a connection from a named group, leaving its registration intact.
    pub fn leave_group(&self, group: &str, id: ConnectionId) {
        if let Some(members) = self.state.lock().unwrap().groups.get_mut(group) {
            members.remove(&id);
        }
    }

    /// Sends raw bytes to a single connection.
    ///
    /// Silently drops the send if the connection has since disconnected —
    /// callers never need to treat "peer went away mid-broadcast" as an
    /// error, since the disconnect handler independently unregisters it.
    pub fn send_to(&self, id: ConnectionId, data: Vec<u8>) {
        let outbox = self.state.lock().unwrap().connections.get(&id).cloned();
        if let Some(outbox) = outbox {
            let _ = outbox.send(data);
        }
    }

    /// Sends raw bytes to every connection currently in a group.
    pub fn send_to_group(&self, group: &str, data: Vec<u8>) {
        let members = self.members_of(group);
        for id in members {
            self.send_to(id, data.clone());
        }
    }

    /// Sends raw bytes to every connection in a group except one.
    ///
    /// Used when the actor that triggered a broadcast (e.g. the player who
    /// just moved) has already been sent its own, differently-shaped reply.
    pub fn send_to_group_except(&self, group: &str, except: ConnectionId, data: Vec<u8>) {
        let members = self.members_of(group);
        for id in members {
            if id != except {
                self.send_to(id, data.clone());
            }
        }
    }

    fn members_of(&self, group: &str) -> Vec<ConnectionId> {
        self.state
            .lock()
            .unwrap()
            .groups
            .get(group)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default()
    }
}
