//! Room membership
//!
//! A `Room` maps each present user to the handles of that user's live
//! connections, in join order. A user may hold several connections at once
//! (for example one per browser tab). A user id is present in the table only
//! while it has at least one connection; the entry is removed, never left
//! empty.
//!
//! Concurrency note: rooms are owned by the hub task and are only ever
//! touched from there.

use std::collections::HashMap;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::message::Message;

/// Identifies one connection of one user in one room.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientKey {
    pub conn_id: Uuid,
    pub user_id: String,
    pub room_id: String,
}

/// The hub's side of a client: its key, display name, and the only sending
/// half of its outbound queue. Dropping the handle closes the queue.
#[derive(Debug)]
pub struct ClientHandle {
    pub key: ClientKey,
    pub username: String,
    pub sender: mpsc::Sender<Message>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomSummary {
    pub id: String,
    pub name: String,
    pub members: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub user_id: String,
    pub username: String,
    pub connections: usize,
}

#[derive(Debug)]
pub struct Room {
    pub id: String,
    pub name: String,
    pub members: HashMap<String, Vec<ClientHandle>>,
}

impl Room {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            members: HashMap::new(),
        }
    }

    /// Append a connection. Returns `true` when it is the user's first live
    /// connection in this room.
    pub fn add(&mut self, handle: ClientHandle) -> bool {
        let connections = self.members.entry(handle.key.user_id.clone()).or_default();
        connections.push(handle);
        connections.len() == 1
    }

    /// Remove exactly the connection identified by `key`.
    ///
    /// Returns the removed handle and whether it was the user's last
    /// connection, or `None` if the connection is not present.
    pub fn remove(&mut self, key: &ClientKey) -> Option<(ClientHandle, bool)> {
        let connections = self.members.get_mut(&key.user_id)?;
        let index = connections
            .iter()
            .position(|handle| handle.key.conn_id == key.conn_id)?;
        let handle = connections.remove(index);

        let last = connections.is_empty();
        if last {
            self.members.remove(&key.user_id);
        }

        Some((handle, last))
    }

    /// Whether the exact connection identified by `key` is present.
    pub fn contains(&self, key: &ClientKey) -> bool {
        self.members
            .get(&key.user_id)
            .is_some_and(|connections| connections.iter().any(|h| h.key.conn_id == key.conn_id))
    }

    pub fn contains_user(&self, user_id: &str) -> bool {
        self.members.contains_key(user_id)
    }

    /// Number of distinct users present.
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Number of live connections across all users.
    pub fn connection_count(&self) -> usize {
        self.members.values().map(Vec::len).sum()
    }

    pub fn handles(&self) -> impl Iterator<Item = &ClientHandle> {
        self.members.values().flatten()
    }

    pub fn summary(&self) -> RoomSummary {
        RoomSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            members: self.member_count(),
        }
    }

    pub fn members(&self) -> Vec<Member> {
        let mut members: Vec<_> = self
            .members
            .iter()
            .filter_map(|(user_id, connections)| {
                connections.first().map(|first| Member {
                    user_id: user_id.clone(),
                    username: first.username.clone(),
                    connections: connections.len(),
                })
            })
            .collect();

        members.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        members
    }
}
