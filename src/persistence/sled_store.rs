//! `sled`-backed `ChatStore`
//!
//! Rooms live in a single `rooms` tree keyed by room id. Each room's messages
//! live in their own tree, keyed by a zero-padded millisecond timestamp plus
//! a monotonic sequence number so iteration yields them in insertion order.
//! When a room holds more than `max_messages_per_room` messages the oldest
//! are removed on write.

use chrono::Utc;
use sled::{Db, Tree};
use tracing::warn;
use uuid::Uuid;

use super::{ChatStore, StoredMessage, StoredRoom};
use crate::utils::error::StoreError;

const ROOMS_TREE: &str = "rooms";

#[derive(Clone)]
pub struct SledStore {
    db: Db,
    max_messages_per_room: Option<usize>,
}

impl SledStore {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str, max_messages_per_room: Option<usize>) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            max_messages_per_room,
        })
    }

    fn rooms(&self) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(ROOMS_TREE)?)
    }

    fn messages(&self, room_id: &str) -> Result<Tree, StoreError> {
        Ok(self.db.open_tree(format!("messages/{room_id}"))?)
    }

    fn enforce_retention(&self, tree: &Tree, room_id: &str) {
        let Some(max) = self.max_messages_per_room else {
            return;
        };

        let total = tree.len();
        if total <= max {
            return;
        }

        let stale: Vec<_> = tree
            .iter()
            .take(total - max)
            .filter_map(|entry| entry.ok().map(|(k, _)| k))
            .collect();

        for key in stale {
            if let Err(e) = tree.remove(key) {
                warn!("Failed to remove old message from room {room_id}: {e}");
            }
        }
    }
}

impl ChatStore for SledStore {
    fn create_room(&self, name: &str) -> Result<StoredRoom, StoreError> {
        let room = StoredRoom {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            created_at: Utc::now().timestamp_millis(),
        };

        self.rooms()?
            .insert(room.id.as_bytes(), serde_json::to_vec(&room)?)?;

        Ok(room)
    }

    fn list_rooms(&self) -> Result<Vec<StoredRoom>, StoreError> {
        let mut rooms = Vec::new();
        for entry in self.rooms()?.iter() {
            let (_, value) = entry?;
            rooms.push(serde_json::from_slice::<StoredRoom>(&value)?);
        }

        rooms.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(rooms)
    }

    fn append_message(
        &self,
        room_id: &str,
        sender_id: &str,
        username: &str,
        content: &str,
    ) -> Result<StoredMessage, StoreError> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            room_id: room_id.to_string(),
            sender_id: sender_id.to_string(),
            username: username.to_string(),
            content: content.to_string(),
            created_at: Utc::now().timestamp_millis(),
        };

        let tree = self.messages(room_id)?;
        let key = format!("{:020}_{:020}", message.created_at, self.db.generate_id()?);
        tree.insert(key.as_bytes(), serde_json::to_vec(&message)?)?;

        self.enforce_retention(&tree, room_id);

        Ok(message)
    }

    fn list_messages(&self, room_id: &str, limit: usize) -> Result<Vec<StoredMessage>, StoreError> {
        let tree = self.messages(room_id)?;

        let mut messages = Vec::with_capacity(limit.min(tree.len()));
        for entry in tree.iter().rev().take(limit) {
            let (_, value) = entry?;
            messages.push(serde_json::from_slice::<StoredMessage>(&value)?);
        }

        messages.reverse();
        Ok(messages)
    }
}

impl std::fmt::Debug for SledStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SledStore")
            .field("db", &"sled::Db")
            .field("max_messages_per_room", &self.max_messages_per_room)
            .finish()
    }
}
