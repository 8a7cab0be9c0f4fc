//! The `persistence` module stores rooms and chat messages durably.
//!
//! The hub's in-memory room table is only a live cache of room identity and
//! membership. Message content is persisted here when a client sends it, and
//! read back to replay recent history to newly joined connections. Nothing
//! in this module decides whether a message is delivered.
//!
//! It uses `sled` as an embedded key-value store.

pub mod sled_store;

use serde::{Deserialize, Serialize};

use crate::utils::error::StoreError;

pub use sled_store::SledStore;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredRoom {
    pub id: String,
    pub name: String,
    pub created_at: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub id: String,
    pub room_id: String,
    pub sender_id: String,
    pub username: String,
    pub content: String,
    /// Milliseconds since the UNIX epoch.
    pub created_at: i64,
}

/// Room and message storage used by the hub's collaborators.
pub trait ChatStore: Send + Sync {
    fn create_room(&self, name: &str) -> Result<StoredRoom, StoreError>;

    fn list_rooms(&self) -> Result<Vec<StoredRoom>, StoreError>;

    fn append_message(
        &self,
        room_id: &str,
        sender_id: &str,
        username: &str,
        content: &str,
    ) -> Result<StoredMessage, StoreError>;

    /// The most recent `limit` messages of a room, oldest first.
    fn list_messages(&self, room_id: &str, limit: usize) -> Result<Vec<StoredMessage>, StoreError>;
}
