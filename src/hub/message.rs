//! Message definitions for the hub
//!
//! `Message` is the unit the hub fans out: chat content submitted by a
//! client, or a synthetic join/leave notice produced by the hub itself. The
//! same value is placed on every recipient's outbound queue; the write pump
//! turns it into the outbound wire envelope.
//!
//! Notes on fields:
//! - `room_id`: routing key for the broadcast
//! - `user_id`: sender identity, used only server-side
//! - `username`: sender display name
//! - `created_at`: set from the store when the message was persisted, or at
//!   creation time for notices

use chrono::{DateTime, Utc};

use crate::persistence::StoredMessage;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub content: String,
    pub room_id: String,
    pub user_id: String,
    pub username: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn chat(
        content: impl Into<String>,
        room_id: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            room_id: room_id.into(),
            user_id: user_id.into(),
            username: username.into(),
            created_at: None,
        }
    }

    /// Notice sent to a room when a user's first connection joins it.
    pub fn joined(room_id: &str, user_id: &str, username: &str) -> Self {
        Self::chat(format!("{username} has joined the room"), room_id, user_id, username)
            .stamped(Utc::now())
    }

    /// Notice sent to a room when a user's last connection leaves it.
    pub fn left(room_id: &str, user_id: &str, username: &str) -> Self {
        Self::chat(format!("{username} has left the room"), room_id, user_id, username)
            .stamped(Utc::now())
    }

    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }
}

impl From<StoredMessage> for Message {
    fn from(stored: StoredMessage) -> Self {
        Self {
            created_at: DateTime::from_timestamp_millis(stored.created_at),
            content: stored.content,
            room_id: stored.room_id,
            user_id: stored.sender_id,
            username: stored.username,
        }
    }
}
