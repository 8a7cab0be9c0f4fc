//! Wire envelopes
//!
//! Inbound frames carry an `Event`: a type string plus a kind-specific JSON
//! payload. Routing on the type string happens in the client's
//! `EventRouter`, so new kinds only need a payload type and a handler.
//!
//! Outbound frames carry one `OutboundMessage` each.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::hub::Message;

pub const EVENT_SEND_MESSAGE: &str = "send_message";
pub const EVENT_CHANGE_ROOM: &str = "change_room";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessagePayload {
    pub content: String,
    #[serde(default)]
    pub room_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeRoomPayload {
    pub room_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    pub room_id: String,
    pub username: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl From<&Message> for OutboundMessage {
    fn from(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            room_id: message.room_id.clone(),
            username: message.username.clone(),
            created_at: message.created_at,
        }
    }
}

/// Query parameters a connection presents when it joins a room.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JoinRequest {
    pub access_token: String,
    pub room_id: String,
}

impl JoinRequest {
    /// Parse `access_token` and `room_id` from a request query string.
    /// Either value is left empty when absent.
    pub fn from_query(query: &str) -> Self {
        let mut request = JoinRequest::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "access_token" => request.access_token = value.into_owned(),
                "room_id" => request.room_id = value.into_owned(),
                _ => {}
            }
        }
        request
    }
}
