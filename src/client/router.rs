//! Event routing
//!
//! `EventRouter` is a table from event type strings to handler functions. A
//! handler decodes its payload and decides what the read pump should do; it
//! never performs I/O itself. Event types without a handler are refused with
//! `HubError::EventNotSupported`.

use std::collections::HashMap;

use serde::Deserialize;

use crate::hub::{ClientKey, Message};
use crate::transport::message::{
    ChangeRoomPayload, EVENT_CHANGE_ROOM, EVENT_SEND_MESSAGE, Event, SendMessagePayload,
};
use crate::utils::error::HubError;

/// What the read pump should do with a routed event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Broadcast(Message),
    Ignore,
}

/// Sender-side context handed to every handler.
#[derive(Debug, Clone, Copy)]
pub struct EventSource<'a> {
    pub key: &'a ClientKey,
    pub username: &'a str,
}

pub type EventHandler = fn(&Event, EventSource<'_>) -> Result<Action, HubError>;

#[derive(Clone)]
pub struct EventRouter {
    handlers: HashMap<String, EventHandler>,
}

impl EventRouter {
    /// A router with no handlers.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, kind: impl Into<String>, handler: EventHandler) {
        self.handlers.insert(kind.into(), handler);
    }

    pub fn route(&self, event: &Event, sender: EventSource<'_>) -> Result<Action, HubError> {
        match self.handlers.get(&event.kind) {
            Some(handler) => handler(event, sender),
            None => Err(HubError::EventNotSupported(event.kind.clone())),
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.handlers.keys().collect();
        kinds.sort();
        f.debug_struct("EventRouter").field("handlers", &kinds).finish()
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        let mut router = Self::empty();
        router.register(EVENT_SEND_MESSAGE, send_message);
        router.register(EVENT_CHANGE_ROOM, change_room);
        router
    }
}

fn send_message(event: &Event, sender: EventSource<'_>) -> Result<Action, HubError> {
    let payload = SendMessagePayload::deserialize(&event.payload).map_err(HubError::MalformedEvent)?;

    if let Some(room_id) = payload.room_id.filter(|id| !id.is_empty()) {
        if room_id != sender.key.room_id {
            return Err(HubError::RoomMismatch {
                expected: sender.key.room_id.clone(),
                got: room_id,
            });
        }
    }

    if payload.content.trim().is_empty() {
        return Ok(Action::Ignore);
    }

    Ok(Action::Broadcast(Message::chat(
        payload.content,
        &sender.key.room_id,
        &sender.key.user_id,
        sender.username,
    )))
}

/// A client is bound to one room for its lifetime; switching rooms means
/// opening a new connection.
fn change_room(event: &Event, sender: EventSource<'_>) -> Result<Action, HubError> {
    let payload = ChangeRoomPayload::deserialize(&event.payload).map_err(HubError::MalformedEvent)?;

    if payload.room_id == sender.key.room_id {
        return Ok(Action::Ignore);
    }

    Err(HubError::EventNotSupported(event.kind.clone()))
}
