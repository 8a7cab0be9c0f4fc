//! roomhub hub
//!
//! The hub owns every room and serializes all membership changes and
//! broadcasts through a single task. Clients and the server interact with it
//! only through a `HubHandle`.

pub mod engine;
pub mod message;
pub mod room;

pub use engine::{Hub, HubCommand, HubHandle};
pub use message::Message;
pub use room::{ClientHandle, ClientKey, Member, Room, RoomSummary};

#[cfg(test)]
mod tests;
