//! The `client` module drives a single connection on behalf of the hub.
//!
//! `Client` owns the receiving half of a connection's outbound queue and runs
//! the read and write pumps. `EventRouter` decides what each inbound event
//! means for the room.

pub mod room_client;
pub mod router;

pub use room_client::{Client, ClientContext};
pub use router::{Action, EventRouter, EventSource};
