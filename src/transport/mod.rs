//! The `transport` module carries frames between clients and the hub.
//!
//! `connection` defines the frame stream/sink capability the client pumps
//! are written against, `message` the JSON envelopes on the wire, and
//! `websocket` the server that admits connections.

pub mod connection;
pub mod message;
pub mod websocket;

pub use connection::{Frame, FrameSink, FrameStream};
pub use message::{Event, JoinRequest, OutboundMessage};
pub use websocket::{ServerContext, start_websocket_server};
