//! # roomhub
//!
//! `roomhub` is a real-time chat-room server. Clients connect over
//! WebSockets, authenticate once with an access token and are bound to a
//! single room for the lifetime of the connection. Messages sent to a room
//! are persisted and fanned out to every connection currently in it.
//!
//! ## Core Modules
//!
//! - `hub`: the single task that owns room membership and broadcasts.
//! - `client`: per-connection read and write pumps plus event routing.
//! - `transport`: frame capability traits, wire envelopes and the WebSocket server.
//! - `auth`: access token verification.
//! - `persistence`: the room and message store (sled).
//! - `config`: layered configuration loading.
//! - `utils`: error types and logging setup.

pub mod auth;
pub mod client;
pub mod config;
pub mod hub;
pub mod persistence;
pub mod transport;
pub mod utils;
