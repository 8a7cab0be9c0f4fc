//! The `error` module defines the error types used within `roomhub`.
//!
//! Errors are grouped by where they originate: the transport, the identity
//! verification collaborator, the message store, and the hub itself. Every
//! client-level error is contained to the connection that produced it; none
//! of them can stop the hub task.

use thiserror::Error;

/// Failures raised by a connection's frame stream or sink.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The peer closed the connection cleanly (normal or going-away close,
    /// or the stream simply ended).
    #[error("connection closed by peer")]
    Closed,

    #[error("connection closed with code {code}: {reason}")]
    ClosedWith { code: u16, reason: String },

    #[error("connection reset without closing handshake")]
    Abnormal,

    #[error("read deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    WebSocket(#[from] tungstenite::Error),
}

impl TransportError {
    /// Returns `true` for a peer-initiated close that should not be reported
    /// as an error.
    pub fn is_clean_close(&self) -> bool {
        matches!(self, TransportError::Closed)
    }
}

/// Failures from the identity verification collaborator.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("access token not provided")]
    MissingToken,

    #[error("invalid access token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    #[error("token lifetime of {0} seconds is out of range")]
    InvalidLifetime(i64),
}

/// Failures from the room/message store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("failed to (de)serialize stored record: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced by hub operations and by a client's event handling.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("this event type is not supported: {0}")]
    EventNotSupported(String),

    #[error("malformed event: {0}")]
    MalformedEvent(#[source] serde_json::Error),

    #[error("event addressed to room {got} but client is bound to room {expected}")]
    RoomMismatch { expected: String, got: String },

    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("join request did not name a room")]
    MissingRoom,

    #[error("hub is no longer running")]
    HubClosed,

    #[error("failed to bind listener: {0}")]
    Bind(#[source] std::io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
