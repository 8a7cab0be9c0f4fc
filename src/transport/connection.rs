//! Connection capability
//!
//! A client only needs two things from its transport: a stream of frames to
//! read from and a sink to write frames to. The halves are separate so the
//! read pump and the write pump can each own one; at most one task ever
//! writes to a connection.
//!
//! The split halves of a `tokio_tungstenite` WebSocket implement both traits
//! here. Tests use an in-memory pair instead.

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::WebSocketStream;
use tungstenite::error::ProtocolError;
use tungstenite::protocol::CloseFrame;
use tungstenite::protocol::Message as WsMessage;
use tungstenite::protocol::frame::coding::CloseCode;

use crate::utils::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
}

#[async_trait]
pub trait FrameStream: Send {
    /// Wait for the next frame. A clean close by the peer is reported as
    /// `TransportError::Closed`.
    async fn receive(&mut self) -> Result<Frame, TransportError>;
}

#[async_trait]
pub trait FrameSink: Send {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

#[async_trait]
impl<S> FrameStream for SplitStream<WebSocketStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn receive(&mut self) -> Result<Frame, TransportError> {
        loop {
            let Some(message) = self.next().await else {
                return Err(TransportError::Closed);
            };

            match message.map_err(classify)? {
                WsMessage::Text(text) => return Ok(Frame::Text(text.as_str().to_owned())),
                WsMessage::Binary(data) => return Ok(Frame::Binary(data.to_vec())),
                WsMessage::Ping(data) => return Ok(Frame::Ping(data.to_vec())),
                WsMessage::Pong(data) => return Ok(Frame::Pong(data.to_vec())),
                WsMessage::Close(frame) => return Err(close_error(frame)),
                // raw frames are never yielded while reading
                WsMessage::Frame(_) => continue,
            }
        }
    }
}

#[async_trait]
impl<S> FrameSink for SplitSink<WebSocketStream<S>, WsMessage>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let message = match frame {
            Frame::Text(text) => WsMessage::text(text),
            Frame::Binary(data) => WsMessage::binary(data),
            Frame::Ping(data) => WsMessage::Ping(data.into()),
            Frame::Pong(data) => WsMessage::Pong(data.into()),
        };

        SinkExt::send(self, message).await.map_err(classify)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        SinkExt::close(self).await.map_err(classify)
    }
}

fn classify(error: tungstenite::Error) -> TransportError {
    match error {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            TransportError::Closed
        }
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => {
            TransportError::Abnormal
        }
        other => TransportError::WebSocket(other),
    }
}

fn close_error(frame: Option<CloseFrame>) -> TransportError {
    match frame {
        None => TransportError::Closed,
        Some(frame) if matches!(frame.code, CloseCode::Normal | CloseCode::Away) => {
            TransportError::Closed
        }
        Some(frame) => TransportError::ClosedWith {
            code: u16::from(frame.code),
            reason: frame.reason.as_str().to_owned(),
        },
    }
}
