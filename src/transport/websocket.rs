//! WebSocket transport
//!
//! Accepts TCP connections, upgrades them to WebSocket and hands each one to
//! a `Client`. Responsibilities:
//! - read `access_token` and `room_id` from the upgrade request's query
//! - verify the token once through the configured `TokenVerifier`
//! - refuse the connection with a policy-violation close frame when either
//!   is missing or the token is invalid
//! - register the client with the hub and load the room's recent history
//!
//! Everything after admission happens in the client's pumps.

use std::sync::Arc;

use futures_util::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{WebSocketStream, accept_hdr_async_with_config};
use tracing::{debug, info, warn};
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::protocol::frame::coding::CloseCode;
use tungstenite::protocol::{CloseFrame, WebSocketConfig};

use crate::auth::{Identity, TokenVerifier};
use crate::client::{Client, ClientContext};
use crate::config::Settings;
use crate::hub::{HubHandle, Message};
use crate::transport::message::JoinRequest;
use crate::utils::error::{HubError, TransportError};

/// Everything a connection needs besides the hub.
pub struct ServerContext {
    pub verifier: Arc<dyn TokenVerifier>,
    pub client: ClientContext,
    pub queue_capacity: usize,
    pub history_limit: usize,
    pub max_message_bytes: usize,
}

impl ServerContext {
    pub fn new(settings: &Settings, verifier: Arc<dyn TokenVerifier>, client: ClientContext) -> Self {
        Self {
            verifier,
            client,
            queue_capacity: settings.hub.queue_capacity,
            history_limit: settings.client.history_limit,
            max_message_bytes: settings.client.max_message_bytes,
        }
    }
}

impl std::fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerContext")
            .field("client", &self.client)
            .field("queue_capacity", &self.queue_capacity)
            .field("history_limit", &self.history_limit)
            .field("max_message_bytes", &self.max_message_bytes)
            .finish_non_exhaustive()
    }
}

pub async fn start_websocket_server(
    addr: String,
    hub: HubHandle,
    context: Arc<ServerContext>,
) -> Result<(), HubError> {
    let listener = TcpListener::bind(&addr).await.map_err(HubError::Bind)?;

    info!("WebSocket server listening on ws://{addr}");

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Failed to accept connection: {e}");
                continue;
            }
        };

        let hub = hub.clone();
        let context = context.clone();

        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, hub, context).await {
                warn!("Connection from {peer} ended: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    hub: HubHandle,
    context: Arc<ServerContext>,
) -> Result<(), HubError> {
    let mut query = None;
    let config = WebSocketConfig::default().max_message_size(Some(context.max_message_bytes));

    let capture = |request: &Request, response: Response| {
        query = request.uri().query().map(str::to_owned);
        Ok::<_, ErrorResponse>(response)
    };

    let mut ws = accept_hdr_async_with_config(stream, capture, Some(config))
        .await
        .map_err(TransportError::from)?;

    let request = JoinRequest::from_query(query.as_deref().unwrap_or_default());
    let identity = match admit(&request, context.verifier.as_ref()).await {
        Ok(identity) => identity,
        Err(e) => {
            reject(&mut ws, &e).await;
            return Err(e);
        }
    };

    let (client, handle) = Client::new(&identity, &request.room_id, context.queue_capacity);
    info!(
        "{} ({}) connected to room {}",
        identity.username, client.key.conn_id, request.room_id
    );

    // Register before reading history so nothing sent in between is lost.
    // Messages that end up both in history and in the queue are written once.
    hub.register(handle)?;
    let history = load_history(&context, &request.room_id).await;

    let (sink, stream) = ws.split();
    client
        .with_history(history)
        .run(stream, sink, hub, context.client.clone())
        .await;

    Ok(())
}

async fn admit(request: &JoinRequest, verifier: &dyn TokenVerifier) -> Result<Identity, HubError> {
    if request.room_id.is_empty() {
        return Err(HubError::MissingRoom);
    }

    Ok(verifier.verify(&request.access_token).await?)
}

async fn reject(ws: &mut WebSocketStream<TcpStream>, error: &HubError) {
    let frame = CloseFrame {
        code: CloseCode::Policy,
        reason: error.to_string().into(),
    };

    if let Err(e) = ws.close(Some(frame)).await {
        debug!("Failed to send rejection close frame: {e}");
    }
}

/// Most recent stored messages for `room_id`, oldest first. A store failure
/// only costs the history.
async fn load_history(context: &ServerContext, room_id: &str) -> Vec<Message> {
    let Some(store) = context.client.store.clone() else {
        return Vec::new();
    };
    if context.history_limit == 0 {
        return Vec::new();
    }

    let limit = context.history_limit;
    let room = room_id.to_string();
    let loaded = tokio::task::spawn_blocking(move || store.list_messages(&room, limit)).await;

    match loaded {
        Ok(Ok(messages)) => messages.into_iter().map(Message::from).collect(),
        Ok(Err(e)) => {
            warn!("Failed to load history for room {room_id}: {e}");
            Vec::new()
        }
        Err(e) => {
            warn!("History task for room {room_id} failed: {e}");
            Vec::new()
        }
    }
}
