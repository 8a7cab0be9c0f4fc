//! Per-connection client
//!
//! A `Client` bridges one transport connection to the hub. It runs two
//! tasks for its whole lifetime:
//!
//! - the read pump receives frames under a read deadline, decodes events and
//!   routes them; chat messages are persisted and handed to the hub;
//! - the write pump drains the client's outbound queue onto the transport
//!   and sends a ping every `ping_period`.
//!
//! Whichever pump stops first unregisters the client and raises a shared
//! shutdown signal. The hub then drops the queue's sending half, which stops
//! the write pump; the signal stops the read pump without waiting for its
//! read deadline. When the hub removes the client on its own (eviction or an
//! external unregister) the write pump sees the closed queue and raises the
//! same signal. Unregistration happens exactly once per client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, interval_at, timeout_at};
use tracing::{debug, error, info, trace, warn};
use uuid::Uuid;

use super::router::{Action, EventRouter, EventSource};
use crate::auth::Identity;
use crate::config::ClientSettings;
use crate::hub::{ClientHandle, ClientKey, HubHandle, Message};
use crate::persistence::ChatStore;
use crate::transport::connection::{Frame, FrameSink, FrameStream};
use crate::transport::message::{Event, OutboundMessage};
use crate::utils::error::{HubError, TransportError};

/// Smallest read deadline a client accepts.
pub const MIN_PONG_WAIT: Duration = Duration::from_millis(10);

/// Shared, per-server parameters for every client's pumps.
#[derive(Clone)]
pub struct ClientContext {
    pub router: Arc<EventRouter>,
    pub store: Option<Arc<dyn ChatStore>>,
    pub pong_wait: Duration,
    pub ping_period: Duration,
}

impl ClientContext {
    /// The ping period is nine tenths of `pong_wait`, so a ping round trip
    /// always fits inside the read deadline. `pong_wait` is raised to
    /// `MIN_PONG_WAIT` so the ping ticker never gets a zero period.
    pub fn new(
        router: Arc<EventRouter>,
        store: Option<Arc<dyn ChatStore>>,
        pong_wait: Duration,
    ) -> Self {
        let pong_wait = pong_wait.max(MIN_PONG_WAIT);
        Self {
            router,
            store,
            pong_wait,
            ping_period: pong_wait * 9 / 10,
        }
    }

    pub fn from_settings(settings: &ClientSettings, store: Option<Arc<dyn ChatStore>>) -> Self {
        Self::new(
            Arc::new(EventRouter::default()),
            store,
            Duration::from_secs(settings.pong_wait_secs),
        )
    }
}

impl std::fmt::Debug for ClientContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientContext")
            .field("router", &self.router)
            .field("store", &self.store.is_some())
            .field("pong_wait", &self.pong_wait)
            .field("ping_period", &self.ping_period)
            .finish()
    }
}

#[derive(Debug)]
pub struct Client {
    pub key: ClientKey,
    pub username: String,
    queue: mpsc::Receiver<Message>,
    history: Vec<Message>,
}

impl Client {
    /// Create a client for `identity` in `room_id` together with the handle
    /// the hub keeps for it. The outbound queue holds `capacity` messages.
    pub fn new(identity: &Identity, room_id: &str, capacity: usize) -> (Self, ClientHandle) {
        let (sender, queue) = mpsc::channel(capacity.max(1));
        let key = ClientKey {
            conn_id: Uuid::new_v4(),
            user_id: identity.user_id.clone(),
            room_id: room_id.to_string(),
        };

        let handle = ClientHandle {
            key: key.clone(),
            username: identity.username.clone(),
            sender,
        };

        let client = Self {
            key,
            username: identity.username.clone(),
            queue,
            history: Vec::new(),
        };

        (client, handle)
    }

    /// Messages the write pump sends before anything from the queue.
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    /// Run both pumps until the connection ends. The client must already be
    /// registered with `hub`.
    pub async fn run<S, K>(self, stream: S, sink: K, hub: HubHandle, context: ClientContext)
    where
        S: FrameStream + 'static,
        K: FrameSink + 'static,
    {
        let cleanup = Cleanup::new(hub.clone(), self.key.clone());

        let reader = ReadPump {
            stream,
            stopped: cleanup.subscribe(),
            dispatcher: Dispatcher {
                key: self.key.clone(),
                username: self.username.clone(),
                hub,
                context: context.clone(),
            },
            cleanup: cleanup.clone(),
        };

        let writer = WritePump {
            sink,
            queue: self.queue,
            history: self.history,
            replayed: Vec::new(),
            ping_period: context.ping_period,
            key: self.key.clone(),
            cleanup: cleanup.clone(),
        };

        let (read, write) = tokio::join!(tokio::spawn(reader.run()), tokio::spawn(writer.run()));

        if let Err(e) = read {
            error!("Read pump for {} failed: {e}", self.key.conn_id);
        }
        if let Err(e) = write {
            error!("Write pump for {} failed: {e}", self.key.conn_id);
        }

        // no-op unless a pump panicked before cleaning up
        cleanup.run();
        info!(
            "{} ({}) disconnected from room {}",
            self.username, self.key.conn_id, self.key.room_id
        );
    }
}

/// Unregisters a client from the hub at most once and tells both pumps to
/// stop.
#[derive(Clone)]
struct Cleanup {
    hub: HubHandle,
    key: ClientKey,
    done: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Cleanup {
    fn new(hub: HubHandle, key: ClientKey) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            hub,
            key,
            done: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(shutdown),
        }
    }

    /// Resolves through `changed()` once `run` has been called.
    fn subscribe(&self) -> watch::Receiver<bool> {
        self.shutdown.subscribe()
    }

    fn run(&self) {
        if self.done.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shutdown.send_replace(true);

        if let Err(e) = self.hub.unregister(self.key.clone()) {
            debug!("Could not unregister {}: {e}", self.key.conn_id);
        }
    }
}

struct ReadPump<S> {
    stream: S,
    stopped: watch::Receiver<bool>,
    dispatcher: Dispatcher,
    cleanup: Cleanup,
}

impl<S: FrameStream> ReadPump<S> {
    async fn run(mut self) {
        let pong_wait = self.dispatcher.context.pong_wait;
        let mut deadline = Instant::now() + pong_wait;

        loop {
            let received = tokio::select! {
                biased;
                _ = self.stopped.changed() => {
                    debug!(
                        "Read pump of {} stopping: client shut down",
                        self.dispatcher.key.conn_id
                    );
                    break;
                }
                received = timeout_at(deadline, self.stream.receive()) => received,
            };

            let frame = match received {
                Ok(Ok(frame)) => frame,
                Ok(Err(e)) => {
                    self.dispatcher.log_transport_error(&e);
                    break;
                }
                Err(_) => {
                    self.dispatcher
                        .log_transport_error(&TransportError::DeadlineExceeded);
                    break;
                }
            };

            let result = match frame {
                Frame::Pong(_) => {
                    deadline = Instant::now() + pong_wait;
                    Ok(())
                }
                Frame::Ping(_) => Ok(()),
                Frame::Text(text) => self.dispatcher.dispatch(serde_json::from_str(&text)).await,
                Frame::Binary(data) => {
                    self.dispatcher
                        .dispatch(serde_json::from_slice(&data))
                        .await
                }
            };

            if let Err(e) = result {
                warn!(
                    "Closing connection {} of {}: {e}",
                    self.dispatcher.key.conn_id, self.dispatcher.username
                );
                break;
            }
        }

        self.cleanup.run();
    }
}

/// Everything the read pump needs besides the stream itself.
struct Dispatcher {
    key: ClientKey,
    username: String,
    hub: HubHandle,
    context: ClientContext,
}

impl Dispatcher {
    fn log_transport_error(&self, error: &TransportError) {
        match error {
            e if e.is_clean_close() => {
                debug!("{} ({}) closed the connection", self.username, self.key.conn_id)
            }
            TransportError::DeadlineExceeded => warn!(
                "No pong from {} ({}) within {:?}",
                self.username, self.key.conn_id, self.context.pong_wait
            ),
            e => error!("Read error on {} ({}): {e}", self.username, self.key.conn_id),
        }
    }

    async fn dispatch(&self, event: serde_json::Result<Event>) -> Result<(), HubError> {
        let event = event.map_err(HubError::MalformedEvent)?;
        let source = EventSource {
            key: &self.key,
            username: &self.username,
        };

        match self.context.router.route(&event, source)? {
            Action::Broadcast(message) => {
                let message = self.persist(message).await;
                self.hub.submit(self.key.clone(), message)
            }
            Action::Ignore => Ok(()),
        }
    }

    /// Store the message and take its timestamp from the store. Delivery does
    /// not depend on the outcome.
    async fn persist(&self, message: Message) -> Message {
        let Some(store) = self.context.store.clone() else {
            return message.stamped(Utc::now());
        };

        let (room_id, user_id, username, content) = (
            message.room_id.clone(),
            message.user_id.clone(),
            message.username.clone(),
            message.content.clone(),
        );

        let stored = tokio::task::spawn_blocking(move || {
            store.append_message(&room_id, &user_id, &username, &content)
        })
        .await;

        match stored {
            Ok(Ok(stored)) => Message::from(stored),
            Ok(Err(e)) => {
                warn!("Failed to persist message in room {}: {e}", message.room_id);
                message.stamped(Utc::now())
            }
            Err(e) => {
                error!("Persistence task failed: {e}");
                message.stamped(Utc::now())
            }
        }
    }
}

struct WritePump<K> {
    sink: K,
    queue: mpsc::Receiver<Message>,
    history: Vec<Message>,
    /// History already sent; a queued copy of one of these is skipped.
    replayed: Vec<Message>,
    ping_period: Duration,
    key: ClientKey,
    cleanup: Cleanup,
}

impl<K: FrameSink> WritePump<K> {
    async fn run(mut self) {
        if let Err(e) = self.pump().await {
            if e.is_clean_close() {
                debug!("Connection {} closed while writing", self.key.conn_id);
            } else {
                error!("Write error on {}: {e}", self.key.conn_id);
            }
        }

        self.cleanup.run();
        if let Err(e) = self.sink.close().await {
            trace!("Closing sink of {}: {e}", self.key.conn_id);
        }
    }

    async fn pump(&mut self) -> Result<(), TransportError> {
        for message in std::mem::take(&mut self.history) {
            send_message(&mut self.sink, &message).await?;
            self.replayed.push(message);
        }

        let mut ticker = interval_at(Instant::now() + self.ping_period, self.ping_period);

        loop {
            tokio::select! {
                queued = self.queue.recv() => match queued {
                    Some(message) if take_replayed(&mut self.replayed, &message) => {
                        trace!("Skipping replayed message for {}", self.key.conn_id);
                    }
                    Some(message) => send_message(&mut self.sink, &message).await?,
                    None => {
                        debug!("Outbound queue of {} closed", self.key.conn_id);
                        return Ok(());
                    }
                },
                _ = ticker.tick() => self.sink.send(Frame::Ping(Vec::new())).await?,
            }
        }
    }
}

/// Removes `message` from `replayed`, returning whether it was there.
fn take_replayed(replayed: &mut Vec<Message>, message: &Message) -> bool {
    match replayed.iter().position(|sent| sent == message) {
        Some(index) => {
            replayed.remove(index);
            true
        }
        None => false,
    }
}

async fn send_message<K: FrameSink>(sink: &mut K, message: &Message) -> Result<(), TransportError> {
    match serde_json::to_string(&OutboundMessage::from(message)) {
        Ok(json) => sink.send(Frame::Text(json)).await,
        Err(e) => {
            error!("Failed to serialize message for room {}: {e}", message.room_id);
            Ok(())
        }
    }
}
