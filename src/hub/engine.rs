//! Hub engine
//!
//! The hub is the single authority over room membership and message fan-out.
//! It runs as one task that owns the room table and processes requests from
//! an unbounded command channel one at a time, to completion. Because no other
//! code can reach the table, "first connection added" and "last connection
//! removed" checks and the join/leave notices they trigger can never race.
//!
//! Delivery policy: a broadcast waits on each recipient's bounded queue for
//! at most `delivery_timeout`. A recipient whose queue stays full for that
//! long, or whose queue has already been closed, is evicted from its room as
//! if it had unregistered. The wait happens on the hub task itself, so while
//! it lasts every room is stalled, along with pending register and unregister
//! requests. The hub never performs network or disk I/O.
//!
//! Messages submitted by clients are only delivered while the submitting
//! connection is still registered; anything a removed connection sends
//! afterwards is dropped.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::mpsc::error::SendTimeoutError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace, warn};

use super::message::Message;
use super::room::{ClientHandle, ClientKey, Member, Room, RoomSummary};
use crate::config::HubSettings;
use crate::utils::error::HubError;

/// Requests processed by the hub task.
#[derive(Debug)]
pub enum HubCommand {
    Register(ClientHandle),
    Unregister(ClientKey),
    Broadcast(Message),
    Submit {
        from: ClientKey,
        message: Message,
    },
    CreateRoom {
        id: String,
        name: String,
        reply: oneshot::Sender<RoomSummary>,
    },
    Rooms(oneshot::Sender<Vec<RoomSummary>>),
    Members {
        room_id: String,
        reply: oneshot::Sender<Option<Vec<Member>>>,
    },
}

#[derive(Debug)]
pub struct Hub {
    rooms: HashMap<String, Room>,
    default_room_name: String,
    delivery_timeout: Duration,
}

impl Hub {
    pub fn new(settings: &HubSettings) -> Self {
        Self {
            rooms: HashMap::new(),
            default_room_name: settings.default_room_name.clone(),
            delivery_timeout: Duration::from_millis(settings.delivery_timeout_ms),
        }
    }

    /// Start the hub on its own task and return a handle to it. The task
    /// stops once every handle has been dropped.
    pub fn spawn(self) -> HubHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(self.run(rx));
        HubHandle { commands: tx }
    }

    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<HubCommand>) {
        info!("Hub started");

        while let Some(command) = commands.recv().await {
            self.handle(command).await;
        }

        info!("Hub stopped: all handles dropped");
    }

    async fn handle(&mut self, command: HubCommand) {
        match command {
            HubCommand::Register(client) => self.register(client).await,
            HubCommand::Unregister(key) => self.unregister(&key).await,
            HubCommand::Broadcast(message) => self.broadcast(message).await,
            HubCommand::Submit { from, message } => self.submit(&from, message).await,
            HubCommand::CreateRoom { id, name, reply } => {
                let _ = reply.send(self.create_room(&id, &name));
            }
            HubCommand::Rooms(reply) => {
                let _ = reply.send(self.rooms());
            }
            HubCommand::Members { room_id, reply } => {
                let _ = reply.send(self.members(&room_id));
            }
        }
    }

    /// Admit a client into its room, creating the room if it is unknown.
    /// Only a user's first connection produces a join notice.
    pub async fn register(&mut self, client: ClientHandle) {
        let key = client.key.clone();
        let username = client.username.clone();

        let room = self.rooms.entry(key.room_id.clone()).or_insert_with(|| {
            info!("Creating room {} on first join", key.room_id);
            Room::new(&key.room_id, &self.default_room_name)
        });

        let first = room.add(client);
        debug!(
            "{} ({}) joined room {} [{} connections]",
            username,
            key.conn_id,
            key.room_id,
            room.connection_count()
        );

        if first {
            self.broadcast(Message::joined(&key.room_id, &key.user_id, &username))
                .await;
        }
    }

    /// Remove exactly the connection identified by `key`. Unknown keys are
    /// ignored, so a client may be unregistered any number of times.
    pub async fn unregister(&mut self, key: &ClientKey) {
        let Some(room) = self.rooms.get_mut(&key.room_id) else {
            trace!("Unregister for unknown room {}", key.room_id);
            return;
        };

        let Some((handle, last)) = room.remove(key) else {
            trace!("Connection {} already removed", key.conn_id);
            return;
        };

        debug!(
            "{} ({}) left room {}",
            handle.username, key.conn_id, key.room_id
        );

        if last {
            self.broadcast(Message::left(&key.room_id, &key.user_id, &handle.username))
                .await;
        }

        // closes the client's outbound queue
        drop(handle);
    }

    /// Deliver `message` to every connection in its room. A room that does
    /// not exist or has no members is a silent no-op.
    pub async fn broadcast(&mut self, message: Message) {
        let mut pending = VecDeque::from([message]);

        while let Some(message) = pending.pop_front() {
            for key in self.deliver(&message).await {
                if let Some(notice) = self.evict(&key) {
                    pending.push_back(notice);
                }
            }
        }
    }

    /// Broadcast a message sent by the connection `from`, unless that
    /// connection has already left its room.
    pub async fn submit(&mut self, from: &ClientKey, message: Message) {
        let registered = self
            .rooms
            .get(&from.room_id)
            .is_some_and(|room| room.contains(from));

        if !registered {
            debug!(
                "Dropping message from removed connection {} in room {}",
                from.conn_id, from.room_id
            );
            return;
        }

        self.broadcast(message).await;
    }

    async fn deliver(&self, message: &Message) -> Vec<ClientKey> {
        let Some(room) = self.rooms.get(&message.room_id) else {
            trace!("Broadcast to unknown room {}", message.room_id);
            return Vec::new();
        };

        let mut evicted = Vec::new();
        for handle in room.handles() {
            match handle
                .sender
                .send_timeout(message.clone(), self.delivery_timeout)
                .await
            {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(_)) => {
                    warn!(
                        "Outbound queue of {} ({}) full for {:?}, evicting",
                        handle.username, handle.key.conn_id, self.delivery_timeout
                    );
                    evicted.push(handle.key.clone());
                }
                Err(SendTimeoutError::Closed(_)) => {
                    debug!(
                        "Outbound queue of {} ({}) closed, evicting",
                        handle.username, handle.key.conn_id
                    );
                    evicted.push(handle.key.clone());
                }
            }
        }

        evicted
    }

    /// Drop a connection the hub could not deliver to. Returns the leave
    /// notice to broadcast if it was the user's last connection.
    fn evict(&mut self, key: &ClientKey) -> Option<Message> {
        let room = self.rooms.get_mut(&key.room_id)?;
        let (handle, last) = room.remove(key)?;

        last.then(|| Message::left(&key.room_id, &key.user_id, &handle.username))
    }

    /// Create a room, or rename it if it already exists. Membership is kept.
    pub fn create_room(&mut self, id: &str, name: &str) -> RoomSummary {
        let room = self
            .rooms
            .entry(id.to_string())
            .or_insert_with(|| Room::new(id, name));
        room.name = name.to_string();
        room.summary()
    }

    /// Snapshot of all rooms, ordered by id.
    pub fn rooms(&self) -> Vec<RoomSummary> {
        let mut rooms: Vec<_> = self.rooms.values().map(Room::summary).collect();
        rooms.sort_by(|a, b| a.id.cmp(&b.id));
        rooms
    }

    pub fn members(&self, room_id: &str) -> Option<Vec<Member>> {
        self.rooms.get(room_id).map(Room::members)
    }

    pub fn room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }
}

/// Cloneable handle used by clients and the server to talk to the hub task.
#[derive(Debug, Clone)]
pub struct HubHandle {
    commands: mpsc::UnboundedSender<HubCommand>,
}

impl HubHandle {
    pub fn register(&self, client: ClientHandle) -> Result<(), HubError> {
        self.send(HubCommand::Register(client))
    }

    pub fn unregister(&self, key: ClientKey) -> Result<(), HubError> {
        self.send(HubCommand::Unregister(key))
    }

    pub fn broadcast(&self, message: Message) -> Result<(), HubError> {
        self.send(HubCommand::Broadcast(message))
    }

    pub fn submit(&self, from: ClientKey, message: Message) -> Result<(), HubError> {
        self.send(HubCommand::Submit { from, message })
    }

    pub async fn create_room(&self, id: &str, name: &str) -> Result<RoomSummary, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::CreateRoom {
            id: id.to_string(),
            name: name.to_string(),
            reply,
        })?;
        rx.await.map_err(|_| HubError::HubClosed)
    }

    pub async fn rooms(&self) -> Result<Vec<RoomSummary>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Rooms(reply))?;
        rx.await.map_err(|_| HubError::HubClosed)
    }

    pub async fn members(&self, room_id: &str) -> Result<Vec<Member>, HubError> {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Members {
            room_id: room_id.to_string(),
            reply,
        })?;

        rx.await
            .map_err(|_| HubError::HubClosed)?
            .ok_or_else(|| HubError::RoomNotFound(room_id.to_string()))
    }

    fn send(&self, command: HubCommand) -> Result<(), HubError> {
        self.commands
            .send(command)
            .map_err(|_| HubError::HubClosed)
    }
}
