use config::ConfigError;
use serde::Deserialize;

/// Top-level configuration settings for the application.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub hub: HubSettings,
    pub client: ClientSettings,
    pub auth: AuthSettings,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

/// Defines the host and port the WebSocket server binds to.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

/// Hub fan-out parameters.
///
/// `delivery_timeout_ms` bounds how long a broadcast waits on one client's
/// full outbound queue before that client is evicted from its room.
#[derive(Debug, Deserialize, Clone)]
pub struct HubSettings {
    pub queue_capacity: usize,
    pub delivery_timeout_ms: u64,
    pub default_room_name: String,
}

/// Per-connection parameters.
#[derive(Debug, Deserialize, Clone)]
pub struct ClientSettings {
    pub pong_wait_secs: u64,
    pub max_message_bytes: usize,
    pub history_limit: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceSettings {
    pub path: String,
    pub max_messages_per_room: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Missing values are filled from `Settings::default()`.
#[derive(Debug, Default, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub hub: Option<PartialHubSettings>,
    pub client: Option<PartialClientSettings>,
    pub auth: Option<PartialAuthSettings>,
    pub persistence: Option<PartialPersistenceSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialHubSettings {
    pub queue_capacity: Option<usize>,
    pub delivery_timeout_ms: Option<u64>,
    pub default_room_name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialClientSettings {
    pub pong_wait_secs: Option<u64>,
    pub max_message_bytes: Option<usize>,
    pub history_limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialAuthSettings {
    pub jwt_secret: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialPersistenceSettings {
    pub path: Option<String>,
    pub max_messages_per_room: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            hub: HubSettings {
                queue_capacity: 10,
                delivery_timeout_ms: 1000,
                default_room_name: "Default Room Name".to_string(),
            },
            client: ClientSettings {
                pong_wait_secs: 10,
                max_message_bytes: 4096,
                history_limit: 50,
            },
            auth: AuthSettings {
                jwt_secret: "change-me".to_string(),
            },
            persistence: PersistenceSettings {
                path: "roomhub_db".to_string(),
                max_messages_per_room: 1000,
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl Settings {
    /// Reject values the server cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client.pong_wait_secs == 0 {
            return Err(ConfigError::Message(
                "client.pong_wait_secs must be greater than zero".to_string(),
            ));
        }
        if self.hub.queue_capacity == 0 {
            return Err(ConfigError::Message(
                "hub.queue_capacity must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay whatever `partial` specifies onto these settings.
    pub fn merge(self, partial: PartialSettings) -> Self {
        let server = partial.server.unwrap_or_default();
        let hub = partial.hub.unwrap_or_default();
        let client = partial.client.unwrap_or_default();
        let auth = partial.auth.unwrap_or_default();
        let persistence = partial.persistence.unwrap_or_default();
        let logging = partial.logging.unwrap_or_default();

        Self {
            server: ServerSettings {
                host: server.host.unwrap_or(self.server.host),
                port: server.port.unwrap_or(self.server.port),
            },
            hub: HubSettings {
                queue_capacity: hub.queue_capacity.unwrap_or(self.hub.queue_capacity),
                delivery_timeout_ms: hub
                    .delivery_timeout_ms
                    .unwrap_or(self.hub.delivery_timeout_ms),
                default_room_name: hub
                    .default_room_name
                    .unwrap_or(self.hub.default_room_name),
            },
            client: ClientSettings {
                pong_wait_secs: client.pong_wait_secs.unwrap_or(self.client.pong_wait_secs),
                max_message_bytes: client
                    .max_message_bytes
                    .unwrap_or(self.client.max_message_bytes),
                history_limit: client.history_limit.unwrap_or(self.client.history_limit),
            },
            auth: AuthSettings {
                jwt_secret: auth.jwt_secret.unwrap_or(self.auth.jwt_secret),
            },
            persistence: PersistenceSettings {
                path: persistence.path.unwrap_or(self.persistence.path),
                max_messages_per_room: persistence
                    .max_messages_per_room
                    .unwrap_or(self.persistence.max_messages_per_room),
            },
            logging: LoggingSettings {
                level: logging.level.unwrap_or(self.logging.level),
            },
        }
    }
}
