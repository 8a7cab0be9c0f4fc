//! CLI for roomhub
//!
//! Subcommands:
//! - `serve`: run the WebSocket server
//! - `create-room`: add a room to the store
//! - `rooms`: list stored rooms
//! - `token`: issue a development access token signed with the configured secret
//!
//! The store is opened exclusively, so `create-room` and `rooms` must run
//! while the server is stopped.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use roomhub::auth::{Identity, JwtVerifier};
use roomhub::client::ClientContext;
use roomhub::config::{Settings, load_config};
use roomhub::hub::Hub;
use roomhub::persistence::{ChatStore, SledStore};
use roomhub::transport::websocket::{ServerContext, start_websocket_server};
use roomhub::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "roomhub", about = "Real-time chat rooms over WebSockets")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the WebSocket server
    Serve,
    /// Create a room in the store
    CreateRoom {
        #[arg(long)]
        name: String,
    },
    /// List rooms in the store
    Rooms,
    /// Issue an access token for a user
    Token {
        #[arg(long)]
        user_id: String,
        #[arg(long)]
        username: String,
        #[arg(long, default_value = "member")]
        role: String,
        /// Lifetime of the token in seconds
        #[arg(long, default_value_t = 86400)]
        ttl_secs: i64,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            logging::init("info");
            error!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    logging::init(&config.logging.level);

    let result = match cli.command {
        Command::Serve => run_server(config).await,
        Command::CreateRoom { name } => create_room(&config, &name),
        Command::Rooms => list_rooms(&config),
        Command::Token {
            user_id,
            username,
            role,
            ttl_secs,
        } => issue_token(
            &config,
            Identity {
                user_id,
                username,
                role,
            },
            ttl_secs,
        ),
    };

    if let Err(e) = result {
        error!("{e}");
        std::process::exit(1);
    }
}

fn open_store(config: &Settings) -> Result<SledStore, Box<dyn std::error::Error>> {
    let store = SledStore::open(
        &config.persistence.path,
        Some(config.persistence.max_messages_per_room),
    )?;
    Ok(store)
}

async fn run_server(config: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let store: Arc<dyn ChatStore> = Arc::new(open_store(&config)?);

    let hub = Hub::new(&config.hub).spawn();
    let rooms = store.list_rooms()?;
    for room in &rooms {
        hub.create_room(&room.id, &room.name).await?;
    }
    info!("Seeded {} rooms from the store", rooms.len());

    let client = ClientContext::from_settings(&config.client, Some(store));
    let context = Arc::new(ServerContext::new(
        &config,
        Arc::new(JwtVerifier::new(config.auth.jwt_secret.clone())),
        client,
    ));

    tokio::select! {
        result = start_websocket_server(addr, hub, context) => {
            result?;
            error!("WebSocket server exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

fn create_room(config: &Settings, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let room = open_store(config)?.create_room(name)?;
    println!("{}\t{}", room.id, room.name);
    Ok(())
}

fn list_rooms(config: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    for room in open_store(config)?.list_rooms()? {
        println!("{}\t{}", room.id, room.name);
    }
    Ok(())
}

fn issue_token(
    config: &Settings,
    identity: Identity,
    ttl_secs: i64,
) -> Result<(), Box<dyn std::error::Error>> {
    let token = JwtVerifier::new(config.auth.jwt_secret.clone()).issue(&identity, ttl_secs)?;
    println!("{token}");
    Ok(())
}
