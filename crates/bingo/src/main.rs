use std::path::PathBuf;
use std::time::Duration;

use bingo::prelude::*;
use clap::Parser;

/// Shared bingo room server.
#[derive(Parser, Debug)]
#[command(name = "bingo-server")]
#[command(version)]
struct Cli {
    /// Address room sockets are accepted on.
    #[arg(long, env = "BINGO_SOCKET_ADDR", default_value = "127.0.0.1:8081")]
    socket_addr: String,

    /// Address of the HTTP API.
    #[arg(long, env = "BINGO_HTTP_ADDR", default_value = "127.0.0.1:8080")]
    http_addr: String,

    /// JSON file listing the rooms to open at startup.
    #[arg(long, env = "BINGO_ROOMS")]
    rooms: Option<PathBuf>,

    /// Seconds an unused room token stays valid.
    #[arg(long, env = "BINGO_TOKEN_TTL_SECS", default_value_t = 86_400)]
    token_ttl_secs: u64,

    /// Seconds a silent socket is kept before it is dropped.
    #[arg(long, env = "BINGO_IDLE_TIMEOUT_SECS", default_value_t = 60)]
    idle_timeout_secs: u64,

    /// Chat lines kept per room.
    #[arg(long, env = "BINGO_MAX_CHAT_HISTORY", default_value_t = 500)]
    max_chat_history: usize,
}

impl Cli {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            socket_addr: self.socket_addr.clone(),
            http_addr: self.http_addr.clone(),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            room: RoomConfig {
                max_chat_history: self.max_chat_history,
                session: SessionConfig {
                    token_ttl_secs: self.token_ttl_secs,
                },
                ..RoomConfig::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    bingo::logging::init("info");

    let rooms = match &cli.rooms {
        Some(path) => bingo::load_rooms(path)?,
        None => {
            tracing::warn!("no rooms file given, starting with no rooms");
            Vec::new()
        }
    };

    let server = BingoServer::builder()
        .config(cli.server_config())
        .rooms(rooms)
        .build()
        .await?;

    tracing::info!(
        socket = %server.local_addr()?,
        http = %server.http_addr()?,
        rooms = server.handle().list_rooms().await.len(),
        "listening"
    );

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
