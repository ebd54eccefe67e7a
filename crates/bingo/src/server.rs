//! `BingoServer` builder and server loop.
//!
//! This is the entry point for running a bingo server. It ties together
//! all the layers: transport → protocol → room authority, plus the HTTP
//! authorize endpoint.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bingo_protocol::{Codec, JsonCodec};
use bingo_room::{
    CardGenerator, RoomConfig, RoomError, RoomHandle, RoomInfo, RoomManager,
    RoomSettings,
};
use bingo_transport::{Handshake, Transport, WebSocketTransport};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use crate::handler::handle_connection;
use crate::{BingoError, ServerConfig, api};

/// Shared server state passed to each connection handler task and to the
/// HTTP routes.
pub(crate) struct ServerState<C: Codec> {
    pub(crate) rooms: Mutex<RoomManager>,
    pub(crate) codec: C,
    pub(crate) idle_timeout: Duration,
}

impl<C: Codec> ServerState<C> {
    /// Looks up a room without holding the manager lock afterwards.
    pub(crate) async fn room(&self, slug: &str) -> Option<RoomHandle> {
        self.rooms.lock().await.get(slug)
    }
}

/// Builder for configuring and starting a bingo server.
///
/// # Example
///
/// ```rust,no_run
/// use bingo::prelude::*;
///
/// # async fn example(rooms: Vec<RoomSettings>) -> Result<(), BingoError> {
/// let server = BingoServer::builder()
///     .socket_addr("0.0.0.0:8081")
///     .http_addr("0.0.0.0:8080")
///     .rooms(rooms)
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct BingoServerBuilder {
    config: ServerConfig,
    generator: Option<Arc<dyn CardGenerator>>,
    rooms: Vec<RoomSettings>,
}

impl BingoServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
            generator: None,
            rooms: Vec::new(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address room sockets are accepted on.
    pub fn socket_addr(mut self, addr: &str) -> Self {
        self.config.socket_addr = addr.to_string();
        self
    }

    /// Sets the address the HTTP API listens on.
    pub fn http_addr(mut self, addr: &str) -> Self {
        self.config.http_addr = addr.to_string();
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = timeout;
        self
    }

    pub fn room_config(mut self, config: RoomConfig) -> Self {
        self.config.room = config;
        self
    }

    /// Uses `generator` for every room instead of the shuffle generator.
    pub fn generator(mut self, generator: Arc<dyn CardGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Opens `settings` at startup.
    pub fn room(mut self, settings: RoomSettings) -> Self {
        self.rooms.push(settings);
        self
    }

    pub fn rooms(mut self, rooms: impl IntoIterator<Item = RoomSettings>) -> Self {
        self.rooms.extend(rooms);
        self
    }

    /// Binds both listeners and starts the configured rooms.
    ///
    /// Uses `JsonCodec` and `WebSocketTransport`.
    ///
    /// # Errors
    /// Fails if the room config is invalid, either address cannot be bound,
    /// or a room cannot be created.
    pub async fn build(self) -> Result<BingoServer<JsonCodec>, BingoError> {
        self.config.room.validate()?;
        let transport = WebSocketTransport::bind(&self.config.socket_addr).await?;
        let http = TcpListener::bind(&self.config.http_addr).await?;

        let mut manager = match self.generator {
            Some(generator) => RoomManager::with_generator(self.config.room, generator),
            None => RoomManager::new(self.config.room),
        };
        for settings in self.rooms {
            manager.create_room(settings)?;
        }

        let state = Arc::new(ServerState {
            rooms: Mutex::new(manager),
            codec: JsonCodec,
            idle_timeout: self.config.idle_timeout,
        });

        Ok(BingoServer {
            transport,
            http,
            state,
        })
    }
}

impl Default for BingoServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound bingo server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct BingoServer<C: Codec = JsonCodec> {
    transport: WebSocketTransport,
    http: TcpListener,
    state: Arc<ServerState<C>>,
}

impl BingoServer {
    /// Creates a new builder.
    pub fn builder() -> BingoServerBuilder {
        BingoServerBuilder::new()
    }
}

impl<C: Codec> BingoServer<C> {
    /// Returns the address room sockets are accepted on.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.transport.local_addr()
    }

    /// Returns the address the HTTP API listens on.
    pub fn http_addr(&self) -> std::io::Result<SocketAddr> {
        self.http.local_addr()
    }

    /// A handle for managing rooms while the server runs.
    pub fn handle(&self) -> ServerHandle<C> {
        ServerHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Runs until the process is terminated.
    pub async fn run(self) -> Result<(), BingoError> {
        self.run_until(std::future::pending()).await
    }

    /// Serves the HTTP API and accepts room sockets until `shutdown`
    /// completes, then closes every room.
    pub async fn run_until(
        self,
        shutdown: impl Future<Output = ()> + Send,
    ) -> Result<(), BingoError> {
        let Self {
            mut transport,
            http,
            state,
        } = self;

        let app = api::router(Arc::clone(&state));
        let http_task = tokio::spawn(async move {
            if let Err(e) = axum::serve(http, app).await {
                tracing::error!(error = %e, "HTTP server stopped");
            }
        });

        tracing::info!("bingo server running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = transport.accept() => match accepted {
                    Ok(pending) => {
                        let state = Arc::clone(&state);
                        tokio::spawn(async move {
                            let peer = pending.peer_addr();
                            let conn = match pending.complete().await {
                                Ok(conn) => conn,
                                Err(e) => {
                                    tracing::debug!(%peer, error = %e, "handshake failed");
                                    return;
                                }
                            };
                            if let Err(e) = handle_connection(conn, state).await {
                                tracing::debug!(
                                    error = %e,
                                    "connection ended with error"
                                );
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                () = &mut shutdown => break,
            }
        }

        tracing::info!("shutting down");
        http_task.abort();
        let mut rooms = state.rooms.lock().await;
        for slug in rooms.slugs() {
            let _ = rooms.destroy_room(&slug).await;
        }
        transport.shutdown().await?;
        Ok(())
    }
}

/// Manages rooms on a running server. Cheap to clone.
pub struct ServerHandle<C: Codec = JsonCodec> {
    state: Arc<ServerState<C>>,
}

impl<C: Codec> Clone for ServerHandle<C> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<C: Codec> ServerHandle<C> {
    pub async fn create_room(&self, settings: RoomSettings) -> Result<RoomHandle, RoomError> {
        self.state.rooms.lock().await.create_room(settings)
    }

    /// Closes a room; its players receive `disconnected`.
    pub async fn destroy_room(&self, slug: &str) -> Result<(), RoomError> {
        self.state.rooms.lock().await.destroy_room(slug).await
    }

    pub async fn room(&self, slug: &str) -> Option<RoomHandle> {
        self.state.room(slug).await
    }

    pub async fn list_rooms(&self) -> Vec<RoomInfo> {
        self.state.rooms.lock().await.list_rooms().await
    }
}
