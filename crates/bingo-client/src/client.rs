//! The client session: one handle for the caller, one background task per
//! open socket.
//!
//! The handle owns the token store, the board store, and whatever the
//! session has learned about the room (roster, chat, room data, own
//! identity). The task drains inbound frames in order, folds them into that
//! state, keeps the heartbeat going, and forwards queued actions.

use std::sync::Arc;
use std::time::Duration;

use bingo_protocol::{
    Action, ChatMessage, Codec, Color, Frame, GenerationMode, JsonCodec, PING,
    PONG, Player, RoomAction, RoomData, ServerFrame, ServerMessage,
};
use bingo_transport::{Connection, TransportError};
use tokio::sync::{Mutex, broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{
    Authorizer, BoardStore, ClientError, ConnectionState, Dialer,
    HttpAuthorizer, StateEvent, TokenStore, WebSocketDialer,
};

/// How often a `ping` is sent on an open socket.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(25);
/// How long to wait for the matching `pong`.
pub const DEFAULT_PONG_TIMEOUT: Duration = Duration::from_secs(10);
/// How long [`RoomClient::shutdown`] waits for the session task.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);
/// Shorter heartbeat intervals, zero included, are raised to this.
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Settings for a [`RoomClient`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Origin for the authorize request, e.g. `http://127.0.0.1:8080`.
    pub http_base: String,
    /// Origin for the room socket, e.g. `ws://127.0.0.1:8081`.
    pub socket_base: String,
    /// Raised to [`MIN_HEARTBEAT_INTERVAL`] if shorter.
    pub heartbeat_interval: Duration,
    pub pong_timeout: Duration,
    pub shutdown_timeout: Duration,
    /// Capacity of the [`ClientEvent`] broadcast channel, at least 1.
    pub event_channel_capacity: usize,
}

impl ClientConfig {
    pub fn new(http_base: impl Into<String>, socket_base: impl Into<String>) -> Self {
        Self {
            http_base: http_base.into(),
            socket_base: socket_base.into(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            pong_timeout: DEFAULT_PONG_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            event_channel_capacity: 256,
        }
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }
}

// ---------------------------------------------------------------------------
// ClientEvent
// ---------------------------------------------------------------------------

/// Notifications for consumers that do not read the board store. Board
/// changes go through [`BoardStore::subscribe`] instead.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    StateChanged(ConnectionState),
    Chat(ChatMessage),
    Players(Vec<Player>),
    RoomData(RoomData),
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct Identity {
    nickname: Option<String>,
    color: Option<Color>,
}

/// State written by the session task and read through the handle.
struct Shared {
    state: watch::Sender<ConnectionState>,
    players: Mutex<Vec<Player>>,
    chat: Mutex<Vec<ChatMessage>>,
    room_data: Mutex<Option<RoomData>>,
    identity: Mutex<Identity>,
    events: broadcast::Sender<ClientEvent>,
}

impl Shared {
    fn new(event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: watch::Sender::new(ConnectionState::default()),
            players: Mutex::new(Vec::new()),
            chat: Mutex::new(Vec::new()),
            room_data: Mutex::new(None),
            identity: Mutex::new(Identity::default()),
            events,
        }
    }

    fn current(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Feeds `event` to the state machine. Returns the new state if it
    /// changed.
    fn transition(&self, event: StateEvent) -> Option<ConnectionState> {
        let mut changed = None;
        self.state.send_if_modified(|state| match state.on(event) {
            Some(next) if next != *state => {
                tracing::debug!(from = %state, to = %next, ?event, "state transition");
                *state = next;
                changed = Some(next);
                true
            }
            _ => false,
        });
        if let Some(next) = changed {
            self.emit(ClientEvent::StateChanged(next));
        }
        changed
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}

// ---------------------------------------------------------------------------
// RoomClient
// ---------------------------------------------------------------------------

/// The running session task and the channels into it.
struct SessionTask {
    commands: mpsc::UnboundedSender<Action>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

/// A participant in one room.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use bingo_client::{BoardStore, ClientConfig, MemoryTokenStore, RoomClient};
///
/// # async fn example() -> Result<(), bingo_client::ClientError> {
/// let config = ClientConfig::new("http://127.0.0.1:8080", "ws://127.0.0.1:8081");
/// let store = BoardStore::new();
/// let mut client = RoomClient::new("my-room", config, Arc::new(MemoryTokenStore::new()), store.clone());
///
/// client.connect("alice", "hunter2", false).await?;
/// client.wait_until_settled().await;
/// client.mark(2, 3)?;
/// # Ok(())
/// # }
/// ```
pub struct RoomClient<A = HttpAuthorizer, D = WebSocketDialer> {
    slug: String,
    config: ClientConfig,
    authorizer: A,
    dialer: D,
    tokens: Arc<dyn TokenStore>,
    store: BoardStore,
    shared: Arc<Shared>,
    session: Option<SessionTask>,
}

impl RoomClient {
    /// A client talking HTTP and WebSocket to the origins in `config`.
    pub fn new(
        slug: impl Into<String>,
        config: ClientConfig,
        tokens: Arc<dyn TokenStore>,
        store: BoardStore,
    ) -> Self {
        let authorizer = HttpAuthorizer::new(config.http_base.clone());
        let dialer = WebSocketDialer::new(config.socket_base.clone());
        Self::with_parts(slug, config, authorizer, dialer, tokens, store)
    }
}

impl<A: Authorizer, D: Dialer> RoomClient<A, D> {
    pub fn with_parts(
        slug: impl Into<String>,
        config: ClientConfig,
        authorizer: A,
        dialer: D,
        tokens: Arc<dyn TokenStore>,
        store: BoardStore,
    ) -> Self {
        let shared = Arc::new(Shared::new(config.event_channel_capacity));
        Self {
            slug: slug.into(),
            config,
            authorizer,
            dialer,
            tokens,
            store,
            shared,
            session: None,
        }
    }

    // -- Lifecycle --------------------------------------------------------

    /// Rejoins with a persisted token, skipping the password.
    ///
    /// Returns `Ok(false)` if there is no token for this room.
    pub async fn start(&mut self) -> Result<bool, ClientError> {
        let Some(token) = self.tokens.token(&self.slug) else {
            return Ok(false);
        };
        self.begin()?;
        self.open_session(token).await?;
        Ok(true)
    }

    /// Authorizes with `password`, stores the token, opens the socket, and
    /// sends `join` with `nickname` as the hint.
    ///
    /// Returns once `join` is on the wire. The `connected` reply arrives
    /// asynchronously; see [`wait_until_settled`](Self::wait_until_settled).
    ///
    /// # Errors
    /// A refused handshake is [`ClientError::Handshake`] with the HTTP
    /// status, and leaves the client `Closed`.
    pub async fn connect(
        &mut self,
        nickname: &str,
        password: &str,
        spectator: bool,
    ) -> Result<(), ClientError> {
        self.begin()?;

        let token = match self
            .authorizer
            .authorize(&self.slug, password, spectator)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                tracing::warn!(room = %self.slug, error = %e, "handshake failed");
                self.shared.transition(StateEvent::HandshakeFailed);
                return Err(e);
            }
        };

        let (slug, stored) = (self.slug.clone(), token.clone());
        store_write(&self.tokens, move |tokens| tokens.set_token(&slug, &stored)).await?;
        self.tokens.set_nickname_hint(&self.slug, nickname);
        self.open_session(token).await
    }

    /// Sends `leave`, forgets the token, and closes the socket.
    pub fn leave(&self) -> Result<(), ClientError> {
        self.send(Action::Leave)?;
        self.tokens.remove_token(&self.slug)
    }

    /// Closes the socket and waits for the session task to finish.
    pub async fn shutdown(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        if let Some(tx) = session.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = session.task.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!(error = %e, "session task failed"),
                Err(_) => {
                    tracing::warn!("session task did not stop in time, aborting");
                    task.abort();
                    self.shared.transition(StateEvent::TransportClosed);
                }
            }
        }
    }

    // -- Actions ----------------------------------------------------------

    /// Adds this player's color to a cell.
    pub fn mark(&self, row: usize, col: usize) -> Result<(), ClientError> {
        self.check_cell(row, col)?;
        self.send(Action::Mark { row, col })
    }

    /// Removes this player's color from a cell.
    pub fn unmark(&self, row: usize, col: usize) -> Result<(), ClientError> {
        self.check_cell(row, col)?;
        self.send(Action::Unmark { row, col })
    }

    /// Sends `unmark` if the cell already carries this player's color,
    /// `mark` otherwise. The store is left alone until the server answers.
    pub async fn toggle(&self, row: usize, col: usize) -> Result<(), ClientError> {
        let color = self
            .shared
            .identity
            .lock()
            .await
            .color
            .clone()
            .ok_or(ClientError::NotConnected)?;
        let snapshot = self.store.snapshot();
        let cell = snapshot
            .cell(row, col)
            .ok_or(ClientError::OutOfRange { row, col })?;

        if cell.is_marked_by(&color) {
            self.send(Action::Unmark { row, col })
        } else {
            self.send(Action::Mark { row, col })
        }
    }

    pub fn change_color(&self, color: impl Into<Color>) -> Result<(), ClientError> {
        self.send(Action::ChangeColor {
            color: color.into(),
        })
    }

    pub fn chat(&self, message: impl Into<String>) -> Result<(), ClientError> {
        self.send(Action::Chat {
            message: message.into(),
        })
    }

    /// Asks for a fresh board. All three inputs go to the server's card
    /// generator as given.
    pub fn new_card(
        &self,
        seed: Option<u64>,
        mode: GenerationMode,
        difficulty: Option<u32>,
    ) -> Result<(), ClientError> {
        self.send(Action::NewCard {
            seed,
            mode,
            difficulty,
        })
    }

    pub fn reveal_card(&self) -> Result<(), ClientError> {
        self.send(Action::RevealCard)
    }

    // -- Accessors --------------------------------------------------------

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.current()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Waits until the client is no longer `Connecting` and returns the
    /// state it settled in.
    pub async fn wait_until_settled(&self) -> ConnectionState {
        let mut rx = self.shared.state.subscribe();
        match rx.wait_for(|s| *s != ConnectionState::Connecting).await {
            Ok(state) => *state,
            Err(_) => self.state(),
        }
    }

    pub fn events(&self) -> broadcast::Receiver<ClientEvent> {
        self.shared.events.subscribe()
    }

    pub fn board(&self) -> &BoardStore {
        &self.store
    }

    pub async fn players(&self) -> Vec<Player> {
        self.shared.players.lock().await.clone()
    }

    pub async fn chat_history(&self) -> Vec<ChatMessage> {
        self.shared.chat.lock().await.clone()
    }

    pub async fn room_data(&self) -> Option<RoomData> {
        self.shared.room_data.lock().await.clone()
    }

    pub async fn nickname(&self) -> Option<String> {
        self.shared.identity.lock().await.nickname.clone()
    }

    pub async fn color(&self) -> Option<Color> {
        self.shared.identity.lock().await.color.clone()
    }

    // -- Internal ---------------------------------------------------------

    /// Enters `Connecting`, tearing down a finished session first.
    fn begin(&mut self) -> Result<(), ClientError> {
        let state = self.shared.current();
        if state.on(StateEvent::Connect).is_none() {
            return Err(ClientError::InvalidState(state));
        }
        if let Some(mut old) = self.session.take() {
            if let Some(task) = old.task.take() {
                task.abort();
            }
        }
        self.shared.transition(StateEvent::Connect);
        Ok(())
    }

    async fn open_session(&mut self, token: String) -> Result<(), ClientError> {
        let conn = match self.dialer.dial(&self.slug).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(room = %self.slug, error = %e, "could not open socket");
                self.shared.transition(StateEvent::TransportClosed);
                return Err(e.into());
            }
        };

        let join = RoomAction::new(
            token.clone(),
            Action::Join {
                nickname: self.tokens.take_nickname_hint(&self.slug),
            },
        );
        if let Err(e) = send_frame(&conn, &join).await {
            let _ = conn.close().await;
            self.shared.transition(StateEvent::TransportClosed);
            return Err(e);
        }
        tracing::debug!(room = %self.slug, conn_id = %conn.id(), "join sent");

        let (commands, cmd_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let session = SessionLoop {
            slug: self.slug.clone(),
            token,
            conn,
            shared: Arc::clone(&self.shared),
            store: self.store.clone(),
            tokens: Arc::clone(&self.tokens),
            heartbeat_interval: self.config.heartbeat_interval.max(MIN_HEARTBEAT_INTERVAL),
            pong_timeout: self.config.pong_timeout,
        };
        let task = tokio::spawn(session.run(cmd_rx, shutdown_rx));

        self.session = Some(SessionTask {
            commands,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        });
        Ok(())
    }

    fn check_cell(&self, row: usize, col: usize) -> Result<(), ClientError> {
        if self.store.snapshot().contains(row, col) {
            Ok(())
        } else {
            Err(ClientError::OutOfRange { row, col })
        }
    }

    fn send(&self, action: Action) -> Result<(), ClientError> {
        let state = self.shared.current();
        if state != ConnectionState::Connected {
            return Err(ClientError::NotConnected);
        }
        let session = self.session.as_ref().ok_or(ClientError::NotConnected)?;
        session
            .commands
            .send(action)
            .map_err(|_| ClientError::NotConnected)
    }
}

impl<A, D> std::fmt::Debug for RoomClient<A, D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomClient")
            .field("slug", &self.slug)
            .field("state", &self.shared.current())
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

impl<A, D> Drop for RoomClient<A, D> {
    fn drop(&mut self) {
        if let Some(task) = self.session.as_mut().and_then(|s| s.task.take()) {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Session loop
// ---------------------------------------------------------------------------

enum Flow {
    Continue,
    Stop,
}

struct SessionLoop<C> {
    slug: String,
    token: String,
    conn: C,
    shared: Arc<Shared>,
    store: BoardStore,
    tokens: Arc<dyn TokenStore>,
    heartbeat_interval: Duration,
    pong_timeout: Duration,
}

impl<C: Connection<Error = TransportError>> SessionLoop<C> {
    /// Runs until the socket closes, the authority ends the session, a
    /// heartbeat goes unanswered, or the handle asks to stop.
    async fn run(
        self,
        mut commands: mpsc::UnboundedReceiver<Action>,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        let mut ticker = tokio::time::interval_at(
            Instant::now() + self.heartbeat_interval,
            self.heartbeat_interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut pong_deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(action) = cmd else {
                        // Handle dropped.
                        let _ = self.conn.close().await;
                        break;
                    };
                    let leaving = matches!(action, Action::Leave);
                    let frame = RoomAction::new(self.token.clone(), action);
                    if let Err(e) = send_frame(&self.conn, &frame).await {
                        tracing::warn!(room = %self.slug, error = %e, "send failed");
                        self.shared.transition(StateEvent::TransportClosed);
                        break;
                    }
                    if leaving {
                        self.close().await;
                        break;
                    }
                }

                _ = &mut shutdown_rx => {
                    self.close().await;
                    break;
                }

                inbound = self.conn.recv() => {
                    match inbound {
                        Ok(Some(text)) => match Frame::classify(&text) {
                            Frame::Pong => pong_deadline = None,
                            Frame::Ping => {
                                let _ = self.conn.send(PONG).await;
                            }
                            Frame::Message(text) => {
                                if let Flow::Stop = self.handle_text(text).await {
                                    break;
                                }
                            }
                        },
                        Ok(None) => {
                            tracing::info!(room = %self.slug, "socket closed by server");
                            self.shared.transition(StateEvent::TransportClosed);
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(room = %self.slug, error = %e, "socket failed");
                            self.shared.transition(StateEvent::TransportClosed);
                            break;
                        }
                    }
                }

                _ = ticker.tick() => {
                    if pong_deadline.is_some() {
                        continue;
                    }
                    if let Err(e) = self.conn.send(PING).await {
                        tracing::warn!(room = %self.slug, error = %e, "ping failed");
                        self.shared.transition(StateEvent::TransportClosed);
                        break;
                    }
                    pong_deadline = Some(Instant::now() + self.pong_timeout);
                }

                _ = tokio::time::sleep_until(pong_deadline.unwrap_or_else(Instant::now)),
                    if pong_deadline.is_some() =>
                {
                    tracing::warn!(room = %self.slug, "no pong within timeout, disconnecting");
                    let _ = self.conn.close().await;
                    self.shared.transition(StateEvent::TransportClosed);
                    break;
                }
            }
        }

        tracing::debug!(room = %self.slug, state = %self.shared.current(), "session ended");
    }

    async fn close(&self) {
        self.shared.transition(StateEvent::Close);
        let _ = self.conn.close().await;
        self.shared.transition(StateEvent::TransportClosed);
    }

    async fn handle_text(&self, text: &str) -> Flow {
        let frame: ServerFrame = match JsonCodec.decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!(room = %self.slug, error = %e, "dropping malformed frame");
                return Flow::Continue;
            }
        };

        if let Some(players) = frame.players {
            self.update_players(players).await;
        }

        match frame.message {
            ServerMessage::Connected {
                board,
                chat_history,
                nickname,
                color,
                room_data,
            } => {
                self.store.replace(board);
                *self.shared.chat.lock().await = chat_history;
                {
                    let mut identity = self.shared.identity.lock().await;
                    identity.nickname = nickname;
                    identity.color = color;
                }
                if let Some(data) = room_data {
                    *self.shared.room_data.lock().await = Some(data.clone());
                    self.shared.emit(ClientEvent::RoomData(data));
                }
                self.shared.transition(StateEvent::Joined);
                tracing::info!(room = %self.slug, "joined");
            }
            ServerMessage::SyncBoard { board } => self.store.replace(board),
            ServerMessage::CellUpdate { row, col, cell } => {
                self.store.apply_cell(row, col, cell);
            }
            ServerMessage::Chat { message } => {
                self.shared.chat.lock().await.push(message.clone());
                self.shared.emit(ClientEvent::Chat(message));
            }
            ServerMessage::UpdateRoomData { room_data } => {
                *self.shared.room_data.lock().await = Some(room_data.clone());
                self.shared.emit(ClientEvent::RoomData(room_data));
            }
            ServerMessage::Unauthorized => {
                tracing::warn!(room = %self.slug, "token rejected, purging");
                let slug = self.slug.clone();
                let purged =
                    store_write(&self.tokens, move |tokens| tokens.remove_token(&slug)).await;
                if let Err(e) = purged {
                    tracing::error!(room = %self.slug, error = %e, "could not purge token");
                }
                self.shared.transition(StateEvent::Unauthorized);
                let _ = self.conn.close().await;
                return Flow::Stop;
            }
            ServerMessage::Disconnected => {
                tracing::info!(room = %self.slug, "disconnected by server");
                let _ = self.conn.close().await;
                self.shared.transition(StateEvent::TransportClosed);
                return Flow::Stop;
            }
        }
        Flow::Continue
    }

    /// Stores the roster and picks up this player's color from it.
    async fn update_players(&self, players: Vec<Player>) {
        {
            let mut identity = self.shared.identity.lock().await;
            let own = identity
                .nickname
                .as_deref()
                .and_then(|nick| players.iter().find(|p| p.nickname == nick));
            if let Some(player) = own {
                identity.color = Some(player.color.clone());
            }
        }
        *self.shared.players.lock().await = players.clone();
        self.shared.emit(ClientEvent::Players(players));
    }
}

/// Runs a token-store write on the blocking pool, since file-backed stores
/// touch the disk.
async fn store_write<F>(tokens: &Arc<dyn TokenStore>, write: F) -> Result<(), ClientError>
where
    F: FnOnce(&dyn TokenStore) -> Result<(), ClientError> + Send + 'static,
{
    let tokens = Arc::clone(tokens);
    tokio::task::spawn_blocking(move || write(tokens.as_ref()))
        .await
        .map_err(|e| ClientError::TokenStore(std::io::Error::other(e)))?
}

async fn send_frame<C: Connection<Error = TransportError>>(
    conn: &C,
    frame: &RoomAction,
) -> Result<(), ClientError> {
    let text = JsonCodec.encode(frame)?;
    conn.send(&text).await?;
    Ok(())
}
