//! The room actor: one task that owns a room's canonical state.
//!
//! # Actor Model
//!
//! Each room runs as its own Tokio task and owns everything about the
//! room: the board, the chat history, the room data, and the token
//! registry. Nothing else touches that state. Callers talk to it through
//! a [`RoomHandle`], which sends [`RoomCommand`]s over a channel.
//!
//! ```text
//!  socket task A ──┐
//!  socket task B ──┼── RoomCommand ──→ [mpsc channel] ──→ RoomActor
//!  HTTP authorize ─┘                                         │
//!                                     RoomOutbound ←─────────┘
//!                               (one unbounded channel per socket)
//! ```
//!
//! Commands are handled one at a time, so every action is atomic with
//! respect to the room's state and every socket sees broadcasts in the
//! same order.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use bingo_protocol::{
    Action, Board, ChatMessage, ChatSegment, Color, GenerationMode, Player, RoomAction,
    RoomData, ServerFrame, ServerMessage,
};
use bingo_session::{Authenticator, PasswordAuthenticator, SessionManager};
use bingo_transport::ConnectionId;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::{CardGenerator, CardRequest, RoomConfig, RoomError, RoomSettings};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What the room pushes to one socket.
///
/// Frames are shared behind an `Arc` so a broadcast to many sockets
/// serializes the same value rather than cloning it per member.
#[derive(Debug, Clone)]
pub enum RoomOutbound {
    Frame(Arc<ServerFrame>),
    /// Close the socket after flushing earlier frames.
    Close,
}

/// Frames queued for one socket before the room drops it as too slow.
pub const MEMBER_QUEUE_CAPACITY: usize = 256;

/// Channel the room uses to push frames to one socket task.
///
/// Create it with [`MEMBER_QUEUE_CAPACITY`]. A socket whose queue is full
/// is evicted rather than waited on.
pub type MemberSender = mpsc::Sender<RoomOutbound>;

/// Updates pushed by the race-timing bridge.
///
/// The room stores these values without interpreting them and broadcasts
/// `updateRoomData` after each one.
#[derive(Debug, Clone)]
pub enum RoomDataUpdate {
    RacetimeConnection(Option<serde_json::Value>),
    RaceStarted(DateTime<Utc>),
    /// `None` clears a previous finish, e.g. after a race is reopened.
    RaceFinished(Option<DateTime<Utc>>),
    PlayerStatus {
        nickname: String,
        status: Option<serde_json::Value>,
    },
}

/// A snapshot of a room's state, returned by [`RoomHandle::info`].
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_data: RoomData,
    /// Joined sockets, spectators included.
    pub player_count: usize,
    /// Open sockets, joined or not.
    pub connection_count: usize,
    pub hidden: bool,
    pub chat_len: usize,
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub(crate) enum RoomCommand {
    Authorize {
        password: String,
        spectator: bool,
        reply: oneshot::Sender<Result<String, RoomError>>,
    },

    /// A socket opened on this room's endpoint.
    Attach {
        conn: ConnectionId,
        sender: MemberSender,
    },

    /// A decoded frame from an attached socket.
    Action {
        conn: ConnectionId,
        action: RoomAction,
    },

    /// A socket closed (or went silent and was reclaimed).
    Detach { conn: ConnectionId },

    UpdateRoomData {
        update: RoomDataUpdate,
        reply: oneshot::Sender<Result<(), RoomError>>,
    },

    Revoke {
        token: String,
        reply: oneshot::Sender<bool>,
    },

    GetInfo {
        reply: oneshot::Sender<RoomInfo>,
    },

    Shutdown,
}

// ---------------------------------------------------------------------------
// RoomHandle
// ---------------------------------------------------------------------------

/// A cheap, cloneable reference to a running room.
///
/// Every method sends a command to the actor. If the actor has stopped,
/// methods return [`RoomError::Unavailable`].
#[derive(Clone)]
pub struct RoomHandle {
    slug: Arc<str>,
    sender: mpsc::Sender<RoomCommand>,
}

impl RoomHandle {
    pub fn slug(&self) -> &str {
        &self.slug
    }

    fn unavailable(&self) -> RoomError {
        RoomError::Unavailable(self.slug.to_string())
    }

    async fn send(&self, cmd: RoomCommand) -> Result<(), RoomError> {
        self.sender.send(cmd).await.map_err(|_| self.unavailable())
    }

    /// Checks a password and issues a room token.
    ///
    /// # Errors
    /// - [`RoomError::Session`] wrapping `AuthRejected` on a bad password
    /// - [`RoomError::Unavailable`] if the room has stopped
    pub async fn authorize(
        &self,
        password: impl Into<String>,
        spectator: bool,
    ) -> Result<String, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Authorize {
            password: password.into(),
            spectator,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| self.unavailable())?
    }

    /// Registers a socket so the room can reply to it, including with
    /// `unauthorized` before it has joined.
    pub async fn attach(
        &self,
        conn: ConnectionId,
        sender: MemberSender,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Attach { conn, sender }).await
    }

    /// Forwards one client action. Fire-and-forget: results arrive as
    /// frames on the socket's [`MemberSender`].
    pub async fn action(
        &self,
        conn: ConnectionId,
        action: RoomAction,
    ) -> Result<(), RoomError> {
        self.send(RoomCommand::Action { conn, action }).await
    }

    /// Deregisters a socket, removing its player from the roster.
    pub async fn detach(&self, conn: ConnectionId) -> Result<(), RoomError> {
        self.send(RoomCommand::Detach { conn }).await
    }

    /// Applies a race-timing update and broadcasts the new room data.
    ///
    /// # Errors
    /// Returns [`RoomError::PlayerNotFound`] for a status update naming
    /// no known player.
    pub async fn update_room_data(
        &self,
        update: RoomDataUpdate,
    ) -> Result<(), RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::UpdateRoomData {
            update,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| self.unavailable())?
    }

    /// Revokes a token. A socket joined with it receives `unauthorized`
    /// and leaves the roster. Returns `false` if the token was unknown.
    pub async fn revoke(&self, token: impl Into<String>) -> Result<bool, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::Revoke {
            token: token.into(),
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    pub async fn info(&self) -> Result<RoomInfo, RoomError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(RoomCommand::GetInfo { reply: reply_tx }).await?;
        reply_rx.await.map_err(|_| self.unavailable())
    }

    /// Stops the room. Every socket receives `disconnected` and is closed.
    pub async fn shutdown(&self) -> Result<(), RoomError> {
        self.send(RoomCommand::Shutdown).await
    }
}

// ---------------------------------------------------------------------------
// RoomActor
// ---------------------------------------------------------------------------

/// One attached socket.
struct Member {
    sender: MemberSender,
    /// Set once the socket has joined.
    token: Option<String>,
}

struct RoomActor {
    settings: RoomSettings,
    config: RoomConfig,
    room_data: RoomData,
    board: Board,
    chat: VecDeque<ChatMessage>,
    /// Ordered by connection id, which is also arrival order, so the
    /// roster is stable between broadcasts.
    members: BTreeMap<ConnectionId, Member>,
    sessions: SessionManager,
    authenticator: Arc<dyn Authenticator>,
    generator: Arc<dyn CardGenerator>,
    receiver: mpsc::Receiver<RoomCommand>,
}

impl RoomActor {
    async fn run(mut self) {
        let slug = self.settings.slug.clone();
        tracing::info!(room = %slug, "room actor started");

        let mut sweep = tokio::time::interval(self.config.token_sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                cmd = self.receiver.recv() => {
                    let Some(cmd) = cmd else { break };
                    if !self.handle_command(cmd) {
                        break;
                    }
                }
                _ = sweep.tick() => {
                    self.sessions.expire_stale();
                    self.sessions.cleanup_expired();
                }
            }
        }

        self.close_all();
        tracing::info!(room = %slug, "room actor stopped");
    }

    /// Returns `false` when the actor should stop.
    fn handle_command(&mut self, cmd: RoomCommand) -> bool {
        match cmd {
            RoomCommand::Authorize {
                password,
                spectator,
                reply,
            } => {
                let _ = reply.send(self.handle_authorize(&password, spectator));
            }
            RoomCommand::Attach { conn, sender } => {
                self.members.insert(conn, Member { sender, token: None });
                tracing::debug!(room = %self.settings.slug, %conn, "socket attached");
            }
            RoomCommand::Action { conn, action } => {
                self.handle_action(conn, action);
            }
            RoomCommand::Detach { conn } => {
                self.handle_detach(conn);
            }
            RoomCommand::UpdateRoomData { update, reply } => {
                let _ = reply.send(self.handle_room_data_update(update));
            }
            RoomCommand::Revoke { token, reply } => {
                let _ = reply.send(self.handle_revoke(&token));
            }
            RoomCommand::GetInfo { reply } => {
                let _ = reply.send(self.info());
            }
            RoomCommand::Shutdown => {
                tracing::info!(room = %self.settings.slug, "room shutting down");
                return false;
            }
        }
        true
    }

    fn handle_authorize(
        &mut self,
        password: &str,
        spectator: bool,
    ) -> Result<String, RoomError> {
        let claims = self.authenticator.authenticate(password, spectator)?;
        let session = self.sessions.issue(claims);
        tracing::info!(
            room = %self.settings.slug,
            spectator = claims.spectator,
            monitor = claims.monitor,
            "token issued"
        );
        Ok(session.token.clone())
    }

    // -- Actions ----------------------------------------------------------

    fn handle_action(&mut self, conn: ConnectionId, action: RoomAction) {
        if !self.members.contains_key(&conn) {
            tracing::warn!(room = %self.settings.slug, %conn, "action from unattached socket");
            return;
        }

        let RoomAction { auth_token, action } = action;

        let spectator = match self.sessions.resolve(&auth_token) {
            Ok(session) => session.spectator,
            Err(e) => {
                tracing::debug!(
                    room = %self.settings.slug,
                    %conn,
                    action = action.name(),
                    error = %e,
                    "rejecting action"
                );
                self.send_to(conn, ServerFrame::new(ServerMessage::Unauthorized));
                return;
            }
        };

        if let Action::Join { nickname } = action {
            self.handle_join(conn, &auth_token, nickname);
            return;
        }

        // Everything but join needs the socket joined with this token.
        let joined = self
            .members
            .get(&conn)
            .is_some_and(|m| m.token.as_deref() == Some(auth_token.as_str()));
        if !joined {
            tracing::debug!(
                room = %self.settings.slug,
                %conn,
                action = action.name(),
                "action before join, dropping"
            );
            return;
        }

        if spectator && action.requires_player() {
            tracing::debug!(
                room = %self.settings.slug,
                %conn,
                action = action.name(),
                "spectators cannot change the board, dropping"
            );
            return;
        }

        match action {
            Action::Join { .. } => {}
            Action::Leave => self.handle_leave(conn),
            Action::Chat { message } => self.handle_chat(&auth_token, message),
            Action::Mark { row, col } => self.handle_mark(&auth_token, row, col, true),
            Action::Unmark { row, col } => self.handle_mark(&auth_token, row, col, false),
            Action::ChangeColor { color } => self.handle_change_color(&auth_token, color),
            Action::NewCard {
                seed,
                mode,
                difficulty,
            } => {
                let request = CardRequest {
                    game: &self.settings.game,
                    seed,
                    mode: &mode,
                    difficulty,
                };
                match self.generate_board(&request) {
                    Ok(board) => {
                        self.board = board;
                        tracing::info!(
                            room = %self.settings.slug,
                            hidden = self.board.hidden,
                            "new card generated"
                        );
                        self.broadcast_board();
                    }
                    Err(e) => {
                        tracing::warn!(room = %self.settings.slug, error = %e, "new card failed");
                    }
                }
            }
            Action::RevealCard => {
                self.board.hidden = false;
                tracing::info!(room = %self.settings.slug, "card revealed");
                self.broadcast_board();
            }
        }
    }

    fn handle_join(&mut self, conn: ConnectionId, token: &str, hint: Option<String>) {
        // A socket switching tokens gives up the old one first.
        if let Some(previous) = self
            .members
            .get(&conn)
            .and_then(|m| m.token.clone())
            .filter(|t| t != token)
        {
            self.leave_roster(conn, &previous);
        }

        let displaced = match self.sessions.join(token, conn) {
            Ok(displaced) => displaced,
            Err(_) => {
                self.send_to(conn, ServerFrame::new(ServerMessage::Unauthorized));
                return;
            }
        };
        if let Some(old) = displaced {
            tracing::info!(room = %self.settings.slug, %old, new = %conn, "token moved sockets");
            if let Some(member) = self.members.get_mut(&old) {
                member.token = None;
            }
            self.send_to(old, ServerFrame::new(ServerMessage::Disconnected));
            self.close(old);
        }

        // An identity bound by an earlier join wins over the hint.
        let unnamed = self
            .sessions
            .get(token)
            .is_some_and(|session| session.nickname.is_none());
        let fresh_name = unnamed.then(|| {
            let wanted = hint
                .map(|n| n.trim().to_owned())
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| format!("Player {}", self.sessions.len()));
            // Nicknames identify players in the roster, so they stay unique.
            self.sessions.unique_nickname(&wanted)
        });
        let Some(session) = self.sessions.get_mut(token) else {
            return;
        };
        if let Some(nickname) = fresh_name {
            session.nickname = Some(nickname);
        }
        let nickname = session.nickname.clone().unwrap_or_default();
        let color = session.color.clone();

        if let Some(member) = self.members.get_mut(&conn) {
            member.token = Some(token.to_owned());
        }
        tracing::info!(room = %self.settings.slug, %conn, %nickname, "player joined");

        let connected = ServerMessage::Connected {
            board: self.board.client_view(),
            chat_history: self.chat.iter().cloned().collect(),
            nickname: Some(nickname.clone()),
            color: Some(color),
            room_data: Some(self.room_data.clone()),
        };
        self.send_to(conn, ServerFrame::with_players(connected, self.roster()));
        self.announce(ChatMessage::system(format!("{nickname} has joined.")));
    }

    fn handle_leave(&mut self, conn: ConnectionId) {
        let Some(token) = self.members.get(&conn).and_then(|m| m.token.clone()) else {
            return;
        };
        self.leave_roster(conn, &token);
    }

    fn handle_detach(&mut self, conn: ConnectionId) {
        let Some(member) = self.members.remove(&conn) else {
            return;
        };
        tracing::debug!(room = %self.settings.slug, %conn, "socket detached");
        if let Some(token) = member.token {
            self.sessions.release(&token, conn);
            self.announce_departure(&token);
        }
    }

    /// Takes `conn` off the roster but keeps the socket attached.
    fn leave_roster(&mut self, conn: ConnectionId, token: &str) {
        if let Some(member) = self.members.get_mut(&conn) {
            member.token = None;
        }
        self.sessions.release(token, conn);
        self.announce_departure(token);
    }

    fn announce_departure(&mut self, token: &str) {
        let nickname = self
            .sessions
            .get(token)
            .and_then(|s| s.nickname.clone())
            .unwrap_or_default();
        tracing::info!(room = %self.settings.slug, %nickname, "player left");
        self.announce(ChatMessage::system(format!("{nickname} has left.")));
    }

    fn handle_chat(&mut self, token: &str, message: String) {
        let message = message.trim();
        if message.is_empty() {
            return;
        }
        let Some(session) = self.sessions.get(token) else {
            return;
        };
        let nickname = session.nickname.clone().unwrap_or_default();
        let line = ChatMessage::from_player(&nickname, &session.color, message);
        self.push_chat(line.clone());
        self.broadcast(ServerFrame::new(ServerMessage::Chat { message: line }));
    }

    fn handle_mark(&mut self, token: &str, row: usize, col: usize, mark: bool) {
        if self.board.hidden {
            tracing::debug!(room = %self.settings.slug, row, col, "board hidden, dropping mark");
            return;
        }
        let Some(color) = self.sessions.get(token).map(|s| s.color.clone()) else {
            return;
        };
        let Some(cell) = self.board.cell_mut(row, col) else {
            tracing::warn!(room = %self.settings.slug, row, col, "cell out of range, dropping");
            return;
        };

        if mark {
            cell.mark(color);
        } else {
            cell.unmark(&color);
        }
        // Broadcast even when the set did not change, so every client
        // converges on the authority's value.
        let cell = cell.clone();
        self.broadcast(ServerFrame::new(ServerMessage::CellUpdate { row, col, cell }));
    }

    fn handle_change_color(&mut self, token: &str, color: Color) {
        let Some(session) = self.sessions.get_mut(token) else {
            return;
        };
        if session.color == color {
            return;
        }
        session.color = color.clone();
        let nickname = session.nickname.clone().unwrap_or_default();
        tracing::debug!(room = %self.settings.slug, %nickname, %color, "color changed");

        self.announce(ChatMessage(vec![
            ChatSegment::Colored {
                contents: nickname,
                color: color.clone(),
            },
            ChatSegment::Text(format!(" has changed their color to {color}.")),
        ]));
    }

    // -- Room data --------------------------------------------------------

    fn handle_room_data_update(&mut self, update: RoomDataUpdate) -> Result<(), RoomError> {
        let mut with_players = false;
        match update {
            RoomDataUpdate::RacetimeConnection(connection) => {
                self.room_data.racetime_connection = connection;
            }
            RoomDataUpdate::RaceStarted(at) => {
                self.room_data.started_at = Some(at);
                self.room_data.finished_at = None;
            }
            RoomDataUpdate::RaceFinished(at) => {
                self.room_data.finished_at = at;
            }
            RoomDataUpdate::PlayerStatus { nickname, status } => {
                let session = self
                    .sessions
                    .find_by_nickname(&nickname)
                    .ok_or_else(|| RoomError::PlayerNotFound(nickname.clone()))?;
                session.race_status = status;
                with_players = true;
            }
        }

        let message = ServerMessage::UpdateRoomData {
            room_data: self.room_data.clone(),
        };
        let frame = if with_players {
            ServerFrame::with_players(message, self.roster())
        } else {
            ServerFrame::new(message)
        };
        self.broadcast(frame);
        Ok(())
    }

    fn handle_revoke(&mut self, token: &str) -> bool {
        let Some(session) = self.sessions.revoke(token) else {
            return false;
        };
        if let Some(conn) = session.connection() {
            if let Some(member) = self.members.get_mut(&conn) {
                member.token = None;
            }
            self.send_to(conn, ServerFrame::new(ServerMessage::Unauthorized));
            if let Some(nickname) = session.nickname {
                self.announce(ChatMessage::system(format!("{nickname} has left.")));
            }
        }
        true
    }

    // -- Helpers ----------------------------------------------------------

    fn generate_board(&self, request: &CardRequest<'_>) -> Result<Board, RoomError> {
        let goals = self.generator.generate(request)?;
        Board::from_goals(goals, self.settings.game.hide_card)
            .map_err(|e| RoomError::Generation(e.to_string()))
    }

    /// Joined players in arrival order.
    fn roster(&self) -> Vec<Player> {
        self.members
            .values()
            .filter_map(|m| m.token.as_deref())
            .filter_map(|token| self.sessions.get(token))
            .filter_map(|session| session.player())
            .collect()
    }

    fn push_chat(&mut self, line: ChatMessage) {
        if self.config.max_chat_history == 0 {
            return;
        }
        while self.chat.len() >= self.config.max_chat_history {
            self.chat.pop_front();
        }
        self.chat.push_back(line);
    }

    /// Records a presence line and broadcasts it with the roster.
    fn announce(&mut self, line: ChatMessage) {
        self.push_chat(line.clone());
        let frame =
            ServerFrame::with_players(ServerMessage::Chat { message: line }, self.roster());
        self.broadcast(frame);
    }

    fn broadcast_board(&mut self) {
        self.broadcast(ServerFrame::new(ServerMessage::SyncBoard {
            board: self.board.client_view(),
        }));
    }

    /// Sends to every joined socket.
    fn broadcast(&mut self, frame: ServerFrame) {
        let frame = Arc::new(frame);
        let lagging: Vec<ConnectionId> = self
            .members
            .iter()
            .filter(|(_, m)| m.token.is_some())
            .filter(|(_, m)| {
                m.sender
                    .try_send(RoomOutbound::Frame(Arc::clone(&frame)))
                    .is_err()
            })
            .map(|(conn, _)| *conn)
            .collect();
        for conn in lagging {
            self.evict(conn);
        }
    }

    fn send_to(&mut self, conn: ConnectionId, frame: ServerFrame) {
        let failed = self.members.get(&conn).is_some_and(|member| {
            member
                .sender
                .try_send(RoomOutbound::Frame(Arc::new(frame)))
                .is_err()
        });
        if failed {
            self.evict(conn);
        }
    }

    /// Drops a socket whose queue is full or whose task has gone away.
    ///
    /// Dropping the sender lets the socket task flush what is already
    /// queued and then close.
    fn evict(&mut self, conn: ConnectionId) {
        let Some(member) = self.members.remove(&conn) else {
            return;
        };
        tracing::warn!(room = %self.settings.slug, %conn, "socket not keeping up, dropping");
        if let Some(token) = member.token {
            self.sessions.release(&token, conn);
            self.announce_departure(&token);
        }
    }

    fn close(&mut self, conn: ConnectionId) {
        if let Some(member) = self.members.remove(&conn) {
            let _ = member.sender.try_send(RoomOutbound::Close);
        }
    }

    fn close_all(&mut self) {
        let frame = Arc::new(ServerFrame::new(ServerMessage::Disconnected));
        for (_, member) in std::mem::take(&mut self.members) {
            let _ = member.sender.try_send(RoomOutbound::Frame(Arc::clone(&frame)));
            let _ = member.sender.try_send(RoomOutbound::Close);
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_data: self.room_data.clone(),
            player_count: self.members.values().filter(|m| m.token.is_some()).count(),
            connection_count: self.members.len(),
            hidden: self.board.hidden,
            chat_len: self.chat.len(),
        }
    }
}

/// Generates the first board and spawns the actor.
///
/// # Errors
/// Returns [`RoomError::Generation`] if the initial board cannot be built.
pub(crate) fn spawn_room(
    settings: RoomSettings,
    config: RoomConfig,
    generator: Arc<dyn CardGenerator>,
    authenticator: Option<Arc<dyn Authenticator>>,
) -> Result<RoomHandle, RoomError> {
    let mode = GenerationMode::default();
    let goals = generator.generate(&CardRequest {
        game: &settings.game,
        seed: None,
        mode: &mode,
        difficulty: None,
    })?;
    let board = Board::from_goals(goals, settings.game.hide_card)
        .map_err(|e| RoomError::Generation(e.to_string()))?;

    let authenticator = authenticator.unwrap_or_else(|| {
        Arc::new(PasswordAuthenticator::new(
            settings.password.clone(),
            settings.monitor_password.clone(),
        ))
    });

    let (tx, rx) = mpsc::channel(config.channel_size);
    let slug: Arc<str> = Arc::from(settings.slug.as_str());

    let actor = RoomActor {
        room_data: settings.initial_room_data(),
        sessions: SessionManager::new(config.session.clone()),
        settings,
        config,
        board,
        chat: VecDeque::new(),
        members: BTreeMap::new(),
        authenticator,
        generator,
        receiver: rx,
    };

    tokio::spawn(actor.run());

    Ok(RoomHandle { slug, sender: tx })
}
