//! Client session tests against an in-memory room socket.
//!
//! The fake dialer hands out channel-backed connections; each test plays
//! the server by reading the client's frames and writing server frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use bingo_client::{
    Authorizer, BoardStore, ClientConfig, ClientError, ClientEvent, ConnectionState,
    Dialer, MIN_HEARTBEAT_INTERVAL, MemoryTokenStore, RoomClient, TokenStore,
};
use bingo_protocol::{
    Board, ChatMessage, Color, Goal, Player, ServerFrame, ServerMessage,
};
use bingo_transport::{Connection, ConnectionId, TransportError};
use serde_json::Value;
use tokio::sync::{Mutex, broadcast, mpsc};

const SLUG: &str = "test-room";

// =========================================================================
// Fakes
// =========================================================================

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

struct FakeConnection {
    id: ConnectionId,
    inbound: Mutex<mpsc::UnboundedReceiver<String>>,
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

impl Connection for FakeConnection {
    type Error = TransportError;

    async fn send(&self, text: &str) -> Result<(), TransportError> {
        self.outbound
            .send(text.to_owned())
            .map_err(|_| TransportError::ConnectionClosed("peer gone".into()))
    }

    async fn recv(&self) -> Result<Option<String>, TransportError> {
        Ok(self.inbound.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}

/// The server's end of a fake connection.
struct Peer {
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: Option<mpsc::UnboundedSender<String>>,
    closed: Arc<AtomicBool>,
}

impl Peer {
    async fn next_text(&mut self) -> String {
        tokio::time::timeout(Duration::from_secs(60), self.from_client.recv())
            .await
            .expect("timed out waiting for client frame")
            .expect("client side dropped")
    }

    async fn next_json(&mut self) -> Value {
        let text = self.next_text().await;
        serde_json::from_str(&text).expect("client sent invalid JSON")
    }

    fn send_raw(&self, text: &str) {
        self.to_client
            .as_ref()
            .expect("peer hung up")
            .send(text.to_owned())
            .unwrap();
    }

    fn send(&self, frame: ServerFrame) {
        self.send_raw(&serde_json::to_string(&frame).unwrap());
    }

    /// Drops the server's sender, which reads as a clean close.
    fn hang_up(&mut self) {
        self.to_client = None;
    }

    /// Sends a chat line and waits for the client to report it. Every
    /// frame sent before it has been processed by then.
    async fn barrier(&self, events: &mut broadcast::Receiver<ClientEvent>) {
        self.send(ServerFrame::new(ServerMessage::Chat {
            message: ChatMessage::system("barrier"),
        }));
        loop {
            let event = tokio::time::timeout(Duration::from_secs(60), events.recv())
                .await
                .expect("timed out waiting for barrier")
                .unwrap();
            if let ClientEvent::Chat(message) = event {
                if message.plain_text() == "barrier" {
                    return;
                }
            }
        }
    }
}

fn pair() -> (FakeConnection, Peer) {
    let (to_client, inbound) = mpsc::unbounded_channel();
    let (outbound, from_client) = mpsc::unbounded_channel();
    let closed = Arc::new(AtomicBool::new(false));
    let conn = FakeConnection {
        id: ConnectionId::new(NEXT_ID.fetch_add(1, Ordering::Relaxed)),
        inbound: Mutex::new(inbound),
        outbound,
        closed: Arc::clone(&closed),
    };
    let peer = Peer {
        from_client,
        to_client: Some(to_client),
        closed,
    };
    (conn, peer)
}

#[derive(Clone, Default)]
struct FakeDialer {
    connections: Arc<StdMutex<VecDeque<FakeConnection>>>,
}

impl FakeDialer {
    fn push(&self) -> Peer {
        let (conn, peer) = pair();
        self.connections.lock().unwrap().push_back(conn);
        peer
    }
}

impl Dialer for FakeDialer {
    type Connection = FakeConnection;

    async fn dial(&self, _slug: &str) -> Result<FakeConnection, TransportError> {
        self.connections.lock().unwrap().pop_front().ok_or_else(|| {
            TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "no server",
            ))
        })
    }
}

/// Accepts `pw`, refuses anything else with 403.
struct FakeAuthorizer;

impl Authorizer for FakeAuthorizer {
    async fn authorize(
        &self,
        _slug: &str,
        password: &str,
        _spectator: bool,
    ) -> Result<String, ClientError> {
        if password == "pw" {
            Ok("tok-1".into())
        } else {
            Err(ClientError::Handshake {
                status: 403,
                message: "Incorrect password".into(),
            })
        }
    }
}

// =========================================================================
// Helpers
// =========================================================================

struct Harness {
    client: RoomClient<FakeAuthorizer, FakeDialer>,
    dialer: FakeDialer,
    tokens: Arc<MemoryTokenStore>,
    store: BoardStore,
    events: broadcast::Receiver<ClientEvent>,
}

fn harness() -> Harness {
    harness_with(ClientConfig::new("http://unused", "ws://unused"))
}

fn harness_with(config: ClientConfig) -> Harness {
    let dialer = FakeDialer::default();
    let tokens = Arc::new(MemoryTokenStore::new());
    let store = BoardStore::new();
    let client = RoomClient::with_parts(
        SLUG,
        config,
        FakeAuthorizer,
        dialer.clone(),
        Arc::clone(&tokens) as Arc<dyn TokenStore>,
        store.clone(),
    );
    let events = client.events();
    Harness {
        client,
        dialer,
        tokens,
        store,
        events,
    }
}

fn visible_board() -> Board {
    let goals = (0..25)
        .map(|i| Goal::new(format!("g{i}"), format!("Goal {i}")))
        .collect();
    Board::from_goals(goals, false).unwrap()
}

fn alice() -> Player {
    Player {
        nickname: "alice".into(),
        color: Color::from("blue"),
        spectator: false,
        monitor: false,
        race_status: None,
    }
}

fn connected(board: Board) -> ServerFrame {
    ServerFrame::with_players(
        ServerMessage::Connected {
            board,
            chat_history: Vec::new(),
            nickname: Some("alice".into()),
            color: Some(Color::from("blue")),
            room_data: None,
        },
        vec![alice()],
    )
}

async fn wait_for(client: &RoomClient<FakeAuthorizer, FakeDialer>, want: ConnectionState) {
    let mut rx = client.watch_state();
    tokio::time::timeout(Duration::from_secs(60), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("never reached {want}, stuck at {}", client.state()))
        .unwrap();
}

/// Connects as alice and answers the join with a visible board.
async fn joined(h: &mut Harness) -> Peer {
    let mut peer = h.dialer.push();
    h.client.connect("alice", "pw", false).await.unwrap();
    let join = peer.next_json().await;
    assert_eq!(join["action"], "join");
    peer.send(connected(visible_board()));
    wait_for(&h.client, ConnectionState::Connected).await;
    peer
}

// =========================================================================
// Connect
// =========================================================================

#[tokio::test]
async fn test_connect_joins_and_fills_store() {
    let mut h = harness();
    let mut peer = h.dialer.push();
    assert_eq!(h.client.state(), ConnectionState::Uninitialized);

    h.client.connect("alice", "pw", false).await.unwrap();
    assert_eq!(h.client.state(), ConnectionState::Connecting);
    assert_eq!(h.tokens.token(SLUG).as_deref(), Some("tok-1"));

    let join = peer.next_json().await;
    assert_eq!(join["action"], "join");
    assert_eq!(join["authToken"], "tok-1");
    assert_eq!(join["nickname"], "alice");

    peer.send(connected(visible_board()));
    assert_eq!(h.client.wait_until_settled().await, ConnectionState::Connected);

    let snap = h.store.snapshot();
    assert_eq!(snap.height(), 5);
    assert!(snap.rows.iter().all(|row| row.len() == 5));
    assert!(h.client.chat_history().await.is_empty());
    assert_eq!(h.client.nickname().await.as_deref(), Some("alice"));
    assert_eq!(h.client.players().await, vec![alice()]);
}

#[tokio::test]
async fn test_connect_handshake_failure_closes_with_status() {
    let mut h = harness();
    let result = h.client.connect("alice", "wrong", false).await;

    let err = result.unwrap_err();
    assert_eq!(err.status(), Some(403));
    assert_eq!(h.client.state(), ConnectionState::Closed);
    assert_eq!(h.tokens.token(SLUG), None);
}

#[tokio::test]
async fn test_connect_dial_failure_closes() {
    let mut h = harness();
    // No connection queued.
    let result = h.client.connect("alice", "pw", false).await;
    assert!(matches!(result, Err(ClientError::Transport(_))));
    assert_eq!(h.client.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_connect_while_connected_is_rejected() {
    let mut h = harness();
    let _peer = joined(&mut h).await;

    let result = h.client.connect("alice", "pw", false).await;
    assert!(matches!(
        result,
        Err(ClientError::InvalidState(ConnectionState::Connected))
    ));
}

#[tokio::test]
async fn test_start_without_token_does_nothing() {
    let mut h = harness();
    assert!(!h.client.start().await.unwrap());
    assert_eq!(h.client.state(), ConnectionState::Uninitialized);
}

#[tokio::test]
async fn test_start_rejoins_with_stored_token() {
    let mut h = harness();
    h.tokens.set_token(SLUG, "tok-old").unwrap();
    let mut peer = h.dialer.push();

    assert!(h.client.start().await.unwrap());

    let join = peer.next_json().await;
    assert_eq!(join["authToken"], "tok-old");
    assert!(join.get("nickname").is_none(), "no hint on a resumed token");
}

#[tokio::test]
async fn test_nickname_hint_is_used_once() {
    let mut h = harness();
    let mut peer = joined(&mut h).await;
    peer.hang_up();
    wait_for(&h.client, ConnectionState::Closed).await;

    // Manual reconnect with the stored token: the hint was consumed.
    let mut peer = h.dialer.push();
    assert!(h.client.start().await.unwrap());
    let join = peer.next_json().await;
    assert_eq!(join["authToken"], "tok-1");
    assert!(join.get("nickname").is_none());
}

// =========================================================================
// Inbound frames
// =========================================================================

#[tokio::test]
async fn test_cell_update_touches_one_row() {
    let mut h = harness();
    let peer = joined(&mut h).await;
    let before = h.store.snapshot();

    let mut cell = before.cell(2, 3).unwrap().clone();
    cell.mark(Color::from("blue"));
    peer.send(ServerFrame::new(ServerMessage::CellUpdate { row: 2, col: 3, cell }));
    peer.barrier(&mut h.events).await;

    let after = h.store.snapshot();
    assert!(after.cell(2, 3).unwrap().is_marked_by(&Color::from("blue")));
    for r in 0..5 {
        assert_eq!(Arc::ptr_eq(&before.rows[r], &after.rows[r]), r != 2);
    }
}

#[tokio::test]
async fn test_cell_update_while_hidden_is_ignored() {
    let mut h = harness();
    let peer = joined(&mut h).await;

    peer.send(ServerFrame::new(ServerMessage::SyncBoard {
        board: Board::hidden_placeholder(),
    }));
    peer.barrier(&mut h.events).await;
    let hidden = h.store.snapshot();
    assert!(hidden.hidden);

    peer.send(ServerFrame::new(ServerMessage::CellUpdate {
        row: 0,
        col: 0,
        cell: visible_board().board[0][0].clone(),
    }));
    peer.barrier(&mut h.events).await;

    assert!(Arc::ptr_eq(&hidden, &h.store.snapshot()));
}

#[tokio::test]
async fn test_unauthorized_purges_token() {
    let mut h = harness();
    let peer = joined(&mut h).await;
    assert!(h.tokens.token(SLUG).is_some());

    peer.send(ServerFrame::new(ServerMessage::Unauthorized));
    wait_for(&h.client, ConnectionState::Unauthorized).await;

    assert_eq!(h.tokens.token(SLUG), None);
    assert!(peer.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_unauthorized_while_connecting() {
    let mut h = harness();
    let mut peer = h.dialer.push();
    h.client.connect("alice", "pw", false).await.unwrap();
    peer.next_json().await;

    peer.send(ServerFrame::new(ServerMessage::Unauthorized));
    assert_eq!(h.client.wait_until_settled().await, ConnectionState::Unauthorized);
    assert_eq!(h.tokens.token(SLUG), None);
}

#[tokio::test]
async fn test_disconnected_closes_and_keeps_board() {
    let mut h = harness();
    let peer = joined(&mut h).await;

    peer.send(ServerFrame::new(ServerMessage::Disconnected));
    wait_for(&h.client, ConnectionState::Closed).await;

    assert_eq!(h.store.snapshot().height(), 5);
    assert!(h.tokens.token(SLUG).is_some(), "token kept for a manual reconnect");
}

#[tokio::test]
async fn test_transport_close_keeps_board() {
    let mut h = harness();
    let mut peer = joined(&mut h).await;

    peer.hang_up();
    wait_for(&h.client, ConnectionState::Closed).await;

    assert_eq!(h.store.snapshot().height(), 5);
    assert!(matches!(h.client.mark(0, 0), Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn test_malformed_frame_is_dropped() {
    let mut h = harness();
    let peer = joined(&mut h).await;

    peer.send_raw("{not json");
    peer.send_raw(r#"{"action":"noSuchThing"}"#);
    peer.barrier(&mut h.events).await;

    assert_eq!(h.client.state(), ConnectionState::Connected);
    assert_eq!(h.client.chat_history().await.len(), 1);
}

#[tokio::test]
async fn test_roster_updates_own_color() {
    let mut h = harness();
    let peer = joined(&mut h).await;

    let mut me = alice();
    me.color = Color::from("red");
    peer.send(ServerFrame::with_players(
        ServerMessage::Chat {
            message: ChatMessage::system("alice changed color to red."),
        },
        vec![me.clone()],
    ));
    peer.barrier(&mut h.events).await;

    assert_eq!(h.client.color().await, Some(Color::from("red")));
    assert_eq!(h.client.players().await, vec![me]);
}

// =========================================================================
// Outbound actions
// =========================================================================

#[tokio::test]
async fn test_actions_require_connection() {
    let h = harness();
    assert!(matches!(h.client.chat("hi"), Err(ClientError::NotConnected)));
    assert!(matches!(h.client.reveal_card(), Err(ClientError::NotConnected)));
}

#[tokio::test]
async fn test_mark_sends_directional_command_without_touching_store() {
    let mut h = harness();
    let mut peer = joined(&mut h).await;
    let before = h.store.snapshot();

    h.client.mark(2, 3).unwrap();
    let frame = peer.next_json().await;
    assert_eq!(frame["action"], "mark");
    assert_eq!(frame["authToken"], "tok-1");
    assert_eq!(frame["row"], 2);
    assert_eq!(frame["col"], 3);

    assert!(Arc::ptr_eq(&before, &h.store.snapshot()));
}

#[tokio::test]
async fn test_mark_out_of_range_is_rejected_locally() {
    let mut h = harness();
    let _peer = joined(&mut h).await;

    let result = h.client.mark(5, 0);
    assert!(matches!(result, Err(ClientError::OutOfRange { row: 5, col: 0 })));
}

#[tokio::test]
async fn test_toggle_derives_direction_from_own_color() {
    let mut h = harness();
    let mut peer = h.dialer.push();
    h.client.connect("alice", "pw", false).await.unwrap();
    peer.next_json().await;

    let mut board = visible_board();
    board.board[0][0].mark(Color::from("blue"));
    board.board[0][1].mark(Color::from("red"));
    peer.send(connected(board));
    wait_for(&h.client, ConnectionState::Connected).await;

    h.client.toggle(0, 0).await.unwrap();
    assert_eq!(peer.next_json().await["action"], "unmark");

    h.client.toggle(0, 1).await.unwrap();
    assert_eq!(peer.next_json().await["action"], "mark");
}

#[tokio::test]
async fn test_new_card_and_reveal_frames() {
    let mut h = harness();
    let mut peer = joined(&mut h).await;

    h.client
        .new_card(Some(42), Default::default(), None)
        .unwrap();
    let frame = peer.next_json().await;
    assert_eq!(frame["action"], "newCard");
    assert_eq!(frame["seed"], 42);
    assert_eq!(frame["mode"], "random");

    h.client.reveal_card().unwrap();
    assert_eq!(peer.next_json().await["action"], "revealCard");
}

#[tokio::test]
async fn test_leave_removes_token_and_closes() {
    let mut h = harness();
    let mut peer = joined(&mut h).await;

    h.client.leave().unwrap();
    assert_eq!(peer.next_json().await["action"], "leave");
    wait_for(&h.client, ConnectionState::Closed).await;

    assert_eq!(h.tokens.token(SLUG), None);
    assert!(peer.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_shutdown_closes_socket() {
    let mut h = harness();
    let peer = joined(&mut h).await;

    h.client.shutdown().await;

    assert_eq!(h.client.state(), ConnectionState::Closed);
    assert!(peer.closed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_state_changes_are_broadcast() {
    let mut h = harness();
    let _peer = joined(&mut h).await;

    let mut seen = Vec::new();
    while let Ok(event) = h.events.try_recv() {
        if let ClientEvent::StateChanged(state) = event {
            seen.push(state);
        }
    }
    assert_eq!(
        seen,
        vec![ConnectionState::Connecting, ConnectionState::Connected]
    );
}

// =========================================================================
// Heartbeat
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_heartbeat_missing_pong_disconnects() {
    let mut h = harness_with(
        ClientConfig::new("http://unused", "ws://unused")
            .with_heartbeat_interval(Duration::from_secs(25))
            .with_pong_timeout(Duration::from_secs(10)),
    );
    let mut peer = joined(&mut h).await;
    let start = tokio::time::Instant::now();

    assert_eq!(peer.next_text().await, "ping");
    wait_for(&h.client, ConnectionState::Closed).await;

    assert!(start.elapsed() >= Duration::from_secs(35));
    assert!(peer.closed.load(Ordering::SeqCst));
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_answered_keeps_session() {
    let mut h = harness_with(
        ClientConfig::new("http://unused", "ws://unused")
            .with_heartbeat_interval(Duration::from_secs(25))
            .with_pong_timeout(Duration::from_secs(10)),
    );
    let mut peer = joined(&mut h).await;

    for _ in 0..4 {
        assert_eq!(peer.next_text().await, "ping");
        peer.send_raw("pong");
    }

    assert_eq!(h.client.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_pong_must_be_exact() {
    let mut h = harness_with(
        ClientConfig::new("http://unused", "ws://unused")
            .with_pong_timeout(Duration::from_secs(5)),
    );
    let mut peer = joined(&mut h).await;

    assert_eq!(peer.next_text().await, "ping");
    peer.send_raw("\"pong\"");
    peer.send_raw("PONG");

    wait_for(&h.client, ConnectionState::Closed).await;
}

#[tokio::test(start_paused = true)]
async fn test_zero_heartbeat_interval_is_raised_to_minimum() {
    let mut h = harness_with(
        ClientConfig::new("http://unused", "ws://unused")
            .with_heartbeat_interval(Duration::ZERO)
            .with_event_channel_capacity(0),
    );
    let mut peer = joined(&mut h).await;
    let start = tokio::time::Instant::now();

    assert_eq!(peer.next_text().await, "ping");
    assert!(start.elapsed() >= MIN_HEARTBEAT_INTERVAL);
    peer.send_raw("pong");
    assert_eq!(peer.next_text().await, "ping");
    assert_eq!(h.client.state(), ConnectionState::Connected);
}
