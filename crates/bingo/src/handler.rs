//! Per-connection handler: room routing, heartbeats, and frame pumping.
//!
//! Each accepted socket gets its own Tokio task running this handler.
//! The flow is:
//!   1. Pick the room from the request path (`/socket/{slug}`)
//!   2. Attach to the room with an outbound channel
//!   3. Loop: answer `ping`, decode actions and forward them, and write
//!      whatever the room pushes back
//!
//! Authorization happens per frame inside the room: every action carries
//! its token, so the handler itself never rejects a frame.

use std::sync::Arc;
use std::time::Duration;

use bingo_protocol::{Codec, Frame, PONG, ProtocolError, RoomAction};
use bingo_room::{MEMBER_QUEUE_CAPACITY, RoomError, RoomHandle, RoomOutbound};
use bingo_transport::{Connection, ConnectionId, WebSocketConnection};
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::BingoError;
use crate::server::ServerState;

const SOCKET_PREFIX: &str = "/socket/";

/// Drop guard that detaches the socket from its room when the handler
/// exits.
///
/// This ensures cleanup happens even if the handler panics. Since `Drop`
/// is synchronous, we spawn a fire-and-forget task for the async send.
struct DetachGuard {
    conn_id: ConnectionId,
    room: RoomHandle,
}

impl Drop for DetachGuard {
    fn drop(&mut self) {
        let conn_id = self.conn_id;
        let room = self.room.clone();
        tokio::spawn(async move {
            let _ = room.detach(conn_id).await;
        });
    }
}

/// Extracts the room slug from a socket path.
fn room_slug(path: &str) -> Option<&str> {
    let slug = path.strip_prefix(SOCKET_PREFIX)?.trim_end_matches('/');
    (!slug.is_empty() && !slug.contains('/')).then_some(slug)
}

/// Sends one frame, or returns `Ok(false)` if the peer has not taken it
/// within `limit`.
async fn send_within<C: Connection>(
    conn: &C,
    text: &str,
    limit: Duration,
) -> Result<bool, C::Error> {
    match tokio::time::timeout(limit, conn.send(text)).await {
        Ok(sent) => sent.map(|()| true),
        Err(_) => Ok(false),
    }
}

/// Handles a single connection from accept to close.
pub(crate) async fn handle_connection<C: Codec>(
    conn: WebSocketConnection,
    state: Arc<ServerState<C>>,
) -> Result<(), BingoError> {
    let conn_id = conn.id();

    let Some(slug) = room_slug(conn.path()) else {
        let _ = conn.close().await;
        return Err(ProtocolError::InvalidMessage(format!(
            "no room in socket path {:?}",
            conn.path()
        ))
        .into());
    };
    let Some(room) = state.room(slug).await else {
        tracing::debug!(%conn_id, room = slug, "socket for unknown room");
        let _ = conn.close().await;
        return Err(RoomError::NotFound(slug.to_owned()).into());
    };

    let (tx, mut outbound) = mpsc::channel(MEMBER_QUEUE_CAPACITY);
    room.attach(conn_id, tx).await?;
    let _guard = DetachGuard {
        conn_id,
        room: room.clone(),
    };
    tracing::debug!(%conn_id, room = slug, "socket attached");

    let mut idle_deadline = Instant::now() + state.idle_timeout;

    loop {
        tokio::select! {
            pushed = outbound.recv() => match pushed {
                Some(RoomOutbound::Frame(frame)) => {
                    let text = state.codec.encode(frame.as_ref())?;
                    if !send_within(&conn, &text, state.idle_timeout).await? {
                        tracing::info!(%conn_id, room = slug, "peer not reading, dropping");
                        break;
                    }
                }
                Some(RoomOutbound::Close) | None => {
                    let _ = conn.close().await;
                    break;
                }
            },

            inbound = conn.recv() => {
                let text = match inbound {
                    Ok(Some(text)) => text,
                    Ok(None) => {
                        tracing::debug!(%conn_id, "connection closed cleanly");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!(%conn_id, error = %e, "recv error");
                        break;
                    }
                };
                idle_deadline = Instant::now() + state.idle_timeout;

                match Frame::classify(&text) {
                    Frame::Ping => {
                        if !send_within(&conn, PONG, state.idle_timeout).await? {
                            tracing::info!(%conn_id, room = slug, "peer not reading, dropping");
                            break;
                        }
                    }
                    Frame::Pong => {}
                    Frame::Message(text) => {
                        let action: RoomAction = match state.codec.decode(text) {
                            Ok(action) => action,
                            Err(e) => {
                                tracing::debug!(
                                    %conn_id, error = %e, "dropping malformed frame"
                                );
                                continue;
                            }
                        };
                        room.action(conn_id, action).await?;
                    }
                }
            }

            () = tokio::time::sleep_until(idle_deadline) => {
                tracing::info!(%conn_id, room = slug, "connection idle, dropping");
                let _ = conn.close().await;
                break;
            }
        }
    }

    // _guard drops here → detach fires.
    Ok(())
}

#[cfg(test)]
mod tests {
    use bingo_transport::TransportError;

    use super::*;

    /// A peer whose receive window never opens.
    struct StalledConnection;

    impl Connection for StalledConnection {
        type Error = TransportError;

        async fn send(&self, _text: &str) -> Result<(), Self::Error> {
            std::future::pending().await
        }

        async fn recv(&self) -> Result<Option<String>, Self::Error> {
            Ok(None)
        }

        async fn close(&self) -> Result<(), Self::Error> {
            Ok(())
        }

        fn id(&self) -> ConnectionId {
            ConnectionId::new(1)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_within_gives_up_on_stalled_peer() {
        let sent = send_within(&StalledConnection, "{}", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(!sent);
    }

    #[test]
    fn test_room_slug_from_path() {
        assert_eq!(room_slug("/socket/sunday-race"), Some("sunday-race"));
        assert_eq!(room_slug("/socket/sunday-race/"), Some("sunday-race"));
    }

    #[test]
    fn test_room_slug_rejects_other_paths() {
        assert_eq!(room_slug("/"), None);
        assert_eq!(room_slug("/socket/"), None);
        assert_eq!(room_slug("/socket/a/b"), None);
        assert_eq!(room_slug("/api/rooms/x"), None);
    }
}
