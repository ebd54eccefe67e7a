//! HTTP API: the pre-connection authorize handshake.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use bingo_protocol::Codec;
use bingo_room::RoomError;
use bingo_session::SessionError;
use serde::{Deserialize, Serialize};

use crate::server::ServerState;

pub(crate) fn router<C: Codec>(state: Arc<ServerState<C>>) -> Router {
    Router::new()
        .route("/api/rooms/{slug}/authorize", post(authorize::<C>))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AuthorizeBody {
    password: String,
    #[serde(default)]
    spectator: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeReply {
    auth_token: String,
}

/// `POST /api/rooms/{slug}/authorize`
///
/// `200 {"authToken"}` on success, `403` on a wrong password, `404` if the
/// room does not exist.
async fn authorize<C: Codec>(
    State(state): State<Arc<ServerState<C>>>,
    Path(slug): Path<String>,
    Json(body): Json<AuthorizeBody>,
) -> Response {
    let Some(room) = state.room(&slug).await else {
        return (StatusCode::NOT_FOUND, "Room not found").into_response();
    };

    match room.authorize(body.password, body.spectator).await {
        Ok(auth_token) => {
            tracing::debug!(room = %slug, spectator = body.spectator, "authorized");
            Json(AuthorizeReply { auth_token }).into_response()
        }
        Err(RoomError::Session(SessionError::AuthRejected(_))) => {
            tracing::debug!(room = %slug, "wrong password");
            (StatusCode::FORBIDDEN, "Incorrect password").into_response()
        }
        Err(RoomError::Unavailable(_)) => {
            (StatusCode::NOT_FOUND, "Room not found").into_response()
        }
        Err(e) => {
            tracing::error!(room = %slug, error = %e, "authorize failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
