//! The two network seams of a client session: the HTTP handshake that
//! trades a password for a room token, and the dial that opens the room
//! socket.

use std::future::Future;

use bingo_transport::{ClientConnection, Connection, TransportError};
use serde::{Deserialize, Serialize};

use crate::ClientError;

/// Trades a room password for a token.
pub trait Authorizer: Send + Sync + 'static {
    /// # Errors
    /// Returns [`ClientError::Handshake`] with the HTTP status if the
    /// server refuses, or [`ClientError::Http`] if it cannot be reached.
    fn authorize(
        &self,
        slug: &str,
        password: &str,
        spectator: bool,
    ) -> impl Future<Output = Result<String, ClientError>> + Send;
}

/// Opens the socket for a room.
pub trait Dialer: Send + Sync + 'static {
    type Connection: Connection<Error = TransportError>;

    fn dial(
        &self,
        slug: &str,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct AuthorizeRequest<'a> {
    password: &'a str,
    spectator: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizeResponse {
    auth_token: String,
}

/// `POST {base}/api/rooms/{slug}/authorize`.
#[derive(Debug, Clone)]
pub struct HttpAuthorizer {
    http: reqwest::Client,
    base: String,
}

impl HttpAuthorizer {
    /// `base` is the server origin, e.g. `http://127.0.0.1:8080`.
    pub fn new(base: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base)
    }

    pub fn with_client(http: reqwest::Client, base: impl Into<String>) -> Self {
        Self {
            http,
            base: base.into().trim_end_matches('/').to_owned(),
        }
    }
}

impl Authorizer for HttpAuthorizer {
    async fn authorize(
        &self,
        slug: &str,
        password: &str,
        spectator: bool,
    ) -> Result<String, ClientError> {
        let url = format!("{}/api/rooms/{slug}/authorize", self.base);
        let response = self
            .http
            .post(&url)
            .json(&AuthorizeRequest { password, spectator })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            tracing::debug!(slug, status = status.as_u16(), "authorize refused");
            return Err(ClientError::Handshake {
                status: status.as_u16(),
                message,
            });
        }

        let body: AuthorizeResponse = response.json().await?;
        Ok(body.auth_token)
    }
}

// ---------------------------------------------------------------------------
// WebSocket
// ---------------------------------------------------------------------------

/// Dials `{base}/socket/{slug}`.
#[derive(Debug, Clone)]
pub struct WebSocketDialer {
    base: String,
}

impl WebSocketDialer {
    /// `base` is the socket origin, e.g. `ws://127.0.0.1:8081`.
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_owned(),
        }
    }
}

impl Dialer for WebSocketDialer {
    type Connection = ClientConnection;

    async fn dial(&self, slug: &str) -> Result<ClientConnection, TransportError> {
        bingo_transport::connect(&format!("{}/socket/{slug}", self.base)).await
    }
}
