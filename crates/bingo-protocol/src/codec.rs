//! Codec trait, JSON implementation, and heartbeat framing.
//!
//! A "codec" converts between Rust types and text frames. Protocol
//! messages travel as JSON; heartbeats travel as the bare strings
//! [`PING`] and [`PONG`] and are recognized by literal equality before any
//! JSON parsing happens.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Heartbeat frame sent by clients.
pub const PING: &str = "ping";

/// Heartbeat frame sent by the server in answer to [`PING`].
pub const PONG: &str = "pong";

/// A raw inbound text frame, sorted into heartbeat or protocol traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame<'a> {
    Ping,
    Pong,
    /// Anything else; expected to be a JSON message.
    Message(&'a str),
}

impl<'a> Frame<'a> {
    /// Classifies a frame. Only exact `"ping"`/`"pong"` count as
    /// heartbeats; `" ping"` or `"\"ping\""` are ordinary messages.
    pub fn classify(text: &'a str) -> Self {
        match text {
            PING => Self::Ping,
            PONG => Self::Pong,
            other => Self::Message(other),
        }
    }
}

/// A codec that can encode Rust types to text frames and decode them back.
///
/// `Send + Sync + 'static` so one codec can be shared by every connection
/// task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a text frame.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError>;

    /// Deserializes a text frame back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the frame is malformed, lacks its
    /// discriminant, or misses a required field.
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError>;
}

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// ## Example
///
/// ```rust
/// use bingo_protocol::{Action, Codec, JsonCodec, RoomAction};
///
/// let codec = JsonCodec;
/// let action = RoomAction::new("token", Action::Mark { row: 1, col: 4 });
///
/// let text = codec.encode(&action).unwrap();
/// let decoded: RoomAction = codec.decode(&text).unwrap();
/// assert_eq!(action, decoded);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<String, ProtocolError> {
        serde_json::to_string(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T, ProtocolError> {
        serde_json::from_str(text).map_err(ProtocolError::Decode)
    }
}
