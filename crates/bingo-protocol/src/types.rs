//! Core protocol types for the room wire format.
//!
//! This module defines every type that travels "on the wire": the two
//! closed message families and the records they carry.
//!
//! - [`RoomAction`]: client → server. Always carries `authToken`.
//! - [`ServerFrame`]: server → client. A [`ServerMessage`] plus an
//!   optional `players` roster that may ride along with any variant.
//!
//! Both families are discriminated by a string `action` field. serde's
//! internally tagged representation (`#[serde(tag = "action")]`) gives us
//! exactly that shape, and `#[serde(flatten)]` merges the envelope fields
//! (`authToken`, `players`) into the same JSON object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Board, Cell, Color};

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

/// One piece of a chat line: plain text or text drawn in a player's color.
///
/// `#[serde(untagged)]` means a segment is either a bare JSON string or an
/// object `{"contents": "...", "color": "..."}` with no discriminant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatSegment {
    Text(String),
    Colored { contents: String, color: Color },
}

/// A single chat line, made of segments.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatMessage(pub Vec<ChatSegment>);

impl ChatMessage {
    /// A system line with no attribution, e.g. `"alice has joined."`.
    pub fn system(text: impl Into<String>) -> Self {
        Self(vec![ChatSegment::Text(text.into())])
    }

    /// A line attributed to a player: the nickname in their color, then
    /// the text.
    pub fn from_player(
        nickname: &str,
        color: &Color,
        text: impl AsRef<str>,
    ) -> Self {
        Self(vec![
            ChatSegment::Colored {
                contents: nickname.to_owned(),
                color: color.clone(),
            },
            ChatSegment::Text(format!(": {}", text.as_ref())),
        ])
    }

    /// The line flattened to plain text.
    pub fn plain_text(&self) -> String {
        self.0
            .iter()
            .map(|segment| match segment {
                ChatSegment::Text(text) => text.as_str(),
                ChatSegment::Colored { contents, .. } => contents.as_str(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Player & room data
// ---------------------------------------------------------------------------

/// A member of a room's roster, as broadcast to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub nickname: String,
    pub color: Color,
    #[serde(default)]
    pub spectator: bool,
    /// Privileged room monitor.
    #[serde(default)]
    pub monitor: bool,
    /// Race-timing status, owned by the race-timing bridge and passed
    /// through without interpretation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race_status: Option<serde_json::Value>,
}

/// Who times races in this room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RaceHandler {
    Local,
    Racetime,
}

/// Room metadata shown to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomData {
    pub name: String,
    pub game: String,
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub race_handler: Option<RaceHandler>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Race-timing connection details, opaque to this crate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub racetime_connection: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Client → Server
// ---------------------------------------------------------------------------

/// Board generation mode requested with `newCard`, e.g. `"random"`.
///
/// Only the external card generator interprets this.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerationMode(pub String);

impl Default for GenerationMode {
    fn default() -> Self {
        Self("random".to_owned())
    }
}

/// What a client asks the room to do.
///
/// JSON shape: `{"action": "mark", "row": 2, "col": 3}` (the `authToken`
/// is added by the enclosing [`RoomAction`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Action {
    /// Join the room, optionally proposing a nickname.
    Join {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
    },
    Leave,
    Chat {
        message: String,
    },
    Mark {
        row: usize,
        col: usize,
    },
    Unmark {
        row: usize,
        col: usize,
    },
    ChangeColor {
        color: Color,
    },
    /// Regenerate the board. All inputs go to the card generator untouched.
    NewCard {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        seed: Option<u64>,
        #[serde(default)]
        mode: GenerationMode,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        difficulty: Option<u32>,
    },
    RevealCard,
}

impl Action {
    /// The wire discriminant, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave => "leave",
            Self::Chat { .. } => "chat",
            Self::Mark { .. } => "mark",
            Self::Unmark { .. } => "unmark",
            Self::ChangeColor { .. } => "changeColor",
            Self::NewCard { .. } => "newCard",
            Self::RevealCard => "revealCard",
        }
    }

    /// Returns `true` for actions that change the board or a player's
    /// marking color, which spectators may not perform.
    pub fn requires_player(&self) -> bool {
        matches!(
            self,
            Self::Mark { .. }
                | Self::Unmark { .. }
                | Self::ChangeColor { .. }
                | Self::NewCard { .. }
                | Self::RevealCard
        )
    }
}

/// A client frame: an [`Action`] plus the room token that authorizes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomAction {
    /// Missing tokens decode as empty and are rejected by the authority.
    #[serde(default)]
    pub auth_token: String,
    #[serde(flatten)]
    pub action: Action,
}

impl RoomAction {
    pub fn new(auth_token: impl Into<String>, action: Action) -> Self {
        Self {
            auth_token: auth_token.into(),
            action,
        }
    }
}

// ---------------------------------------------------------------------------
// Server → Client
// ---------------------------------------------------------------------------

/// What the room tells a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Chat {
        message: ChatMessage,
    },
    /// One cell changed. Only sent while the board is visible.
    CellUpdate {
        row: usize,
        col: usize,
        cell: Cell,
    },
    /// The whole board was replaced.
    SyncBoard {
        board: Board,
    },
    /// Reply to a successful `join`.
    Connected {
        board: Board,
        chat_history: Vec<ChatMessage>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        nickname: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        color: Option<Color>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_data: Option<RoomData>,
    },
    /// The token was missing, expired, or revoked.
    Unauthorized,
    /// The room closed this connection.
    Disconnected,
    UpdateRoomData {
        room_data: RoomData,
    },
}

/// A server frame: a [`ServerMessage`] with the roster optionally attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerFrame {
    #[serde(flatten)]
    pub message: ServerMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub players: Option<Vec<Player>>,
}

impl ServerFrame {
    /// A frame without a roster.
    pub fn new(message: ServerMessage) -> Self {
        Self {
            message,
            players: None,
        }
    }

    /// A frame carrying the current roster.
    pub fn with_players(message: ServerMessage, players: Vec<Player>) -> Self {
        Self {
            message,
            players: Some(players),
        }
    }
}

impl From<ServerMessage> for ServerFrame {
    fn from(message: ServerMessage) -> Self {
        Self::new(message)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The wire format is consumed by browser clients, so these tests pin
    //! the exact JSON shapes rather than only checking round trips.

    use super::*;
    use crate::Goal;
    use serde_json::json;

    fn cell(colors: &[&str]) -> Cell {
        let mut cell = Cell::new(Goal::new("g1", "Collect 5 stars"));
        for c in colors {
            cell.mark(Color::from(*c));
        }
        cell
    }

    // =====================================================================
    // RoomAction
    // =====================================================================

    #[test]
    fn test_room_action_mark_json_format() {
        let action = RoomAction::new("tok", Action::Mark { row: 2, col: 3 });
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(
            json,
            json!({"action": "mark", "authToken": "tok", "row": 2, "col": 3})
        );
    }

    #[test]
    fn test_room_action_unit_variant_json_format() {
        let action = RoomAction::new("tok", Action::RevealCard);
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json, json!({"action": "revealCard", "authToken": "tok"}));
    }

    #[test]
    fn test_room_action_change_color_uses_camel_case_tag() {
        let json = r#"{"action":"changeColor","authToken":"t","color":"red"}"#;
        let action: RoomAction = serde_json::from_str(json).unwrap();
        assert_eq!(
            action.action,
            Action::ChangeColor {
                color: Color::from("red")
            }
        );
    }

    #[test]
    fn test_room_action_join_without_nickname() {
        let json = r#"{"action":"join","authToken":"t"}"#;
        let action: RoomAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.action, Action::Join { nickname: None });
        assert_eq!(action.auth_token, "t");
    }

    #[test]
    fn test_room_action_leave_decodes() {
        let json = r#"{"action":"leave","authToken":"t"}"#;
        let action: RoomAction = serde_json::from_str(json).unwrap();
        assert_eq!(action.action, Action::Leave);
    }

    #[test]
    fn test_room_action_new_card_defaults_mode() {
        let json = r#"{"action":"newCard","authToken":"t","seed":7}"#;
        let action: RoomAction = serde_json::from_str(json).unwrap();
        assert_eq!(
            action.action,
            Action::NewCard {
                seed: Some(7),
                mode: GenerationMode::default(),
                difficulty: None,
            }
        );
    }

    #[test]
    fn test_room_action_missing_token_decodes_as_empty() {
        let json = r#"{"action":"mark","row":0,"col":0}"#;
        let action: RoomAction = serde_json::from_str(json).unwrap();
        assert!(action.auth_token.is_empty());
    }

    #[test]
    fn test_room_action_missing_discriminant_is_rejected() {
        let json = r#"{"authToken":"t","row":0,"col":0}"#;
        assert!(serde_json::from_str::<RoomAction>(json).is_err());
    }

    #[test]
    fn test_room_action_missing_required_field_is_rejected() {
        let json = r#"{"action":"mark","authToken":"t","row":1}"#;
        assert!(serde_json::from_str::<RoomAction>(json).is_err());
    }

    #[test]
    fn test_room_action_unknown_action_is_rejected() {
        let json = r#"{"action":"flyToMoon","authToken":"t"}"#;
        assert!(serde_json::from_str::<RoomAction>(json).is_err());
    }

    #[test]
    fn test_room_action_negative_row_is_rejected() {
        let json = r#"{"action":"mark","authToken":"t","row":-1,"col":0}"#;
        assert!(serde_json::from_str::<RoomAction>(json).is_err());
    }

    #[test]
    fn test_action_requires_player() {
        assert!(Action::Mark { row: 0, col: 0 }.requires_player());
        assert!(Action::RevealCard.requires_player());
        assert!(!Action::Chat { message: "hi".into() }.requires_player());
        assert!(!Action::Join { nickname: None }.requires_player());
        assert!(!Action::Leave.requires_player());
    }

    // =====================================================================
    // ServerFrame
    // =====================================================================

    #[test]
    fn test_server_frame_cell_update_json_format() {
        let frame = ServerFrame::new(ServerMessage::CellUpdate {
            row: 2,
            col: 3,
            cell: cell(&["blue"]),
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["action"], "cellUpdate");
        assert_eq!(json["row"], 2);
        assert_eq!(json["col"], 3);
        assert_eq!(json["cell"]["colors"], json!(["blue"]));
        assert!(json.get("players").is_none(), "absent roster is omitted");
    }

    #[test]
    fn test_server_frame_players_ride_along() {
        let players = vec![Player {
            nickname: "alice".into(),
            color: Color::from("blue"),
            spectator: false,
            monitor: false,
            race_status: None,
        }];
        let frame = ServerFrame::with_players(
            ServerMessage::Chat {
                message: ChatMessage::system("alice has joined."),
            },
            players,
        );
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["action"], "chat");
        assert_eq!(json["message"], json!(["alice has joined."]));
        assert_eq!(json["players"][0]["nickname"], "alice");
        assert_eq!(json["players"][0]["spectator"], false);
    }

    #[test]
    fn test_server_frame_connected_uses_camel_case_fields() {
        let frame = ServerFrame::new(ServerMessage::Connected {
            board: Board::hidden_placeholder(),
            chat_history: vec![],
            nickname: Some("alice".into()),
            color: Some(Color::from("blue")),
            room_data: None,
        });
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["action"], "connected");
        assert_eq!(json["chatHistory"], json!([]));
        assert_eq!(json["board"], json!({"board": [], "hidden": true}));
        assert!(json.get("roomData").is_none());
    }

    #[test]
    fn test_server_frame_unauthorized_decodes_with_players() {
        let json = r#"{"action":"unauthorized","players":[]}"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        assert_eq!(frame.message, ServerMessage::Unauthorized);
        assert_eq!(frame.players, Some(vec![]));
    }

    #[test]
    fn test_server_frame_update_room_data_passes_opaque_fields() {
        let json = r#"{
            "action": "updateRoomData",
            "roomData": {
                "name": "Sunday Race",
                "game": "Super Mario 64",
                "slug": "sunday-race",
                "raceHandler": "racetime",
                "startedAt": "2024-05-01T12:00:00Z",
                "racetimeConnection": {"url": "https://racetime.example/abc", "status": {"value": "open"}}
            }
        }"#;
        let frame: ServerFrame = serde_json::from_str(json).unwrap();
        let ServerMessage::UpdateRoomData { room_data } = frame.message else {
            panic!("expected updateRoomData");
        };
        assert_eq!(room_data.race_handler, Some(RaceHandler::Racetime));
        assert!(room_data.started_at.is_some());
        assert_eq!(
            room_data.racetime_connection.unwrap()["status"]["value"],
            "open"
        );
    }

    #[test]
    fn test_player_race_status_is_passed_through() {
        let json = r#"{"nickname":"bob","color":"red","spectator":false,"monitor":true,"raceStatus":{"connected":true,"finishTime":"PT1H"}}"#;
        let player: Player = serde_json::from_str(json).unwrap();
        assert!(player.monitor);
        let back = serde_json::to_value(&player).unwrap();
        assert_eq!(back["raceStatus"]["finishTime"], "PT1H");
    }

    // =====================================================================
    // Chat
    // =====================================================================

    #[test]
    fn test_chat_message_from_player_json_format() {
        let msg = ChatMessage::from_player("alice", &Color::from("blue"), "gl");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            json,
            json!([{"contents": "alice", "color": "blue"}, ": gl"])
        );
        assert_eq!(msg.plain_text(), "alice: gl");
    }

    #[test]
    fn test_chat_segment_untagged_decode() {
        let json = r#"["plain", {"contents": "bob", "color": "red"}]"#;
        let msg: ChatMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.0.len(), 2);
        assert!(matches!(msg.0[0], ChatSegment::Text(_)));
        assert!(matches!(msg.0[1], ChatSegment::Colored { .. }));
    }
}
