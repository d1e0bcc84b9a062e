//! Wire-compatible protocol types for the four-in-a-row game server.
//!
//! The server marshals every message as one flat JSON object tagged by
//! `"type"`, so a payload routinely carries zero-valued fields that are
//! meaningless for its variant (`"player":0`, `"board":null`, `"username":""`).
//! Decoding therefore tolerates absent or zero-valued fields wherever the
//! deployed server omits them:
//!
//! - `connected` may omit `player` entirely (treated as player 1 downstream)
//! - `game_over` carries the final board alongside `winner`
//! - unknown fields are ignored
//!
//! Grid cells are raw `{0, 1, 2}` integers here; shape validation into the
//! typed [`Board`](crate::board::Board) model happens in the session layer.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Enter matchmaking under the given display name (MUST be first message).
    Join {
        /// Display name for this player.
        username: String,
    },
    /// Drop a disc into a column. Only valid on this player's turn; the
    /// server answers with an authoritative `board` (or `error`) message.
    Move {
        /// Column index, 0–6.
        column: usize,
        /// Wire number of the submitting player (1 or 2).
        player: u8,
    },
}

impl ClientMessage {
    /// Serialize this intent to its JSON wire form.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectFourError::MalformedMessage`](crate::ConnectFourError::MalformedMessage)
    /// if serialization fails (a programming bug, not a runtime condition).
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The socket is accepted and a player number may be assigned.
    /// The deployed server omits `player`; downstream defaults to 1.
    Connected {
        #[serde(default)]
        player: u8,
    },
    /// No opponent yet — the bot-fallback waiting window is (re-)opened.
    Waiting {},
    /// The waiting window expired and a bot game is starting.
    BotStart {
        #[serde(default)]
        player: u8,
    },
    /// A human opponent was found and a fresh game is starting.
    Matched {
        #[serde(default)]
        player: u8,
    },
    /// Authoritative board state after a resolved move.
    Board {
        board: Vec<Vec<u8>>,
        #[serde(rename = "currentPlayer", default)]
        current_player: u8,
    },
    /// Board state re-delivered to resume a game after a transport drop.
    Reconnected {
        board: Vec<Vec<u8>>,
        #[serde(rename = "currentPlayer", default)]
        current_player: u8,
    },
    /// The game ended. `board` is the final position when the server sends it.
    GameOver {
        #[serde(default)]
        winner: u8,
        #[serde(default)]
        board: Option<Vec<Vec<u8>>>,
    },
    /// The server rejected the last intent (wrong turn, full column,
    /// unsupported message type). Carries no detail on this wire.
    Error {},
}

impl ServerMessage {
    /// Decode a raw inbound payload into a typed protocol event.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectFourError::MalformedMessage`](crate::ConnectFourError::MalformedMessage)
    /// for undecodable payloads. Callers drop the payload and continue.
    pub fn decode(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }
}
