//! Replication protocol messages and wire codec.
//!
//! Every message is a JSON object tagged by `"type"`. State-carrying
//! messages ship the whole [`GameState`], never a diff, so applying one is
//! a wholesale replacement and replaying one is harmless.
//!
//! Edge maps travel as ordered `["r,c", player]` pairs since the wire has
//! no keyed-map guarantee; they are rebuilt and validated on receipt.

use crate::state::game::{BoxClaim, Edge, EdgeGrid, GameError, GameState, PlayerId, Scores, Winner};
use crate::state::lobby::PlayerColors;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Reason sent when a player leaves on purpose.
pub const REASON_PLAYER_LEFT: &str = "player_left";

/// Every `type` tag this protocol understands.
pub const MESSAGE_KINDS: [&str; 7] = [
    "guestReady",
    "colorUpdate",
    "gameStart",
    "move",
    "moveResult",
    "rematch",
    "disconnect",
];

/// A protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Message {
    /// guest -> host: lobby is ready
    GuestReady,

    /// either: display color changed
    ColorUpdate { player: PlayerId, color: String },

    /// host -> guest: initial authoritative state
    #[serde(rename_all = "camelCase")]
    GameStart {
        state: WireGameState,
        host_color: String,
        guest_color: String,
        grid_size: usize,
    },

    /// guest -> host: move request
    Move(Edge),

    /// host -> guest: authoritative outcome of a move
    #[serde(rename_all = "camelCase")]
    MoveResult {
        success: bool,
        state: WireGameState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        completed_boxes: Option<Vec<BoxClaim>>,
    },

    /// either: start a fresh game
    #[serde(rename_all = "camelCase")]
    Rematch { grid_size: usize },

    /// either: session is ending
    Disconnect { reason: String },
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::GuestReady => "guestReady",
            Self::ColorUpdate { .. } => "colorUpdate",
            Self::GameStart { .. } => "gameStart",
            Self::Move(_) => "move",
            Self::MoveResult { .. } => "moveResult",
            Self::Rematch { .. } => "rematch",
            Self::Disconnect { .. } => "disconnect",
        }
    }

    pub fn game_start(state: &GameState, colors: &PlayerColors) -> Self {
        Self::GameStart {
            state: WireGameState::from(state),
            host_color: colors.player1.clone(),
            guest_color: colors.player2.clone(),
            grid_size: state.grid_size(),
        }
    }

    pub fn accepted(state: &GameState, completed: Vec<BoxClaim>) -> Self {
        Self::MoveResult {
            success: true,
            state: WireGameState::from(state),
            completed_boxes: Some(completed),
        }
    }

    pub fn rejected(state: &GameState) -> Self {
        Self::MoveResult {
            success: false,
            state: WireGameState::from(state),
            completed_boxes: None,
        }
    }
}

/// Wire form of [`GameState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireGameState {
    pub grid_size: usize,
    pub horizontal_edges: Vec<(String, PlayerId)>,
    pub vertical_edges: Vec<(String, PlayerId)>,
    pub boxes: Vec<BoxClaim>,
    pub scores: Scores,
    pub current_player: PlayerId,
    pub game_over: bool,
    #[serde(default)]
    pub winner: Option<Winner>,
}

fn edge_key(row: usize, col: usize) -> String {
    format!("{},{}", row, col)
}

fn parse_edge_key(key: &str) -> Result<(usize, usize), ProtocolError> {
    let invalid = || ProtocolError::InvalidEdgeKey(key.to_string());
    let (row, col) = key.split_once(',').ok_or_else(invalid)?;
    let row = row.trim().parse().map_err(|_| invalid())?;
    let col = col.trim().parse().map_err(|_| invalid())?;
    Ok((row, col))
}

fn edge_pairs(grid: &EdgeGrid) -> Vec<(String, PlayerId)> {
    grid.iter()
        .map(|(row, col, player)| (edge_key(row, col), player))
        .collect()
}

fn fill_edges(grid: &mut EdgeGrid, pairs: &[(String, PlayerId)]) -> Result<(), ProtocolError> {
    for (key, player) in pairs {
        let (row, col) = parse_edge_key(key)?;
        if !grid.insert(row, col, *player) {
            return Err(ProtocolError::InvalidState(GameError::Inconsistent(
                "edge out of bounds or listed twice",
            )));
        }
    }
    Ok(())
}

impl From<&GameState> for WireGameState {
    fn from(state: &GameState) -> Self {
        Self {
            grid_size: state.grid_size,
            horizontal_edges: edge_pairs(&state.horizontal),
            vertical_edges: edge_pairs(&state.vertical),
            boxes: state.boxes.clone(),
            scores: state.scores,
            current_player: state.current_player,
            game_over: state.game_over,
            winner: state.winner,
        }
    }
}

impl TryFrom<WireGameState> for GameState {
    type Error = ProtocolError;

    fn try_from(wire: WireGameState) -> Result<Self, Self::Error> {
        let mut state = GameState::new(wire.grid_size)?;
        fill_edges(&mut state.horizontal, &wire.horizontal_edges)?;
        fill_edges(&mut state.vertical, &wire.vertical_edges)?;
        state.boxes = wire.boxes;
        state.scores = wire.scores;
        state.current_player = wire.current_player;
        state.game_over = wire.game_over;
        state.winner = wire.winner;
        state.check_invariants()?;
        Ok(state)
    }
}

/// Serialize a message for the transport.
pub fn encode(message: &Message) -> Result<String, ProtocolError> {
    Ok(serde_json::to_string(message)?)
}

/// Parse a message received from the transport.
pub fn decode(text: &str) -> Result<Message, ProtocolError> {
    let value: Value = serde_json::from_str(text)?;

    match value.get("type").and_then(Value::as_str) {
        None => return Err(ProtocolError::MissingKind),
        Some(kind) if !MESSAGE_KINDS.contains(&kind) => {
            return Err(ProtocolError::UnknownKind(kind.to_string()));
        }
        Some(_) => {}
    }

    Ok(serde_json::from_value(value)?)
}

/// Protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("Message has no type tag")]
    MissingKind,
    #[error("Unknown message kind: {0}")]
    UnknownKind(String),
    #[error("Invalid edge key: {0:?}")]
    InvalidEdgeKey(String),
    #[error("Invalid game state: {0}")]
    InvalidState(#[from] GameError),
}
