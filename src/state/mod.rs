//! State management for Dots and Boxes sessions.
//!
//! - `game` - Rules engine (board, moves, scoring, turn order)
//! - `protocol` - Wire messages exchanged between host and guest
//! - `connection` - Transport connection tracking and in-memory transport
//! - `lobby` - Pre-game rendezvous, roles and display colors
//! - `phase` - Session phase machine (where is the session?)
//! - `session` - Coordinator tying all of the above together
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                              Session                                 │
//! │                                                                      │
//! │  ┌──────────────┐   ┌──────────────┐   ┌───────────────────────┐    │
//! │  │ PhaseMachine │   │    Lobby     │   │      GameState        │    │
//! │  │              │   │              │   │                       │    │
//! │  │ Idle ──▶     │   │ role         │   │ horizontal/vertical   │    │
//! │  │  Local/Lobby │   │ guest ready? │   │   edges → owner       │    │
//! │  │  ──▶ Online  │   │ colors       │   │ boxes, scores, turn   │    │
//! │  └──────────────┘   └──────────────┘   └───────────────────────┘    │
//! │                                                                      │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │ Connection (online only)                                      │  │
//! │  │                                                               │  │
//! │  │   Message ──encode──▶ text ──▶ peer ──▶ decode ──▶ Message    │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────────┘
//!
//!   host:  local click ──▶ apply ──▶ moveResult ──▶ guest replaces state
//!   guest: local click ──▶ move ──▶ host applies ──▶ moveResult
//! ```
//!
//! # Usage
//!
//! ```rust
//! use dotsboxes_state::state::{
//!     game::{Edge, GameState, PlayerId},
//! };
//!
//! let mut game = GameState::new(3).unwrap();
//! let boxes = game.apply_move(Edge::horizontal(0, 0), PlayerId::One).unwrap();
//! assert!(boxes.is_empty());
//! assert_eq!(game.current_player(), PlayerId::Two);
//! ```

pub mod connection;
pub mod game;
pub mod lobby;
pub mod phase;
pub mod protocol;
pub mod session;

// Re-export commonly used types
pub use connection::{
    join, linked_pair, ConnectError, Connection, ConnectionStatus, Events, Link, MemoryEndpoint,
    MemoryNetwork, SendError, Transport, TransportEvent,
};
pub use game::{
    BoxClaim, Edge, EdgeGrid, EdgeKind, GameError, GameState, PlayerId, Scores, Winner,
    DEFAULT_GRID_SIZE, MAX_GRID_SIZE, MIN_GRID_SIZE,
};
pub use lobby::{Lobby, LobbyError, PlayerColors, Role};
pub use phase::{InvalidTransition, PhaseEvent, PhaseMachine, SessionPhase};
pub use protocol::{decode, encode, Message, ProtocolError, WireGameState};
pub use session::{Rejection, Session, SessionError, SessionStats, UiEvent};
