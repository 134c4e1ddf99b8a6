//! Dots and Boxes State Library
//!
//! Rules engine and session state for two-player Dots and Boxes, played
//! hot-seat on one device or online between a host and a guest.
//!
//! # Overview
//!
//! - **Rules Engine** - Board of N×N dots, edge ownership, box completion,
//!   scoring, turn order and game end.
//!
//! - **Replication Protocol** - JSON messages that keep a guest's replica
//!   identical to the host's authoritative game.
//!
//! - **Session Coordination** - Local vs online play, lobbies, rematches,
//!   disconnects and per-session stats.
//!
//! - **Runtime** - An async loop that feeds UI commands and transport
//!   events into a session and publishes what it emits.
//!
//! # Design Principles
//!
//! 1. **The host is authoritative** - Online, only the host mutates the game.
//!    The guest requests moves and adopts whatever state comes back.
//!
//! 2. **State machines validate transitions** - Invalid phase changes and
//!    invalid moves are rejected before anything is mutated.
//!
//! 3. **Transport is pluggable** - Anything implementing
//!    [`state::connection::Transport`] can carry a session; an in-memory
//!    network is provided.
//!
//! 4. **Handlers return events** - Session operations return
//!    [`state::session::UiEvent`]s rather than drawing anything.
//!
//! # Example
//!
//! ```rust
//! use dotsboxes_state::config::SessionConfig;
//! use dotsboxes_state::state::{Edge, PlayerColors, Session, UiEvent};
//!
//! let mut session = Session::new(SessionConfig::default());
//! session.start_local(2, PlayerColors::default()).unwrap();
//!
//! for edge in [
//!     Edge::horizontal(0, 0),
//!     Edge::horizontal(1, 0),
//!     Edge::vertical(0, 0),
//! ] {
//!     session.handle_move(edge).unwrap();
//! }
//! let events = session.handle_move(Edge::vertical(0, 1)).unwrap();
//!
//! assert!(events.iter().any(|e| matches!(e, UiEvent::GameOver { .. })));
//! assert_eq!(session.stats().player2_wins, 1);
//! ```

pub mod config;
pub mod runtime;
pub mod state;
pub mod telemetry;

// Re-export everything from state module at crate root
pub use state::*;
