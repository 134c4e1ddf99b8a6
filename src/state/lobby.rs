//! Lobby state management.
//!
//! A lobby is the rendezvous before an online game: the host opens one at
//! its transport address, the guest connects and reports ready, and only
//! then can the host start the game.

use crate::state::game::PlayerId;
use chrono::{DateTime, Utc};
use std::fmt;

/// Default display color for player 1.
pub const DEFAULT_PLAYER1_COLOR: &str = "#e74c3c";

/// Default display color for player 2.
pub const DEFAULT_PLAYER2_COLOR: &str = "#3498db";

/// Which end of an online session this process is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Holds the authoritative game state, plays as player 1
    Host,
    /// Mirrors the host's state, plays as player 2
    Guest,
}

impl Role {
    pub fn player(self) -> PlayerId {
        match self {
            Self::Host => PlayerId::One,
            Self::Guest => PlayerId::Two,
        }
    }

    pub fn peer(self) -> Self {
        match self {
            Self::Host => Self::Guest,
            Self::Guest => Self::Host,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "host",
            Self::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Display colors for both players. Presentation only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerColors {
    pub player1: String,
    pub player2: String,
}

impl Default for PlayerColors {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER1_COLOR, DEFAULT_PLAYER2_COLOR)
    }
}

impl PlayerColors {
    pub fn new(player1: impl Into<String>, player2: impl Into<String>) -> Self {
        Self {
            player1: player1.into(),
            player2: player2.into(),
        }
    }

    pub fn get(&self, player: PlayerId) -> &str {
        match player {
            PlayerId::One => &self.player1,
            PlayerId::Two => &self.player2,
        }
    }

    pub fn set(&mut self, player: PlayerId, color: impl Into<String>) {
        match player {
            PlayerId::One => self.player1 = color.into(),
            PlayerId::Two => self.player2 = color.into(),
        }
    }
}

/// Lobby state.
#[derive(Debug, Clone)]
pub struct Lobby {
    /// Our role in this lobby
    pub role: Role,

    /// Host's transport address (ours when hosting)
    pub host_address: String,

    /// Whether a guest connection has been accepted
    pub guest_connected: bool,

    /// Whether the guest has reported ready
    pub guest_ready: bool,

    /// When the lobby was opened or joined
    pub opened_at: DateTime<Utc>,

    /// When the first game started
    pub started_at: Option<DateTime<Utc>>,
}

impl Lobby {
    /// Open a lobby as host at our own address.
    pub fn new_host(address: impl Into<String>) -> Self {
        Self::new(Role::Host, address.into(), false)
    }

    /// Joined lobby as guest. Being connected is implied.
    pub fn new_guest(host_address: impl Into<String>) -> Self {
        Self::new(Role::Guest, host_address.into(), true)
    }

    fn new(role: Role, host_address: String, guest_connected: bool) -> Self {
        Self {
            role,
            host_address,
            guest_connected,
            guest_ready: false,
            opened_at: Utc::now(),
            started_at: None,
        }
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    /// Record that the host accepted a guest connection.
    pub fn mark_guest_connected(&mut self) -> Result<(), LobbyError> {
        if !self.is_host() {
            return Err(LobbyError::NotHost);
        }
        if self.guest_connected {
            return Err(LobbyError::GuestAlreadyConnected);
        }
        self.guest_connected = true;
        Ok(())
    }

    /// Record the guest's ready notice.
    pub fn mark_guest_ready(&mut self) -> Result<(), LobbyError> {
        if !self.is_host() {
            return Err(LobbyError::NotHost);
        }
        if !self.guest_connected {
            return Err(LobbyError::GuestNotConnected);
        }
        self.guest_ready = true;
        Ok(())
    }

    /// Check the host may start the game.
    pub fn can_start(&self) -> Result<(), LobbyError> {
        if !self.is_host() {
            return Err(LobbyError::NotHost);
        }
        if !self.guest_connected {
            return Err(LobbyError::GuestNotConnected);
        }
        if !self.guest_ready {
            return Err(LobbyError::GuestNotReady);
        }
        Ok(())
    }

    pub fn mark_started(&mut self) {
        self.started_at.get_or_insert_with(Utc::now);
    }

    /// Convert to JSON for the UI shell.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "role": self.role.as_str(),
            "host_address": self.host_address,
            "guest_connected": self.guest_connected,
            "guest_ready": self.guest_ready,
            "opened_at": self.opened_at.to_rfc3339(),
            "started_at": self.started_at.map(|t| t.to_rfc3339()),
        })
    }
}

/// Lobby errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LobbyError {
    #[error("Only the host can do that")]
    NotHost,
    #[error("No guest has connected yet")]
    GuestNotConnected,
    #[error("Guest is not ready")]
    GuestNotReady,
    #[error("A guest is already connected")]
    GuestAlreadyConnected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_players() {
        assert_eq!(Role::Host.player(), PlayerId::One);
        assert_eq!(Role::Guest.player(), PlayerId::Two);
        assert_eq!(Role::Host.peer(), Role::Guest);
        assert_eq!(format!("{}", Role::Guest), "guest");
    }

    #[test]
    fn test_host_ready_flow() {
        let mut lobby = Lobby::new_host("peer-abc");
        assert_eq!(lobby.can_start(), Err(LobbyError::GuestNotConnected));
        assert_eq!(lobby.mark_guest_ready(), Err(LobbyError::GuestNotConnected));

        lobby.mark_guest_connected().unwrap();
        assert_eq!(lobby.can_start(), Err(LobbyError::GuestNotReady));
        assert_eq!(lobby.mark_guest_connected(), Err(LobbyError::GuestAlreadyConnected));

        lobby.mark_guest_ready().unwrap();
        assert!(lobby.can_start().is_ok());
    }

    #[test]
    fn test_guest_cannot_start() {
        let mut lobby = Lobby::new_guest("peer-abc");
        assert!(lobby.guest_connected);
        assert_eq!(lobby.can_start(), Err(LobbyError::NotHost));
        assert_eq!(lobby.mark_guest_ready(), Err(LobbyError::NotHost));
    }

    #[test]
    fn test_started_at_set_once() {
        let mut lobby = Lobby::new_host("peer-abc");
        lobby.mark_started();
        let first = lobby.started_at;
        lobby.mark_started();
        assert_eq!(lobby.started_at, first);
    }

    #[test]
    fn test_colors() {
        let mut colors = PlayerColors::default();
        assert_eq!(colors.get(PlayerId::One), DEFAULT_PLAYER1_COLOR);

        colors.set(PlayerId::Two, "#00ff00");
        assert_eq!(colors.get(PlayerId::Two), "#00ff00");
    }

    #[test]
    fn test_to_json() {
        let lobby = Lobby::new_host("peer-abc");
        let json = lobby.to_json();
        assert_eq!(json["role"], "host");
        assert_eq!(json["host_address"], "peer-abc");
        assert_eq!(json["guest_ready"], false);
        assert!(json["started_at"].is_null());
    }
}
