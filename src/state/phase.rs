//! Session phase state machine.
//!
//! Tracks which kind of session is running and validates transitions.
//!
//! # State Diagram
//!
//! ```text
//!                         ┌──────────┐
//!        ┌───────────────▶│   Idle   │◀──────────────────────┐
//!        │ end            └────┬─────┘                       │ end
//!        │        start_local  │  open_lobby   join_lobby    │
//!        │      ┌──────────────┼─────────────┐               │
//!        │      ▼              ▼             ▼               │
//! ┌─────────────┐      ┌───────────┐   ┌────────────┐        │
//! │ LocalActive │      │ HostLobby │   │ GuestLobby │────────┤
//! └─────────────┘      └─────┬─────┘   └──────┬─────┘        │
//!   ▲  │ start_local         │ start_online   │ start_online │
//!   └──┘ (restart)           ▼                ▼              │
//!                      ┌─────────────────────────┐           │
//!                      │      OnlineActive       │───────────┘
//!                      └─────────────────────────┘
//! ```

use std::fmt;

/// Where the session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    /// No session; menu is showing
    #[default]
    Idle,

    /// Hot-seat game on one device
    LocalActive,

    /// Hosting, waiting for a guest to connect and report ready
    HostLobby,

    /// Connected to a host, waiting for the game to start
    GuestLobby,

    /// Networked game in progress
    OnlineActive,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::LocalActive => "local_active",
            Self::HostLobby => "online_lobby_host",
            Self::GuestLobby => "online_lobby_guest",
            Self::OnlineActive => "online_active",
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    /// Online phases own a transport connection.
    pub fn is_online(&self) -> bool {
        matches!(self, Self::HostLobby | Self::GuestLobby | Self::OnlineActive)
    }

    /// A game is being played (moves are accepted).
    pub fn is_playing(&self) -> bool {
        matches!(self, Self::LocalActive | Self::OnlineActive)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State transition events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseEvent {
    StartLocal,
    OpenLobby,
    JoinLobby,
    StartOnline,
    End,
}

/// Error when a state transition is invalid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid transition from {from} via {event:?}: {reason}")]
pub struct InvalidTransition {
    pub from: SessionPhase,
    pub event: PhaseEvent,
    pub reason: &'static str,
}

/// Session phase machine.
#[derive(Debug, Clone, Default)]
pub struct PhaseMachine {
    phase: SessionPhase,
}

impl PhaseMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Apply an event, returning the new machine or an error.
    pub fn apply(&self, event: PhaseEvent) -> Result<Self, InvalidTransition> {
        Ok(Self {
            phase: self.transition(event)?,
        })
    }

    /// Apply an event in place, returning error if invalid.
    pub fn apply_mut(&mut self, event: PhaseEvent) -> Result<(), InvalidTransition> {
        self.phase = self.transition(event)?;
        Ok(())
    }

    fn transition(&self, event: PhaseEvent) -> Result<SessionPhase, InvalidTransition> {
        use PhaseEvent::*;
        use SessionPhase::*;

        let invalid = |reason: &'static str| InvalidTransition {
            from: self.phase,
            event,
            reason,
        };

        match (self.phase, event) {
            // StartLocal: Idle -> LocalActive, or restart in place
            (Idle | LocalActive, StartLocal) => Ok(LocalActive),
            (_, StartLocal) => Err(invalid("Leave the online session first")),

            // OpenLobby: Idle -> HostLobby
            (Idle, OpenLobby) => Ok(HostLobby),
            (_, OpenLobby) => Err(invalid("A session is already running")),

            // JoinLobby: Idle -> GuestLobby
            (Idle, JoinLobby) => Ok(GuestLobby),
            (_, JoinLobby) => Err(invalid("A session is already running")),

            // StartOnline: either lobby -> OnlineActive
            (HostLobby | GuestLobby, StartOnline) => Ok(OnlineActive),
            (OnlineActive, StartOnline) => Err(invalid("Game already started")),
            (_, StartOnline) => Err(invalid("Must be in a lobby to start an online game")),

            // End: any session -> Idle
            (Idle, End) => Err(invalid("No session to end")),
            (_, End) => Ok(Idle),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.phase.is_idle()
    }

    pub fn is_online(&self) -> bool {
        self.phase.is_online()
    }

    pub fn is_playing(&self) -> bool {
        self.phase.is_playing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let machine = PhaseMachine::new();
        assert!(machine.is_idle());
        assert!(!machine.is_online());
        assert_eq!(machine.phase(), SessionPhase::Idle);
    }

    #[test]
    fn test_local_flow() {
        let mut machine = PhaseMachine::new();

        machine.apply_mut(PhaseEvent::StartLocal).unwrap();
        assert!(machine.is_playing());
        assert!(!machine.is_online());

        // Restart stays local
        machine.apply_mut(PhaseEvent::StartLocal).unwrap();
        assert_eq!(machine.phase(), SessionPhase::LocalActive);

        machine.apply_mut(PhaseEvent::End).unwrap();
        assert!(machine.is_idle());
    }

    #[test]
    fn test_host_flow() {
        let mut machine = PhaseMachine::new();

        machine.apply_mut(PhaseEvent::OpenLobby).unwrap();
        assert_eq!(machine.phase(), SessionPhase::HostLobby);
        assert!(machine.is_online());
        assert!(!machine.is_playing());

        machine.apply_mut(PhaseEvent::StartOnline).unwrap();
        assert_eq!(machine.phase(), SessionPhase::OnlineActive);
        assert!(machine.is_playing());

        machine.apply_mut(PhaseEvent::End).unwrap();
        assert!(machine.is_idle());
    }

    #[test]
    fn test_guest_flow() {
        let machine = PhaseMachine::new()
            .apply(PhaseEvent::JoinLobby)
            .and_then(|m| m.apply(PhaseEvent::StartOnline))
            .unwrap();
        assert_eq!(machine.phase(), SessionPhase::OnlineActive);
    }

    #[test]
    fn test_invalid_transitions() {
        let machine = PhaseMachine::new();

        assert!(machine.apply(PhaseEvent::End).is_err());
        assert!(machine.apply(PhaseEvent::StartOnline).is_err());

        let hosting = machine.apply(PhaseEvent::OpenLobby).unwrap();
        assert!(hosting.apply(PhaseEvent::JoinLobby).is_err());
        assert!(hosting.apply(PhaseEvent::StartLocal).is_err());

        let playing = hosting.apply(PhaseEvent::StartOnline).unwrap();
        let err = playing.apply(PhaseEvent::StartOnline).unwrap_err();
        assert_eq!(err.reason, "Game already started");
    }

    #[test]
    fn test_display() {
        let err = InvalidTransition {
            from: SessionPhase::HostLobby,
            event: PhaseEvent::JoinLobby,
            reason: "A session is already running",
        };
        assert_eq!(
            format!("{}", err),
            "Invalid transition from online_lobby_host via JoinLobby: A session is already running"
        );
    }
}
