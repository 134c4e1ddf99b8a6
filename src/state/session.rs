//! Session coordination.
//!
//! A [`Session`] owns everything one play session needs: the game (an
//! authoritative copy on the host or in local play, a replica on the
//! guest), the display colors, the lobby, the transport connection and the
//! running tally of results. It decides who may mutate the game and turns
//! every input into a list of [`UiEvent`]s for the renderer and UI shell.
//!
//! # Host authority
//!
//! Online, only the host applies moves. The guest sends a `move` request
//! and replaces its whole game with whatever `moveResult` the host sends
//! back. The guest never mutates its game from its own input.

use crate::config::SessionConfig;
use crate::state::connection::{Connection, SendError, TransportEvent};
use crate::state::game::{Edge, GameError, GameState, PlayerId, Scores, Winner};
use crate::state::lobby::{Lobby, LobbyError, PlayerColors, Role};
use crate::state::phase::{InvalidTransition, PhaseEvent, PhaseMachine, SessionPhase};
use crate::state::protocol::{self, Message, ProtocolError, WireGameState, REASON_PLAYER_LEFT};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Reason reported when the channel drops without a goodbye.
pub const REASON_CONNECTION_LOST: &str = "connection_lost";

/// Results across the games of one session. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStats {
    pub games_played: u32,
    pub player1_wins: u32,
    pub player2_wins: u32,
    pub ties: u32,
}

impl SessionStats {
    pub fn record(&mut self, winner: Winner) {
        self.games_played += 1;
        match winner {
            Winner::Player(PlayerId::One) => self.player1_wins += 1,
            Winner::Player(PlayerId::Two) => self.player2_wins += 1,
            Winner::Tie => self.ties += 1,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Local input refused without touching any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Invalid move")]
    InvalidMove,
    #[error("Wait for your turn")]
    NotYourTurn,
    #[error("Waiting for the host")]
    AwaitingHost,
    #[error("Host rejected the move")]
    RejectedByHost,
    #[error("You can only change your own color")]
    ForeignColor,
}

/// Something the renderer or UI shell should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEvent {
    /// Redraw the board
    Render { state: GameState, colors: PlayerColors },

    /// Short transient message
    Notice(String),

    LobbyOpened { address: String },
    GuestConnected,
    LobbyJoined { host: String },

    /// Host may start the game
    LobbyReady,

    GameStarted { grid_size: usize, my_player: PlayerId },
    ColorsChanged(PlayerColors),
    GameOver { winner: Winner, scores: Scores, stats: SessionStats },

    /// Blocking notice: the other side is gone, menu follows after `return_after`
    SessionEnded { departed: Role, reason: String, return_after: Duration },

    ReturnToMenu,
}

/// Session errors.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error("No game in progress")]
    NoGame,
    #[error("Not connected to a peer")]
    NotConnected,
    #[error(transparent)]
    Transition(#[from] InvalidTransition),
    #[error(transparent)]
    Lobby(#[from] LobbyError),
    #[error(transparent)]
    Game(#[from] GameError),
}

/// One play session, local or online.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    phase: PhaseMachine,
    /// Online role; `None` in local play
    role: Option<Role>,
    game: Option<GameState>,
    /// Board size for rematches
    grid_size: usize,
    colors: PlayerColors,
    lobby: Option<Lobby>,
    connection: Option<Connection>,
    stats: SessionStats,
    /// Current game's result already tallied
    result_recorded: bool,
    /// Guest sent a move and has not seen its result
    awaiting_result: bool,
    /// Guest asked for a rematch and has not seen the host's reset
    awaiting_rematch: bool,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            grid_size: config.grid_size,
            colors: config.colors.clone(),
            config,
            phase: PhaseMachine::new(),
            role: None,
            game: None,
            lobby: None,
            connection: None,
            stats: SessionStats::default(),
            result_recorded: false,
            awaiting_result: false,
            awaiting_rematch: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.phase()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    /// Our player id online. Local play shares one engine, so this is player 1.
    pub fn my_player(&self) -> PlayerId {
        self.role.map_or(PlayerId::One, Role::player)
    }

    pub fn game(&self) -> Option<&GameState> {
        self.game.as_ref()
    }

    pub fn colors(&self) -> &PlayerColors {
        &self.colors
    }

    pub fn lobby(&self) -> Option<&Lobby> {
        self.lobby.as_ref()
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
        info!("session stats reset");
    }

    pub fn has_connection(&self) -> bool {
        self.connection.is_some()
    }

    /// Hosting and still waiting for a guest to dial in.
    pub fn awaiting_guest(&self) -> bool {
        self.phase() == SessionPhase::HostLobby && self.connection.is_none()
    }

    /// Check a join attempt is allowed before dialing.
    pub fn can_join(&self) -> Result<(), SessionError> {
        self.phase.apply(PhaseEvent::JoinLobby)?;
        Ok(())
    }

    // =========================================================================
    // Local input
    // =========================================================================

    /// Start (or restart) a hot-seat game.
    pub fn start_local(
        &mut self,
        grid_size: usize,
        colors: PlayerColors,
    ) -> Result<Vec<UiEvent>, SessionError> {
        let game = GameState::new(grid_size)?;
        self.phase.apply_mut(PhaseEvent::StartLocal)?;

        self.role = None;
        self.colors = colors;
        self.grid_size = grid_size;
        info!(grid_size, "local game started");
        Ok(self.begin_game(game))
    }

    /// Open a lobby as host at our transport address.
    pub fn open_host_lobby(&mut self, address: &str) -> Result<Vec<UiEvent>, SessionError> {
        self.phase.apply_mut(PhaseEvent::OpenLobby)?;
        self.role = Some(Role::Host);
        self.lobby = Some(Lobby::new_host(address));
        info!(%address, "hosting lobby");
        Ok(vec![UiEvent::LobbyOpened {
            address: address.to_string(),
        }])
    }

    /// Host accepted a guest connection.
    pub fn attach_guest(&mut self, mut connection: Connection) -> Result<Vec<UiEvent>, SessionError> {
        let accepted = match (self.phase(), self.lobby.as_mut()) {
            (SessionPhase::HostLobby, Some(lobby)) => lobby.mark_guest_connected(),
            _ => Err(LobbyError::NotHost),
        };
        if let Err(err) = accepted {
            connection.close();
            return Err(err.into());
        }

        info!(peer = %connection.peer, "guest connected");
        self.connection = Some(connection);

        let mut events = vec![UiEvent::GuestConnected];
        let color = Message::ColorUpdate {
            player: PlayerId::One,
            color: self.colors.player1.clone(),
        };
        self.send_or_end(&color, &mut events);
        Ok(events)
    }

    /// Guest joined a host: announce readiness and our color.
    pub fn attach_host(&mut self, mut connection: Connection) -> Result<Vec<UiEvent>, SessionError> {
        if let Err(err) = self.phase.apply_mut(PhaseEvent::JoinLobby) {
            connection.close();
            return Err(err.into());
        }

        let host = connection.peer.clone();
        info!(%host, "joined lobby");
        self.role = Some(Role::Guest);
        self.lobby = Some(Lobby::new_guest(host.clone()));
        self.connection = Some(connection);

        let mut events = vec![UiEvent::LobbyJoined { host }];
        let color = Message::ColorUpdate {
            player: PlayerId::Two,
            color: self.colors.player2.clone(),
        };
        if self.send_or_end(&Message::GuestReady, &mut events) {
            self.send_or_end(&color, &mut events);
        }
        Ok(events)
    }

    /// Host starts the online game once the guest is ready.
    pub fn start_online(&mut self, grid_size: usize) -> Result<Vec<UiEvent>, SessionError> {
        let lobby = self.lobby.as_ref().ok_or(LobbyError::NotHost)?;
        lobby.can_start()?;
        let game = GameState::new(grid_size)?;
        self.phase.apply_mut(PhaseEvent::StartOnline)?;

        if let Some(lobby) = self.lobby.as_mut() {
            lobby.mark_started();
        }
        self.grid_size = grid_size;
        info!(grid_size, "online game started");

        let start = Message::game_start(&game, &self.colors);
        let mut events = self.begin_game(game);
        self.send_or_end(&start, &mut events);
        Ok(events)
    }

    /// A line was clicked.
    pub fn handle_move(&mut self, edge: Edge) -> Result<Vec<UiEvent>, SessionError> {
        match self.phase() {
            SessionPhase::LocalActive => self.local_move(edge),
            SessionPhase::OnlineActive => self.online_move(edge),
            _ => Err(SessionError::NoGame),
        }
    }

    fn local_move(&mut self, edge: Edge) -> Result<Vec<UiEvent>, SessionError> {
        let game = self.game.as_mut().ok_or(SessionError::NoGame)?;
        if !game.is_valid_move(edge) {
            return Err(Rejection::InvalidMove.into());
        }

        let mover = game.current_player();
        let completed = game.apply_move(edge, mover)?;
        debug!(%edge, player = mover.number(), boxes = completed.len(), "local move");

        let mut events = Vec::new();
        self.after_change(&mut events);
        Ok(events)
    }

    fn online_move(&mut self, edge: Edge) -> Result<Vec<UiEvent>, SessionError> {
        let role = self.role.ok_or(SessionError::NotConnected)?;
        let game = self.game.as_mut().ok_or(SessionError::NoGame)?;

        if game.current_player() != role.player() {
            return Err(Rejection::NotYourTurn.into());
        }
        if self.awaiting_result || self.awaiting_rematch {
            return Err(Rejection::AwaitingHost.into());
        }
        if !game.is_valid_move(edge) {
            return Err(Rejection::InvalidMove.into());
        }

        let mut events = Vec::new();
        match role {
            Role::Host => {
                let completed = game.apply_move(edge, PlayerId::One)?;
                debug!(%edge, boxes = completed.len(), "host move");
                let result = Message::accepted(game, completed);
                self.after_change(&mut events);
                self.send_or_end(&result, &mut events);
            }
            Role::Guest => {
                if self.send_or_end(&Message::Move(edge), &mut events) {
                    self.awaiting_result = true;
                    debug!(%edge, "move requested");
                }
            }
        }
        Ok(events)
    }

    /// Play again with the same board size.
    pub fn rematch(&mut self) -> Result<Vec<UiEvent>, SessionError> {
        let grid_size = self.grid_size;
        match (self.phase(), self.role) {
            (SessionPhase::LocalActive, _) => {
                let game = GameState::new(grid_size)?;
                info!(grid_size, "local rematch");
                Ok(self.begin_game(game))
            }
            (SessionPhase::OnlineActive, Some(Role::Host)) => {
                // Reset before sending so no move is accepted against the old game.
                let game = GameState::new(grid_size)?;
                let mut events = self.begin_game(game);
                info!(grid_size, "rematch sent");
                self.send_or_end(&Message::Rematch { grid_size }, &mut events);
                Ok(events)
            }
            (SessionPhase::OnlineActive, Some(Role::Guest)) => {
                let mut events = Vec::new();
                if !self.awaiting_rematch
                    && self.send_or_end(&Message::Rematch { grid_size }, &mut events)
                {
                    self.awaiting_rematch = true;
                    info!(grid_size, "rematch requested");
                }
                Ok(events)
            }
            _ => Err(SessionError::NoGame),
        }
    }

    /// Change a display color. Online, only our own.
    pub fn set_color(&mut self, player: PlayerId, color: String) -> Result<Vec<UiEvent>, SessionError> {
        let online = self.phase.is_online();
        if online && player != self.my_player() {
            return Err(Rejection::ForeignColor.into());
        }

        self.colors.set(player, color.clone());
        let mut events = vec![UiEvent::ColorsChanged(self.colors.clone())];
        // Without a guest yet, attach_guest and gameStart carry the color.
        if online && self.connection.is_some() {
            self.send_or_end(&Message::ColorUpdate { player, color }, &mut events);
        }
        if let Some(render) = self.render() {
            events.push(render);
        }
        Ok(events)
    }

    /// Leave the session. The goodbye to the peer is best effort.
    pub fn quit(&mut self) -> Vec<UiEvent> {
        if self.phase.is_idle() {
            return Vec::new();
        }

        if let Some(connection) = self.connection.as_mut() {
            let notice = Message::Disconnect {
                reason: REASON_PLAYER_LEFT.to_string(),
            };
            if let Err(err) = connection.send(&notice) {
                debug!(error = %err, "disconnect notice not delivered");
            }
        }

        info!(phase = %self.phase(), "session closed by local player");
        self.release();
        vec![UiEvent::ReturnToMenu]
    }

    // =========================================================================
    // Transport input
    // =========================================================================

    /// React to something the transport reported.
    pub fn handle_transport_event(&mut self, event: TransportEvent) -> Vec<UiEvent> {
        let Some(connection) = self.connection.as_mut() else {
            debug!(?event, "transport event without a connection");
            return Vec::new();
        };
        connection.observe(&event);

        match event {
            TransportEvent::Open => Vec::new(),
            TransportEvent::Data(text) => match protocol::decode(&text) {
                Ok(message) => self.handle_message(message),
                Err(ProtocolError::UnknownKind(kind)) => {
                    warn!(%kind, "ignoring unknown message kind");
                    Vec::new()
                }
                Err(err) => {
                    warn!(error = %err, "ignoring undecodable message");
                    Vec::new()
                }
            },
            TransportEvent::Close => self.end_by_peer(REASON_CONNECTION_LOST.to_string()),
            TransportEvent::Error(detail) => {
                warn!(%detail, "transport error");
                self.end_by_peer(detail)
            }
        }
    }

    /// Apply one protocol message according to our role.
    pub fn handle_message(&mut self, message: Message) -> Vec<UiEvent> {
        let Some(role) = self.role.filter(|_| self.phase.is_online()) else {
            warn!(kind = message.kind(), "message outside an online session");
            return Vec::new();
        };
        debug!(%role, kind = message.kind(), "received message");

        match (role, message) {
            (Role::Host, Message::GuestReady) => self.on_guest_ready(),
            (_, Message::ColorUpdate { player, color }) => {
                self.colors.set(player, color);
                let mut events = vec![UiEvent::ColorsChanged(self.colors.clone())];
                events.extend(self.render());
                events
            }
            (
                Role::Guest,
                Message::GameStart {
                    state,
                    host_color,
                    guest_color,
                    ..
                },
            ) => self.on_game_start(state, PlayerColors::new(host_color, guest_color)),
            (Role::Host, Message::Move(edge)) => self.on_move_request(edge),
            (Role::Guest, Message::MoveResult { success, state, .. }) => {
                self.on_move_result(success, state)
            }
            (role, Message::Rematch { grid_size }) => self.on_rematch(role, grid_size),
            (_, Message::Disconnect { reason }) => self.end_by_peer(reason),
            (role, other) => {
                warn!(%role, kind = other.kind(), "ignoring message not meant for this role");
                Vec::new()
            }
        }
    }

    fn on_guest_ready(&mut self) -> Vec<UiEvent> {
        let ready = match (self.phase(), self.lobby.as_mut()) {
            (SessionPhase::HostLobby, Some(lobby)) => lobby.mark_guest_ready(),
            _ => Err(LobbyError::GuestNotConnected),
        };
        match ready {
            Ok(()) => {
                info!("guest ready");
                vec![UiEvent::LobbyReady]
            }
            Err(err) => {
                warn!(error = %err, "unexpected guestReady");
                Vec::new()
            }
        }
    }

    fn on_game_start(&mut self, state: WireGameState, colors: PlayerColors) -> Vec<UiEvent> {
        let game = match GameState::try_from(state) {
            Ok(game) => game,
            Err(err) => {
                warn!(error = %err, "discarding invalid gameStart state");
                return Vec::new();
            }
        };

        if self.phase() == SessionPhase::GuestLobby {
            if let Err(err) = self.phase.apply_mut(PhaseEvent::StartOnline) {
                warn!(error = %err, "cannot start game");
                return Vec::new();
            }
        }
        if let Some(lobby) = self.lobby.as_mut() {
            lobby.mark_started();
        }

        info!(grid_size = game.grid_size(), "game started by host");
        self.colors = colors;
        self.grid_size = game.grid_size();
        self.begin_game(game)
    }

    /// Host side: validate and answer a guest's move request.
    fn on_move_request(&mut self, edge: Edge) -> Vec<UiEvent> {
        if self.phase() != SessionPhase::OnlineActive {
            warn!(%edge, "move request before the game started");
            return Vec::new();
        }
        let Some(game) = self.game.as_mut() else {
            return Vec::new();
        };

        let mut events = Vec::new();
        let reply = if game.current_player() != PlayerId::Two {
            warn!(%edge, "guest moved out of turn");
            Message::rejected(game)
        } else {
            match game.apply_move(edge, PlayerId::Two) {
                Ok(completed) => {
                    debug!(%edge, boxes = completed.len(), "guest move applied");
                    let reply = Message::accepted(game, completed);
                    self.after_change(&mut events);
                    reply
                }
                Err(err) => {
                    warn!(error = %err, "guest move rejected");
                    Message::rejected(game)
                }
            }
        };

        self.send_or_end(&reply, &mut events);
        events
    }

    /// Guest side: adopt the host's state wholesale.
    fn on_move_result(&mut self, success: bool, state: WireGameState) -> Vec<UiEvent> {
        if self.phase() != SessionPhase::OnlineActive {
            warn!("moveResult outside a game");
            return Vec::new();
        }

        self.awaiting_result = false;
        match GameState::try_from(state) {
            Ok(game) => self.game = Some(game),
            Err(err) => {
                warn!(error = %err, "discarding invalid moveResult state");
                return Vec::new();
            }
        }

        let mut events = Vec::new();
        if !success {
            events.push(UiEvent::Notice(Rejection::RejectedByHost.to_string()));
        }
        self.after_change(&mut events);
        events
    }

    fn on_rematch(&mut self, role: Role, grid_size: usize) -> Vec<UiEvent> {
        if self.phase() != SessionPhase::OnlineActive {
            warn!(grid_size, "rematch outside a game");
            return Vec::new();
        }
        let game = match GameState::new(grid_size) {
            Ok(game) => game,
            Err(err) => {
                warn!(error = %err, "ignoring rematch");
                return Vec::new();
            }
        };

        info!(%role, grid_size, "rematch");
        self.grid_size = grid_size;
        let mut events = self.begin_game(game);
        if role == Role::Host {
            // Guest resets only on the host's word.
            self.send_or_end(&Message::Rematch { grid_size }, &mut events);
        }
        events
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn begin_game(&mut self, game: GameState) -> Vec<UiEvent> {
        let grid_size = game.grid_size();
        self.game = Some(game);
        self.result_recorded = false;
        self.awaiting_result = false;
        self.awaiting_rematch = false;

        let mut events = vec![UiEvent::GameStarted {
            grid_size,
            my_player: self.my_player(),
        }];
        self.after_change(&mut events);
        events
    }

    fn render(&self) -> Option<UiEvent> {
        self.game.as_ref().map(|state| UiEvent::Render {
            state: state.clone(),
            colors: self.colors.clone(),
        })
    }

    /// Redraw, and tally the result the first time a game is seen finished.
    fn after_change(&mut self, events: &mut Vec<UiEvent>) {
        events.extend(self.render());

        let Some(game) = self.game.as_ref() else {
            return;
        };
        if self.result_recorded || !game.is_game_over() {
            return;
        }
        let Some(winner) = game.winner() else {
            return;
        };

        self.result_recorded = true;
        self.stats.record(winner);
        info!(winner = u8::from(winner), games = self.stats.games_played, "game over");
        events.push(UiEvent::GameOver {
            winner,
            scores: game.scores(),
            stats: self.stats,
        });
    }

    fn send(&mut self, message: &Message) -> Result<(), SendError> {
        self.connection
            .as_mut()
            .ok_or(SendError::NotOpen)?
            .send(message)
    }

    /// Send, or end the session if the channel is unusable. Returns whether it was sent.
    fn send_or_end(&mut self, message: &Message, events: &mut Vec<UiEvent>) -> bool {
        match self.send(message) {
            Ok(()) => true,
            Err(err) => {
                warn!(kind = message.kind(), error = %err, "send failed");
                events.extend(self.end_by_peer(REASON_CONNECTION_LOST.to_string()));
                false
            }
        }
    }

    fn end_by_peer(&mut self, reason: String) -> Vec<UiEvent> {
        let departed = self.role.map_or(Role::Host, Role::peer);
        warn!(%departed, %reason, "session ended by peer");
        self.release();
        vec![UiEvent::SessionEnded {
            departed,
            reason,
            return_after: self.config.notice_delay,
        }]
    }

    /// Drop all session resources and go idle. Closes the connection at most once.
    fn release(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            connection.close();
        }
        self.game = None;
        self.lobby = None;
        self.role = None;
        self.awaiting_result = false;
        self.awaiting_rematch = false;
        if let Err(err) = self.phase.apply_mut(PhaseEvent::End) {
            debug!(error = %err, "already idle");
        }
    }

    /// Snapshot for the UI shell.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "phase": self.phase().as_str(),
            "role": self.role.map(|r| r.as_str()),
            "my_player": self.my_player().number(),
            "colors": {
                "player1": self.colors.player1,
                "player2": self.colors.player2,
            },
            "scores": self.game.as_ref().map(|g| g.scores()),
            "current_player": self.game.as_ref().map(|g| g.current_player().number()),
            "game_over": self.game.as_ref().map(|g| g.is_game_over()),
            "lobby": self.lobby.as_ref().map(Lobby::to_json),
            "stats": self.stats,
        })
    }
}
