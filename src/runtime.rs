//! Event loop driving a [`Session`].
//!
//! One task owns the session and multiplexes three sources: commands from
//! the UI, events from the current transport connection, and incoming
//! guests while hosting. Everything the session emits is forwarded to the
//! UI channel. Handlers never send to the UI themselves; they return their
//! events and this loop publishes them.

use crate::state::connection::{join, Events, Transport, TransportEvent};
use crate::state::game::{Edge, PlayerId};
use crate::state::session::{Session, SessionError, UiEvent};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// Input from the UI shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `None` uses the configured size
    StartLocal { grid_size: Option<usize> },
    Host,
    Join { remote: String },
    StartOnline { grid_size: Option<usize> },
    Move(Edge),
    SetColor { player: PlayerId, color: String },
    Rematch,
    Quit,
    ResetStats,
}

/// Run until the command channel closes, then hand the session back.
pub async fn run<T>(
    mut session: Session,
    transport: T,
    mut commands: mpsc::Receiver<Command>,
    ui: mpsc::UnboundedSender<UiEvent>,
) -> Session
where
    T: Transport,
{
    let mut events: Option<Events> = None;
    let mut return_at: Option<Instant> = None;

    info!(address = transport.local_address(), "session loop started");

    loop {
        let output = tokio::select! {
            command = commands.recv() => match command {
                Some(command) => execute(&mut session, &transport, &mut events, command).await,
                None => {
                    publish(&ui, session.quit());
                    break;
                }
            },

            event = next_event(&mut events) => session.handle_transport_event(event),

            accepted = transport.accept(), if session.awaiting_guest() => match accepted {
                Ok(link) => match session.attach_guest(link.connection) {
                    Ok(out) => {
                        events = Some(link.events);
                        out
                    }
                    Err(err) => notice(err),
                },
                Err(err) => {
                    warn!(error = %err, "accept failed");
                    Vec::new()
                }
            },

            _ = sleep_until(return_at.unwrap_or_else(Instant::now)), if return_at.is_some() => {
                return_at = None;
                vec![UiEvent::ReturnToMenu]
            }
        };

        // The session dropped its connection; stop listening to it.
        if !session.has_connection() {
            events = None;
        }
        for event in &output {
            match event {
                UiEvent::SessionEnded { return_after, .. } => {
                    return_at = Some(Instant::now() + *return_after);
                }
                UiEvent::ReturnToMenu | UiEvent::GameStarted { .. } | UiEvent::LobbyOpened { .. } => {
                    return_at = None;
                }
                _ => {}
            }
        }
        publish(&ui, output);
    }

    info!(stats = ?session.stats(), "session loop stopped");
    session
}

async fn execute<T>(
    session: &mut Session,
    transport: &T,
    events: &mut Option<Events>,
    command: Command,
) -> Vec<UiEvent>
where
    T: Transport,
{
    debug!(?command, "command");
    let default_size = session.config().grid_size;

    let result = match command {
        Command::StartLocal { grid_size } => {
            let colors = session.colors().clone();
            session.start_local(grid_size.unwrap_or(default_size), colors)
        }
        Command::Host => session.open_host_lobby(transport.local_address()),
        Command::Join { remote } => match session.can_join() {
            Ok(()) => match join(transport, &remote, session.config().join_timeout).await {
                Ok(link) => {
                    *events = Some(link.events);
                    session.attach_host(link.connection)
                }
                Err(err) => Ok(vec![UiEvent::Notice(format!("Could not join {remote}: {err}"))]),
            },
            Err(err) => Err(err),
        },
        Command::StartOnline { grid_size } => session.start_online(grid_size.unwrap_or(default_size)),
        Command::Move(edge) => session.handle_move(edge),
        Command::SetColor { player, color } => session.set_color(player, color),
        Command::Rematch => session.rematch(),
        Command::Quit => Ok(session.quit()),
        Command::ResetStats => {
            session.reset_stats();
            Ok(Vec::new())
        }
    };

    result.unwrap_or_else(notice)
}

/// Next event from the live connection. A vanished peer counts as a close.
async fn next_event(events: &mut Option<Events>) -> TransportEvent {
    match events {
        Some(events) => events.next().await.unwrap_or(TransportEvent::Close),
        None => std::future::pending().await,
    }
}

fn notice(err: SessionError) -> Vec<UiEvent> {
    debug!(error = %err, "command refused");
    vec![UiEvent::Notice(err.to_string())]
}

fn publish(ui: &mpsc::UnboundedSender<UiEvent>, events: Vec<UiEvent>) {
    for event in events {
        if ui.send(event).is_err() {
            debug!("ui channel closed");
            return;
        }
    }
}
