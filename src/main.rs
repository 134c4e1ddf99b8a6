//! dotsboxes - play Dots and Boxes in the terminal.
//!
//! Hot-seat play on one keyboard. Type a line per move:
//!
//! ```text
//! h 0 1     horizontal line at row 0, column 1
//! v 2 0     vertical line at row 2, column 0
//! rematch   start over with the same board
//! reset     clear the session tally
//! quit
//! ```

use clap::Parser;
use dotsboxes_state::config::SessionConfig;
use dotsboxes_state::runtime::{self, Command};
use dotsboxes_state::state::{Edge, GameState, MemoryNetwork, PlayerColors, PlayerId, Session, UiEvent};
use dotsboxes_state::telemetry;
use std::fmt::Write as _;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Parser)]
#[command(name = "dotsboxes", version, about = "Play Dots and Boxes in the terminal")]
struct Cli {
    /// Dots per side
    #[arg(short, long, env = "DOTS_GRID_SIZE")]
    grid_size: Option<usize>,

    /// Display color for player 1
    #[arg(long)]
    player1_color: Option<String>,

    /// Display color for player 2
    #[arg(long)]
    player2_color: Option<String>,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] dotsboxes_state::config::ConfigError),
    #[error("session loop stopped early")]
    Stopped,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), CliError> {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let mut config = SessionConfig::from_env()?;
    if let Some(size) = cli.grid_size {
        config = config.with_grid_size(size)?;
    }
    if let Some(color) = cli.player1_color {
        config.colors.set(PlayerId::One, color);
    }
    if let Some(color) = cli.player2_color {
        config.colors.set(PlayerId::Two, color);
    }

    let network = MemoryNetwork::new();
    let (commands, command_rx) = mpsc::channel(32);
    let (ui_tx, mut ui_rx) = mpsc::unbounded_channel();

    commands
        .send(Command::StartLocal { grid_size: None })
        .await
        .map_err(|_| CliError::Stopped)?;

    let input = async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let Some(command) = parse_command(&line) else {
                println!("? try `h <row> <col>`, `v <row> <col>`, rematch, reset or quit");
                continue;
            };
            let quitting = command == Command::Quit;
            if commands.send(command).await.is_err() || quitting {
                break;
            }
        }
    };

    let output = async move {
        while let Some(event) = ui_rx.recv().await {
            show(&event);
        }
    };

    let session = Session::new(config);
    let (session, (), ()) = tokio::join!(
        runtime::run(session, network.endpoint("local"), command_rx, ui_tx),
        input,
        output
    );

    let stats = session.stats();
    println!(
        "games: {}  player 1: {}  player 2: {}  ties: {}",
        stats.games_played, stats.player1_wins, stats.player2_wins, stats.ties
    );
    Ok(())
}

fn parse_command(line: &str) -> Option<Command> {
    let words: Vec<&str> = line.split_whitespace().collect();
    match words.as_slice() {
        ["h", row, col] => Some(Command::Move(Edge::horizontal(row.parse().ok()?, col.parse().ok()?))),
        ["v", row, col] => Some(Command::Move(Edge::vertical(row.parse().ok()?, col.parse().ok()?))),
        ["rematch"] => Some(Command::Rematch),
        ["reset"] => Some(Command::ResetStats),
        ["quit" | "q"] => Some(Command::Quit),
        _ => None,
    }
}

fn show(event: &UiEvent) {
    match event {
        UiEvent::Render { state, colors } => print!("{}", draw(state, colors)),
        UiEvent::Notice(text) => println!("! {text}"),
        UiEvent::GameStarted { grid_size, .. } => println!("new game on a {grid_size}x{grid_size} board"),
        UiEvent::GameOver { winner, scores, .. } => {
            println!("game over: {} to {}", scores.player1, scores.player2);
            match u8::from(*winner) {
                0 => println!("it's a tie"),
                n => println!("player {n} wins"),
            }
        }
        UiEvent::ReturnToMenu => println!("bye"),
        _ => {}
    }
}

/// Text board: `-` and `|` for drawn lines, the owner's number inside boxes.
fn draw(state: &GameState, colors: &PlayerColors) -> String {
    let n = state.grid_size();
    let mut out = String::new();

    for r in 0..n {
        for c in 0..n {
            out.push('o');
            if c + 1 < n {
                let line = if state.edge_owner(Edge::horizontal(r, c)).is_some() { "---" } else { "   " };
                out.push_str(line);
            }
        }
        out.push('\n');

        if r + 1 == n {
            break;
        }
        for c in 0..n {
            let wall = if state.edge_owner(Edge::vertical(r, c)).is_some() { '|' } else { ' ' };
            out.push(wall);
            if c + 1 < n {
                let owner = state
                    .boxes()
                    .iter()
                    .find(|b| b.row == r && b.col == c)
                    .map_or(' ', |b| char::from(b'0' + b.owner.number()));
                let _ = write!(out, " {owner} ");
            }
        }
        out.push('\n');
    }

    let scores = state.scores();
    let turn = state.current_player();
    let _ = writeln!(
        out,
        "P1 {} ({})  P2 {} ({})  to move: {}",
        scores.player1,
        colors.player1,
        scores.player2,
        colors.player2,
        turn
    );
    out
}
