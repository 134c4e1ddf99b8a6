//! Game state management.
//!
//! The rules engine: board representation, move legality, box completion,
//! scoring, turn advancement and win detection. Everything here is pure
//! state with no I/O; callers decide who is allowed to move.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest playable board (dots per side).
pub const MIN_GRID_SIZE: usize = 2;

/// Largest board accepted, locally or from a peer.
pub const MAX_GRID_SIZE: usize = 32;

/// Default board size offered by the menu.
pub const DEFAULT_GRID_SIZE: usize = 5;

/// One of the two participants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum PlayerId {
    One,
    Two,
}

impl PlayerId {
    /// The opponent.
    pub fn other(self) -> Self {
        match self {
            Self::One => Self::Two,
            Self::Two => Self::One,
        }
    }

    pub fn number(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
        }
    }
}

impl TryFrom<u8> for PlayerId {
    type Error = GameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::One),
            2 => Ok(Self::Two),
            other => Err(GameError::InvalidPlayer(other)),
        }
    }
}

impl From<PlayerId> for u8 {
    fn from(player: PlayerId) -> Self {
        player.number()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Player {}", self.number())
    }
}

/// Orientation of a line between two adjacent dots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    Horizontal,
    Vertical,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Horizontal => "horizontal",
            Self::Vertical => "vertical",
        }
    }
}

/// A candidate or drawn line.
///
/// Horizontal `(r, c)` joins dot `(r, c)` to `(r, c + 1)`; vertical `(r, c)`
/// joins dot `(r, c)` to `(r + 1, c)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    #[serde(rename = "edgeType")]
    pub kind: EdgeKind,
    #[serde(rename = "r")]
    pub row: usize,
    #[serde(rename = "c")]
    pub col: usize,
}

impl Edge {
    pub fn new(kind: EdgeKind, row: usize, col: usize) -> Self {
        Self { kind, row, col }
    }

    pub fn horizontal(row: usize, col: usize) -> Self {
        Self::new(EdgeKind::Horizontal, row, col)
    }

    pub fn vertical(row: usize, col: usize) -> Self {
        Self::new(EdgeKind::Vertical, row, col)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.kind.as_str(), self.row, self.col)
    }
}

/// A completed box and who completed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxClaim {
    #[serde(rename = "r")]
    pub row: usize,
    #[serde(rename = "c")]
    pub col: usize,
    pub owner: PlayerId,
}

/// Box counts per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Scores {
    pub player1: u32,
    pub player2: u32,
}

impl Scores {
    pub fn get(&self, player: PlayerId) -> u32 {
        match player {
            PlayerId::One => self.player1,
            PlayerId::Two => self.player2,
        }
    }

    fn increment(&mut self, player: PlayerId) {
        match player {
            PlayerId::One => self.player1 += 1,
            PlayerId::Two => self.player2 += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.player1 + self.player2
    }

    /// Compare final scores.
    pub fn winner(&self) -> Winner {
        match self.player1.cmp(&self.player2) {
            std::cmp::Ordering::Greater => Winner::Player(PlayerId::One),
            std::cmp::Ordering::Less => Winner::Player(PlayerId::Two),
            std::cmp::Ordering::Equal => Winner::Tie,
        }
    }
}

/// Result of a finished game. Wire value 0 for a tie, otherwise the player number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Winner {
    Tie,
    Player(PlayerId),
}

impl TryFrom<u8> for Winner {
    type Error = GameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Tie),
            n => PlayerId::try_from(n).map(Self::Player),
        }
    }
}

impl From<Winner> for u8 {
    fn from(winner: Winner) -> Self {
        match winner {
            Winner::Tie => 0,
            Winner::Player(p) => p.number(),
        }
    }
}

/// Dense owner grid for one edge orientation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeGrid {
    rows: usize,
    cols: usize,
    owners: Vec<Option<PlayerId>>,
}

impl EdgeGrid {
    pub(crate) fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            owners: vec![None; rows * cols],
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn in_bounds(&self, row: usize, col: usize) -> bool {
        row < self.rows && col < self.cols
    }

    /// Owner of a drawn edge; `None` when undrawn or out of bounds.
    pub fn owner(&self, row: usize, col: usize) -> Option<PlayerId> {
        if self.in_bounds(row, col) {
            self.owners[row * self.cols + col]
        } else {
            None
        }
    }

    pub fn is_drawn(&self, row: usize, col: usize) -> bool {
        self.owner(row, col).is_some()
    }

    /// Record an edge. Returns false if out of bounds or already drawn.
    pub(crate) fn insert(&mut self, row: usize, col: usize, player: PlayerId) -> bool {
        if !self.in_bounds(row, col) {
            return false;
        }
        let slot = &mut self.owners[row * self.cols + col];
        if slot.is_some() {
            return false;
        }
        *slot = Some(player);
        true
    }

    /// Drawn edges in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, PlayerId)> + '_ {
        let cols = self.cols;
        self.owners
            .iter()
            .enumerate()
            .filter_map(move |(i, owner)| owner.map(|p| (i / cols, i % cols, p)))
    }

    pub fn len(&self) -> usize {
        self.owners.iter().filter(|o| o.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.iter().all(|o| o.is_none())
    }
}

/// The single mutable aggregate for one game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub(crate) grid_size: usize,
    pub(crate) horizontal: EdgeGrid,
    pub(crate) vertical: EdgeGrid,
    /// Completed boxes in completion order
    pub(crate) boxes: Vec<BoxClaim>,
    pub(crate) scores: Scores,
    pub(crate) current_player: PlayerId,
    pub(crate) game_over: bool,
    pub(crate) winner: Option<Winner>,
}

impl GameState {
    /// Create a fresh game on an `grid_size` x `grid_size` lattice of dots.
    pub fn new(grid_size: usize) -> Result<Self, GameError> {
        if !(MIN_GRID_SIZE..=MAX_GRID_SIZE).contains(&grid_size) {
            return Err(GameError::InvalidGridSize(grid_size));
        }

        Ok(Self {
            grid_size,
            horizontal: EdgeGrid::new(grid_size, grid_size - 1),
            vertical: EdgeGrid::new(grid_size - 1, grid_size),
            boxes: Vec::new(),
            scores: Scores::default(),
            current_player: PlayerId::One,
            game_over: false,
            winner: None,
        })
    }

    pub fn grid_size(&self) -> usize {
        self.grid_size
    }

    pub fn horizontal_edges(&self) -> &EdgeGrid {
        &self.horizontal
    }

    pub fn vertical_edges(&self) -> &EdgeGrid {
        &self.vertical
    }

    pub fn boxes(&self) -> &[BoxClaim] {
        &self.boxes
    }

    pub fn scores(&self) -> Scores {
        self.scores
    }

    pub fn current_player(&self) -> PlayerId {
        self.current_player
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn winner(&self) -> Option<Winner> {
        self.winner
    }

    /// Number of boxes on the board, `(N - 1)²`.
    pub fn total_boxes(&self) -> usize {
        (self.grid_size - 1) * (self.grid_size - 1)
    }

    fn edges(&self, kind: EdgeKind) -> &EdgeGrid {
        match kind {
            EdgeKind::Horizontal => &self.horizontal,
            EdgeKind::Vertical => &self.vertical,
        }
    }

    fn edges_mut(&mut self, kind: EdgeKind) -> &mut EdgeGrid {
        match kind {
            EdgeKind::Horizontal => &mut self.horizontal,
            EdgeKind::Vertical => &mut self.vertical,
        }
    }

    /// Who drew an edge, if anyone.
    pub fn edge_owner(&self, edge: Edge) -> Option<PlayerId> {
        self.edges(edge.kind).owner(edge.row, edge.col)
    }

    pub fn drawn_edge_count(&self) -> usize {
        self.horizontal.len() + self.vertical.len()
    }

    /// Check whether an edge may be drawn. Turn ownership is the caller's concern.
    pub fn is_valid_move(&self, edge: Edge) -> bool {
        let grid = self.edges(edge.kind);
        grid.in_bounds(edge.row, edge.col) && !grid.is_drawn(edge.row, edge.col)
    }

    /// All edges that can still be drawn, horizontal first, row-major.
    pub fn remaining_moves(&self) -> Vec<Edge> {
        let mut moves = Vec::new();
        for kind in [EdgeKind::Horizontal, EdgeKind::Vertical] {
            let grid = self.edges(kind);
            for row in 0..grid.rows() {
                for col in 0..grid.cols() {
                    if !grid.is_drawn(row, col) {
                        moves.push(Edge::new(kind, row, col));
                    }
                }
            }
        }
        moves
    }

    /// A box is complete when all four bounding edges are present.
    pub fn is_box_complete(&self, row: usize, col: usize) -> bool {
        row + 1 < self.grid_size
            && col + 1 < self.grid_size
            && self.horizontal.is_drawn(row, col)
            && self.horizontal.is_drawn(row + 1, col)
            && self.vertical.is_drawn(row, col)
            && self.vertical.is_drawn(row, col + 1)
    }

    /// Boxes bordering an edge, in claim order (above/below, left/right).
    fn adjacent_boxes(&self, edge: Edge) -> Vec<(usize, usize)> {
        let last = self.grid_size - 1;
        let mut candidates = Vec::with_capacity(2);
        match edge.kind {
            EdgeKind::Horizontal => {
                if edge.row > 0 {
                    candidates.push((edge.row - 1, edge.col));
                }
                if edge.row < last {
                    candidates.push((edge.row, edge.col));
                }
            }
            EdgeKind::Vertical => {
                if edge.col > 0 {
                    candidates.push((edge.row, edge.col - 1));
                }
                if edge.col < last {
                    candidates.push((edge.row, edge.col));
                }
            }
        }
        candidates
    }

    /// Draw an edge for `player` and resolve its consequences.
    ///
    /// Rejects illegal moves before touching any state. On success returns
    /// the boxes this move completed; if none, the turn passes to the other
    /// player, otherwise the mover goes again.
    pub fn apply_move(&mut self, edge: Edge, player: PlayerId) -> Result<Vec<BoxClaim>, GameError> {
        if !self.is_valid_move(edge) {
            return Err(GameError::InvalidMove(edge));
        }

        self.edges_mut(edge.kind).insert(edge.row, edge.col, player);

        let mut completed = Vec::new();
        for (row, col) in self.adjacent_boxes(edge) {
            if self.is_box_complete(row, col) {
                let claim = BoxClaim { row, col, owner: player };
                self.boxes.push(claim);
                self.scores.increment(player);
                completed.push(claim);
            }
        }

        if self.boxes.len() == self.total_boxes() {
            self.game_over = true;
            self.winner = Some(self.scores.winner());
        }

        if completed.is_empty() {
            self.current_player = self.current_player.other();
        }

        Ok(completed)
    }

    /// Verify the aggregate's invariants. Used when adopting a replicated state.
    pub fn check_invariants(&self) -> Result<(), GameError> {
        let mut owned = Scores::default();
        let mut seen = vec![false; self.total_boxes()];

        for claim in &self.boxes {
            if claim.row + 1 >= self.grid_size || claim.col + 1 >= self.grid_size {
                return Err(GameError::Inconsistent("box out of bounds"));
            }
            let index = claim.row * (self.grid_size - 1) + claim.col;
            if seen[index] {
                return Err(GameError::Inconsistent("box claimed twice"));
            }
            seen[index] = true;
            if !self.is_box_complete(claim.row, claim.col) {
                return Err(GameError::Inconsistent("claimed box is not enclosed"));
            }
            owned.increment(claim.owner);
        }

        for row in 0..self.grid_size - 1 {
            for col in 0..self.grid_size - 1 {
                if self.is_box_complete(row, col) && !seen[row * (self.grid_size - 1) + col] {
                    return Err(GameError::Inconsistent("enclosed box is unclaimed"));
                }
            }
        }

        if owned != self.scores {
            return Err(GameError::Inconsistent("scores disagree with boxes"));
        }

        let finished = self.boxes.len() == self.total_boxes();
        if finished != self.game_over {
            return Err(GameError::Inconsistent("game over flag disagrees with boxes"));
        }

        let expected_winner = finished.then(|| self.scores.winner());
        if expected_winner != self.winner {
            return Err(GameError::Inconsistent("winner disagrees with scores"));
        }

        Ok(())
    }
}

/// Game errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error("Grid size {0} is outside {min}..={max}", min = MIN_GRID_SIZE, max = MAX_GRID_SIZE)]
    InvalidGridSize(usize),
    #[error("Invalid move: {0}")]
    InvalidMove(Edge),
    #[error("Unknown player id {0}")]
    InvalidPlayer(u8),
    #[error("Inconsistent game state: {0}")]
    Inconsistent(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// Every legal move in a fixed order, alternating turns by the engine's rule.
    fn play_out(state: &mut GameState) -> Vec<usize> {
        let mut box_counts = Vec::new();
        for edge in state.remaining_moves() {
            let mover = state.current_player();
            assert!(!state.is_game_over());
            state.apply_move(edge, mover).unwrap();
            box_counts.push(state.boxes().len());
        }
        box_counts
    }

    #[test]
    fn test_new_state_is_empty() {
        for n in MIN_GRID_SIZE..=9 {
            let state = GameState::new(n).unwrap();
            assert_eq!(state.drawn_edge_count(), 0);
            assert!(state.boxes().is_empty());
            assert_eq!(state.current_player(), PlayerId::One);
            assert_eq!(state.scores(), Scores::default());
            assert!(!state.is_game_over());
            assert_eq!(state.winner(), None);
        }
    }

    #[test]
    fn test_grid_size_bounds() {
        assert_eq!(GameState::new(1).unwrap_err(), GameError::InvalidGridSize(1));
        assert_eq!(
            GameState::new(MAX_GRID_SIZE + 1).unwrap_err(),
            GameError::InvalidGridSize(MAX_GRID_SIZE + 1)
        );
        assert!(GameState::new(MAX_GRID_SIZE).is_ok());
    }

    #[test]
    fn test_edge_bounds() {
        let state = GameState::new(3).unwrap();

        assert!(state.is_valid_move(Edge::horizontal(2, 1)));
        assert!(!state.is_valid_move(Edge::horizontal(2, 2)));
        assert!(!state.is_valid_move(Edge::horizontal(3, 0)));

        assert!(state.is_valid_move(Edge::vertical(1, 2)));
        assert!(!state.is_valid_move(Edge::vertical(2, 0)));
        assert!(!state.is_valid_move(Edge::vertical(0, 3)));

        assert_eq!(state.remaining_moves().len(), 12);
    }

    #[test]
    fn test_validation_never_mutates() {
        let mut state = GameState::new(3).unwrap();
        state.apply_move(Edge::horizontal(0, 0), PlayerId::One).unwrap();
        let before = state.clone();

        for edge in [
            Edge::horizontal(0, 0),
            Edge::horizontal(9, 9),
            Edge::vertical(1, 1),
            Edge::vertical(usize::MAX, 0),
        ] {
            let _ = state.is_valid_move(edge);
        }

        assert_eq!(state, before);
    }

    #[test]
    fn test_rejected_move_leaves_state_untouched() {
        let mut state = GameState::new(3).unwrap();
        state.apply_move(Edge::vertical(0, 0), PlayerId::One).unwrap();
        let before = state.clone();

        let err = state.apply_move(Edge::vertical(0, 0), PlayerId::Two).unwrap_err();
        assert_eq!(err, GameError::InvalidMove(Edge::vertical(0, 0)));
        assert_eq!(state, before);
    }

    #[test]
    fn test_turn_flips_without_box() {
        let mut state = GameState::new(3).unwrap();

        let completed = state.apply_move(Edge::horizontal(0, 0), PlayerId::One).unwrap();
        assert!(completed.is_empty());
        assert_eq!(state.current_player(), PlayerId::Two);
        assert_eq!(state.edge_owner(Edge::horizontal(0, 0)), Some(PlayerId::One));
    }

    #[test]
    fn test_completing_box_keeps_turn() {
        let mut state = GameState::new(3).unwrap();
        state.apply_move(Edge::horizontal(0, 0), PlayerId::One).unwrap();
        state.apply_move(Edge::horizontal(1, 0), PlayerId::Two).unwrap();
        state.apply_move(Edge::vertical(0, 0), PlayerId::One).unwrap();
        assert_eq!(state.current_player(), PlayerId::Two);

        let completed = state.apply_move(Edge::vertical(0, 1), PlayerId::Two).unwrap();

        assert_eq!(completed, vec![BoxClaim { row: 0, col: 0, owner: PlayerId::Two }]);
        assert_eq!(state.current_player(), PlayerId::Two);
        assert_eq!(state.scores(), Scores { player1: 0, player2: 1 });
    }

    #[test]
    fn test_double_box_claim_order() {
        // Vertical edge (0,1) closes both boxes of the top row.
        let mut state = GameState::new(3).unwrap();
        for edge in [
            Edge::horizontal(0, 0),
            Edge::horizontal(0, 1),
            Edge::horizontal(1, 0),
            Edge::horizontal(1, 1),
            Edge::vertical(0, 0),
            Edge::vertical(0, 2),
        ] {
            let mover = state.current_player();
            state.apply_move(edge, mover).unwrap();
        }
        let mover = state.current_player();

        let completed = state.apply_move(Edge::vertical(0, 1), mover).unwrap();

        assert_eq!(
            completed,
            vec![
                BoxClaim { row: 0, col: 0, owner: mover },
                BoxClaim { row: 0, col: 1, owner: mover },
            ]
        );
        assert_eq!(state.scores().get(mover), 2);
        assert_eq!(state.current_player(), mover);
    }

    #[test]
    fn test_horizontal_claims_above_before_below() {
        let mut state = GameState::new(3).unwrap();
        for edge in [
            Edge::horizontal(0, 0),
            Edge::horizontal(2, 0),
            Edge::vertical(0, 0),
            Edge::vertical(0, 1),
            Edge::vertical(1, 0),
            Edge::vertical(1, 1),
        ] {
            state.apply_move(edge, PlayerId::One).unwrap();
        }

        let completed = state.apply_move(Edge::horizontal(1, 0), PlayerId::Two).unwrap();

        let order: Vec<(usize, usize)> = completed.iter().map(|b| (b.row, b.col)).collect();
        assert_eq!(order, vec![(0, 0), (1, 0)]);
    }

    #[test]
    fn test_completeness_ignores_edge_owners() {
        let mut state = GameState::new(2).unwrap();
        state.apply_move(Edge::horizontal(0, 0), PlayerId::One).unwrap();
        state.apply_move(Edge::horizontal(1, 0), PlayerId::Two).unwrap();
        state.apply_move(Edge::vertical(0, 0), PlayerId::One).unwrap();

        let completed = state.apply_move(Edge::vertical(0, 1), PlayerId::Two).unwrap();

        assert_eq!(completed.len(), 1);
        assert!(state.is_game_over());
        assert_eq!(state.winner(), Some(Winner::Player(PlayerId::Two)));
    }

    #[test]
    fn test_full_tiling_ends_game_only_at_end() {
        for n in [2, 3, 5, 7] {
            let mut state = GameState::new(n).unwrap();
            let total = state.total_boxes();
            let counts = play_out(&mut state);

            assert_eq!(state.boxes().len(), (n - 1) * (n - 1));
            assert!(state.is_game_over());
            assert!(state.winner().is_some());
            assert_eq!(*counts.last().unwrap(), total);
            assert!(counts[..counts.len() - 1].iter().all(|&c| c < total));
            assert!(state.remaining_moves().is_empty());
        }
    }

    #[test]
    fn test_score_invariant_holds_throughout() {
        let mut state = GameState::new(5).unwrap();
        for edge in state.remaining_moves().into_iter().rev() {
            let before = state.current_player();
            let completed = state.apply_move(edge, before).unwrap();

            assert_eq!(state.scores().total() as usize, state.boxes().len());
            if completed.is_empty() {
                assert_eq!(state.current_player(), before.other());
            } else {
                assert_eq!(state.current_player(), before);
            }
            state.check_invariants().unwrap();
        }
    }

    #[test]
    fn test_winner_from_scores() {
        assert_eq!(
            Scores { player1: 5, player2: 4 }.winner(),
            Winner::Player(PlayerId::One)
        );
        assert_eq!(Scores { player1: 3, player2: 3 }.winner(), Winner::Tie);
        assert_eq!(
            Scores { player1: 2, player2: 7 }.winner(),
            Winner::Player(PlayerId::Two)
        );
    }

    #[test]
    fn test_two_two_split_is_a_tie() {
        let mut state = GameState::new(3).unwrap();
        for edge in state.remaining_moves() {
            if edge.kind == EdgeKind::Horizontal {
                state.apply_move(edge, PlayerId::One).unwrap();
            }
        }
        for (col, row, player) in [
            (0, 0, PlayerId::One),
            (1, 0, PlayerId::One),
            (2, 0, PlayerId::Two),
            (0, 1, PlayerId::One),
            (1, 1, PlayerId::One),
            (2, 1, PlayerId::Two),
        ] {
            state.apply_move(Edge::vertical(row, col), player).unwrap();
        }

        assert_eq!(state.scores(), Scores { player1: 2, player2: 2 });
        assert!(state.is_game_over());
        assert_eq!(state.winner(), Some(Winner::Tie));
    }

    #[test]
    fn test_check_invariants_detects_tampering() {
        let mut state = GameState::new(2).unwrap();
        for edge in state.remaining_moves() {
            state.apply_move(edge, PlayerId::One).unwrap();
        }
        state.check_invariants().unwrap();

        let mut bad = state.clone();
        bad.scores.player2 += 1;
        assert!(bad.check_invariants().is_err());

        let mut bad = state.clone();
        bad.game_over = false;
        assert!(bad.check_invariants().is_err());

        let mut bad = state;
        bad.winner = Some(Winner::Tie);
        assert!(bad.check_invariants().is_err());
    }

    #[test]
    fn test_player_wire_values() {
        assert_eq!(PlayerId::try_from(1), Ok(PlayerId::One));
        assert_eq!(PlayerId::try_from(2), Ok(PlayerId::Two));
        assert_eq!(PlayerId::try_from(3), Err(GameError::InvalidPlayer(3)));
        assert_eq!(Winner::try_from(0), Ok(Winner::Tie));
        assert_eq!(PlayerId::One.other(), PlayerId::Two);
        assert_eq!(format!("{}", PlayerId::Two), "Player 2");
    }
}
