//! # Domain Types
//!
//! Core domain types for the game. [`GameState`] is the single source of
//! truth and the exact record written to `games/{code}/state`.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            Domain Types                                 │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Cell       │   │   BoardResult   │   │   ActiveBoard   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  Empty  ("")    │   │  InProgress("") │   │  Any   (null)   │       │
//! │  │  X      ("X")   │   │  WonByX  ("X")  │   │  Board (0..=8)  │       │
//! │  │  O      ("O")   │   │  WonByO  ("O")  │   └─────────────────┘       │
//! │  └─────────────────┘   │  Tie     ("tie")│                             │
//! │                        └─────────────────┘                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                          GameState                              │   │
//! │  │  boards[9][9] │ wonBoards[9] │ activeBoard │ currentPlayer      │   │
//! │  │  gameOver     │ gameWinner   │ playerXTime / playerOTime (s)    │   │
//! │  │  turnStartedAt │ moveNumber                                     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format
//! Field names are camelCase and empty markers are empty strings, so the
//! JSON record reads the same as the one the web client has always written:
//! ```json
//! { "boards": [["", "X", ...], ...], "wonBoards": ["", "tie", ...],
//!   "activeBoard": null, "currentPlayer": "O", "gameOver": false,
//!   "gameWinner": "", "playerXTime": 500, "playerOTime": 487.25 }
//! ```
//!
//! Clocks are held as integer milliseconds but travel as seconds. An
//! undecided `gameWinner` travels as `""` (`null` is also accepted).
//! `turnStartedAt` and `moveNumber` are optional on the wire.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::rules;
use crate::GRID_SIZE;

// =============================================================================
// Player
// =============================================================================

/// One of the two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Player {
    /// Always moves first.
    X,
    O,
}

impl Player {
    /// Returns the other side.
    #[inline]
    pub const fn opponent(self) -> Self {
        match self {
            Player::X => Player::O,
            Player::O => Player::X,
        }
    }

    /// The mark this player leaves in a cell.
    #[inline]
    pub const fn mark(self) -> Cell {
        match self {
            Player::X => Cell::X,
            Player::O => Cell::O,
        }
    }
}

impl std::fmt::Display for Player {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Player::X => write!(f, "X"),
            Player::O => write!(f, "O"),
        }
    }
}

// =============================================================================
// Cell
// =============================================================================

/// A single square of a sub-board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Cell {
    #[default]
    #[serde(rename = "")]
    Empty,
    X,
    O,
}

impl Cell {
    /// Returns the player owning this cell, if any.
    #[inline]
    pub const fn owner(self) -> Option<Player> {
        match self {
            Cell::Empty => None,
            Cell::X => Some(Player::X),
            Cell::O => Some(Player::O),
        }
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        matches!(self, Cell::Empty)
    }
}

/// Nine cells, row-major (0 = top-left, 8 = bottom-right).
pub type SubBoard = [Cell; GRID_SIZE];

// =============================================================================
// Board Result
// =============================================================================

/// Outcome of a 3x3 grid, used for sub-boards and for the meta-board.
///
/// Never stored independently of the cells it summarizes, except as the
/// `won_boards` cache which is rebuilt on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum BoardResult {
    #[default]
    #[serde(rename = "")]
    InProgress,
    #[serde(rename = "X")]
    WonByX,
    #[serde(rename = "O")]
    WonByO,
    #[serde(rename = "tie")]
    Tie,
}

impl BoardResult {
    /// The result for a line completed by `player`.
    #[inline]
    pub const fn won_by(player: Player) -> Self {
        match player {
            Player::X => BoardResult::WonByX,
            Player::O => BoardResult::WonByO,
        }
    }

    /// Returns the winner, if the grid was won (a tie has no winner).
    #[inline]
    pub const fn winner(self) -> Option<Player> {
        match self {
            BoardResult::WonByX => Some(Player::X),
            BoardResult::WonByO => Some(Player::O),
            BoardResult::InProgress | BoardResult::Tie => None,
        }
    }

    /// True once the grid is won or tied.
    #[inline]
    pub const fn is_decided(self) -> bool {
        !matches!(self, BoardResult::InProgress)
    }
}

// =============================================================================
// Active Board
// =============================================================================

/// Which sub-board the player to move is constrained to.
///
/// Serialized as `null` for [`ActiveBoard::Any`] and as the index otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<u8>", into = "Option<u8>")]
pub enum ActiveBoard {
    /// Unconstrained: the routed sub-board is decided or full.
    #[default]
    Any,
    /// Must play in this sub-board (0-8).
    Board(u8),
}

impl ActiveBoard {
    /// Returns true if a move into `board` satisfies the constraint.
    #[inline]
    pub fn allows(self, board: usize) -> bool {
        match self {
            ActiveBoard::Any => true,
            ActiveBoard::Board(b) => usize::from(b) == board,
        }
    }

    /// Returns the constrained index, if any.
    #[inline]
    pub fn index(self) -> Option<usize> {
        match self {
            ActiveBoard::Any => None,
            ActiveBoard::Board(b) => Some(usize::from(b)),
        }
    }
}

impl From<Option<u8>> for ActiveBoard {
    fn from(value: Option<u8>) -> Self {
        match value {
            Some(b) => ActiveBoard::Board(b),
            None => ActiveBoard::Any,
        }
    }
}

impl From<ActiveBoard> for Option<u8> {
    fn from(value: ActiveBoard) -> Self {
        match value {
            ActiveBoard::Any => None,
            ActiveBoard::Board(b) => Some(b),
        }
    }
}

impl std::fmt::Display for ActiveBoard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveBoard::Any => write!(f, "any"),
            ActiveBoard::Board(b) => write!(f, "{}", b),
        }
    }
}

// =============================================================================
// Game Winner
// =============================================================================

/// Final result of a finished game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum GameWinner {
    X,
    O,
    #[serde(rename = "tie")]
    Tie,
}

impl From<Player> for GameWinner {
    fn from(player: Player) -> Self {
        match player {
            Player::X => GameWinner::X,
            Player::O => GameWinner::O,
        }
    }
}

impl std::fmt::Display for GameWinner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GameWinner::X => write!(f, "X"),
            GameWinner::O => write!(f, "O"),
            GameWinner::Tie => write!(f, "tie"),
        }
    }
}

// =============================================================================
// Game State
// =============================================================================

/// The complete, serializable state of one game.
///
/// ## Lifecycle
/// ```text
/// reset_game(budget) ──► apply_move ──► apply_move ──► ... ──► game_over
///        ▲                                                        │
///        └────────────────────── reset_game ◄─────────────────────┘
/// ```
///
/// Fields are private: a `GameState` only changes through
/// [`crate::engine::apply_move`], [`crate::engine::check_clock`] or is
/// replaced wholesale. States arriving from elsewhere (the shared store,
/// a saved position) go through [`GameState::normalized`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    /// The meta-grid: nine sub-boards of nine cells.
    pub(crate) boards: [SubBoard; GRID_SIZE],

    /// Cached result per sub-board.
    pub(crate) won_boards: [BoardResult; GRID_SIZE],

    /// Where the player to move must play.
    #[ts(as = "Option<u8>")]
    pub(crate) active_board: ActiveBoard,

    /// Whose turn it is.
    pub(crate) current_player: Player,

    /// True once the meta-board is decided or a clock ran out.
    pub(crate) game_over: bool,

    /// Valid only when `game_over`.
    #[serde(default, with = "wire::winner")]
    #[ts(type = "string")]
    pub(crate) game_winner: Option<GameWinner>,

    /// Remaining budget for X, in milliseconds.
    #[serde(rename = "playerXTime", with = "wire::seconds")]
    #[ts(type = "number")]
    pub(crate) player_x_time_ms: u64,

    /// Remaining budget for O, in milliseconds.
    #[serde(rename = "playerOTime", with = "wire::seconds")]
    #[ts(type = "number")]
    pub(crate) player_o_time_ms: u64,

    /// When the current turn started. `None` until the first move.
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub(crate) turn_started_at: Option<DateTime<Utc>>,

    /// Number of transitions applied since the last reset.
    #[serde(default)]
    pub(crate) move_number: u32,
}

impl GameState {
    /// Creates a fresh game: all cells empty, X to move anywhere, both
    /// clocks at `time_budget_ms`.
    pub fn new(time_budget_ms: u64) -> Self {
        GameState {
            boards: [[Cell::Empty; GRID_SIZE]; GRID_SIZE],
            won_boards: [BoardResult::InProgress; GRID_SIZE],
            active_board: ActiveBoard::Any,
            current_player: Player::X,
            game_over: false,
            game_winner: None,
            player_x_time_ms: time_budget_ms,
            player_o_time_ms: time_budget_ms,
            turn_started_at: None,
            move_number: 0,
        }
    }

    /// Builds a state from a board position.
    ///
    /// Derived fields are recomputed from `boards`, and `active_board` is
    /// widened to `Any` if it points at a decided or full sub-board.
    pub fn from_position(
        boards: [SubBoard; GRID_SIZE],
        current_player: Player,
        active_board: ActiveBoard,
        time_budget_ms: u64,
    ) -> Self {
        let mut state = GameState {
            boards,
            current_player,
            active_board,
            ..GameState::new(time_budget_ms)
        };
        state.move_number = state.filled_cells() as u32;
        state.recompute_derived();
        state
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn boards(&self) -> &[SubBoard; GRID_SIZE] {
        &self.boards
    }

    /// Returns one cell, or `None` for out-of-range indices.
    pub fn cell(&self, board: usize, cell: usize) -> Option<Cell> {
        self.boards.get(board).and_then(|b| b.get(cell)).copied()
    }

    pub fn won_boards(&self) -> &[BoardResult; GRID_SIZE] {
        &self.won_boards
    }

    pub fn active_board(&self) -> ActiveBoard {
        self.active_board
    }

    pub fn current_player(&self) -> Player {
        self.current_player
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    /// The winner; `None` while the game is running.
    pub fn game_winner(&self) -> Option<GameWinner> {
        if self.game_over {
            self.game_winner
        } else {
            None
        }
    }

    /// Stored remaining budget for `player` (not charged for the running turn).
    pub fn time_left_ms(&self, player: Player) -> u64 {
        match player {
            Player::X => self.player_x_time_ms,
            Player::O => self.player_o_time_ms,
        }
    }

    pub fn turn_started_at(&self) -> Option<DateTime<Utc>> {
        self.turn_started_at
    }

    pub fn move_number(&self) -> u32 {
        self.move_number
    }

    /// Total number of non-empty cells on the meta-board.
    pub fn filled_cells(&self) -> usize {
        self.boards
            .iter()
            .flat_map(|b| b.iter())
            .filter(|c| !c.is_empty())
            .count()
    }

    /// Result of the meta-board, computed from `won_boards`.
    pub fn meta_result(&self) -> BoardResult {
        rules::evaluate(&self.won_boards)
    }

    /// Returns true if `board` can still receive a move.
    pub fn is_board_open(&self, board: usize) -> bool {
        match (self.won_boards.get(board), self.boards.get(board)) {
            (Some(result), Some(cells)) => {
                !result.is_decided() && cells.iter().any(|c| c.is_empty())
            }
            _ => false,
        }
    }

    // =========================================================================
    // Consistency
    // =========================================================================

    /// Checks every cached field against the cells.
    ///
    /// ## Rules
    /// - `won_boards[i]` equals the recomputed result of `boards[i]`
    /// - `active_board`, if set, names an open sub-board
    /// - a decided meta-board implies `game_over` with the matching winner
    /// - an undecided meta-board with `game_over` is only valid for a clock
    ///   loss: the winner is a player and the loser's clock reads zero
    pub fn is_consistent(&self) -> bool {
        let caches_match = self
            .boards
            .iter()
            .zip(self.won_boards.iter())
            .all(|(cells, cached)| rules::evaluate(cells) == *cached);
        if !caches_match {
            return false;
        }

        if let ActiveBoard::Board(b) = self.active_board {
            if !self.is_board_open(usize::from(b)) {
                return false;
            }
        }

        match (self.meta_result(), self.game_over) {
            (BoardResult::InProgress, false) => self.game_winner.is_none(),
            (BoardResult::InProgress, true) => self.is_clock_loss(),
            (decided, true) => self.game_winner == Some(winner_for(decided)),
            (_, false) => false,
        }
    }

    /// Returns a copy with every derived field rebuilt from the cells.
    ///
    /// A clock loss (game over on an undecided meta-board with the loser's
    /// clock at zero) is preserved; any other unsupported `game_over` is
    /// cleared.
    pub fn normalized(&self) -> Self {
        let mut state = self.clone();
        state.recompute_derived();
        state
    }

    fn is_clock_loss(&self) -> bool {
        match self.game_winner {
            Some(GameWinner::X) => self.player_o_time_ms == 0,
            Some(GameWinner::O) => self.player_x_time_ms == 0,
            _ => false,
        }
    }

    /// Rebuilds `won_boards`, `game_over`, `game_winner` and sanitizes
    /// `active_board`.
    pub(crate) fn recompute_derived(&mut self) {
        for (cached, cells) in self.won_boards.iter_mut().zip(self.boards.iter()) {
            *cached = rules::evaluate(cells);
        }

        match self.meta_result() {
            BoardResult::InProgress => {
                if !(self.game_over && self.is_clock_loss()) {
                    self.game_over = false;
                    self.game_winner = None;
                }
            }
            decided => {
                self.game_over = true;
                self.game_winner = Some(winner_for(decided));
            }
        }

        if let ActiveBoard::Board(b) = self.active_board {
            if !self.is_board_open(usize::from(b)) {
                self.active_board = ActiveBoard::Any;
            }
        }
    }
}

impl Default for GameState {
    fn default() -> Self {
        GameState::new(crate::DEFAULT_TIME_BUDGET_MS)
    }
}

/// Maps a decided meta result to the game winner.
pub(crate) fn winner_for(result: BoardResult) -> GameWinner {
    match result.winner() {
        Some(player) => GameWinner::from(player),
        None => GameWinner::Tie,
    }
}

// =============================================================================
// Wire Adapters
// =============================================================================

mod wire {
    /// `Option<GameWinner>` as `""` / `"X"` / `"O"` / `"tie"`.
    pub(super) mod winner {
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serialize, Serializer};

        use crate::types::GameWinner;

        pub fn serialize<S: Serializer>(
            winner: &Option<GameWinner>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match winner {
                Some(winner) => winner.serialize(serializer),
                None => serializer.serialize_str(""),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<GameWinner>, D::Error> {
            match Option::<String>::deserialize(deserializer)?.as_deref() {
                None | Some("") => Ok(None),
                Some("X") => Ok(Some(GameWinner::X)),
                Some("O") => Ok(Some(GameWinner::O)),
                Some("tie") => Ok(Some(GameWinner::Tie)),
                Some(other) => Err(D::Error::unknown_variant(other, &["", "X", "O", "tie"])),
            }
        }
    }

    /// Millisecond clock as a (possibly fractional) number of seconds.
    pub(super) mod seconds {
        use serde::de::Error;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(ms: &u64, serializer: S) -> Result<S::Ok, S::Error> {
            if ms % 1000 == 0 {
                serializer.serialize_u64(ms / 1000)
            } else {
                serializer.serialize_f64(*ms as f64 / 1000.0)
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
            let secs = f64::deserialize(deserializer)?;
            if !secs.is_finite() {
                return Err(D::Error::custom("clock must be a finite number of seconds"));
            }
            // A negative reading means the clock already ran out.
            Ok((secs.max(0.0) * 1000.0).round() as u64)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
