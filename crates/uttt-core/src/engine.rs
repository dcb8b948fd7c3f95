//! # Game Engine
//!
//! Pure state transitions. Every function takes the current state by
//! reference and returns a new one; nothing here mutates its input.
//!
//! ## apply_move Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                 apply_move(state, Move { board, cell }, now)            │
//! │                                                                         │
//! │  1. game_over?                       ──► Err(GameOver)                 │
//! │  2. mover's clock already expired?   ──► Ok(TimeExpired(terminal))     │
//! │  3. board / cell in 0-8?             ──► Err(Board/CellOutOfRange)     │
//! │  4. won_boards[board] in progress?   ──► Err(BoardDecided)             │
//! │  5. cell empty?                      ──► Err(CellOccupied)             │
//! │  6. active board allows board?       ──► Err(WrongBoard)               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  place mark ─► recompute won_boards + meta result ─► route next board  │
//! │       ─► charge elapsed time to mover ─► alternate player              │
//! │       ─► Ok(Placed(next))                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Clock Accounting
//! Time is charged at move boundaries. The clock starts with the first
//! accepted move (the opening move is free); afterwards each move costs
//! `now - turn_started_at`. [`check_clock`] is the same zero-crossing test
//! run at a tick boundary, without a move.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MoveError;
use crate::types::{ActiveBoard, GameState, GameWinner, Player};
use crate::GRID_SIZE;

// =============================================================================
// Move
// =============================================================================

/// A request to mark `cell` of sub-board `board`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Move {
    /// Sub-board index (0-8, row-major).
    pub board: usize,
    /// Cell index inside the sub-board (0-8, row-major).
    pub cell: usize,
}

impl Move {
    #[inline]
    pub const fn new(board: usize, cell: usize) -> Self {
        Move { board, cell }
    }
}

impl std::fmt::Display for Move {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.board, self.cell)
    }
}

// =============================================================================
// Move Outcome
// =============================================================================

/// Successful result of [`apply_move`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveOutcome {
    /// The mark was placed.
    Placed(GameState),

    /// The mover had no time left; the move was not placed and the game
    /// ended with the opponent as winner.
    TimeExpired(GameState),
}

impl MoveOutcome {
    pub fn state(&self) -> &GameState {
        match self {
            MoveOutcome::Placed(state) | MoveOutcome::TimeExpired(state) => state,
        }
    }

    pub fn into_state(self) -> GameState {
        match self {
            MoveOutcome::Placed(state) | MoveOutcome::TimeExpired(state) => state,
        }
    }

    pub fn is_placed(&self) -> bool {
        matches!(self, MoveOutcome::Placed(_))
    }
}

// =============================================================================
// Transitions
// =============================================================================

/// Returns a fresh game with both clocks at `time_budget_ms`.
pub fn reset_game(time_budget_ms: u64) -> GameState {
    GameState::new(time_budget_ms)
}

/// Checks the board preconditions of a move, in order.
///
/// Does not look at the clock; see [`apply_move`] for the full pipeline.
pub fn validate_move(state: &GameState, mv: Move) -> Result<(), MoveError> {
    if state.game_over {
        return Err(MoveError::GameOver);
    }

    if mv.board >= GRID_SIZE {
        return Err(MoveError::BoardOutOfRange(mv.board));
    }

    if mv.cell >= GRID_SIZE {
        return Err(MoveError::CellOutOfRange(mv.cell));
    }

    if state.won_boards[mv.board].is_decided() {
        return Err(MoveError::BoardDecided(mv.board));
    }

    if !state.boards[mv.board][mv.cell].is_empty() {
        return Err(MoveError::CellOccupied {
            board: mv.board,
            cell: mv.cell,
        });
    }

    if let ActiveBoard::Board(required) = state.active_board {
        if !state.active_board.allows(mv.board) {
            return Err(MoveError::WrongBoard {
                required: usize::from(required),
                attempted: mv.board,
            });
        }
    }

    Ok(())
}

/// Applies `mv` for the current player at wall-clock time `now`.
///
/// ## Returns
/// - `Ok(Placed(next))` when the move was accepted
/// - `Ok(TimeExpired(terminal))` when the mover's clock had already run out
/// - `Err(MoveError)` when a precondition failed; `state` is unchanged
pub fn apply_move(
    state: &GameState,
    mv: Move,
    now: DateTime<Utc>,
) -> Result<MoveOutcome, MoveError> {
    if state.game_over {
        debug!(%mv, "Move rejected: game is over");
        return Err(MoveError::GameOver);
    }

    if let Some(terminal) = check_clock(state, now) {
        return Ok(MoveOutcome::TimeExpired(terminal));
    }

    if let Err(e) = validate_move(state, mv) {
        debug!(%mv, player = %state.current_player, error = %e, "Move rejected");
        return Err(e);
    }

    let mover = state.current_player;
    let elapsed = elapsed_ms(state, now);
    let mut next = state.clone();

    next.boards[mv.board][mv.cell] = mover.mark();
    next.recompute_derived();

    let budget = match mover {
        Player::X => &mut next.player_x_time_ms,
        Player::O => &mut next.player_o_time_ms,
    };
    *budget = budget.saturating_sub(elapsed);

    next.active_board = if next.is_board_open(mv.cell) {
        ActiveBoard::Board(mv.cell as u8)
    } else {
        ActiveBoard::Any
    };
    next.current_player = mover.opponent();
    next.turn_started_at = Some(now);
    next.move_number += 1;

    if next.won_boards[mv.board].is_decided() {
        debug!(board = mv.board, result = ?next.won_boards[mv.board], "Sub-board decided");
    }
    if next.game_over {
        debug!(winner = ?next.game_winner, "Game over");
    }

    Ok(MoveOutcome::Placed(next))
}

/// Tick-boundary clock check.
///
/// Returns the terminal state if the player to move has run out of time,
/// or `None` if the game continues (or is already over).
pub fn check_clock(state: &GameState, now: DateTime<Utc>) -> Option<GameState> {
    if state.game_over || state.turn_started_at.is_none() {
        return None;
    }

    let loser = state.current_player;
    if elapsed_ms(state, now) < state.time_left_ms(loser) {
        return None;
    }

    debug!(%loser, "Clock expired");

    let mut next = state.clone();
    match loser {
        Player::X => next.player_x_time_ms = 0,
        Player::O => next.player_o_time_ms = 0,
    }
    next.game_over = true;
    next.game_winner = Some(GameWinner::from(loser.opponent()));
    next.move_number += 1;
    Some(next)
}

// =============================================================================
// Queries
// =============================================================================

/// Milliseconds the running turn has consumed so far (zero before the
/// first move, and if `now` precedes the turn start).
pub fn elapsed_ms(state: &GameState, now: DateTime<Utc>) -> u64 {
    state
        .turn_started_at
        .map(|started| (now - started).num_milliseconds().max(0) as u64)
        .unwrap_or(0)
}

/// Remaining time for `player` as a clock display would show it at `now`.
pub fn remaining_time_ms(state: &GameState, player: Player, now: DateTime<Utc>) -> u64 {
    let stored = state.time_left_ms(player);
    if state.game_over || player != state.current_player {
        return stored;
    }
    stored.saturating_sub(elapsed_ms(state, now))
}

/// All moves that pass [`validate_move`], in board-then-cell order.
pub fn legal_moves(state: &GameState) -> Vec<Move> {
    if state.game_over {
        return Vec::new();
    }

    (0..GRID_SIZE)
        .filter(|&b| state.active_board.allows(b) && state.is_board_open(b))
        .flat_map(|b| {
            state.boards[b]
                .iter()
                .enumerate()
                .filter(|(_, c)| c.is_empty())
                .map(move |(c, _)| Move::new(b, c))
        })
        .collect()
}

// =============================================================================
// Unit Tests
// =============================================================================
