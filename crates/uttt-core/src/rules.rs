//! # Win Detection
//!
//! The three-in-a-row check shared by both levels of the game.
//!
//! ## One Primitive, Two Granularities
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        evaluate(&[S; 9])                                │
//! │                                                                         │
//! │   Sub-board (S = Cell)               Meta-board (S = BoardResult)       │
//! │   ────────────────────               ───────────────────────────        │
//! │   owner:  X / O mark                 owner:  WonByX / WonByO            │
//! │   open:   Empty                      open:   InProgress                 │
//! │                                      (Tie is neither: it blocks lines)  │
//! │                                                                         │
//! │   Lines, checked in this order:                                        │
//! │     rows     0-1-2   3-4-5   6-7-8                                      │
//! │     columns  0-3-6   1-4-7   2-5-8                                      │
//! │     diagonal 0-4-8   2-4-6                                              │
//! │                                                                         │
//! │   First completed line wins; otherwise no open square ⇒ Tie.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Both levels go through [`evaluate`], so line order and the tie rule can
//! never differ between a sub-board and the meta-board.

use crate::types::{BoardResult, Cell, Player};
use crate::GRID_SIZE;

/// The eight winning lines of a 3x3 grid, row-major indices.
pub const WIN_LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

// =============================================================================
// Square Trait
// =============================================================================

/// Anything that can sit in one of the nine positions of a 3x3 grid.
pub trait Square: Copy {
    /// The player holding this square, if any.
    fn owner(self) -> Option<Player>;

    /// True if the square can still change.
    fn is_open(self) -> bool;
}

impl Square for Cell {
    #[inline]
    fn owner(self) -> Option<Player> {
        Cell::owner(self)
    }

    #[inline]
    fn is_open(self) -> bool {
        self.is_empty()
    }
}

impl Square for BoardResult {
    #[inline]
    fn owner(self) -> Option<Player> {
        self.winner()
    }

    #[inline]
    fn is_open(self) -> bool {
        !self.is_decided()
    }
}

// =============================================================================
// Evaluation
// =============================================================================

/// Returns the owner of the first completed line, if any.
pub fn line_winner<S: Square>(squares: &[S; GRID_SIZE]) -> Option<Player> {
    WIN_LINES.iter().find_map(|&[a, b, c]| {
        let owner = squares[a].owner()?;
        (squares[b].owner() == Some(owner) && squares[c].owner() == Some(owner))
            .then_some(owner)
    })
}

/// Evaluates a 3x3 grid.
///
/// ## Returns
/// - `WonByX` / `WonByO` for a completed line
/// - `Tie` when no square is open and nobody completed a line
/// - `InProgress` otherwise
pub fn evaluate<S: Square>(squares: &[S; GRID_SIZE]) -> BoardResult {
    if let Some(player) = line_winner(squares) {
        return BoardResult::won_by(player);
    }

    if squares.iter().any(|s| s.is_open()) {
        BoardResult::InProgress
    } else {
        BoardResult::Tie
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
