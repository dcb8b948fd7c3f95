//! # Error Types
//!
//! Domain-specific error types for uttt-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  uttt-core errors (this file)                                          │
//! │  ├── MoveError        - A move failed an engine precondition           │
//! │  ├── ValidationError  - Room code / display name input failures        │
//! │  └── CoreError        - Either of the above                            │
//! │                                                                         │
//! │  uttt-sync errors (separate crate)                                     │
//! │  └── SyncError        - RuleViolation, StaleSubmission, RoomNotFound,  │
//! │                         TransportFailure, config, session              │
//! │                                                                         │
//! │  Flow: MoveError → SyncError::RuleViolation / StaleSubmission → UI     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include the board/cell indices in move errors
//! 3. Errors are enum variants, never String
//! 4. Every move error is recoverable: the state is untouched

use thiserror::Error;

// =============================================================================
// Move Error
// =============================================================================

/// A move was rejected by the engine.
///
/// Variants are listed in the order the preconditions are checked.
/// Rejections are normal: the UI probes with clicks and simply ignores them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MoveError {
    /// The game is already decided; only a reset changes the state now.
    #[error("Game is over")]
    GameOver,

    /// Sub-board index outside 0-8.
    #[error("Board index {0} is out of range")]
    BoardOutOfRange(usize),

    /// Cell index outside 0-8.
    #[error("Cell index {0} is out of range")]
    CellOutOfRange(usize),

    /// The sub-board is already won or tied.
    #[error("Board {0} is already decided")]
    BoardDecided(usize),

    /// The cell already holds a mark.
    #[error("Cell {cell} of board {board} is occupied")]
    CellOccupied { board: usize, cell: usize },

    /// The player is routed to a different sub-board.
    ///
    /// ## User Workflow
    /// ```text
    /// X plays cell 4 of board 0
    ///      │
    ///      ▼
    /// O must play in board 4
    ///      │
    ///      ▼
    /// O clicks board 7 → WrongBoard { required: 4, attempted: 7 }
    /// ```
    #[error("Must play in board {required}, not board {attempted}")]
    WrongBoard { required: usize, attempted: usize },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors for room codes and display names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (wrong length, illegal characters).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Core Error
// =============================================================================

/// Any error produced by uttt-core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// Move rejected by the engine.
    #[error("Rule violation: {0}")]
    Move(#[from] MoveError),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
