//! # uttt-core: Pure Game Engine for Ultimate Tic-Tac-Toe
//!
//! This crate is the **heart** of the game. It owns every rule: move
//! legality, active sub-board routing, win/tie detection at both levels,
//! turn alternation and clock accounting. It knows nothing about networking.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Ultimate Tic-Tac-Toe Architecture                   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Front end (terminal / web)                   │   │
//! │  │    requestMove ──► requestReset ──► requestLeave                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ UiCommand                              │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 uttt-sync (SyncCoordinator)                     │   │
//! │  │    local: pass-through │ online: validate, publish, subscribe  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ uttt-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   rules   │  │  engine   │  │ validation│  │   │
//! │  │   │ GameState │  │ win lines │  │ apply_move│  │ room code │  │   │
//! │  │   │   Cell    │  │  evaluate │  │ check_clk │  │  names    │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO STORE • NO WALL CLOCK • PURE FUNCTIONS            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (GameState, Cell, BoardResult, Player, ...)
//! - [`rules`] - The shared three-in-a-row primitive for both board levels
//! - [`engine`] - State transitions: `apply_move`, `reset_game`, `check_clock`
//! - [`error`] - Domain error types
//! - [`validation`] - Room code and display name validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: `(state, move, now) -> next state`, never in place
//! 2. **Derived Fields Are Recomputed**: `won_boards`, `game_over` and
//!    `game_winner` are rebuilt from the cells on every transition
//! 3. **Integer Time**: clock budgets are milliseconds (u64), never floats
//! 4. **Explicit Errors**: every rejection is a typed [`MoveError`]
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use uttt_core::engine::{apply_move, reset_game};
//! use uttt_core::{ActiveBoard, Move, Player};
//!
//! let state = reset_game(uttt_core::DEFAULT_TIME_BUDGET_MS);
//! let next = apply_move(&state, Move::new(0, 4), Utc::now())
//!     .unwrap()
//!     .into_state();
//!
//! assert_eq!(next.current_player(), Player::O);
//! assert_eq!(next.active_board(), ActiveBoard::Board(4));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod engine;
pub mod error;
pub mod rules;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use engine::{Move, MoveOutcome};
pub use error::{CoreError, CoreResult, MoveError, ValidationError};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Number of sub-boards on the meta-board, and of cells per sub-board.
pub const GRID_SIZE: usize = 9;

/// Default per-player time budget in seconds.
///
/// ## Why 500?
/// Rooms created from the start menu have always been seeded with 500
/// seconds per side; local games use the same budget.
pub const DEFAULT_TIME_BUDGET_SECS: u64 = 500;

/// Default per-player time budget in milliseconds.
pub const DEFAULT_TIME_BUDGET_MS: u64 = DEFAULT_TIME_BUDGET_SECS * 1000;

/// Length of a room code (uppercase alphanumeric).
pub const ROOM_CODE_LENGTH: usize = 6;

/// Maximum display name length, in characters.
pub const MAX_DISPLAY_NAME_LENGTH: usize = 20;

/// Name used when a player never entered one.
pub const DEFAULT_DISPLAY_NAME: &str = "Anonymous";
