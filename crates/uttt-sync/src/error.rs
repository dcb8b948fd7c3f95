//! # Sync Error Types
//!
//! Error types for coordinator operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Game Rules    │  │     Room        │  │     Transport           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  RuleViolation  │  │  RoomNotFound   │  │  TransportFailure       │ │
//! │  │  StaleSubmission│  │  InvalidRoomCode│  │  (read/write/subscribe) │ │
//! │  │  NotYourTurn    │  │  InvalidName    │  │                         │ │
//! │  │                 │  │  NoFreeRoomCode │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Protocol     │  │      Session            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Serialization  │  │  NotJoined              │ │
//! │  │  ConfigLoad/Save│  │  Deserialization│  │  SessionClosed          │ │
//! │  └─────────────────┘  └─────────────────┘  │  AlreadyJoined          │ │
//! │                                             │  MovePending            │ │
//! │                                             │  AwaitingState          │ │
//! │                                             │  MoveSuperseded         │ │
//! │                                             └─────────────────────────┘ │
//! │                                                                         │
//! │  Every variant is recoverable: local GameState is never touched on an  │
//! │  error path.                                                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;
use uttt_core::{CoreError, MoveError, Player, ValidationError};

use crate::registry::Role;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering every coordinator failure.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Game Rule Errors
    // =========================================================================
    /// The engine rejected a move (local mode).
    #[error("Move rejected: {0}")]
    RuleViolation(MoveError),

    /// The move is illegal against the latest remote snapshot (online mode).
    ///
    /// ## When This Occurs
    /// ```text
    /// Client A renders state S, opponent's move lands (S')
    ///      │
    ///      ▼
    /// Client A clicks a cell that was legal in S but not in S'
    ///      │
    ///      ▼
    /// StaleSubmission → nothing written, re-render from S'
    /// ```
    #[error("Move no longer legal: {0}")]
    StaleSubmission(MoveError),

    /// The submitting role is not the player to move.
    #[error("Not your turn: you are {role}, {current} is to move")]
    NotYourTurn { role: Role, current: Player },

    // =========================================================================
    // Room Errors
    // =========================================================================
    /// No game record exists under this code.
    #[error("Room {0} not found")]
    RoomNotFound(String),

    /// Room code failed validation.
    #[error("Invalid room code: {0}")]
    InvalidRoomCode(ValidationError),

    /// Display name failed validation.
    #[error("Invalid display name: {0}")]
    InvalidDisplayName(ValidationError),

    /// Every drawn room code already held a game.
    #[error("No free room code after {0} attempts")]
    NoFreeRoomCode(usize),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// A remote read, write or subscribe failed.
    #[error("Remote {operation} of {path} failed: {reason}")]
    TransportFailure {
        operation: &'static str,
        path: String,
        reason: String,
    },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Failed to serialize a record.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// A remote record did not have the expected shape.
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Session Errors
    // =========================================================================
    /// Operation needs a joined session.
    #[error("Not joined to a room")]
    NotJoined,

    /// The session has left its room; start a new one to play again.
    #[error("Session has left the room")]
    SessionClosed,

    /// `join_or_create` called on a session that already joined.
    #[error("Already joined room {0}")]
    AlreadyJoined(String),

    /// The previous move has not come back from the store yet.
    #[error("Move {0} is still waiting for the store to confirm it")]
    MovePending(u32),

    /// Joined, but the room has not delivered a readable game state yet.
    #[error("Waiting for the room's game state")]
    AwaitingState,

    /// Another write of the same move landed after ours and replaced it.
    #[error("Move {0} was overwritten by a concurrent write")]
    MoveSuperseded(u32),
}

// =============================================================================
// Constructors
// =============================================================================

impl SyncError {
    /// Builds a [`SyncError::TransportFailure`].
    pub fn transport(operation: &'static str, path: impl Into<String>, reason: impl ToString) -> Self {
        SyncError::TransportFailure {
            operation,
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            SyncError::DeserializationFailed(err.to_string())
        } else {
            SyncError::SerializationFailed(err.to_string())
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<MoveError> for SyncError {
    fn from(err: MoveError) -> Self {
        SyncError::RuleViolation(err)
    }
}

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::InvalidConfig(err.to_string())
    }
}

impl From<CoreError> for SyncError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Move(e) => SyncError::RuleViolation(e),
            CoreError::Validation(e) => SyncError::from(e),
        }
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true for engine rejections, stale or not.
    ///
    /// Callers ignore these: they are normal click probing.
    pub fn is_rule_violation(&self) -> bool {
        matches!(
            self,
            SyncError::RuleViolation(_)
                | SyncError::StaleSubmission(_)
                | SyncError::NotYourTurn { .. }
                | SyncError::MovePending(_)
        )
    }

    /// Returns true if the user can simply try again.
    ///
    /// ## Retryable Errors
    /// - Transport failures (network issues)
    /// - Room not found (typo in the code)
    /// - No game state yet, or no free room code
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::TransportFailure { .. }
                | SyncError::RoomNotFound(_)
                | SyncError::AwaitingState
                | SyncError::NoFreeRoomCode(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if a record did not match the wire format.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::SerializationFailed(_) | SyncError::DeserializationFailed(_)
        )
    }
}
