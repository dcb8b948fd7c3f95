//! # UI Events
//!
//! The boundary between the coordinator and whatever draws the board.
//!
//! ```text
//!          UiCommand (in)                       GameEventEmitter (out)
//!   ┌─────────────────────────┐            ┌──────────────────────────────┐
//!   │ Move { board, cell }    │            │ on_state_change(&GameState)  │
//!   │ Reset                   │──► coord ──│ on_role_assigned(Role, code) │
//!   │ Leave                   │            │ on_error(&SyncError)         │
//!   └─────────────────────────┘            └──────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use uttt_core::GameState;

use crate::error::SyncError;
use crate::registry::Role;
use crate::room::RoomCode;

/// A request from the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum UiCommand {
    /// `requestMove(boardIndex, cellIndex)`
    Move { board: usize, cell: usize },

    /// `requestReset()`
    Reset,

    /// `requestLeave()`
    Leave,
}

/// Receives coordinator notifications (implemented by the front end).
pub trait GameEventEmitter: Send + Sync {
    /// The state to render changed.
    fn on_state_change(&self, state: &GameState);

    /// A role was assigned after joining. `room` is `None` in local play.
    fn on_role_assigned(&self, _role: Role, _room: Option<&RoomCode>) {}

    /// A background operation failed (e.g. a remote record was unreadable).
    fn on_error(&self, _error: &SyncError) {}
}

/// No-op event emitter for testing and headless use.
pub struct NoOpEmitter;

impl GameEventEmitter for NoOpEmitter {
    fn on_state_change(&self, _state: &GameState) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ui_command_wire_format() {
        let json = serde_json::to_value(UiCommand::Move { board: 0, cell: 4 }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "move", "board": 0, "cell": 4 }));

        let cmd: UiCommand = serde_json::from_str(r#"{ "type": "reset" }"#).unwrap();
        assert_eq!(cmd, UiCommand::Reset);
    }
}
