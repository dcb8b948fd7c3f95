//! # Player Registry
//!
//! Role assignment for online rooms. The registry is the JSON object stored
//! at `games/{code}/players`:
//!
//! ```json
//! { "X": "Ada", "O": "Grace" }
//! ```
//!
//! ## First-Come Assignment
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       join → assign(name)                               │
//! │                                                                         │
//! │   X free?  ──yes──► X                                                  │
//! │      │no                                                                │
//! │   O free?  ──yes──► O                                                  │
//! │      │no                                                                │
//! │      └────────────► Spectator (registry unchanged)                     │
//! │                                                                         │
//! │  Read-modify-write, not atomic: two joiners reading "X free" at the    │
//! │  same time both become X, and the later registry write wins.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uttt_core::Player;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Role
// =============================================================================

/// What a participant may do in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    X,
    O,
    #[serde(rename = "spectator")]
    Spectator,
}

impl Role {
    /// The side this role plays, if any.
    pub fn player(self) -> Option<Player> {
        match self {
            Role::X => Some(Player::X),
            Role::O => Some(Player::O),
            Role::Spectator => None,
        }
    }

    /// Returns true if this role is the player to move.
    pub fn may_move(self, current: Player) -> bool {
        self.player() == Some(current)
    }
}

impl From<Player> for Role {
    fn from(player: Player) -> Self {
        match player {
            Player::X => Role::X,
            Player::O => Role::O,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::X => write!(f, "X"),
            Role::O => write!(f, "O"),
            Role::Spectator => write!(f, "spectator"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "X" | "x" => Ok(Role::X),
            "O" | "o" => Ok(Role::O),
            "spectator" | "Spectator" => Ok(Role::Spectator),
            other => Err(SyncError::DeserializationFailed(format!(
                "Unknown role: '{}'",
                other
            ))),
        }
    }
}

// =============================================================================
// Player Registry
// =============================================================================

/// Display names of the two seated players.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerRegistry {
    #[serde(rename = "X", default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,

    #[serde(rename = "O", default, skip_serializing_if = "Option::is_none")]
    pub o: Option<String>,
}

impl PlayerRegistry {
    /// Parses the remote record; an absent record is an empty registry.
    pub fn from_value(value: Option<Value>) -> SyncResult<Self> {
        match value {
            None | Some(Value::Null) => Ok(Self::default()),
            Some(v) => Ok(serde_json::from_value(v)?),
        }
    }

    pub fn to_value(&self) -> SyncResult<Value> {
        serde_json::to_value(self).map_err(|e| SyncError::SerializationFailed(e.to_string()))
    }

    /// Name seated as `player`, if any. Empty names count as free seats.
    pub fn name_for(&self, player: Player) -> Option<&str> {
        let seat = match player {
            Player::X => &self.x,
            Player::O => &self.o,
        };
        seat.as_deref().filter(|name| !name.is_empty())
    }

    /// Seats `name` in the first free seat and returns the role.
    pub fn assign(&mut self, name: &str) -> Role {
        if self.name_for(Player::X).is_none() {
            self.x = Some(name.to_string());
            Role::X
        } else if self.name_for(Player::O).is_none() {
            self.o = Some(name.to_string());
            Role::O
        } else {
            Role::Spectator
        }
    }

    /// Reclaims `remembered` if that seat is still held under `name`.
    ///
    /// Lets a player who reloads rejoin their own seat instead of being
    /// demoted to spectator by their earlier registration.
    pub fn reclaim(&self, remembered: Role, name: &str) -> Option<Role> {
        let player = remembered.player()?;
        (self.name_for(player) == Some(name)).then_some(remembered)
    }

    pub fn is_full(&self) -> bool {
        self.name_for(Player::X).is_some() && self.name_for(Player::O).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_come_assignment() {
        let mut registry = PlayerRegistry::default();
        assert_eq!(registry.assign("Ada"), Role::X);
        assert_eq!(registry.assign("Grace"), Role::O);
        assert!(registry.is_full());
        assert_eq!(registry.assign("Linus"), Role::Spectator);

        assert_eq!(registry.name_for(Player::X), Some("Ada"));
        assert_eq!(registry.name_for(Player::O), Some("Grace"));
    }

    #[test]
    fn test_registry_wire_format() {
        let mut registry = PlayerRegistry::default();
        registry.assign("Ada");
        assert_eq!(registry.to_value().unwrap(), json!({ "X": "Ada" }));

        let parsed = PlayerRegistry::from_value(Some(json!({ "O": "Grace" }))).unwrap();
        assert_eq!(parsed.name_for(Player::X), None);
        assert_eq!(parsed.name_for(Player::O), Some("Grace"));
    }

    #[test]
    fn test_absent_record_is_empty() {
        assert_eq!(PlayerRegistry::from_value(None).unwrap(), PlayerRegistry::default());
        assert_eq!(
            PlayerRegistry::from_value(Some(Value::Null)).unwrap(),
            PlayerRegistry::default()
        );
    }

    #[test]
    fn test_malformed_record_rejected() {
        let err = PlayerRegistry::from_value(Some(json!([1, 2, 3]))).unwrap_err();
        assert!(err.is_protocol_error());
    }

    #[test]
    fn test_freed_seat_is_reassigned() {
        let mut registry = PlayerRegistry::from_value(Some(json!({ "X": "", "O": "Grace" }))).unwrap();
        assert_eq!(registry.assign("Ada"), Role::X);
    }

    #[test]
    fn test_reclaim_own_seat() {
        let registry = PlayerRegistry::from_value(Some(json!({ "X": "Ada", "O": "Grace" }))).unwrap();
        assert_eq!(registry.reclaim(Role::O, "Grace"), Some(Role::O));
        assert_eq!(registry.reclaim(Role::O, "Ada"), None);
        assert_eq!(registry.reclaim(Role::Spectator, "Ada"), None);
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("X".parse::<Role>().unwrap(), Role::X);
        assert_eq!("spectator".parse::<Role>().unwrap(), Role::Spectator);
        assert!("Z".parse::<Role>().is_err());
        assert!(Role::O.may_move(Player::O));
        assert!(!Role::Spectator.may_move(Player::X));
    }
}
