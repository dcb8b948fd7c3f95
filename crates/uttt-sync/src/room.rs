//! # Room Codes
//!
//! A room is addressed by a 6-character uppercase alphanumeric code. The
//! code doubles as the key prefix of the room's records in the shared store.
//!
//! ## Store Layout
//! ```text
//! games/
//! └── {CODE}/
//!     ├── state     GameState (camelCase JSON)
//!     └── players   { "X": name, "O": name }
//! ```

use rand::Rng;
use serde::{Deserialize, Serialize};
use uttt_core::validation::normalize_room_code;
use uttt_core::ROOM_CODE_LENGTH;

use crate::error::{SyncError, SyncResult};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// A validated, uppercase room code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Parses user input: trims, uppercases, checks length and charset.
    pub fn parse(input: &str) -> SyncResult<Self> {
        normalize_room_code(input)
            .map(RoomCode)
            .map_err(SyncError::InvalidRoomCode)
    }

    /// Generates a fresh random code.
    pub fn generate() -> Self {
        Self::generate_with(&mut rand::thread_rng())
    }

    pub fn generate_with<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LENGTH)
            .map(|_| char::from(CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())]))
            .collect();
        RoomCode(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store path of the room's game state.
    pub fn state_path(&self) -> String {
        format!("games/{}/state", self.0)
    }

    /// Store path of the room's player registry.
    pub fn players_path(&self) -> String {
        format!("games/{}/players", self.0)
    }

    /// Preference key remembering the role last assigned in this room.
    pub fn role_pref_key(&self) -> String {
        format!("uttt-player-{}", self.0)
    }
}

impl std::fmt::Display for RoomCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for RoomCode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RoomCode::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = SyncError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        RoomCode::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}
