//! # Game Configuration
//!
//! Configuration for the coordinator and front ends.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     UTTT_MODE=online                                                   │
//! │     UTTT_TIME_BUDGET_SECS=300                                          │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ultimate-tic-tac-toe/uttt.toml (Linux)                   │
//! │     ~/Library/Application Support/com.uttt.ultimate-tic-tac-toe/...    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     local mode, 500 s per player, no optimistic view                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # uttt.toml
//! [game]
//! time_budget_secs = 500
//!
//! [player]
//! display_name = "Ada"
//!
//! [sync]
//! mode = "online"   # local | online
//! optimistic_updates = false
//! room_code_length = 6
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uttt_core::validation::validate_display_name;
use uttt_core::{DEFAULT_TIME_BUDGET_SECS, ROOM_CODE_LENGTH};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Play Mode
// =============================================================================

/// How moves reach the game state.
///
/// ```text
/// LOCAL                               ONLINE
/// ─────                               ──────
/// Two players, one device             One player per device
/// apply_move → state, synchronously   validate → publish → echo → state
/// No store, no roles                  Roles X / O / spectator
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    #[default]
    Local,
    Online,
}

impl PlayMode {
    pub fn is_online(&self) -> bool {
        matches!(self, PlayMode::Online)
    }
}

impl std::fmt::Display for PlayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlayMode::Local => write!(f, "local"),
            PlayMode::Online => write!(f, "online"),
        }
    }
}

impl std::str::FromStr for PlayMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "local" | "hotseat" | "offline" => Ok(PlayMode::Local),
            "online" | "remote" | "multiplayer" => Ok(PlayMode::Online),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown play mode: '{}'. Valid options: local, online",
                other
            ))),
        }
    }
}

// =============================================================================
// Game Settings
// =============================================================================

/// Rules settings applied to new games.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameSettings {
    /// Starting clock for each player (seconds).
    #[serde(default = "default_time_budget")]
    pub time_budget_secs: u64,
}

fn default_time_budget() -> u64 {
    DEFAULT_TIME_BUDGET_SECS
}

impl Default for GameSettings {
    fn default() -> Self {
        GameSettings {
            time_budget_secs: default_time_budget(),
        }
    }
}

// =============================================================================
// Player Settings
// =============================================================================

/// Settings for the local player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlayerSettings {
    /// Default display name when none was entered or remembered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,

    /// Preference file override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefs_path: Option<PathBuf>,
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Coordinator behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: PlayMode,

    /// Show the published state before the store echoes it back.
    #[serde(default)]
    pub optimistic_updates: bool,

    /// Length of generated room codes. Only 6 is supported.
    #[serde(default = "default_room_code_length")]
    pub room_code_length: usize,
}

fn default_room_code_length() -> usize {
    ROOM_CODE_LENGTH
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: PlayMode::default(),
            optimistic_updates: false,
            room_code_length: default_room_code_length(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete game configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GameConfig {
    #[serde(default)]
    pub game: GameSettings,

    #[serde(default)]
    pub player: PlayerSettings,

    #[serde(default)]
    pub sync: SyncSettings,
}

impl GameConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (uttt.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading game config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load game config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Game config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.game.time_budget_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "time_budget_secs must be greater than 0".into(),
            ));
        }

        if self.game.time_budget_secs.checked_mul(1000).is_none() {
            return Err(SyncError::InvalidConfig(format!(
                "time_budget_secs is too large: {}",
                self.game.time_budget_secs
            )));
        }

        if self.sync.room_code_length != ROOM_CODE_LENGTH {
            return Err(SyncError::InvalidConfig(format!(
                "room_code_length must be {}, got {}",
                ROOM_CODE_LENGTH, self.sync.room_code_length
            )));
        }

        if let Some(ref name) = self.player.display_name {
            validate_display_name(name).map_err(SyncError::InvalidDisplayName)?;
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(secs) = std::env::var("UTTT_TIME_BUDGET_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => {
                    debug!(secs = s, "Overriding time budget from environment");
                    self.game.time_budget_secs = s;
                }
                Err(_) => warn!(value = %secs, "Ignoring invalid UTTT_TIME_BUDGET_SECS"),
            }
        }

        if let Ok(name) = std::env::var("UTTT_DISPLAY_NAME") {
            self.player.display_name = Some(name);
        }

        if let Ok(path) = std::env::var("UTTT_PREFS_PATH") {
            self.player.prefs_path = Some(PathBuf::from(path));
        }

        if let Ok(mode) = std::env::var("UTTT_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding play mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown play mode in environment"),
            }
        }

        if let Ok(flag) = std::env::var("UTTT_OPTIMISTIC") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.sync.optimistic_updates = true,
                "0" | "false" | "no" | "off" => self.sync.optimistic_updates = false,
                _ => warn!(value = %flag, "Ignoring invalid UTTT_OPTIMISTIC"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "uttt", "ultimate-tic-tac-toe")
            .map(|dirs| dirs.config_dir().join("uttt.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn mode(&self) -> PlayMode {
        self.sync.mode
    }

    /// Per-player starting clock in milliseconds.
    pub fn time_budget_ms(&self) -> u64 {
        self.game.time_budget_secs.saturating_mul(1000)
    }

    pub fn default_display_name(&self) -> Option<&str> {
        self.player.display_name.as_deref()
    }
}
