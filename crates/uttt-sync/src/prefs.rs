//! # Local Preferences
//!
//! A small key-value string store for what a player's device remembers
//! between games: their display name and, per room, the role they were
//! last assigned.
//!
//! | key                  | value                 |
//! |----------------------|-----------------------|
//! | `displayName`        | last entered name     |
//! | `uttt-player-{CODE}` | `X`, `O`, `spectator` |
//!
//! Nothing depends on these surviving: read failures look like a missing
//! key, write failures are logged and dropped.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};

/// Key of the remembered display name.
pub const DISPLAY_NAME_KEY: &str = "displayName";

/// Best-effort string preferences.
pub trait PreferenceStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str);
}

// =============================================================================
// In-Memory Preferences
// =============================================================================

/// Preferences that live as long as the process.
#[derive(Debug, Default)]
pub struct MemoryPreferences {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryPreferences {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
    }
}

// =============================================================================
// File Preferences
// =============================================================================

/// Preferences persisted as a flat TOML table.
///
/// ```toml
/// displayName = "Ada"
/// uttt-player-K3X9QA = "X"
/// ```
#[derive(Debug)]
pub struct FilePreferences {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FilePreferences {
    /// Opens (or starts) the preference file at `path`.
    ///
    /// A missing or unreadable file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let values = Self::load(&path).unwrap_or_default();
        debug!(?path, entries = values.len(), "Opened preferences");
        FilePreferences {
            path,
            values: Mutex::new(values),
        }
    }

    /// Default preference file in the platform data directory.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "uttt", "ultimate-tic-tac-toe")
            .map(|dirs| dirs.data_dir().join("prefs.toml"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(path: &Path) -> Option<BTreeMap<String, String>> {
        if !path.exists() {
            return None;
        }
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(?path, error = %e, "Failed to read preferences");
                return None;
            }
        };
        match toml::from_str(&contents) {
            Ok(values) => Some(values),
            Err(e) => {
                warn!(?path, error = %e, "Ignoring malformed preferences file");
                None
            }
        }
    }

    fn persist(&self, values: &BTreeMap<String, String>) {
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = toml::to_string(values)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(&self.path, contents)
        })();

        if let Err(e) = result {
            warn!(path = ?self.path, error = %e, "Failed to save preferences");
        }
    }
}

impl PreferenceStore for FilePreferences {
    fn get(&self, key: &str) -> Option<String> {
        let values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = self.values.lock().unwrap_or_else(|e| e.into_inner());
        values.insert(key.to_string(), value.to_string());
        self.persist(&values);
    }
}
