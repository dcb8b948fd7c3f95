//! # Validation Module
//!
//! Input validation for the two strings a player ever types: the room code
//! and the display name.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Front end                                                    │
//! │  └── Input length limits, immediate feedback                           │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  ├── Room code: trim, uppercase, 6 alphanumeric characters             │
//! │  └── Display name: trim, at most 20 characters                         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Shared store                                                 │
//! │  └── Room existence (RoomNotFound, checked by uttt-sync)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use uttt_core::validation::{normalize_room_code, validate_display_name};
//!
//! assert_eq!(normalize_room_code(" ab12cd ").unwrap(), "AB12CD");
//! assert_eq!(validate_display_name("  Ada ").unwrap(), Some("Ada".to_string()));
//! assert_eq!(validate_display_name("   ").unwrap(), None);
//! ```

use crate::error::ValidationError;
use crate::{MAX_DISPLAY_NAME_LENGTH, ROOM_CODE_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Room Codes
// =============================================================================

/// Validates a room code and returns its canonical (uppercase) form.
///
/// ## Rules
/// - Surrounding whitespace is ignored
/// - Matching is case-insensitive; the result is uppercase
/// - Exactly 6 characters, ASCII letters and digits only
pub fn normalize_room_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "room code".to_string(),
        });
    }

    if !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ValidationError::InvalidFormat {
            field: "room code".to_string(),
            reason: "must contain only letters and numbers".to_string(),
        });
    }

    if code.len() != ROOM_CODE_LENGTH {
        return Err(ValidationError::InvalidFormat {
            field: "room code".to_string(),
            reason: format!("must be exactly {} characters", ROOM_CODE_LENGTH),
        });
    }

    Ok(code.to_ascii_uppercase())
}

/// Returns true if `code` is already in canonical form.
pub fn is_canonical_room_code(code: &str) -> bool {
    code.len() == ROOM_CODE_LENGTH
        && code
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
}

// =============================================================================
// Display Names
// =============================================================================

/// Validates a display name.
///
/// ## Returns
/// - `Ok(Some(name))` with the trimmed name
/// - `Ok(None)` for an empty or whitespace-only name (caller picks a fallback)
/// - `Err(TooLong)` above 20 characters
pub fn validate_display_name(name: &str) -> ValidationResult<Option<String>> {
    let name = name.trim();

    if name.is_empty() {
        return Ok(None);
    }

    if name.chars().count() > MAX_DISPLAY_NAME_LENGTH {
        return Err(ValidationError::TooLong {
            field: "display name".to_string(),
            max: MAX_DISPLAY_NAME_LENGTH,
        });
    }

    Ok(Some(name.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================
