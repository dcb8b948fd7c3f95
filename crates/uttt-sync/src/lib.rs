//! # uttt-sync: Sync Coordinator for Ultimate Tic-Tac-Toe
//!
//! This crate turns the pure engine into a playable session: a hot-seat
//! pass-through for local games, and a room-based client for online games
//! where the shared store is the only source of truth.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Coordinator Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SyncCoordinator (one per client)                 │  │
//! │  │                                                                  │  │
//! │  │  handle(UiCommand) ──► submit_move / reset / leave              │  │
//! │  │  Emits state changes through GameEventEmitter                   │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │  RemoteStore   │  │ PlayerRegistry │  │  PreferenceStore       │    │
//! │  │                │  │                │  │                        │    │
//! │  │ games/{code}/  │  │ First-come X,  │  │ displayName            │    │
//! │  │   state        │  │ then O, then   │  │ uttt-player-{code}     │    │
//! │  │   players      │  │ spectators     │  │                        │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                                                                         │
//! │  Listener task: subscription ──► replace local state wholesale          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`coordinator`] - `SyncCoordinator`, session phases, the listener task
//! - [`config`] - Game configuration (mode, time budget, display name)
//! - [`error`] - Sync error types
//! - [`events`] - UI commands in, state notifications out
//! - [`prefs`] - Device-local preferences
//! - [`registry`] - Roles and the players record
//! - [`room`] - Room codes and store paths
//! - [`store`] - `RemoteStore` trait and the in-process `MemoryStore`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use uttt_sync::{GameConfig, MemoryStore, SyncCoordinator};
//!
//! let store = Arc::new(MemoryStore::new());
//! let host = SyncCoordinator::online(GameConfig::load_or_default(None), store.clone());
//! let (code, role) = host.create_room("Ada").await?;
//!
//! let guest = SyncCoordinator::online(GameConfig::load_or_default(None), store);
//! guest.join_or_create(code.as_str(), "Grace").await?;
//!
//! host.submit_move(0, 4).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod prefs;
pub mod registry;
pub mod room;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{GameConfig, GameSettings, PlayMode, PlayerSettings, SyncSettings};
pub use coordinator::{SessionPhase, SyncCoordinator, SyncCoordinatorBuilder};
pub use error::{SyncError, SyncResult};
pub use events::{GameEventEmitter, NoOpEmitter, UiCommand};
pub use prefs::{FilePreferences, MemoryPreferences, PreferenceStore, DISPLAY_NAME_KEY};
pub use registry::{PlayerRegistry, Role};
pub use room::RoomCode;
pub use store::{MemoryStore, RemoteStore, Subscription};
