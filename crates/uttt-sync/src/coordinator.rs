//! # Sync Coordinator
//!
//! Mediates between local user intent and the shared game record.
//!
//! ## Online Move Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       submit_move(board, cell)                          │
//! │                                                                         │
//! │  1. Role gate: my role == current player?        no ──► NotYourTurn    │
//! │  2. apply_move against the AUTHORITATIVE snapshot                      │
//! │                                                  err ──► StaleSubmission│
//! │  3. Phase ─► AwaitingEcho { move_number }                              │
//! │     (optimistic view: expose the published state right away)          │
//! │  4. write games/{code}/state  (wholesale overwrite)                    │
//! │                                                  err ──► TransportFailure│
//! │                                                                         │
//! │  Listener task (one per joined session)                                │
//! │  ──────────────────────────────────────                                │
//! │  subscription.next() ──► on_remote_state_change(value)                 │
//! │      decode ─► normalize if inconsistent ─► replace state wholesale    │
//! │      ─► drop speculative view ─► echo resolved? ─► Active              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every participant, the mover included, renders the state that actually
//! landed in the store. Two movers racing from the same snapshot both write;
//! the later write is what everyone converges on.
//!
//! ## Session Lifecycle
//! ```text
//! Unjoined ──► Joining ──► Joined(role) ──► Active ⇄ AwaitingEcho ──► Left
//!     ▲           │                                                    │
//!     └── error ──┘                          (terminal: new session) ◄─┘
//! ```
//!
//! Local mode has no store and no roles: the session starts `Active` and
//! every move goes straight through the engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use uttt_core::engine::{self, apply_move, check_clock, reset_game};
use uttt_core::validation::validate_display_name;
use uttt_core::{GameState, Move, MoveOutcome, Player, DEFAULT_DISPLAY_NAME};

use crate::config::{GameConfig, PlayMode};
use crate::error::{SyncError, SyncResult};
use crate::events::{GameEventEmitter, NoOpEmitter, UiCommand};
use crate::prefs::{MemoryPreferences, PreferenceStore, DISPLAY_NAME_KEY};
use crate::registry::{PlayerRegistry, Role};
use crate::room::RoomCode;
use crate::store::{RemoteStore, Subscription};

// =============================================================================
// Session Phase
// =============================================================================

/// Where a client session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, not yet in a room.
    Unjoined,

    /// `join_or_create` in flight.
    Joining,

    /// Role assigned; no readable game state received yet.
    Joined(Role),

    /// Following the authoritative state.
    Active,

    /// Published a move; waiting for the store to deliver it back.
    AwaitingEcho { move_number: u32 },

    /// Subscription released. Terminal.
    Left,
}

impl SessionPhase {
    /// True while the session is in a room.
    pub fn is_joined(self) -> bool {
        matches!(
            self,
            SessionPhase::Joined(_) | SessionPhase::Active | SessionPhase::AwaitingEcho { .. }
        )
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Unjoined => write!(f, "unjoined"),
            SessionPhase::Joining => write!(f, "joining"),
            SessionPhase::Joined(role) => write!(f, "joined({})", role),
            SessionPhase::Active => write!(f, "active"),
            SessionPhase::AwaitingEcho { move_number } => write!(f, "awaiting-echo({})", move_number),
            SessionPhase::Left => write!(f, "left"),
        }
    }
}

// =============================================================================
// Internal State
// =============================================================================

/// Codes drawn by `create_room` before giving up.
const MAX_CODE_ATTEMPTS: usize = 8;

struct Session {
    phase: SessionPhase,
    room: Option<RoomCode>,
    role: Option<Role>,

    /// Last state confirmed by the store (online) or produced by the engine (local).
    authoritative: GameState,

    /// Published but unconfirmed state, shown only with optimistic updates.
    speculative: Option<GameState>,

    /// What this client last wrote. Kept after the echo until another
    /// move number arrives, so a later write of the same move shows up as
    /// superseding it.
    published: Option<GameState>,
}

struct Shared {
    config: GameConfig,
    store: Option<Arc<dyn RemoteStore>>,
    prefs: Arc<dyn PreferenceStore>,
    emitter: Arc<dyn GameEventEmitter>,
    session_id: Uuid,
    session: RwLock<Session>,
}

struct Listener {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

// =============================================================================
// Sync Coordinator
// =============================================================================

/// One client's view of one game, local or online.
pub struct SyncCoordinator {
    shared: Arc<Shared>,
    listener: Mutex<Option<Listener>>,
}

impl SyncCoordinator {
    /// Creates a local (hot-seat) coordinator.
    pub fn local(mut config: GameConfig) -> Self {
        config.sync.mode = PlayMode::Local;
        Self::from_parts(config, None, Arc::new(MemoryPreferences::new()), Arc::new(NoOpEmitter))
    }

    /// Creates an online coordinator on `store`.
    pub fn online(mut config: GameConfig, store: Arc<dyn RemoteStore>) -> Self {
        config.sync.mode = PlayMode::Online;
        Self::from_parts(
            config,
            Some(store),
            Arc::new(MemoryPreferences::new()),
            Arc::new(NoOpEmitter),
        )
    }

    fn from_parts(
        config: GameConfig,
        store: Option<Arc<dyn RemoteStore>>,
        prefs: Arc<dyn PreferenceStore>,
        emitter: Arc<dyn GameEventEmitter>,
    ) -> Self {
        let phase = match config.mode() {
            PlayMode::Local => SessionPhase::Active,
            PlayMode::Online => SessionPhase::Unjoined,
        };
        let session = Session {
            phase,
            room: None,
            role: None,
            authoritative: reset_game(config.time_budget_ms()),
            speculative: None,
            published: None,
        };
        let session_id = Uuid::new_v4();
        debug!(session = %session_id, mode = %config.mode(), "Coordinator created");

        SyncCoordinator {
            shared: Arc::new(Shared {
                config,
                store,
                prefs,
                emitter,
                session_id,
                session: RwLock::new(session),
            }),
            listener: Mutex::new(None),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn session_id(&self) -> Uuid {
        self.shared.session_id
    }

    pub fn mode(&self) -> PlayMode {
        self.shared.config.mode()
    }

    pub fn config(&self) -> &GameConfig {
        &self.shared.config
    }

    pub async fn phase(&self) -> SessionPhase {
        self.shared.session.read().await.phase
    }

    /// Assigned role; `None` in local play and before joining.
    pub async fn role(&self) -> Option<Role> {
        self.shared.session.read().await.role
    }

    pub async fn room(&self) -> Option<RoomCode> {
        self.shared.session.read().await.room.clone()
    }

    /// The authoritative state.
    pub async fn state(&self) -> GameState {
        self.shared.session.read().await.authoritative.clone()
    }

    /// The state to render: the speculative one if any, else authoritative.
    pub async fn view(&self) -> GameState {
        let session = self.shared.session.read().await;
        session
            .speculative
            .clone()
            .unwrap_or_else(|| session.authoritative.clone())
    }

    /// Clock reading for `player` at `now`, for display.
    pub async fn remaining_time_ms(&self, player: Player, now: DateTime<Utc>) -> u64 {
        let session = self.shared.session.read().await;
        engine::remaining_time_ms(&session.authoritative, player, now)
    }

    /// Picks the name to register under.
    ///
    /// ## Fallback Order
    /// 1. `input`, trimmed (remembered for next time)
    /// 2. The remembered name
    /// 3. The configured default
    /// 4. `"Anonymous"`
    pub fn resolve_display_name(&self, input: &str) -> SyncResult<String> {
        if let Some(name) = validate_display_name(input).map_err(SyncError::InvalidDisplayName)? {
            self.shared.prefs.set(DISPLAY_NAME_KEY, &name);
            return Ok(name);
        }

        let remembered = self
            .shared
            .prefs
            .get(DISPLAY_NAME_KEY)
            .and_then(|name| validate_display_name(&name).ok().flatten());
        if let Some(name) = remembered {
            return Ok(name);
        }

        let configured = self
            .shared
            .config
            .default_display_name()
            .and_then(|name| validate_display_name(name).ok().flatten());
        Ok(configured.unwrap_or_else(|| DEFAULT_DISPLAY_NAME.to_string()))
    }

    // =========================================================================
    // Rooms
    // =========================================================================

    /// Creates a room with a fresh game and joins it (as X).
    ///
    /// Codes already holding a game record are skipped.
    pub async fn create_room(&self, display_name: &str) -> SyncResult<(RoomCode, Role)> {
        self.create_room_with(display_name, RoomCode::generate).await
    }

    async fn create_room_with<F>(
        &self,
        display_name: &str,
        mut next_code: F,
    ) -> SyncResult<(RoomCode, Role)>
    where
        F: FnMut() -> RoomCode,
    {
        let store = Arc::clone(self.shared.store()?);
        let name = self.resolve_display_name(display_name)?;
        self.ensure_unjoined().await?;

        let mut attempts = 0;
        let code = loop {
            if attempts == MAX_CODE_ATTEMPTS {
                return Err(SyncError::NoFreeRoomCode(attempts));
            }
            attempts += 1;
            let code = next_code();
            if store.read(&code.state_path()).await?.is_none() {
                break code;
            }
            debug!(session = %self.shared.session_id, room = %code, "Room code taken, drawing another");
        };

        let fresh = self.shared.fresh_state();
        let value = serde_json::to_value(&fresh)
            .map_err(|e| SyncError::SerializationFailed(e.to_string()))?;
        store.write(&code.state_path(), value).await.map_err(|e| {
            error!(session = %self.shared.session_id, room = %code, error = %e, "Failed to create room");
            e
        })?;
        info!(session = %self.shared.session_id, room = %code, "Room created");

        let role = self.join_or_create(code.as_str(), &name).await?;
        Ok((code, role))
    }

    /// Joins an existing room and takes the first free seat.
    ///
    /// ## Steps
    /// 1. Validate the code (case-insensitive)
    /// 2. Read `games/{code}/state`; absent ⇒ `RoomNotFound`
    /// 3. Read the player registry, assign a role, write the registry back
    /// 4. Remember the role, subscribe, start following remote changes
    ///
    /// On failure the session returns to `Unjoined` and may retry.
    pub async fn join_or_create(&self, code: &str, display_name: &str) -> SyncResult<Role> {
        let store = Arc::clone(self.shared.store()?);
        let code = RoomCode::parse(code)?;
        let name = self.resolve_display_name(display_name)?;

        {
            let mut session = self.shared.session.write().await;
            match session.phase {
                SessionPhase::Unjoined => session.phase = SessionPhase::Joining,
                SessionPhase::Left => return Err(SyncError::SessionClosed),
                _ => {
                    let joined = session.room.as_ref().unwrap_or(&code).to_string();
                    return Err(SyncError::AlreadyJoined(joined));
                }
            }
        }

        match self.join_room(store, &code, &name).await {
            Ok(role) => Ok(role),
            Err(e) => {
                warn!(session = %self.shared.session_id, room = %code, error = %e, "Join failed");
                self.shared.session.write().await.phase = SessionPhase::Unjoined;
                Err(e)
            }
        }
    }

    async fn join_room(
        &self,
        store: Arc<dyn RemoteStore>,
        code: &RoomCode,
        name: &str,
    ) -> SyncResult<Role> {
        let state_path = code.state_path();
        let players_path = code.players_path();

        let initial = store
            .read(&state_path)
            .await?
            .ok_or_else(|| SyncError::RoomNotFound(code.to_string()))?;

        let mut players = match PlayerRegistry::from_value(store.read(&players_path).await?) {
            Ok(players) => players,
            Err(e) => {
                warn!(room = %code, error = %e, "Player registry unreadable, starting empty");
                PlayerRegistry::default()
            }
        };

        let remembered = self
            .shared
            .prefs
            .get(&code.role_pref_key())
            .and_then(|role| role.parse::<Role>().ok());

        let role = match remembered.and_then(|role| players.reclaim(role, name)) {
            Some(role) => {
                debug!(room = %code, role = %role, "Reclaimed remembered seat");
                role
            }
            None => {
                let role = players.assign(name);
                if role != Role::Spectator {
                    store.write(&players_path, players.to_value()?).await?;
                }
                role
            }
        };
        self.shared
            .prefs
            .set(&code.role_pref_key(), &role.to_string());

        let subscription = store.subscribe(&state_path).await?;

        let snapshot = {
            let mut session = self.shared.session.write().await;
            session.room = Some(code.clone());
            session.role = Some(role);
            match serde_json::from_value::<GameState>(initial) {
                Ok(state) => {
                    session.authoritative = state.normalized();
                    session.phase = SessionPhase::Active;
                }
                Err(e) => {
                    warn!(room = %code, error = %e, "Room state unreadable, waiting for a valid one");
                    session.phase = SessionPhase::Joined(role);
                }
            }
            session.authoritative.clone()
        };

        self.spawn_listener(subscription).await;

        info!(
            session = %self.shared.session_id,
            room = %code,
            role = %role,
            display_name = name,
            "Joined room"
        );
        self.shared.emitter.on_role_assigned(role, Some(code));
        self.shared.emitter.on_state_change(&snapshot);
        Ok(role)
    }

    async fn ensure_unjoined(&self) -> SyncResult<()> {
        let session = self.shared.session.read().await;
        match session.phase {
            SessionPhase::Unjoined => Ok(()),
            SessionPhase::Left => Err(SyncError::SessionClosed),
            _ => Err(SyncError::AlreadyJoined(
                session
                    .room
                    .as_ref()
                    .map(|code| code.to_string())
                    .unwrap_or_default(),
            )),
        }
    }

    async fn spawn_listener(&self, subscription: Subscription) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let task = tokio::spawn(listen(Arc::clone(&self.shared), subscription, shutdown_rx));
        *self.listener.lock().await = Some(Listener { shutdown_tx, task });
    }

    /// Releases the subscription. Safe to call any number of times.
    pub async fn leave(&self) {
        let room = {
            let mut session = self.shared.session.write().await;
            if session.phase == SessionPhase::Left {
                debug!(session = %self.shared.session_id, "Already left");
                return;
            }
            session.phase = SessionPhase::Left;
            session.speculative = None;
            session.published = None;
            session.room.clone()
        };

        if let Some(listener) = self.listener.lock().await.take() {
            let _ = listener.shutdown_tx.send(()).await;
            if let Err(e) = listener.task.await {
                warn!(session = %self.shared.session_id, error = %e, "Listener task ended abnormally");
            }
        }

        match room {
            Some(code) => info!(session = %self.shared.session_id, room = %code, "Left room"),
            None => info!(session = %self.shared.session_id, "Session closed"),
        }
    }

    // =========================================================================
    // Moves
    // =========================================================================

    /// Submits a move for the local player at the current time.
    pub async fn submit_move(&self, board: usize, cell: usize) -> SyncResult<MoveOutcome> {
        self.submit_move_at(board, cell, Utc::now()).await
    }

    /// Submits a move at an explicit time.
    pub async fn submit_move_at(
        &self,
        board: usize,
        cell: usize,
        now: DateTime<Utc>,
    ) -> SyncResult<MoveOutcome> {
        let mv = Move::new(board, cell);
        match self.mode() {
            PlayMode::Local => self.submit_local(mv, now).await,
            PlayMode::Online => self.submit_online(mv, now).await,
        }
    }

    async fn submit_local(&self, mv: Move, now: DateTime<Utc>) -> SyncResult<MoveOutcome> {
        let outcome = {
            let mut session = self.shared.session.write().await;
            if session.phase == SessionPhase::Left {
                return Err(SyncError::SessionClosed);
            }
            let outcome = apply_move(&session.authoritative, mv, now)?;
            session.authoritative = outcome.state().clone();
            outcome
        };

        if let MoveOutcome::TimeExpired(state) = &outcome {
            info!(winner = ?state.game_winner(), "Clock expired");
        }
        self.shared.emitter.on_state_change(outcome.state());
        Ok(outcome)
    }

    async fn submit_online(&self, mv: Move, now: DateTime<Utc>) -> SyncResult<MoveOutcome> {
        let optimistic = self.shared.config.sync.optimistic_updates;

        let (code, outcome) = {
            let mut session = self.shared.session.write().await;
            let code = match session.phase {
                SessionPhase::Unjoined | SessionPhase::Joining => return Err(SyncError::NotJoined),
                SessionPhase::Left => return Err(SyncError::SessionClosed),
                SessionPhase::AwaitingEcho { move_number } => {
                    return Err(SyncError::MovePending(move_number))
                }
                SessionPhase::Joined(_) => return Err(SyncError::AwaitingState),
                SessionPhase::Active => session.room.clone().ok_or(SyncError::NotJoined)?,
            };
            let role = session.role.ok_or(SyncError::NotJoined)?;

            let current = session.authoritative.current_player();
            if !role.may_move(current) {
                debug!(role = %role, current = %current, "Move rejected: not your turn");
                return Err(SyncError::NotYourTurn { role, current });
            }

            let outcome =
                apply_move(&session.authoritative, mv, now).map_err(SyncError::StaleSubmission)?;
            let next = outcome.state().clone();

            session.phase = SessionPhase::AwaitingEcho {
                move_number: next.move_number(),
            };
            if optimistic {
                session.speculative = Some(next.clone());
            }
            session.published = Some(next);
            (code, outcome)
        };

        if optimistic {
            self.shared.emitter.on_state_change(outcome.state());
        }

        let move_number = outcome.state().move_number();
        if let Err(e) = self.shared.publish(&code, outcome.state()).await {
            self.abandon_publish(move_number).await;
            return Err(e);
        }

        info!(
            session = %self.shared.session_id,
            room = %code,
            board = mv.board,
            cell = mv.cell,
            move_number,
            "Published move"
        );
        Ok(outcome)
    }

    /// Rolls back the echo wait after a failed write.
    async fn abandon_publish(&self, move_number: u32) {
        let restored = {
            let mut session = self.shared.session.write().await;
            if session.phase != (SessionPhase::AwaitingEcho { move_number }) {
                None
            } else {
                session.phase = SessionPhase::Active;
                session.published = None;
                session
                    .speculative
                    .take()
                    .map(|_| session.authoritative.clone())
            }
        };

        if let Some(state) = restored {
            self.shared.emitter.on_state_change(&state);
        }
    }

    // =========================================================================
    // Reset & Clock
    // =========================================================================

    /// Starts a new game.
    ///
    /// Local: replaces the state. Online: publishes a fresh state; everyone
    /// adopts it through the echo. Any joined participant may reset.
    pub async fn reset(&self) -> SyncResult<()> {
        let fresh = self.shared.fresh_state();

        match self.mode() {
            PlayMode::Local => {
                {
                    let mut session = self.shared.session.write().await;
                    if session.phase == SessionPhase::Left {
                        return Err(SyncError::SessionClosed);
                    }
                    session.authoritative = fresh.clone();
                }
                info!("Game reset");
                self.shared.emitter.on_state_change(&fresh);
            }
            PlayMode::Online => {
                let optimistic = self.shared.config.sync.optimistic_updates;
                let code = {
                    let mut session = self.shared.session.write().await;
                    let code = self.shared.joined_room(&session)?;
                    session.phase = SessionPhase::Active;
                    session.published = None;
                    if optimistic {
                        session.speculative = Some(fresh.clone());
                    }
                    code
                };

                if optimistic {
                    self.shared.emitter.on_state_change(&fresh);
                }
                if let Err(e) = self.shared.publish(&code, &fresh).await {
                    let restored = {
                        let mut session = self.shared.session.write().await;
                        session
                            .speculative
                            .take()
                            .map(|_| session.authoritative.clone())
                    };
                    if let Some(state) = restored {
                        self.shared.emitter.on_state_change(&state);
                    }
                    return Err(e);
                }
                info!(session = %self.shared.session_id, room = %code, "Published reset");
            }
        }
        Ok(())
    }

    /// Tick-boundary clock check at the current time.
    pub async fn tick(&self) -> SyncResult<bool> {
        self.tick_at(Utc::now()).await
    }

    /// Ends the game if the player to move ran out of time at `now`.
    ///
    /// Returns true if the game ended. Online, the terminal state is
    /// published like a move, and only from `Active`: while a move of ours
    /// is on its way the snapshot still shows the turn it ended.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> SyncResult<bool> {
        let (terminal, room) = {
            let mut session = self.shared.session.write().await;
            let room = match self.mode() {
                PlayMode::Local if session.phase == SessionPhase::Left => {
                    return Err(SyncError::SessionClosed)
                }
                PlayMode::Local => None,
                PlayMode::Online => {
                    let code = self.shared.joined_room(&session)?;
                    if session.phase != SessionPhase::Active {
                        return Ok(false);
                    }
                    Some(code)
                }
            };
            let Some(terminal) = check_clock(&session.authoritative, now) else {
                return Ok(false);
            };
            match room {
                None => session.authoritative = terminal.clone(),
                Some(_) => {
                    session.phase = SessionPhase::AwaitingEcho {
                        move_number: terminal.move_number(),
                    };
                    session.published = Some(terminal.clone());
                }
            }
            (terminal, room)
        };

        info!(winner = ?terminal.game_winner(), "Clock expired");
        match room {
            Some(code) => {
                if let Err(e) = self.shared.publish(&code, &terminal).await {
                    self.abandon_publish(terminal.move_number()).await;
                    return Err(e);
                }
            }
            None => self.shared.emitter.on_state_change(&terminal),
        }
        Ok(true)
    }

    // =========================================================================
    // Remote Changes & UI Dispatch
    // =========================================================================

    /// Adopts a state delivered by the store subscription.
    pub async fn on_remote_state_change(&self, value: Option<Value>) {
        self.shared.on_remote_state_change(value).await;
    }

    /// Single entry point for front-end commands.
    ///
    /// Rule violations are returned but not reported: they are normal clicks
    /// on unplayable cells. Other errors also go to `on_error`.
    pub async fn handle(&self, command: UiCommand) -> SyncResult<()> {
        let result = match command {
            UiCommand::Move { board, cell } => self.submit_move(board, cell).await.map(|_| ()),
            UiCommand::Reset => self.reset().await,
            UiCommand::Leave => {
                self.leave().await;
                Ok(())
            }
        };

        if let Err(ref e) = result {
            if e.is_rule_violation() {
                debug!(error = %e, "Command ignored");
            } else {
                self.shared.emitter.on_error(e);
            }
        }
        result
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get_mut().take() {
            listener.task.abort();
        }
    }
}

impl Shared {
    fn store(&self) -> SyncResult<&Arc<dyn RemoteStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| SyncError::InvalidConfig("Online play requires a remote store".into()))
    }

    fn fresh_state(&self) -> GameState {
        reset_game(self.config.time_budget_ms())
    }

    fn joined_room(&self, session: &Session) -> SyncResult<RoomCode> {
        match session.phase {
            SessionPhase::Left => Err(SyncError::SessionClosed),
            phase if phase.is_joined() => session.room.clone().ok_or(SyncError::NotJoined),
            _ => Err(SyncError::NotJoined),
        }
    }

    async fn publish(&self, code: &RoomCode, state: &GameState) -> SyncResult<()> {
        let store = self.store()?;
        let value = serde_json::to_value(state)
            .map_err(|e| SyncError::SerializationFailed(e.to_string()))?;
        store.write(&code.state_path(), value).await.map_err(|e| {
            error!(session = %self.session_id, room = %code, error = %e, "Failed to publish state");
            e
        })
    }

    async fn on_remote_state_change(&self, value: Option<Value>) {
        let Some(value) = value else {
            debug!(session = %self.session_id, "Remote state absent");
            return;
        };

        let decoded = match serde_json::from_value::<GameState>(value) {
            Ok(state) => state,
            Err(e) => {
                warn!(session = %self.session_id, error = %e, "Ignoring malformed remote state");
                self.emitter
                    .on_error(&SyncError::DeserializationFailed(e.to_string()));
                return;
            }
        };

        let state = if decoded.is_consistent() {
            decoded
        } else {
            warn!(
                session = %self.session_id,
                move_number = decoded.move_number(),
                "Remote state inconsistent, recomputing derived fields"
            );
            decoded.normalized()
        };

        let superseded = {
            let mut session = self.session.write().await;
            let mut superseded = None;
            match session.phase {
                SessionPhase::Unjoined | SessionPhase::Joining | SessionPhase::Left => {
                    debug!(session = %self.session_id, phase = %session.phase, "Ignoring remote state");
                    return;
                }
                SessionPhase::Joined(_) => {
                    session.phase = SessionPhase::Active;
                }
                SessionPhase::Active => {
                    // A write of the same move landing after ours replaced it.
                    if let Some(published) = session.published.take() {
                        if published == state {
                            session.published = Some(published);
                        } else if published.move_number() == state.move_number() {
                            superseded = Some(state.move_number());
                        }
                    }
                }
                SessionPhase::AwaitingEcho { move_number } => {
                    if session.published.as_ref() == Some(&state) {
                        debug!(session = %self.session_id, move_number, "Own move confirmed");
                        session.phase = SessionPhase::Active;
                    } else if state.move_number() > move_number {
                        session.phase = SessionPhase::Active;
                        session.published = None;
                    } else {
                        // Written before ours; our echo is still to come.
                        debug!(
                            session = %self.session_id,
                            move_number = state.move_number(),
                            "Concurrent write arrived ahead of own echo"
                        );
                    }
                }
            }
            session.authoritative = state.clone();
            session.speculative = None;
            superseded
        };

        debug!(session = %self.session_id, move_number = state.move_number(), "Adopted remote state");
        if let Some(move_number) = superseded {
            warn!(session = %self.session_id, move_number, "Own move superseded by a concurrent write");
            self.emitter.on_error(&SyncError::MoveSuperseded(move_number));
        }
        self.emitter.on_state_change(&state);
    }
}

/// Forwards store notifications until shutdown or the feed closes.
async fn listen(shared: Arc<Shared>, mut subscription: Subscription, mut shutdown_rx: mpsc::Receiver<()>) {
    debug!(session = %shared.session_id, path = subscription.path(), "Listener started");

    loop {
        tokio::select! {
            next = subscription.next() => match next {
                Some(value) => shared.on_remote_state_change(value).await,
                None => {
                    warn!(session = %shared.session_id, "Remote feed closed");
                    break;
                }
            },
            _ = shutdown_rx.recv() => break,
        }
    }

    subscription.unsubscribe();
    debug!(session = %shared.session_id, "Listener stopped");
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncCoordinator with options.
pub struct SyncCoordinatorBuilder {
    config: GameConfig,
    store: Option<Arc<dyn RemoteStore>>,
    prefs: Option<Arc<dyn PreferenceStore>>,
    emitter: Option<Arc<dyn GameEventEmitter>>,
}

impl SyncCoordinatorBuilder {
    pub fn new(config: GameConfig) -> Self {
        SyncCoordinatorBuilder {
            config,
            store: None,
            prefs: None,
            emitter: None,
        }
    }

    /// Sets the remote store (required in online mode).
    pub fn with_store(mut self, store: Arc<dyn RemoteStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_preferences(mut self, prefs: Arc<dyn PreferenceStore>) -> Self {
        self.prefs = Some(prefs);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn GameEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Builds the SyncCoordinator.
    pub fn build(self) -> SyncResult<SyncCoordinator> {
        self.config.validate()?;

        if self.config.mode().is_online() && self.store.is_none() {
            return Err(SyncError::InvalidConfig(
                "Online mode requires a remote store".into(),
            ));
        }

        let prefs = self
            .prefs
            .unwrap_or_else(|| Arc::new(MemoryPreferences::new()));
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        Ok(SyncCoordinator::from_parts(self.config, self.store, prefs, emitter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use uttt_core::{ActiveBoard, BoardResult, Cell, GameWinner, MoveError};

    // =========================================================================
    // Fixtures
    // =========================================================================

    fn online_config() -> GameConfig {
        let mut config = GameConfig::default();
        config.sync.mode = PlayMode::Online;
        config
    }

    fn client(store: &Arc<MemoryStore>) -> SyncCoordinator {
        SyncCoordinator::online(online_config(), store.clone())
    }

    /// Waits until `coordinator.state()` satisfies `pred`.
    async fn eventually<F>(coordinator: &SyncCoordinator, pred: F) -> GameState
    where
        F: Fn(&GameState) -> bool,
    {
        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                let state = coordinator.state().await;
                if pred(&state) {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("state condition not reached")
    }

    /// Lets listener tasks drain their queues.
    async fn settle() {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    async fn stored_state(store: &MemoryStore, code: &RoomCode) -> GameState {
        let value = store.read(&code.state_path()).await.unwrap().unwrap();
        serde_json::from_value(value).unwrap()
    }

    #[derive(Default)]
    struct RecordingEmitter {
        states: std::sync::Mutex<Vec<GameState>>,
        roles: std::sync::Mutex<Vec<Role>>,
        errors: std::sync::Mutex<Vec<String>>,
    }

    impl GameEventEmitter for RecordingEmitter {
        fn on_state_change(&self, state: &GameState) {
            self.states.lock().unwrap().push(state.clone());
        }

        fn on_role_assigned(&self, role: Role, _room: Option<&RoomCode>) {
            self.roles.lock().unwrap().push(role);
        }

        fn on_error(&self, error: &SyncError) {
            self.errors.lock().unwrap().push(error.to_string());
        }
    }

    /// MemoryStore whose writes can be made to fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_writes: AtomicBool,
    }

    #[async_trait]
    impl RemoteStore for FlakyStore {
        async fn write(&self, path: &str, value: Value) -> SyncResult<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(SyncError::transport("write", path, "connection reset"));
            }
            self.inner.write(path, value).await
        }

        async fn read(&self, path: &str) -> SyncResult<Option<Value>> {
            self.inner.read(path).await
        }

        async fn subscribe(&self, path: &str) -> SyncResult<Subscription> {
            self.inner.subscribe(path).await
        }
    }

    // =========================================================================
    // Local Mode
    // =========================================================================

    #[tokio::test]
    async fn test_local_mode_passes_through_to_engine() {
        let coordinator = SyncCoordinator::local(GameConfig::default());
        assert_eq!(coordinator.phase().await, SessionPhase::Active);
        assert_eq!(coordinator.role().await, None);

        let outcome = coordinator.submit_move(0, 4).await.unwrap();
        assert!(outcome.is_placed());

        let state = coordinator.state().await;
        assert_eq!(state.cell(0, 4), Some(Cell::X));
        assert_eq!(state.active_board(), ActiveBoard::Board(4));
        assert_eq!(coordinator.view().await, state);

        let err = coordinator.submit_move(7, 0).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::RuleViolation(MoveError::WrongBoard {
                required: 4,
                attempted: 7
            })
        ));
        assert_eq!(coordinator.state().await, state);
    }

    #[tokio::test]
    async fn test_local_reset_and_leave() {
        let coordinator = SyncCoordinator::local(GameConfig::default());
        coordinator.submit_move(0, 4).await.unwrap();

        coordinator.reset().await.unwrap();
        assert_eq!(coordinator.state().await, reset_game(500_000));

        coordinator.leave().await;
        coordinator.leave().await;
        assert_eq!(coordinator.phase().await, SessionPhase::Left);
        assert!(matches!(
            coordinator.submit_move(0, 0).await,
            Err(SyncError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_local_clock_expires_at_tick() {
        let mut config = GameConfig::default();
        config.game.time_budget_secs = 1;
        let coordinator = SyncCoordinator::local(config);

        let t0 = Utc::now();
        coordinator.submit_move_at(0, 4, t0).await.unwrap();
        assert!(!coordinator.tick_at(t0 + ChronoDuration::milliseconds(500)).await.unwrap());
        assert_eq!(
            coordinator
                .remaining_time_ms(Player::O, t0 + ChronoDuration::milliseconds(500))
                .await,
            500
        );

        assert!(coordinator.tick_at(t0 + ChronoDuration::seconds(2)).await.unwrap());
        let state = coordinator.state().await;
        assert!(state.is_game_over());
        assert_eq!(state.game_winner(), Some(GameWinner::X));
    }

    #[tokio::test]
    async fn test_handle_dispatches_commands() {
        let emitter = Arc::new(RecordingEmitter::default());
        let coordinator = SyncCoordinatorBuilder::new(GameConfig::default())
            .with_emitter(emitter.clone())
            .build()
            .unwrap();

        coordinator
            .handle(UiCommand::Move { board: 0, cell: 4 })
            .await
            .unwrap();
        let repeat = coordinator.handle(UiCommand::Move { board: 0, cell: 4 }).await;
        assert!(repeat.unwrap_err().is_rule_violation());
        assert!(emitter.errors.lock().unwrap().is_empty());

        coordinator.handle(UiCommand::Reset).await.unwrap();
        assert_eq!(coordinator.state().await.filled_cells(), 0);

        coordinator.handle(UiCommand::Leave).await.unwrap();
        let closed = coordinator.handle(UiCommand::Move { board: 0, cell: 0 }).await;
        assert!(matches!(closed, Err(SyncError::SessionClosed)));
        assert_eq!(emitter.errors.lock().unwrap().len(), 1);
        assert_eq!(emitter.states.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_builder_requires_store_for_online() {
        let result = SyncCoordinatorBuilder::new(online_config()).build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }

    // =========================================================================
    // Rooms & Roles
    // =========================================================================

    #[tokio::test]
    async fn test_roles_assigned_first_come() {
        let store = Arc::new(MemoryStore::new());
        let host = client(&store);
        let guest = client(&store);
        let watcher = client(&store);

        let (code, role) = host.create_room("Ada").await.unwrap();
        assert_eq!(role, Role::X);
        assert_eq!(host.phase().await, SessionPhase::Active);

        let lower = code.as_str().to_lowercase();
        assert_eq!(guest.join_or_create(&lower, "Grace").await.unwrap(), Role::O);
        assert_eq!(watcher.join_or_create(code.as_str(), "Linus").await.unwrap(), Role::Spectator);

        let players = store.read(&code.players_path()).await.unwrap();
        assert_eq!(players, Some(json!({ "X": "Ada", "O": "Grace" })));
        assert_eq!(guest.room().await, Some(code));
    }

    #[tokio::test]
    async fn test_join_unknown_room_is_retryable() {
        let store = Arc::new(MemoryStore::new());
        let host = client(&store);
        let guest = client(&store);
        let (code, _) = host.create_room("Ada").await.unwrap();

        let err = guest.join_or_create("ZZZ999", "Grace").await.unwrap_err();
        assert!(matches!(err, SyncError::RoomNotFound(_)));
        assert!(err.is_retryable());
        assert_eq!(guest.phase().await, SessionPhase::Unjoined);

        let err = guest.join_or_create("ZZ-99", "Grace").await.unwrap_err();
        assert!(matches!(err, SyncError::InvalidRoomCode(_)));

        assert_eq!(guest.join_or_create(code.as_str(), "Grace").await.unwrap(), Role::O);
        assert!(matches!(
            guest.join_or_create(code.as_str(), "Grace").await,
            Err(SyncError::AlreadyJoined(_))
        ));
    }

    #[tokio::test]
    async fn test_display_name_fallbacks() {
        let store = Arc::new(MemoryStore::new());

        let prefs = Arc::new(MemoryPreferences::new());
        prefs.set(DISPLAY_NAME_KEY, "Remembered");
        let coordinator = SyncCoordinatorBuilder::new(online_config())
            .with_store(store.clone())
            .with_preferences(prefs.clone())
            .build()
            .unwrap();
        assert_eq!(coordinator.resolve_display_name("  ").unwrap(), "Remembered");
        assert_eq!(coordinator.resolve_display_name(" Ada ").unwrap(), "Ada");
        assert_eq!(prefs.get(DISPLAY_NAME_KEY).as_deref(), Some("Ada"));
        assert!(matches!(
            coordinator.resolve_display_name(&"n".repeat(21)),
            Err(SyncError::InvalidDisplayName(_))
        ));

        let mut config = online_config();
        config.player.display_name = Some("Configured".into());
        let configured = SyncCoordinator::online(config, store.clone());
        assert_eq!(configured.resolve_display_name("").unwrap(), "Configured");

        let anonymous = client(&store);
        assert_eq!(anonymous.resolve_display_name("").unwrap(), "Anonymous");
    }

    #[tokio::test]
    async fn test_rejoin_reclaims_remembered_seat() {
        let store = Arc::new(MemoryStore::new());
        let prefs: Arc<dyn PreferenceStore> = Arc::new(MemoryPreferences::new());
        let build = |prefs: Arc<dyn PreferenceStore>| {
            SyncCoordinatorBuilder::new(online_config())
                .with_store(store.clone())
                .with_preferences(prefs)
                .build()
                .unwrap()
        };

        let host = build(prefs.clone());
        let (code, _) = host.create_room("Ada").await.unwrap();
        client(&store).join_or_create(code.as_str(), "Grace").await.unwrap();
        assert_eq!(prefs.get(&code.role_pref_key()).as_deref(), Some("X"));

        host.leave().await;
        let again = build(prefs.clone());
        assert_eq!(again.join_or_create(code.as_str(), "Ada").await.unwrap(), Role::X);

        // A different name with no remembered seat is only a spectator.
        let stranger = client(&store);
        assert_eq!(
            stranger.join_or_create(code.as_str(), "Ada").await.unwrap(),
            Role::Spectator
        );
    }

    #[tokio::test]
    async fn test_role_assignment_emitted() {
        let store = Arc::new(MemoryStore::new());
        let emitter = Arc::new(RecordingEmitter::default());
        let host = SyncCoordinatorBuilder::new(online_config())
            .with_store(store.clone())
            .with_emitter(emitter.clone())
            .build()
            .unwrap();

        host.create_room("Ada").await.unwrap();
        assert_eq!(*emitter.roles.lock().unwrap(), vec![Role::X]);
        assert!(!emitter.states.lock().unwrap().is_empty());
    }

    // =========================================================================
    // Online Moves
    // =========================================================================

    #[tokio::test]
    async fn test_move_reaches_every_participant_through_store() {
        let store = Arc::new(MemoryStore::new());
        let host = client(&store);
        let guest = client(&store);
        let (code, _) = host.create_room("Ada").await.unwrap();
        guest.join_or_create(code.as_str(), "Grace").await.unwrap();
        settle().await;

        host.submit_move(0, 4).await.unwrap();
        // The mover waits for the store like everyone else.
        assert_eq!(
            host.phase().await,
            SessionPhase::AwaitingEcho { move_number: 1 }
        );

        let seen_by_host = eventually(&host, |s| s.move_number() == 1).await;
        let seen_by_guest = eventually(&guest, |s| s.move_number() == 1).await;
        assert_eq!(seen_by_host, seen_by_guest);
        assert_eq!(seen_by_guest.cell(0, 4), Some(Cell::X));
        assert_eq!(host.phase().await, SessionPhase::Active);

        guest.submit_move(4, 0).await.unwrap();
        let state = eventually(&host, |s| s.move_number() == 2).await;
        assert_eq!(state.cell(4, 0), Some(Cell::O));
        assert_eq!(state, stored_state(&store, &code).await);
    }

    #[tokio::test]
    async fn test_out_of_turn_and_stale_moves_never_written() {
        let store = Arc::new(MemoryStore::new());
        let host = client(&store);
        let guest = client(&store);
        let watcher = client(&store);
        let (code, _) = host.create_room("Ada").await.unwrap();
        guest.join_or_create(code.as_str(), "Grace").await.unwrap();
        watcher.join_or_create(code.as_str(), "Linus").await.unwrap();

        let err = guest.submit_move(0, 0).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::NotYourTurn {
                role: Role::O,
                current: Player::X
            }
        ));
        assert!(watcher.submit_move(0, 0).await.unwrap_err().is_rule_violation());
        assert_eq!(stored_state(&store, &code).await.move_number(), 0);

        host.submit_move(0, 4).await.unwrap();
        eventually(&guest, |s| s.move_number() == 1).await;

        let err = guest.submit_move(7, 0).await.unwrap_err();
        assert!(matches!(
            err,
            SyncError::StaleSubmission(MoveError::WrongBoard {
                required: 4,
                attempted: 7
            })
        ));
        assert_eq!(stored_state(&store, &code).await.move_number(), 1);
    }

    #[tokio::test]
    async fn test_second_submit_waits_for_echo() {
        let store = Arc::new(MemoryStore::new());
        let host = client(&store);
        host.create_room("Ada").await.unwrap();

        host.submit_move(0, 4).await.unwrap();
        assert!(matches!(
            host.submit_move(4, 4).await,
            Err(SyncError::MovePending(1))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_submissions_last_write_wins() {
        let store = Arc::new(MemoryStore::new());
        let first_events = Arc::new(RecordingEmitter::default());
        let first = SyncCoordinatorBuilder::new(online_config())
            .with_store(store.clone())
            .with_emitter(first_events.clone())
            .build()
            .unwrap();
        let (code, _) = first.create_room("Ada").await.unwrap();

        // A second device of the same player reclaims seat X.
        let prefs = Arc::new(MemoryPreferences::new());
        prefs.set(&code.role_pref_key(), "X");
        let second_events = Arc::new(RecordingEmitter::default());
        let second = SyncCoordinatorBuilder::new(online_config())
            .with_store(store.clone())
            .with_preferences(prefs)
            .with_emitter(second_events.clone())
            .build()
            .unwrap();
        assert_eq!(second.join_or_create(code.as_str(), "Ada").await.unwrap(), Role::X);
        settle().await;

        // Current-thread runtime: neither listener runs between these two
        // submits, so both validate against the same snapshot.
        first.submit_move(0, 4).await.unwrap();
        second.submit_move(2, 2).await.unwrap();

        let winner = |s: &GameState| s.cell(2, 2) == Some(Cell::X);
        let seen_by_first = eventually(&first, winner).await;
        let seen_by_second = eventually(&second, winner).await;

        assert_eq!(seen_by_first, seen_by_second);
        assert_eq!(seen_by_first, stored_state(&store, &code).await);
        assert_eq!(seen_by_first.cell(0, 4), Some(Cell::Empty));
        assert_eq!(seen_by_first.move_number(), 1);
        assert_eq!(first.phase().await, SessionPhase::Active);
        assert_eq!(second.phase().await, SessionPhase::Active);

        // Only the earlier writer lost its move. The later one saw the
        // earlier write ahead of its own echo, which is not a loss.
        assert_eq!(
            *first_events.errors.lock().unwrap(),
            vec!["Move 1 was overwritten by a concurrent write".to_string()]
        );
        assert!(second_events.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_redelivered_echo_is_not_a_loss() {
        let store = Arc::new(MemoryStore::new());
        let emitter = Arc::new(RecordingEmitter::default());
        let host = SyncCoordinatorBuilder::new(online_config())
            .with_store(store.clone())
            .with_emitter(emitter.clone())
            .build()
            .unwrap();
        let (code, _) = host.create_room("Ada").await.unwrap();
        settle().await;

        host.submit_move(0, 4).await.unwrap();
        let state = eventually(&host, |s| s.move_number() == 1).await;
        host.on_remote_state_change(Some(serde_json::to_value(&state).unwrap()))
            .await;

        assert_eq!(host.phase().await, SessionPhase::Active);
        assert_eq!(stored_state(&store, &code).await, state);
        assert!(emitter.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_optimistic_view_superseded_by_echo() {
        let store = Arc::new(MemoryStore::new());
        let mut config = online_config();
        config.sync.optimistic_updates = true;
        let host = SyncCoordinator::online(config, store.clone());
        host.create_room("Ada").await.unwrap();
        settle().await;

        host.submit_move(0, 4).await.unwrap();
        assert_eq!(host.view().await.cell(0, 4), Some(Cell::X));
        assert_eq!(host.state().await.cell(0, 4), Some(Cell::Empty));

        let state = eventually(&host, |s| s.move_number() == 1).await;
        assert_eq!(host.view().await, state);
    }

    #[tokio::test]
    async fn test_online_reset_reaches_everyone() {
        let store = Arc::new(MemoryStore::new());
        let host = client(&store);
        let watcher = client(&store);
        let (code, _) = host.create_room("Ada").await.unwrap();
        watcher.join_or_create(code.as_str(), "Linus").await.unwrap();

        host.submit_move(0, 4).await.unwrap();
        eventually(&host, |s| s.move_number() == 1).await;
        eventually(&watcher, |s| s.move_number() == 1).await;

        // Spectators may reset too.
        watcher.reset().await.unwrap();
        let fresh = eventually(&host, |s| s.move_number() == 0).await;
        assert_eq!(fresh, reset_game(500_000));
        assert_eq!(stored_state(&store, &code).await, fresh);
    }

    // =========================================================================
    // Failures & Remote Records
    // =========================================================================

    #[tokio::test]
    async fn test_transport_failure_leaves_state_untouched() {
        let store = Arc::new(FlakyStore::default());
        let host = SyncCoordinator::online(online_config(), store.clone());
        host.create_room("Ada").await.unwrap();
        settle().await;

        store.fail_writes.store(true, Ordering::SeqCst);
        let err = host.submit_move(0, 4).await.unwrap_err();
        assert!(matches!(err, SyncError::TransportFailure { operation: "write", .. }));
        assert!(err.is_retryable());
        assert_eq!(host.state().await.move_number(), 0);
        assert_eq!(host.phase().await, SessionPhase::Active);

        store.fail_writes.store(false, Ordering::SeqCst);
        host.submit_move(0, 4).await.unwrap();
        eventually(&host, |s| s.move_number() == 1).await;
    }

    #[tokio::test]
    async fn test_create_room_skips_codes_in_use() {
        let store = Arc::new(MemoryStore::new());
        let taken = RoomCode::parse("ABC123").unwrap();
        let existing = apply_move(&reset_game(500_000), Move::new(0, 4), Utc::now())
            .unwrap()
            .into_state();
        store
            .write(&taken.state_path(), serde_json::to_value(&existing).unwrap())
            .await
            .unwrap();

        let host = client(&store);
        let mut codes = vec![taken.clone(), RoomCode::parse("XYZ789").unwrap()].into_iter();
        let (code, role) = host
            .create_room_with("Ada", || codes.next().unwrap())
            .await
            .unwrap();

        assert_eq!(code.as_str(), "XYZ789");
        assert_eq!(role, Role::X);
        assert_eq!(stored_state(&store, &taken).await, existing);
        assert_eq!(store.read(&taken.players_path()).await.unwrap(), None);
        assert_eq!(stored_state(&store, &code).await, reset_game(500_000));
    }

    #[tokio::test]
    async fn test_create_room_gives_up_when_codes_exhausted() {
        let store = Arc::new(MemoryStore::new());
        let taken = RoomCode::parse("ABC123").unwrap();
        store
            .write(&taken.state_path(), serde_json::to_value(reset_game(500_000)).unwrap())
            .await
            .unwrap();

        let host = client(&store);
        let err = host
            .create_room_with("Ada", || taken.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::NoFreeRoomCode(MAX_CODE_ATTEMPTS)));
        assert!(err.is_retryable());
        assert_eq!(host.phase().await, SessionPhase::Unjoined);
    }

    #[tokio::test]
    async fn test_create_room_transport_failure() {
        let store = Arc::new(FlakyStore::default());
        store.fail_writes.store(true, Ordering::SeqCst);
        let host = SyncCoordinator::online(online_config(), store.clone());

        let err = host.create_room("Ada").await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(host.phase().await, SessionPhase::Unjoined);
        assert_eq!(host.room().await, None);
    }

    #[tokio::test]
    async fn test_malformed_remote_state_ignored() {
        let store = Arc::new(MemoryStore::new());
        let emitter = Arc::new(RecordingEmitter::default());
        let host = SyncCoordinatorBuilder::new(online_config())
            .with_store(store.clone())
            .with_emitter(emitter.clone())
            .build()
            .unwrap();
        host.create_room("Ada").await.unwrap();
        settle().await;
        let before = host.state().await;

        host.on_remote_state_change(Some(json!({ "boards": "nope" }))).await;
        host.on_remote_state_change(None).await;

        assert_eq!(host.state().await, before);
        assert_eq!(emitter.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_inconsistent_remote_state_normalized() {
        let store = Arc::new(MemoryStore::new());
        let host = client(&store);
        host.create_room("Ada").await.unwrap();
        settle().await;

        let mut value = serde_json::to_value(reset_game(500_000)).unwrap();
        value["wonBoards"][3] = json!("X");
        value["gameOver"] = json!(true);
        value["gameWinner"] = json!("tie");
        host.on_remote_state_change(Some(value)).await;

        let state = host.state().await;
        assert_eq!(state.won_boards()[3], BoardResult::InProgress);
        assert!(!state.is_game_over());
        assert!(state.is_consistent());
    }

    #[tokio::test]
    async fn test_leave_releases_subscription_and_ignores_changes() {
        let store = Arc::new(MemoryStore::new());
        let host = client(&store);
        let (code, _) = host.create_room("Ada").await.unwrap();
        assert_eq!(store.subscriber_count(&code.state_path()).await, 1);

        host.leave().await;
        host.leave().await;
        assert_eq!(host.phase().await, SessionPhase::Left);
        assert_eq!(store.subscriber_count(&code.state_path()).await, 0);

        let before = host.state().await;
        let other = apply_move(&before, Move::new(0, 0), Utc::now())
            .unwrap()
            .into_state();
        host.on_remote_state_change(Some(serde_json::to_value(&other).unwrap()))
            .await;
        assert_eq!(host.state().await, before);

        assert!(matches!(host.submit_move(0, 0).await, Err(SyncError::SessionClosed)));
        assert!(matches!(
            host.join_or_create(code.as_str(), "Ada").await,
            Err(SyncError::SessionClosed)
        ));
    }

    #[tokio::test]
    async fn test_leave_before_join_is_safe() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = client(&store);
        coordinator.leave().await;
        assert_eq!(coordinator.phase().await, SessionPhase::Left);
    }

    // =========================================================================
    // Session Edges & Online Clock
    // =========================================================================

    #[tokio::test]
    async fn test_no_moves_before_a_readable_state_arrives() {
        let store = Arc::new(MemoryStore::new());
        let code = RoomCode::parse("ABC123").unwrap();
        let garbage = json!({ "boards": "nope" });
        store.write(&code.state_path(), garbage.clone()).await.unwrap();

        let guest = client(&store);
        assert_eq!(guest.join_or_create(code.as_str(), "Grace").await.unwrap(), Role::X);
        settle().await;
        assert_eq!(guest.phase().await, SessionPhase::Joined(Role::X));

        let err = guest.submit_move(0, 4).await.unwrap_err();
        assert!(matches!(err, SyncError::AwaitingState));
        assert!(err.is_retryable());
        assert!(!guest.tick_at(Utc::now() + ChronoDuration::hours(1)).await.unwrap());
        assert_eq!(store.read(&code.state_path()).await.unwrap(), Some(garbage));

        store
            .write(&code.state_path(), serde_json::to_value(reset_game(500_000)).unwrap())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(2), async {
            while guest.phase().await != SessionPhase::Active {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("room state never arrived");

        guest.submit_move(0, 4).await.unwrap();
        let state = eventually(&guest, |s| s.move_number() == 1).await;
        assert_eq!(state.cell(0, 4), Some(Cell::X));
    }

    #[tokio::test]
    async fn test_tick_while_awaiting_echo_keeps_the_move() {
        let store = Arc::new(MemoryStore::new());
        let mut config = online_config();
        config.game.time_budget_secs = 2;
        let host = SyncCoordinator::online(config.clone(), store.clone());
        let guest = SyncCoordinator::online(config, store.clone());
        let (code, _) = host.create_room("Ada").await.unwrap();
        guest.join_or_create(code.as_str(), "Grace").await.unwrap();
        settle().await;

        let t0 = Utc::now();
        let at = |ms: i64| t0 + ChronoDuration::milliseconds(ms);

        host.submit_move_at(0, 4, t0).await.unwrap();
        eventually(&guest, |s| s.move_number() == 1).await;
        guest.submit_move_at(4, 0, at(1_000)).await.unwrap();
        eventually(&host, |s| s.move_number() == 2).await;

        // X's turn began at 1.0 s with 2 s on the clock; X moves at 2.9 s.
        host.submit_move_at(0, 0, at(2_900)).await.unwrap();
        // At 3.2 s the pre-move snapshot shows X out of time, but X moved.
        assert!(!host.tick_at(at(3_200)).await.unwrap());

        let state = eventually(&guest, |s| s.move_number() == 3).await;
        assert_eq!(state.cell(0, 0), Some(Cell::X));
        assert!(!state.is_game_over());
        eventually(&host, |s| s.move_number() == 3).await;
        assert_eq!(host.phase().await, SessionPhase::Active);

        // O has 1 s left from 2.9 s; the host's tick ends the game for everyone.
        assert!(host.tick_at(at(10_000)).await.unwrap());
        let over = eventually(&guest, |s| s.is_game_over()).await;
        assert_eq!(over.game_winner(), Some(GameWinner::X));
        assert_eq!(over.cell(0, 0), Some(Cell::X));
        assert_eq!(stored_state(&store, &code).await, over);
        eventually(&host, |s| s.is_game_over()).await;
        assert_eq!(host.phase().await, SessionPhase::Active);
    }

    #[tokio::test]
    async fn test_online_tick_before_expiry_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let host = client(&store);
        let (code, _) = host.create_room("Ada").await.unwrap();
        settle().await;

        let t0 = Utc::now();
        host.submit_move_at(0, 4, t0).await.unwrap();
        eventually(&host, |s| s.move_number() == 1).await;

        assert!(!host.tick_at(t0 + ChronoDuration::seconds(10)).await.unwrap());
        assert_eq!(stored_state(&store, &code).await.move_number(), 1);
    }

    #[tokio::test]
    async fn test_online_late_submission_publishes_timeout() {
        let store = Arc::new(MemoryStore::new());
        let mut config = online_config();
        config.game.time_budget_secs = 1;
        let host = SyncCoordinator::online(config.clone(), store.clone());
        let guest = SyncCoordinator::online(config, store.clone());
        let (code, _) = host.create_room("Ada").await.unwrap();
        guest.join_or_create(code.as_str(), "Grace").await.unwrap();
        settle().await;

        let t0 = Utc::now();
        host.submit_move_at(0, 4, t0).await.unwrap();
        eventually(&guest, |s| s.move_number() == 1).await;

        let outcome = guest
            .submit_move_at(4, 0, t0 + ChronoDuration::seconds(5))
            .await
            .unwrap();
        assert!(!outcome.is_placed());
        assert!(matches!(outcome, MoveOutcome::TimeExpired(_)));

        let over = eventually(&host, |s| s.is_game_over()).await;
        assert_eq!(over.game_winner(), Some(GameWinner::X));
        assert_eq!(over.cell(4, 0), Some(Cell::Empty));
        assert_eq!(stored_state(&store, &code).await, over);
    }
}
