//! # uttt: Terminal Ultimate Tic-Tac-Toe
//!
//! Two players share one terminal and take turns typing `<board> <cell>`.
//!
//! ## Startup Sequence
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Application Startup                               │
//! │                                                                         │
//! │  1. Initialize Logging (stderr, RUST_LOG overrides)                     │
//! │  2. Load GameConfig (defaults → uttt.toml → UTTT_* env → CLI flags)     │
//! │  3. Open preferences (remembered display name)                          │
//! │  4. Build the table:                                                    │
//! │     • local  - one coordinator, engine pass-through                     │
//! │     • online - two coordinators seated as X and O on an in-process      │
//! │                MemoryStore, every move goes through the store           │
//! │  5. Select loop: stdin lines, 1 s clock ticks, Ctrl+C                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod input;
mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use uttt_core::{GameState, Player};
use uttt_sync::{
    FilePreferences, GameConfig, GameEventEmitter, MemoryPreferences, MemoryStore, PlayMode,
    PreferenceStore, Role, RoomCode, SyncCoordinator, SyncCoordinatorBuilder, SyncError,
    UiCommand,
};

use input::Input;

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(name = "uttt", about = "Ultimate Tic-Tac-Toe in the terminal", version)]
struct Args {
    /// Config file (defaults to the platform config directory)
    #[clap(short, long)]
    config: Option<PathBuf>,

    /// Seconds on each player's clock
    #[clap(short, long)]
    time_budget: Option<u64>,

    /// Display name (remembered for next time)
    #[clap(short, long)]
    name: Option<String>,

    /// `local` or `online` (online plays both seats through an in-process store)
    #[clap(short, long)]
    mode: Option<PlayMode>,

    /// Write the effective configuration to the config file and exit
    #[clap(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let mut config =
        GameConfig::load(args.config.clone()).context("Failed to load configuration")?;
    if let Some(secs) = args.time_budget {
        config.game.time_budget_secs = secs;
    }
    if let Some(mode) = args.mode {
        config.sync.mode = mode;
    }
    config.validate().context("Invalid configuration")?;

    if args.save_config {
        config.save(args.config).context("Failed to save configuration")?;
        println!("Configuration saved.");
        return Ok(());
    }

    let prefs = open_preferences(&config);
    let emitter: Arc<dyn GameEventEmitter> = Arc::new(TerminalEmitter);
    let table = Table::open(config, prefs, emitter, args.name.as_deref().unwrap_or("")).await?;

    println!("{}", input::HELP);
    println!("{}", render::render_state(&table.view().await, Utc::now()));

    run(&table).await;
    table.close().await;
    Ok(())
}

/// Initializes tracing on stderr so logs never break up the board.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=uttt_sync=trace` - Show store traffic
/// - Default: warnings, plus INFO for the game crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,uttt=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_preferences(config: &GameConfig) -> Arc<dyn PreferenceStore> {
    match config
        .player
        .prefs_path
        .clone()
        .or_else(FilePreferences::default_path)
    {
        Some(path) => Arc::new(FilePreferences::open(path)),
        None => {
            warn!("No preference directory available, names will not be remembered");
            Arc::new(MemoryPreferences::new())
        }
    }
}

// =============================================================================
// Table
// =============================================================================

/// The coordinators behind one terminal.
enum Table {
    Local(SyncCoordinator),
    Online {
        code: RoomCode,
        x: SyncCoordinator,
        o: SyncCoordinator,
    },
}

impl Table {
    async fn open(
        config: GameConfig,
        prefs: Arc<dyn PreferenceStore>,
        emitter: Arc<dyn GameEventEmitter>,
        name: &str,
    ) -> Result<Self> {
        match config.mode() {
            PlayMode::Local => {
                let coordinator = SyncCoordinatorBuilder::new(config)
                    .with_preferences(prefs)
                    .with_emitter(emitter)
                    .build()?;
                let name = coordinator.resolve_display_name(name)?;
                println!("Welcome, {}. Hot-seat game: X moves first.", name);
                Ok(Table::Local(coordinator))
            }
            PlayMode::Online => {
                let store = Arc::new(MemoryStore::new());

                // Only X renders; both seats see the same store state.
                let x = SyncCoordinatorBuilder::new(config.clone())
                    .with_store(store.clone())
                    .with_preferences(prefs)
                    .with_emitter(emitter)
                    .build()?;
                let o = SyncCoordinatorBuilder::new(config)
                    .with_store(store)
                    .build()?;

                let (code, role) = x.create_room(name).await?;
                let guest = o.join_or_create(code.as_str(), "Guest").await?;
                info!(room = %code, host = %role, guest = %guest, "Table ready");
                println!("Room {}: you are {}, the guest is {}.", code, role, guest);

                Ok(Table::Online { code, x, o })
            }
        }
    }

    async fn view(&self) -> GameState {
        match self {
            Table::Local(coordinator) => coordinator.view().await,
            Table::Online { x, .. } => x.view().await,
        }
    }

    /// Routes a command to the coordinator that may act on it.
    async fn handle(&self, command: UiCommand) -> Result<(), SyncError> {
        match self {
            Table::Local(coordinator) => coordinator.handle(command).await,
            Table::Online { x, o, .. } => match command {
                UiCommand::Move { .. } => {
                    let seat = match x.state().await.current_player() {
                        Player::X => x,
                        Player::O => o,
                    };
                    seat.handle(command).await
                }
                UiCommand::Reset | UiCommand::Leave => x.handle(command).await,
            },
        }
    }

    async fn tick(&self) -> Result<bool, SyncError> {
        match self {
            Table::Local(coordinator) => coordinator.tick().await,
            Table::Online { x, .. } => x.tick().await,
        }
    }

    async fn close(&self) {
        match self {
            Table::Local(coordinator) => coordinator.leave().await,
            Table::Online { code, x, o } => {
                x.leave().await;
                o.leave().await;
                info!(room = %code, "Table closed");
            }
        }
    }
}

// =============================================================================
// Main Loop
// =============================================================================

async fn run(table: &Table) {
    let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                println!("\nInterrupted, leaving.");
                break;
            }

            _ = ticker.tick() => {
                if let Err(e) = table.tick().await {
                    warn!(error = %e, "Clock check failed");
                }
            }

            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => break,
                    Err(e) => {
                        eprintln!("Error reading input: {}", e);
                        continue;
                    }
                };

                match input::parse(&line) {
                    Ok(Input::Empty) => {}
                    Ok(Input::Help) => println!("{}", input::HELP),
                    Ok(Input::Command(UiCommand::Leave)) => break,
                    Ok(Input::Command(command)) => {
                        if let Err(e) = table.handle(command).await {
                            // Other failures were already reported by the emitter.
                            if e.is_rule_violation() {
                                eprintln!("Illegal move: {}", e);
                            }
                        }
                    }
                    Err(e) => eprintln!("{}", e),
                }
            }
        }
    }
}

// =============================================================================
// Event Emitter
// =============================================================================

/// Prints every state change to stdout and errors to stderr.
struct TerminalEmitter;

impl GameEventEmitter for TerminalEmitter {
    fn on_state_change(&self, state: &GameState) {
        println!("{}", render::render_state(state, Utc::now()));
    }

    fn on_role_assigned(&self, role: Role, room: Option<&RoomCode>) {
        if let Some(code) = room {
            println!("Joined room {} as {}", code, role);
        }
    }

    fn on_error(&self, error: &SyncError) {
        eprintln!("Error: {}", error);
    }
}
