//! Game Logic Module
//!
//! The memory-match rules. Deterministic and free of I/O.
//!
//! ## Module Structure
//!
//! - `level`: fixed level table
//! - `board`: deck dealing
//! - `timer`: level countdown
//! - `state`: session state and match engine
//! - `tick`: virtual-time session driver
//! - `events`: events reported by the driver

pub mod board;
pub mod events;
pub mod level;
pub mod state;
pub mod tick;
pub mod timer;

// Re-export key types
pub use board::{generate_board, BoardError, Tile, TileId, CARD_FACES};
pub use events::{EndReason, GameEvent, GameEventData};
pub use level::{LevelConfig, LevelNumber, LEVELS, MAX_LEVEL};
pub use state::{EngineState, RejectReason, SelectOutcome, SessionPhase, SessionState};
pub use tick::{replay_session, GameRules, GameSession, TickResult, TimerKind};
pub use timer::{format_clock, Countdown};
