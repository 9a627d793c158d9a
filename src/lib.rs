//! # Memory Match Game Server
//!
//! Timed memory-matching game with wallet identity, a Games ID leaderboard
//! proxy and on-chain score submission.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   MEMORY MATCH SERVER                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/            - Deterministic primitives                 │
//! │  ├── rng.rs       - Seeded Xorshift128+ PRNG                 │
//! │  └── clock.rs     - Virtual-time timer scheduler             │
//! │                                                              │
//! │  game/            - Game rules (deterministic)               │
//! │  ├── level.rs     - Level table                              │
//! │  ├── board.rs     - Deck dealing                             │
//! │  ├── timer.rs     - Level countdown                          │
//! │  ├── state.rs     - Session state and match engine           │
//! │  ├── tick.rs      - Timer-driven session driver              │
//! │  └── events.rs    - Game events                              │
//! │                                                              │
//! │  network/         - Networking (non-deterministic)           │
//! │  ├── upstream.rs  - Games ID HTTP client                     │
//! │  ├── identity.rs  - Token validation, wallet resolution      │
//! │  ├── leaderboard.rs - Paginated leaderboard                  │
//! │  ├── submission.rs  - Score submission                       │
//! │  ├── session.rs   - Play session management                  │
//! │  ├── protocol.rs  - HTTP and WebSocket message types         │
//! │  └── server.rs    - axum HTTP + WebSocket server             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! The `core/` and `game/` modules never read the system clock or global
//! randomness. Time advances only through [`game::GameSession::advance`]
//! and boards are dealt from a seeded [`DeterministicRng`], so a seed plus
//! a timestamped list of selections replays a session exactly.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod game;
pub mod network;

// Re-export commonly used types
pub use core::clock::Millis;
pub use core::rng::DeterministicRng;
pub use game::state::{SessionPhase, SessionState};
pub use game::tick::{GameRules, GameSession};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Points for each matched pair.
pub const MATCH_REWARD: u32 = 10;

/// Points for clearing a level before its timer runs out.
pub const LEVEL_BONUS: u32 = 100;

/// How long a selected pair stays face up before it is resolved.
pub const REVEAL_DELAY_MS: Millis = 1000;

/// Pause between clearing a level and dealing the next one.
pub const LEVEL_ADVANCE_DELAY_MS: Millis = 1000;

/// Countdown resolution.
pub const TICK_INTERVAL_MS: Millis = 1000;
