//! Game Events
//!
//! Everything the session driver reports back to its owner.

use serde::{Serialize, Deserialize};

use crate::core::clock::Millis;
use crate::game::board::TileId;
use crate::game::level::LevelNumber;

/// Why a session stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The countdown reached zero.
    TimeExpired,
    /// The final level's board was cleared.
    AllLevelsCleared,
}

/// Game event data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GameEventData {
    /// A session started at level 1.
    SessionStarted {
        level: LevelNumber,
        time_limit_secs: u32,
    },

    /// A tile was turned face up.
    TileFlipped {
        tile: TileId,
        face: String,
    },

    /// Two flipped tiles matched.
    PairMatched {
        first: TileId,
        second: TileId,
        score: u32,
    },

    /// Two flipped tiles did not match and were turned back.
    PairMismatched {
        first: TileId,
        second: TileId,
    },

    /// Every tile on the board is matched.
    LevelCompleted {
        level: LevelNumber,
    },

    /// The next level was dealt.
    LevelAdvanced {
        level: LevelNumber,
        bonus: u32,
        score: u32,
        time_limit_secs: u32,
    },

    /// One second of the countdown elapsed.
    CountdownTick {
        remaining_secs: u32,
    },

    /// The session is over.
    SessionEnded {
        reason: EndReason,
        level: LevelNumber,
        score: u32,
    },

    /// The session returned to the menu.
    SessionReset,
}

/// A game event with its virtual timestamp.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    /// Virtual time of the event
    pub at_ms: Millis,
    /// Event data
    pub data: GameEventData,
}

impl GameEvent {
    /// Create a new event.
    pub fn new(at_ms: Millis, data: GameEventData) -> Self {
        Self { at_ms, data }
    }

    /// Whether this event ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self.data, GameEventData::SessionEnded { .. })
    }
}
