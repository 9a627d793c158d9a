//! Level Table
//!
//! Five fixed levels of increasing board size and time limit.

use serde::{Serialize, Deserialize};

/// Highest level number.
pub const MAX_LEVEL: u8 = 5;

/// Board dimensions and time limit for one level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelConfig {
    /// Board rows
    pub rows: u8,
    /// Board columns
    pub columns: u8,
    /// Countdown length in whole seconds
    pub time_limit_secs: u32,
}

impl LevelConfig {
    /// Total tiles on the board.
    #[inline]
    pub const fn tile_count(&self) -> usize {
        self.rows as usize * self.columns as usize
    }

    /// Number of face pairs dealt.
    #[inline]
    pub const fn pair_count(&self) -> usize {
        self.tile_count() / 2
    }
}

/// Level configurations, indexed by `level - 1`.
///
/// Every entry has an even tile count so tiles pair exactly.
pub const LEVELS: [LevelConfig; MAX_LEVEL as usize] = [
    LevelConfig { rows: 3, columns: 4, time_limit_secs: 180 },
    LevelConfig { rows: 4, columns: 4, time_limit_secs: 210 },
    LevelConfig { rows: 4, columns: 5, time_limit_secs: 240 },
    LevelConfig { rows: 5, columns: 6, time_limit_secs: 300 },
    LevelConfig { rows: 8, columns: 8, time_limit_secs: 420 },
];

/// A level number in `1..=MAX_LEVEL`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct LevelNumber(u8);

impl LevelNumber {
    /// Level 1, where every session starts.
    pub const FIRST: LevelNumber = LevelNumber(1);

    /// Level 5.
    pub const LAST: LevelNumber = LevelNumber(MAX_LEVEL);

    /// Create from a raw number, rejecting anything outside `1..=5`.
    pub const fn new(level: u8) -> Option<Self> {
        if level >= 1 && level <= MAX_LEVEL {
            Some(Self(level))
        } else {
            None
        }
    }

    /// Raw level number.
    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Configuration for this level.
    #[inline]
    pub fn config(self) -> &'static LevelConfig {
        &LEVELS[(self.0 - 1) as usize]
    }

    /// The following level, or `None` after the last one.
    pub fn next(self) -> Option<LevelNumber> {
        Self::new(self.0 + 1)
    }

    /// Whether this is the final level.
    #[inline]
    pub fn is_last(self) -> bool {
        self.0 == MAX_LEVEL
    }
}

impl Default for LevelNumber {
    fn default() -> Self {
        Self::FIRST
    }
}

impl TryFrom<u8> for LevelNumber {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("level {} out of range 1..={}", value, MAX_LEVEL))
    }
}

impl From<LevelNumber> for u8 {
    fn from(level: LevelNumber) -> u8 {
        level.0
    }
}

impl std::fmt::Display for LevelNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
