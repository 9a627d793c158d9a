//! Session State and Match Engine
//!
//! Owns the board, the flipped and matched sets, score, level and phase.
//! Every mutation here is synchronous; delays are decided by the driver in
//! `game::tick`.

use std::collections::BTreeSet;
use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::{LEVEL_BONUS, MATCH_REWARD};
use crate::core::rng::DeterministicRng;
use crate::game::board::{generate_level_board, BoardError, Tile, TileId, CARD_FACES};
use crate::game::events::EndReason;
use crate::game::level::LevelNumber;
use crate::game::timer::Countdown;

/// Coarse session phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum SessionPhase {
    /// Not started, or reset
    #[default]
    Menu,
    /// Accepting selections
    Playing,
    /// Over; score may be submitted
    Ended,
}

/// Match engine state, derived from the flipped set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Nothing flipped.
    Idle,
    /// One tile flipped, waiting for the second.
    OneFlipped,
    /// Two tiles flipped, input locked until resolution.
    Resolving,
}

/// Why a selection was ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// Phase is not `Playing`.
    NotPlaying,
    /// A pair is being resolved.
    Resolving,
    /// The board is cleared and the next level has not been dealt.
    LevelComplete,
    /// No tile with that id.
    UnknownTile,
    /// Tile is already face up.
    AlreadyFlipped,
    /// Tile is already matched.
    AlreadyMatched,
}

/// Result of selecting a tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SelectOutcome {
    /// First tile of a pair turned up.
    Flipped(TileId),
    /// Second tile turned up; the pair is now resolving.
    PairRevealed {
        /// Tile flipped first
        first: TileId,
        /// Tile flipped second
        second: TileId,
    },
    /// Selection ignored.
    Rejected(RejectReason),
}

impl SelectOutcome {
    /// Whether the selection changed anything.
    pub fn is_accepted(&self) -> bool {
        !matches!(self, SelectOutcome::Rejected(_))
    }
}

/// Result of resolving a flipped pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PairOutcome {
    /// Faces matched; both tiles stay up.
    Matched {
        /// Tile flipped first
        first: TileId,
        /// Tile flipped second
        second: TileId,
    },
    /// Faces differed; both tiles turned back.
    Mismatched {
        /// Tile flipped first
        first: TileId,
        /// Tile flipped second
        second: TileId,
    },
}

/// Result of leaving a cleared board.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelAdvance {
    /// The next level was dealt.
    Next {
        /// New level
        level: LevelNumber,
        /// Bonus added to the score
        bonus: u32,
    },
    /// The last level was cleared; the session ended.
    Finished,
}

/// Complete state of one play-through.
#[derive(Clone, Debug)]
pub struct SessionState {
    /// Current level
    pub level: LevelNumber,

    /// Accumulated score
    pub score: u32,

    /// Coarse phase
    pub phase: SessionPhase,

    /// Set once the session ends
    pub end_reason: Option<EndReason>,

    /// Level countdown
    pub countdown: Countdown,

    tiles: Vec<Tile>,
    flipped: Vec<TileId>,
    matched: BTreeSet<TileId>,
    catalogue: &'static [&'static str],
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new(&CARD_FACES)
    }
}

impl SessionState {
    /// A session sitting in the menu.
    pub fn new(catalogue: &'static [&'static str]) -> Self {
        Self {
            level: LevelNumber::FIRST,
            score: 0,
            phase: SessionPhase::Menu,
            end_reason: None,
            countdown: Countdown::new(LevelNumber::FIRST.config().time_limit_secs),
            tiles: Vec::new(),
            flipped: Vec::with_capacity(2),
            matched: BTreeSet::new(),
            catalogue,
        }
    }

    /// Start a fresh play-through at level 1 with score 0.
    pub fn start(&mut self, rng: &mut DeterministicRng) -> Result<(), BoardError> {
        self.score = 0;
        self.end_reason = None;
        self.load_level(LevelNumber::FIRST, rng)?;
        self.phase = SessionPhase::Playing;
        Ok(())
    }

    /// Deal a new board for `level` and restart the countdown.
    fn load_level(&mut self, level: LevelNumber, rng: &mut DeterministicRng) -> Result<(), BoardError> {
        let config = level.config();
        self.tiles = generate_level_board(config, self.catalogue, rng)?;
        self.level = level;
        self.flipped.clear();
        self.matched.clear();
        self.countdown.reset(config.time_limit_secs);
        debug!(
            "Dealt level {} ({}x{}, {}s)",
            level, config.rows, config.columns, config.time_limit_secs
        );
        Ok(())
    }

    /// Current match engine state.
    pub fn engine_state(&self) -> EngineState {
        match self.flipped.len() {
            0 => EngineState::Idle,
            1 => EngineState::OneFlipped,
            _ => EngineState::Resolving,
        }
    }

    /// Turn a tile face up if the rules allow it.
    pub fn select(&mut self, tile_id: TileId) -> SelectOutcome {
        if self.phase != SessionPhase::Playing {
            return SelectOutcome::Rejected(RejectReason::NotPlaying);
        }
        if self.engine_state() == EngineState::Resolving {
            return SelectOutcome::Rejected(RejectReason::Resolving);
        }
        if self.is_level_complete() {
            return SelectOutcome::Rejected(RejectReason::LevelComplete);
        }

        let Some(tile) = self.tiles.get_mut(tile_id) else {
            return SelectOutcome::Rejected(RejectReason::UnknownTile);
        };
        if tile.matched {
            return SelectOutcome::Rejected(RejectReason::AlreadyMatched);
        }
        if tile.flipped {
            return SelectOutcome::Rejected(RejectReason::AlreadyFlipped);
        }

        tile.flipped = true;
        self.flipped.push(tile_id);

        match self.flipped.as_slice() {
            [first, second] => SelectOutcome::PairRevealed {
                first: *first,
                second: *second,
            },
            _ => SelectOutcome::Flipped(tile_id),
        }
    }

    /// Resolve the two flipped tiles. Returns `None` unless a pair is flipped.
    pub fn resolve_pair(&mut self) -> Option<PairOutcome> {
        let &[first, second] = self.flipped.as_slice() else {
            return None;
        };
        self.flipped.clear();

        let matched = self.tiles[first].face == self.tiles[second].face;
        for id in [first, second] {
            let tile = &mut self.tiles[id];
            tile.flipped = false;
            if matched {
                tile.matched = true;
                self.matched.insert(id);
            }
        }

        if matched {
            self.score += MATCH_REWARD;
            Some(PairOutcome::Matched { first, second })
        } else {
            Some(PairOutcome::Mismatched { first, second })
        }
    }

    /// Whether every tile on the board is matched.
    pub fn is_level_complete(&self) -> bool {
        !self.tiles.is_empty() && self.matched.len() == self.tiles.len()
    }

    /// Leave a cleared board: deal the next level or finish the session.
    pub fn advance_level(&mut self, rng: &mut DeterministicRng) -> Result<LevelAdvance, BoardError> {
        match self.level.next() {
            Some(next) => {
                self.score += LEVEL_BONUS;
                self.load_level(next, rng)?;
                Ok(LevelAdvance::Next {
                    level: next,
                    bonus: LEVEL_BONUS,
                })
            }
            None => {
                self.end(EndReason::AllLevelsCleared);
                Ok(LevelAdvance::Finished)
            }
        }
    }

    /// End the session. Flipped tiles stay as they are.
    pub fn end(&mut self, reason: EndReason) {
        if self.phase == SessionPhase::Playing {
            self.phase = SessionPhase::Ended;
            self.end_reason = Some(reason);
        }
        self.countdown.stop();
    }

    /// Back to the menu: level 1, score 0, no board.
    pub fn reset(&mut self) {
        *self = Self::new(self.catalogue);
    }

    /// Tiles on the current board.
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Currently flipped tile ids, in flip order.
    pub fn flipped(&self) -> &[TileId] {
        &self.flipped
    }

    /// Matched tile ids.
    pub fn matched(&self) -> &BTreeSet<TileId> {
        &self.matched
    }

    /// Number of matched pairs on the current board.
    pub fn matched_pairs(&self) -> usize {
        self.matched.len() / 2
    }

    /// Total pairs on the current board.
    pub fn total_pairs(&self) -> usize {
        self.tiles.len() / 2
    }

    /// Whether the session has ended.
    pub fn is_ended(&self) -> bool {
        self.phase == SessionPhase::Ended
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn playing() -> (SessionState, DeterministicRng) {
        let mut rng = DeterministicRng::new(12345);
        let mut state = SessionState::default();
        state.start(&mut rng).unwrap();
        (state, rng)
    }

    /// Two tiles that share a face.
    fn matching_pair(state: &SessionState) -> (TileId, TileId) {
        let tiles = state.tiles();
        for a in tiles.iter().filter(|t| !t.matched) {
            if let Some(b) = tiles.iter().find(|b| b.id != a.id && !b.matched && b.face == a.face) {
                return (a.id, b.id);
            }
        }
        panic!("no unmatched pair left");
    }

    /// Two tiles with different faces.
    fn mismatching_pair(state: &SessionState) -> (TileId, TileId) {
        let tiles = state.tiles();
        let a = &tiles[0];
        let b = tiles.iter().find(|b| b.face != a.face).unwrap();
        (a.id, b.id)
    }

    #[test]
    fn test_start_deals_level_one() {
        let (state, _) = playing();
        assert_eq!(state.phase, SessionPhase::Playing);
        assert_eq!(state.level, LevelNumber::FIRST);
        assert_eq!(state.score, 0);
        assert_eq!(state.tiles().len(), 12);
        assert_eq!(state.countdown.remaining_secs(), 180);
        assert_eq!(state.engine_state(), EngineState::Idle);
    }

    #[test]
    fn test_select_rejected_in_menu() {
        let mut state = SessionState::default();
        assert_eq!(state.select(0), SelectOutcome::Rejected(RejectReason::NotPlaying));
    }

    #[test]
    fn test_select_transitions() {
        let (mut state, _) = playing();
        let (a, b) = mismatching_pair(&state);

        assert_eq!(state.select(a), SelectOutcome::Flipped(a));
        assert_eq!(state.engine_state(), EngineState::OneFlipped);
        assert_eq!(state.select(a), SelectOutcome::Rejected(RejectReason::AlreadyFlipped));

        assert_eq!(state.select(b), SelectOutcome::PairRevealed { first: a, second: b });
        assert_eq!(state.engine_state(), EngineState::Resolving);
    }

    #[test]
    fn test_third_selection_is_noop() {
        let (mut state, _) = playing();
        let (a, b) = mismatching_pair(&state);
        let c = (0..state.tiles().len()).find(|id| *id != a && *id != b).unwrap();

        state.select(a);
        state.select(b);
        assert_eq!(state.select(c), SelectOutcome::Rejected(RejectReason::Resolving));
        assert_eq!(state.flipped(), &[a, b]);
        assert!(!state.tiles()[c].flipped);
    }

    #[test]
    fn test_unknown_tile() {
        let (mut state, _) = playing();
        assert_eq!(state.select(99), SelectOutcome::Rejected(RejectReason::UnknownTile));
    }

    #[test]
    fn test_match_awards_points() {
        let (mut state, _) = playing();
        let (a, b) = matching_pair(&state);

        state.select(a);
        state.select(b);
        assert_eq!(state.resolve_pair(), Some(PairOutcome::Matched { first: a, second: b }));

        assert_eq!(state.score, MATCH_REWARD);
        assert_eq!(state.matched().len(), 2);
        assert!(state.flipped().is_empty());
        assert!(state.tiles()[a].matched && state.tiles()[b].matched);
        assert_eq!(state.select(a), SelectOutcome::Rejected(RejectReason::AlreadyMatched));
    }

    #[test]
    fn test_mismatch_turns_back() {
        let (mut state, _) = playing();
        let (a, b) = mismatching_pair(&state);

        state.select(a);
        state.select(b);
        assert_eq!(state.resolve_pair(), Some(PairOutcome::Mismatched { first: a, second: b }));

        assert_eq!(state.score, 0);
        assert!(state.matched().is_empty());
        assert!(state.flipped().is_empty());
        assert!(!state.tiles()[a].flipped && !state.tiles()[b].flipped);
        assert_eq!(state.engine_state(), EngineState::Idle);
    }

    #[test]
    fn test_resolve_without_pair() {
        let (mut state, _) = playing();
        assert_eq!(state.resolve_pair(), None);
        state.select(0);
        assert_eq!(state.resolve_pair(), None);
        assert_eq!(state.flipped(), &[0]);
    }

    #[test]
    fn test_clear_level_and_advance() {
        let (mut state, mut rng) = playing();
        while !state.is_level_complete() {
            let (a, b) = matching_pair(&state);
            state.select(a);
            state.select(b);
            state.resolve_pair();
        }
        assert_eq!(state.score, 60);
        assert_eq!(state.select(0), SelectOutcome::Rejected(RejectReason::LevelComplete));

        let advance = state.advance_level(&mut rng).unwrap();
        assert_eq!(advance, LevelAdvance::Next { level: LevelNumber::new(2).unwrap(), bonus: LEVEL_BONUS });
        assert_eq!(state.score, 160);
        assert_eq!(state.tiles().len(), 16);
        assert!(state.matched().is_empty());
        assert_eq!(state.countdown.remaining_secs(), 210);
    }

    #[test]
    fn test_last_level_finishes() {
        let (mut state, mut rng) = playing();
        state.level = LevelNumber::LAST;
        let score = state.score;

        assert_eq!(state.advance_level(&mut rng).unwrap(), LevelAdvance::Finished);
        assert_eq!(state.phase, SessionPhase::Ended);
        assert_eq!(state.end_reason, Some(EndReason::AllLevelsCleared));
        assert_eq!(state.level, LevelNumber::LAST);
        assert_eq!(state.score, score);
    }

    #[test]
    fn test_reset_returns_to_menu() {
        let (mut state, _) = playing();
        state.score = 40;
        state.reset();

        assert_eq!(state.phase, SessionPhase::Menu);
        assert_eq!(state.score, 0);
        assert_eq!(state.level, LevelNumber::FIRST);
        assert!(state.tiles().is_empty());
        assert!(!state.is_level_complete());
    }
}
