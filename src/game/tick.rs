//! Session Driver
//!
//! Couples [`SessionState`] to a virtual-time [`Scheduler`]. The owner feeds
//! in selections and advances the clock; the driver fires pair resolution,
//! level advance and countdown timers in deterministic order and reports
//! what happened as [`GameEvent`]s.
//!
//! ## Timer ordering
//!
//! Timers due at the same instant fire as resolve, then advance, then
//! countdown. Once a board is cleared the countdown is cancelled until the
//! next level is dealt, so clearing the board always beats running out of
//! time.

use serde::{Serialize, Deserialize};
use tracing::debug;

use crate::{LEVEL_ADVANCE_DELAY_MS, REVEAL_DELAY_MS, TICK_INTERVAL_MS};
use crate::core::clock::{DueTimer, Millis, Scheduler};
use crate::core::rng::DeterministicRng;
use crate::game::board::{BoardError, TileId, CARD_FACES};
use crate::game::events::{EndReason, GameEvent, GameEventData};
use crate::game::state::{LevelAdvance, PairOutcome, SelectOutcome, SessionPhase, SessionState};
use crate::game::timer::CountdownTick;

/// Timers the driver schedules. Declaration order is firing priority.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TimerKind {
    /// Resolve the two flipped tiles.
    ResolvePair,
    /// Leave a cleared board.
    AdvanceLevel,
    /// One second of countdown.
    CountdownTick,
}

/// Timing and content rules for a session.
#[derive(Clone, Debug)]
pub struct GameRules {
    /// How long a flipped pair stays visible before resolving
    pub reveal_delay_ms: Millis,
    /// Pause between clearing a board and dealing the next
    pub advance_delay_ms: Millis,
    /// Length of one countdown second
    pub tick_interval_ms: Millis,
    /// Faces to deal from
    pub catalogue: &'static [&'static str],
}

impl Default for GameRules {
    fn default() -> Self {
        Self {
            reveal_delay_ms: REVEAL_DELAY_MS,
            advance_delay_ms: LEVEL_ADVANCE_DELAY_MS,
            tick_interval_ms: TICK_INTERVAL_MS,
            catalogue: &CARD_FACES,
        }
    }
}

/// What happened during a call into the driver.
#[derive(Debug, Default)]
pub struct TickResult {
    /// Events generated, in order
    pub events: Vec<GameEvent>,
    /// Whether the session is over
    pub session_ended: bool,
}

/// One player's game, driven in virtual time.
#[derive(Clone, Debug)]
pub struct GameSession {
    state: SessionState,
    scheduler: Scheduler<TimerKind>,
    rng: DeterministicRng,
    rules: GameRules,
    seed: u64,
    pending_events: Vec<GameEvent>,
}

impl GameSession {
    /// A session in the menu. Boards are dealt from `seed`.
    pub fn new(seed: u64, rules: GameRules) -> Self {
        Self {
            state: SessionState::new(rules.catalogue),
            scheduler: Scheduler::new(),
            rng: DeterministicRng::new(seed),
            rules,
            seed,
            pending_events: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Current virtual time.
    pub fn now(&self) -> Millis {
        self.scheduler.now()
    }

    /// Seed the boards are dealt from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Whether a timer of `kind` is pending.
    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.scheduler.is_scheduled(kind)
    }

    /// Start (or restart) at level 1 with score 0.
    pub fn start(&mut self) -> Result<TickResult, BoardError> {
        self.scheduler.clear();
        self.state.start(&mut self.rng)?;
        self.schedule_countdown();
        self.push(GameEventData::SessionStarted {
            level: self.state.level,
            time_limit_secs: self.state.countdown.limit_secs(),
        });
        Ok(self.collect())
    }

    /// Handle a tile selection at the current virtual time.
    pub fn select(&mut self, tile: TileId) -> SelectOutcome {
        let outcome = self.state.select(tile);
        match outcome {
            SelectOutcome::Flipped(id) => self.push_flip(id),
            SelectOutcome::PairRevealed { second, .. } => {
                self.push_flip(second);
                self.scheduler.schedule(TimerKind::ResolvePair, self.rules.reveal_delay_ms);
            }
            SelectOutcome::Rejected(reason) => {
                debug!("Selection of tile {} ignored: {:?}", tile, reason);
            }
        }
        outcome
    }

    /// Advance the virtual clock to `now`, firing every timer due on the way.
    pub fn advance(&mut self, now: Millis) -> Result<TickResult, BoardError> {
        while let Some(due) = self.scheduler.pop_due(now) {
            self.fire(due)?;
        }
        self.scheduler.advance_clock(now);
        Ok(self.collect())
    }

    /// Abandon the session and return to the menu.
    pub fn reset(&mut self) -> TickResult {
        self.scheduler.clear();
        self.state.reset();
        self.push(GameEventData::SessionReset);
        self.collect()
    }

    /// Drain events generated outside of [`advance`](Self::advance).
    pub fn take_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.pending_events)
    }

    fn fire(&mut self, due: DueTimer<TimerKind>) -> Result<(), BoardError> {
        match due.kind {
            TimerKind::ResolvePair => self.on_resolve(),
            TimerKind::AdvanceLevel => self.on_advance()?,
            TimerKind::CountdownTick => self.on_countdown(),
        }
        Ok(())
    }

    fn on_resolve(&mut self) {
        match self.state.resolve_pair() {
            Some(PairOutcome::Matched { first, second }) => {
                self.push(GameEventData::PairMatched {
                    first,
                    second,
                    score: self.state.score,
                });
                if self.state.is_level_complete() {
                    // The cleared board is safe from the clock.
                    self.scheduler.cancel_kind(TimerKind::CountdownTick);
                    self.state.countdown.stop();
                    self.push(GameEventData::LevelCompleted { level: self.state.level });
                    self.scheduler.schedule(TimerKind::AdvanceLevel, self.rules.advance_delay_ms);
                }
            }
            Some(PairOutcome::Mismatched { first, second }) => {
                self.push(GameEventData::PairMismatched { first, second });
            }
            None => {}
        }
    }

    fn on_advance(&mut self) -> Result<(), BoardError> {
        if self.state.phase != SessionPhase::Playing {
            return Ok(());
        }
        match self.state.advance_level(&mut self.rng)? {
            LevelAdvance::Next { level, bonus } => {
                self.push(GameEventData::LevelAdvanced {
                    level,
                    bonus,
                    score: self.state.score,
                    time_limit_secs: self.state.countdown.limit_secs(),
                });
                self.schedule_countdown();
            }
            LevelAdvance::Finished => self.finish(EndReason::AllLevelsCleared),
        }
        Ok(())
    }

    fn on_countdown(&mut self) {
        if self.state.phase != SessionPhase::Playing {
            return;
        }
        match self.state.countdown.tick() {
            CountdownTick::Running(remaining_secs) => {
                self.push(GameEventData::CountdownTick { remaining_secs });
                self.scheduler.schedule(TimerKind::CountdownTick, self.rules.tick_interval_ms);
            }
            CountdownTick::Expired => {
                self.push(GameEventData::CountdownTick { remaining_secs: 0 });
                self.finish(EndReason::TimeExpired);
            }
            CountdownTick::Stopped => {}
        }
    }

    /// End the session and release every pending timer.
    fn finish(&mut self, reason: EndReason) {
        self.state.end(reason);
        self.scheduler.clear();
        debug!("Session ended at level {}: {:?}", self.state.level, reason);
        self.push(GameEventData::SessionEnded {
            reason,
            level: self.state.level,
            score: self.state.score,
        });
    }

    fn schedule_countdown(&mut self) {
        self.scheduler.cancel_kind(TimerKind::CountdownTick);
        self.scheduler.schedule(TimerKind::CountdownTick, self.rules.tick_interval_ms);
    }

    fn push_flip(&mut self, tile: TileId) {
        let face = self.state.tiles()[tile].face.to_string();
        self.push(GameEventData::TileFlipped { tile, face });
    }

    fn push(&mut self, data: GameEventData) {
        self.pending_events.push(GameEvent::new(self.scheduler.now(), data));
    }

    fn collect(&mut self) -> TickResult {
        TickResult {
            events: self.take_events(),
            session_ended: self.state.is_ended(),
        }
    }
}

/// Replay recorded selections against a fresh session.
///
/// `inputs` are `(time, tile)` pairs in time order. The session is started at
/// time zero and finally advanced to `until`.
pub fn replay_session(
    seed: u64,
    rules: GameRules,
    inputs: &[(Millis, TileId)],
    until: Millis,
) -> Result<(GameSession, Vec<GameEvent>), BoardError> {
    let mut session = GameSession::new(seed, rules);
    let mut all_events = session.start()?.events;

    for &(at, tile) in inputs {
        all_events.extend(session.advance(at)?.events);
        if session.state().is_ended() {
            break;
        }
        session.select(tile);
        all_events.extend(session.take_events());
    }

    all_events.extend(session.advance(until.max(session.now()))?.events);
    Ok((session, all_events))
}

// =============================================================================
// TESTS
// =============================================================================
