//! Play Session Management
//!
//! One play session per live connection: the player's identity, their game
//! and what they have submitted. Wall-clock time enters here and nowhere
//! deeper; the game itself only sees virtual milliseconds.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::core::clock::Millis;
use crate::core::rng::derive_session_seed;
use crate::game::board::{BoardError, TileId};
use crate::game::events::GameEvent;
use crate::game::state::{SelectOutcome, SessionPhase};
use crate::game::tick::{GameRules, GameSession, TickResult};
use crate::network::identity::{IdentityContext, IdentityError, TokenClaims, WalletIdentity};
use crate::network::protocol::SessionSnapshot;
use crate::network::submission::{
    ScoreSubmissionResult, SubmissionState, SubmissionTicket, SubmitError,
};

/// Unique session identifier.
pub type SessionId = Uuid;

/// Everything needed to send one submission.
#[derive(Debug, Clone)]
pub struct PendingSubmission {
    /// Ticket to land the outcome with.
    pub ticket: SubmissionTicket,
    /// Wallet to credit.
    pub wallet: String,
    /// Final score.
    pub score: u32,
}

/// Session errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No usable wallet.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Board could not be dealt.
    #[error(transparent)]
    Board(#[from] BoardError),

    /// Scores can only be submitted once the game is over.
    #[error("Finish the game before submitting a score.")]
    NotEnded,
}

/// A player's live session.
pub struct PlaySession {
    /// Unique session identifier.
    pub id: SessionId,
    identity: IdentityContext,
    game: GameSession,
    submission: SubmissionState,
    rules: GameRules,
    /// Wall-clock origin of the current game's virtual time.
    epoch: Instant,
    last_activity: Instant,
}

impl PlaySession {
    /// Create a new session in the menu.
    pub fn new(id: SessionId, rules: GameRules) -> Self {
        let now = Instant::now();
        Self {
            id,
            identity: IdentityContext::default(),
            game: GameSession::new(0, rules.clone()),
            submission: SubmissionState::default(),
            rules,
            epoch: now,
            last_activity: now,
        }
    }

    /// Apply validated identity claims.
    pub fn authenticate(&mut self, claims: &TokenClaims, provider_app_id: &str) -> Result<WalletIdentity, IdentityError> {
        self.touch();
        self.identity.sign_in(claims, provider_app_id).cloned()
    }

    /// Record the username looked up for the signed-in wallet.
    pub fn set_username(&mut self, username: Option<String>) {
        self.identity.set_username(username);
    }

    /// Sign out and abandon any game in progress.
    pub fn logout(&mut self) -> TickResult {
        info!("Session {} logged out", self.id);
        self.identity.logout();
        self.reset()
    }

    /// Current identity state.
    pub fn identity(&self) -> &IdentityContext {
        &self.identity
    }

    /// The game.
    pub fn game(&self) -> &GameSession {
        &self.game
    }

    /// Submission state.
    pub fn submission(&self) -> &SubmissionState {
        &self.submission
    }

    /// Virtual time of the current game.
    pub fn elapsed_ms(&self) -> Millis {
        u64::try_from(self.epoch.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// Start a new game. Requires a resolved wallet; the boards are dealt
    /// from a seed bound to that wallet.
    pub fn start(&mut self) -> Result<TickResult, SessionError> {
        self.touch();
        let wallet = self.identity.require_wallet()?;
        let nonce = Uuid::new_v4().into_bytes();
        let seed = derive_session_seed(wallet, &nonce);

        let mut game = GameSession::new(seed, self.rules.clone());
        let started = game.start()?;
        self.game = game;
        self.epoch = Instant::now();
        self.submission.invalidate();

        info!("Session {} started a game (seed {:016x})", self.id, seed);
        Ok(started)
    }

    /// Select a tile. Timers due before the selection fire first.
    pub fn select(&mut self, tile: TileId) -> Result<(SelectOutcome, Vec<GameEvent>), SessionError> {
        self.touch();
        let mut events = self.game.advance(self.elapsed_ms())?.events;
        let outcome = self.game.select(tile);
        events.extend(self.game.take_events());
        Ok((outcome, events))
    }

    /// Fire every timer due by now.
    pub fn advance(&mut self) -> Result<TickResult, SessionError> {
        Ok(self.game.advance(self.elapsed_ms())?)
    }

    /// Abandon the game and return to the menu.
    pub fn reset(&mut self) -> TickResult {
        self.touch();
        self.submission.invalidate();
        self.game.reset()
    }

    /// Prepare a submission of the ended game's score.
    pub fn begin_submission(&mut self) -> Result<PendingSubmission, SessionError> {
        self.touch();
        if self.game.state().phase != SessionPhase::Ended {
            return Err(SessionError::NotEnded);
        }
        let wallet = match self.identity.require_wallet() {
            Ok(wallet) => wallet.to_string(),
            Err(e) => {
                self.submission.reject(&SubmitError::MissingWallet);
                return Err(e.into());
            }
        };
        Ok(PendingSubmission {
            ticket: self.submission.begin(),
            wallet,
            score: self.game.state().score,
        })
    }

    /// Land a submission outcome. Returns false if the game has since been
    /// reset or restarted.
    pub fn complete_submission(
        &mut self,
        ticket: SubmissionTicket,
        outcome: &Result<ScoreSubmissionResult, SubmitError>,
    ) -> bool {
        let landed = self.submission.complete(ticket, outcome);
        if !landed {
            debug!("Session {} dropped a stale submission outcome", self.id);
        }
        landed
    }

    /// Wire view of the game.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot::from(self.game.state())
    }

    /// Note activity.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Manages all live sessions.
#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<BTreeMap<SessionId, Arc<RwLock<PlaySession>>>>,
}

impl SessionManager {
    /// Create new session manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new session.
    pub async fn create_session(&self, rules: GameRules) -> (SessionId, Arc<RwLock<PlaySession>>) {
        let id = Uuid::new_v4();
        let session = Arc::new(RwLock::new(PlaySession::new(id, rules)));

        let mut sessions = self.sessions.write().await;
        sessions.insert(id, session.clone());

        (id, session)
    }

    /// Get a session by ID.
    pub async fn get_session(&self, id: &SessionId) -> Option<Arc<RwLock<PlaySession>>> {
        let sessions = self.sessions.read().await;
        sessions.get(id).cloned()
    }

    /// Remove a session.
    pub async fn remove_session(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(id).is_some()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Remove sessions idle for longer than `timeout`. Returns their ids.
    pub async fn cleanup_idle(&self, timeout: Duration) -> Vec<SessionId> {
        let mut sessions = self.sessions.write().await;
        let mut to_remove = Vec::new();

        for (id, session) in sessions.iter() {
            let s = session.read().await;
            if s.idle_for() > timeout {
                to_remove.push(*id);
            }
        }

        for id in &to_remove {
            sessions.remove(id);
        }

        to_remove
    }
}

// =============================================================================
// TESTS
// =============================================================================
