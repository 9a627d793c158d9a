//! Score Submission
//!
//! Sends a finished game's score to the Games ID service. One request per
//! call, no retry, and at most one submission in flight per submitter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::network::identity::format_address;
use crate::network::protocol::SubmitScoreRequest;
use crate::network::upstream::{GamesIdApi, UpstreamError};

/// Transactions recorded with every submission.
pub const TRANSACTION_AMOUNT: u32 = 1;

/// Shown when the service rejects a submission without a message.
pub const DEFAULT_REJECTION: &str = "Failed to submit score";

/// Submission errors. Messages are shown to the player.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// No wallet to credit.
    #[error("Please connect your wallet to continue.")]
    MissingWallet,

    /// Another submission is outstanding.
    #[error("A score submission is already in progress.")]
    AlreadySubmitting,

    /// The service refused the score.
    #[error("{0}")]
    Rejected(String),

    /// The request never completed.
    #[error("Something went wrong. Please try again.")]
    Transport,
}

impl From<UpstreamError> for SubmitError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::Status { message, .. } => {
                SubmitError::Rejected(message.unwrap_or_else(|| DEFAULT_REJECTION.to_string()))
            }
            UpstreamError::Transport(_) | UpstreamError::Timeout | UpstreamError::InvalidBody(_) => {
                SubmitError::Transport
            }
        }
    }
}

/// Outcome of a submission, as displayed to the player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreSubmissionResult {
    /// Whether the score was recorded.
    pub success: bool,
    /// Transaction hash reported by the service.
    pub transaction_hash: Option<String>,
    /// Error message on failure.
    pub error: Option<String>,
    /// When the outcome was known.
    pub submitted_at: DateTime<Utc>,
}

impl ScoreSubmissionResult {
    /// A recorded score.
    pub fn succeeded(transaction_hash: Option<String>) -> Self {
        Self {
            success: true,
            transaction_hash,
            error: None,
            submitted_at: Utc::now(),
        }
    }

    /// A failed submission.
    pub fn failed(error: &SubmitError) -> Self {
        Self {
            success: false,
            transaction_hash: None,
            error: Some(error.to_string()),
            submitted_at: Utc::now(),
        }
    }
}

/// Submits scores, one at a time.
pub struct ScoreSubmitter<A> {
    api: Arc<A>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when dropped.
struct InFlightGuard<'a>(&'a AtomicBool);

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(flag))
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<A: GamesIdApi> ScoreSubmitter<A> {
    /// Create a submitter over `api`.
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Whether a submission is outstanding.
    pub fn is_submitting(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Submit `score` for `wallet`.
    pub async fn submit(&self, wallet: Option<&str>, score: u32) -> Result<ScoreSubmissionResult, SubmitError> {
        let wallet = wallet
            .map(str::trim)
            .filter(|w| !w.is_empty())
            .ok_or(SubmitError::MissingWallet)?;
        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(SubmitError::AlreadySubmitting)?;

        let request = SubmitScoreRequest {
            player: wallet.to_string(),
            score_amount: score,
            transaction_amount: TRANSACTION_AMOUNT,
        };

        match self.api.submit_score(&request).await {
            Ok(response) => {
                info!(
                    "Submitted score {} for {} (tx {})",
                    score,
                    format_address(wallet),
                    response.transaction_hash.as_deref().unwrap_or("-")
                );
                Ok(ScoreSubmissionResult::succeeded(response.transaction_hash))
            }
            Err(e) => {
                warn!("Error submitting score for {}: {}", format_address(wallet), e);
                Err(e.into())
            }
        }
    }
}

/// Proof that a submission was started for a given game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmissionTicket {
    generation: u64,
}

/// What the player sees of their submissions.
///
/// A failure sets the error but leaves the last recorded result alone.
#[derive(Debug, Clone, Default)]
pub struct SubmissionState {
    result: Option<ScoreSubmissionResult>,
    error: Option<String>,
    generation: u64,
}

impl SubmissionState {
    /// Start a submission: clears the error only.
    pub fn begin(&mut self) -> SubmissionTicket {
        self.error = None;
        SubmissionTicket {
            generation: self.generation,
        }
    }

    /// Land a submission outcome. Returns false if the game it belongs to
    /// has since been reset.
    pub fn complete(
        &mut self,
        ticket: SubmissionTicket,
        outcome: &Result<ScoreSubmissionResult, SubmitError>,
    ) -> bool {
        if ticket.generation != self.generation {
            return false;
        }
        match outcome {
            Ok(result) => {
                self.result = Some(result.clone());
                self.error = None;
            }
            Err(e) => self.error = Some(e.to_string()),
        }
        true
    }

    /// Record a failure that never reached the service.
    pub fn reject(&mut self, error: &SubmitError) {
        self.error = Some(error.to_string());
    }

    /// Orphan outstanding submissions.
    pub fn invalidate(&mut self) {
        self.generation += 1;
        self.error = None;
    }

    /// Last recorded result.
    pub fn result(&self) -> Option<&ScoreSubmissionResult> {
        self.result.as_ref()
    }

    /// Last error message.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::upstream::fake::FakeGamesIdApi;
    use std::time::Duration;

    const WALLET: &str = "0x1234567890abcdef1234567890abcdef12345678";

    #[tokio::test]
    async fn test_submit_sends_one_request() {
        let api = Arc::new(FakeGamesIdApi::default());
        let submitter = ScoreSubmitter::new(api.clone());

        let result = submitter.submit(Some(WALLET), 160).await.unwrap();
        assert!(result.success);
        assert_eq!(result.transaction_hash.as_deref(), Some("0xfeed"));

        let calls = api.submit_calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].player, WALLET);
        assert_eq!(calls[0].score_amount, 160);
        assert_eq!(calls[0].transaction_amount, TRANSACTION_AMOUNT);
    }

    #[tokio::test]
    async fn test_missing_wallet_sends_nothing() {
        let api = Arc::new(FakeGamesIdApi::default());
        let submitter = ScoreSubmitter::new(api.clone());

        assert_eq!(submitter.submit(None, 10).await, Err(SubmitError::MissingWallet));
        assert_eq!(submitter.submit(Some("  "), 10).await, Err(SubmitError::MissingWallet));
        assert_eq!(api.submit_call_count(), 0);
    }

    #[tokio::test]
    async fn test_rejection_message_passed_through() {
        let api = Arc::new(FakeGamesIdApi::default());
        *api.submit.lock().unwrap() = Some(Err(UpstreamError::Status {
            status: 400,
            message: Some("Score too high".into()),
        }));
        let submitter = ScoreSubmitter::new(api.clone());

        let err = submitter.submit(Some(WALLET), 10).await.unwrap_err();
        assert_eq!(err.to_string(), "Score too high");
        assert!(!submitter.is_submitting());
    }

    #[tokio::test]
    async fn test_rejection_without_message() {
        let api = Arc::new(FakeGamesIdApi::default());
        *api.submit.lock().unwrap() = Some(Err(UpstreamError::Status { status: 500, message: None }));
        let submitter = ScoreSubmitter::new(api);

        let err = submitter.submit(Some(WALLET), 10).await.unwrap_err();
        assert_eq!(err.to_string(), "Failed to submit score");
    }

    #[tokio::test]
    async fn test_transport_failure_message() {
        let api = Arc::new(FakeGamesIdApi::default());
        *api.submit.lock().unwrap() = Some(Err(UpstreamError::Transport("connection refused".into())));
        let submitter = ScoreSubmitter::new(api);

        let err = submitter.submit(Some(WALLET), 10).await.unwrap_err();
        assert_eq!(err.to_string(), "Something went wrong. Please try again.");
    }

    #[tokio::test]
    async fn test_second_submit_while_in_flight() {
        let api = Arc::new(FakeGamesIdApi {
            submit_delay: Some(Duration::from_millis(50)),
            ..Default::default()
        });
        let submitter = Arc::new(ScoreSubmitter::new(api.clone()));

        let first = {
            let submitter = submitter.clone();
            tokio::spawn(async move { submitter.submit(Some(WALLET), 10).await })
        };
        while !submitter.is_submitting() {
            tokio::task::yield_now().await;
        }

        assert_eq!(submitter.submit(Some(WALLET), 10).await, Err(SubmitError::AlreadySubmitting));
        assert!(first.await.unwrap().is_ok());
        assert_eq!(api.submit_call_count(), 1);
        assert!(!submitter.is_submitting());
    }

    #[test]
    fn test_failure_keeps_displayed_result() {
        let mut state = SubmissionState::default();
        let ticket = state.begin();
        state.complete(ticket, &Ok(ScoreSubmissionResult::succeeded(Some("0xaa".into()))));

        state.reject(&SubmitError::MissingWallet);
        assert_eq!(state.error(), Some("Please connect your wallet to continue."));
        assert_eq!(state.result().unwrap().transaction_hash.as_deref(), Some("0xaa"));

        let ticket = state.begin();
        assert!(state.error().is_none());
        state.complete(ticket, &Err(SubmitError::Transport));
        assert_eq!(state.result().unwrap().transaction_hash.as_deref(), Some("0xaa"));
    }

    #[test]
    fn test_stale_outcome_discarded() {
        let mut state = SubmissionState::default();
        let ticket = state.begin();
        state.invalidate();

        let landed = state.complete(ticket, &Ok(ScoreSubmissionResult::succeeded(None)));
        assert!(!landed);
        assert!(state.result().is_none());
    }

    #[test]
    fn test_result_json_shape() {
        let result = ScoreSubmissionResult::succeeded(Some("0xaa".into()));
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["transaction_hash"], "0xaa");
        assert!(json["submitted_at"].is_string());
    }
}
