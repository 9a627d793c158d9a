//! Games ID Service Client
//!
//! Outbound calls to the remote leaderboard, identity check and score
//! services. Everything that leaves the process goes through [`GamesIdApi`]
//! so the clients above it can be exercised against an in-memory fake.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::network::protocol::{
    CheckWalletResponse, ErrorBody, LeaderboardPage, SubmitScoreRequest, SubmitScoreResponse,
};

/// Default Games ID service.
pub const DEFAULT_BASE_URL: &str = "https://monad-games-id-site.vercel.app";

/// Default game identifier on the leaderboard.
pub const DEFAULT_GAME_ID: u32 = 204;

/// Upstream configuration.
#[derive(Clone, Debug)]
pub struct UpstreamConfig {
    /// Base URL of the Games ID service.
    pub base_url: String,
    /// Game identifier sent with leaderboard reads.
    pub game_id: u32,
    /// Leaderboard sort key.
    pub leaderboard_sort: String,
    /// Score submission endpoint.
    pub submit_score_url: String,
    /// Bearer token for score submission, if the endpoint wants one.
    pub submit_api_key: Option<String>,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            game_id: DEFAULT_GAME_ID,
            leaderboard_sort: "scores".to_string(),
            submit_score_url: format!("{}/api/submit-score", DEFAULT_BASE_URL),
            submit_api_key: None,
            timeout: Duration::from_secs(10),
        }
    }
}

impl UpstreamConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let base_url = std::env::var("GAMES_ID_BASE_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.base_url);
        let submit_score_url = std::env::var("SUBMIT_SCORE_URL")
            .unwrap_or_else(|_| format!("{}/api/submit-score", base_url));

        Self {
            game_id: env_parse("GAME_ID").unwrap_or(defaults.game_id),
            leaderboard_sort: std::env::var("LEADERBOARD_SORT").unwrap_or(defaults.leaderboard_sort),
            submit_api_key: std::env::var("SUBMIT_API_KEY").ok().filter(|k| !k.is_empty()),
            timeout: env_parse("UPSTREAM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            base_url,
            submit_score_url,
        }
    }
}

/// Parse an environment variable, warning when it is set but malformed.
pub(crate) fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let raw = std::env::var(key).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("Ignoring malformed {}={:?}", key, raw);
            None
        }
    }
}

/// Upstream errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpstreamError {
    /// Request never completed.
    #[error("upstream request failed: {0}")]
    Transport(String),

    /// Request timed out.
    #[error("upstream request timed out")]
    Timeout,

    /// Non-success status.
    #[error("upstream returned {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// `error` field of the body, if present.
        message: Option<String>,
    },

    /// Body was not the expected JSON.
    #[error("invalid upstream response: {0}")]
    InvalidBody(String),
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else {
            UpstreamError::Transport(err.to_string())
        }
    }
}

/// The remote Games ID service.
pub trait GamesIdApi: Send + Sync + 'static {
    /// Read one leaderboard page. `Ok(None)` when the service sends no body.
    fn leaderboard_page(
        &self,
        page: u32,
    ) -> impl Future<Output = Result<Option<LeaderboardPage>, UpstreamError>> + Send;

    /// Look up the username registered for a wallet.
    fn check_wallet(
        &self,
        wallet: &str,
    ) -> impl Future<Output = Result<CheckWalletResponse, UpstreamError>> + Send;

    /// Record a score.
    fn submit_score(
        &self,
        request: &SubmitScoreRequest,
    ) -> impl Future<Output = Result<SubmitScoreResponse, UpstreamError>> + Send;
}

/// [`GamesIdApi`] over HTTP.
#[derive(Clone, Debug)]
pub struct HttpGamesIdApi {
    client: reqwest::Client,
    config: UpstreamConfig,
}

impl HttpGamesIdApi {
    /// Build a client for `config`.
    pub fn new(config: UpstreamConfig) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("memory-match-server/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    /// Active configuration.
    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }
}

/// Turn a non-success response into [`UpstreamError::Status`].
async fn status_error(response: reqwest::Response) -> UpstreamError {
    let status = response.status().as_u16();
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .map(|body| body.error)
        .filter(|m| !m.is_empty());
    UpstreamError::Status { status, message }
}

impl GamesIdApi for HttpGamesIdApi {
    async fn leaderboard_page(&self, page: u32) -> Result<Option<LeaderboardPage>, UpstreamError> {
        let response = self
            .client
            .get(self.url("/api/leaderboard"))
            .query(&[
                ("page", page.to_string()),
                ("gameId", self.config.game_id.to_string()),
                ("sortBy", self.config.leaderboard_sort.clone()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body = response.bytes().await?;
        let value: serde_json::Value = if body.iter().all(u8::is_ascii_whitespace) {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&body).map_err(|e| UpstreamError::InvalidBody(e.to_string()))?
        };
        if value.is_null() {
            debug!("Leaderboard page {} came back empty", page);
            return Ok(None);
        }

        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| UpstreamError::InvalidBody(e.to_string()))
    }

    async fn check_wallet(&self, wallet: &str) -> Result<CheckWalletResponse, UpstreamError> {
        let response = self
            .client
            .get(self.url("/api/check-wallet"))
            .query(&[("wallet", wallet)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidBody(e.to_string()))
    }

    async fn submit_score(&self, request: &SubmitScoreRequest) -> Result<SubmitScoreResponse, UpstreamError> {
        let mut builder = self.client.post(&self.config.submit_score_url).json(request);
        if let Some(ref key) = self.config.submit_api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await?;

        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| UpstreamError::InvalidBody(e.to_string()))
    }
}

// =============================================================================
// TEST SUPPORT
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = UpstreamConfig::default();
        assert_eq!(config.game_id, 204);
        assert_eq!(config.leaderboard_sort, "scores");
        assert!(config.submit_score_url.ends_with("/api/submit-score"));
        assert!(config.submit_api_key.is_none());
    }

    #[test]
    fn test_http_client_builds() {
        let api = HttpGamesIdApi::new(UpstreamConfig::default()).unwrap();
        assert_eq!(api.url("/api/leaderboard"), format!("{}/api/leaderboard", DEFAULT_BASE_URL));
    }

    #[test]
    fn test_status_error_display() {
        let err = UpstreamError::Status { status: 502, message: None };
        assert_eq!(err.to_string(), "upstream returned 502");
    }
}
