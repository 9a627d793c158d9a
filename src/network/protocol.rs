//! Protocol Messages
//!
//! Wire format for the HTTP proxy endpoints and the live game channel.
//! HTTP bodies follow the Games ID service's camelCase JSON; WebSocket
//! messages are `type`-tagged snake_case JSON.

use serde::{Serialize, Deserialize};

use crate::game::board::TileId;
use crate::game::events::{EndReason, GameEvent};
use crate::game::level::LevelNumber;
use crate::game::state::{EngineState, SessionPhase, SessionState};
use crate::game::timer::format_clock;
use crate::network::submission::ScoreSubmissionResult;

// =============================================================================
// HTTP: LEADERBOARD
// =============================================================================

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// Upstream user id, when known.
    #[serde(default)]
    pub user_id: Option<u64>,
    /// 1-based rank.
    pub rank: u32,
    /// Player wallet address.
    pub wallet_address: String,
    /// Registered username, if any.
    #[serde(default)]
    pub username: Option<String>,
    /// Total score.
    pub score: u64,
}

/// Paging metadata returned with a leaderboard page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    /// Current page (1-based).
    pub page: u32,
    /// Entries per page.
    pub limit: u32,
    /// Total entries.
    pub total: u64,
    /// Total pages.
    pub total_pages: u32,
}

/// A page of leaderboard entries, as served by the Games ID service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaderboardPage {
    /// Entries on this page.
    pub data: Vec<LeaderboardEntry>,
    /// Paging metadata.
    pub pagination: Pagination,
}

/// `GET /api/leaderboard` response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardResponse {
    /// The upstream page, passed through.
    pub data: LeaderboardPage,
}

/// `GET /api/leaderboard` query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeaderboardQuery {
    /// Requested page, unparsed.
    pub page: Option<String>,
}

// =============================================================================
// HTTP: SCORE SUBMISSION
// =============================================================================

/// `POST /api/submit-score` request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScoreRequest {
    /// Wallet address credited with the score.
    #[serde(default)]
    pub player: String,
    /// Score to record.
    pub score_amount: u32,
    /// Transaction count to record.
    pub transaction_amount: u32,
}

/// Successful submission response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitScoreResponse {
    /// On-chain transaction hash, when the service reports one.
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

/// Error body used by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable message.
    pub error: String,
}

impl ErrorBody {
    /// Create an error body.
    pub fn new(message: impl Into<String>) -> Self {
        Self { error: message.into() }
    }
}

// =============================================================================
// HTTP: IDENTITY CHECK
// =============================================================================

/// `GET /api/check-wallet` query string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CheckWalletQuery {
    /// Wallet address to look up.
    pub wallet: Option<String>,
}

/// Identity check response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckWalletResponse {
    /// Whether the wallet has a registered username.
    #[serde(default)]
    pub has_username: bool,
    /// Registered user, if any.
    #[serde(default)]
    pub user: Option<CheckWalletUser>,
}

impl CheckWalletResponse {
    /// The username to display, if one is registered.
    pub fn username(&self) -> Option<&str> {
        if !self.has_username {
            return None;
        }
        self.user
            .as_ref()
            .and_then(|u| u.username.as_deref())
            .filter(|name| !name.is_empty())
    }
}

/// User record returned by the identity check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckWalletUser {
    /// Upstream user id.
    #[serde(default)]
    pub id: Option<u64>,
    /// Registered username.
    #[serde(default)]
    pub username: Option<String>,
    /// Wallet address.
    #[serde(default)]
    pub wallet_address: Option<String>,
}

// =============================================================================
// CLIENT -> SERVER MESSAGES
// =============================================================================

/// Messages sent from client to server over `/ws`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Present an identity token.
    Auth {
        /// Identity provider JWT.
        token: String,
    },

    /// Start (or restart) a game at level 1.
    Start,

    /// Select a tile on the current board.
    Select {
        /// Tile id.
        tile: TileId,
    },

    /// Abandon the game and return to the menu.
    Reset,

    /// Submit the final score of an ended game.
    SubmitScore,

    /// Ping for latency measurement.
    Ping {
        /// Client timestamp, echoed back.
        timestamp: u64,
    },

    /// Sign out.
    Logout,
}

// =============================================================================
// SERVER -> CLIENT MESSAGES
// =============================================================================

/// Messages sent from server to client over `/ws`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Authentication result.
    AuthResult(AuthResult),

    /// Full view of the session.
    Snapshot(SessionSnapshot),

    /// Game event notification.
    Event(GameEvent),

    /// Score submission outcome.
    Submission(ScoreSubmissionResult),

    /// Error message.
    Error(ServerError),

    /// Pong response.
    Pong {
        /// Client timestamp from the ping.
        timestamp: u64,
        /// Server wall clock (Unix millis).
        server_time: u64,
    },

    /// Server is shutting down.
    Shutdown {
        /// Reason shown to the player.
        reason: String,
    },
}

/// Authentication result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    /// Whether a wallet was resolved.
    pub success: bool,
    /// Session identifier.
    pub session_id: String,
    /// Resolved wallet address.
    pub wallet_address: Option<String>,
    /// Shortened wallet address for display.
    pub display_address: Option<String>,
    /// Registered username, if any.
    pub username: Option<String>,
    /// Message explaining a failure.
    pub error: Option<String>,
    /// Server version.
    pub server_version: String,
}

/// Error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerError {
    /// Error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// Error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Message could not be parsed.
    InvalidMessage,
    /// No identity token presented yet.
    NotAuthenticated,
    /// Token valid but no usable wallet.
    IdentityIncomplete,
    /// Request not valid in the current phase.
    InvalidState,
    /// Score submission failed.
    SubmissionFailed,
    /// Internal server error.
    InternalError,
}

// =============================================================================
// SESSION SNAPSHOT
// =============================================================================

/// A tile as the player may see it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileView {
    /// Tile id.
    pub id: TileId,
    /// Face value; hidden while the tile is face down.
    pub face: Option<String>,
    /// Currently flipped.
    pub flipped: bool,
    /// Already matched.
    pub matched: bool,
}

/// Serializable view of a session. Face-down tiles carry no face.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Coarse phase.
    pub phase: SessionPhase,
    /// Match engine state.
    pub engine: EngineState,
    /// Current level.
    pub level: LevelNumber,
    /// Board rows.
    pub rows: u8,
    /// Board columns.
    pub columns: u8,
    /// Accumulated score.
    pub score: u32,
    /// Seconds left on the countdown.
    pub time_left_secs: u32,
    /// Countdown formatted as `m:ss`.
    pub time_left: String,
    /// Matched pairs on this board.
    pub matched_pairs: usize,
    /// Total pairs on this board.
    pub total_pairs: usize,
    /// Why the session ended, if it has.
    pub end_reason: Option<EndReason>,
    /// Board, in position order.
    pub tiles: Vec<TileView>,
}

impl From<&SessionState> for SessionSnapshot {
    fn from(state: &SessionState) -> Self {
        let config = state.level.config();
        let remaining = state.countdown.remaining_secs();
        Self {
            phase: state.phase,
            engine: state.engine_state(),
            level: state.level,
            rows: config.rows,
            columns: config.columns,
            score: state.score,
            time_left_secs: remaining,
            time_left: format_clock(remaining),
            matched_pairs: state.matched_pairs(),
            total_pairs: state.total_pairs(),
            end_reason: state.end_reason,
            tiles: state
                .tiles()
                .iter()
                .map(|tile| TileView {
                    id: tile.id,
                    face: tile.is_face_up().then(|| tile.face.to_string()),
                    flipped: tile.flipped,
                    matched: tile.matched,
                })
                .collect(),
        }
    }
}

// =============================================================================
// SERIALIZATION HELPERS
// =============================================================================

impl ClientMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Deserialize from a binary frame holding JSON.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl ServerMessage {
    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserialize from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Build an error message.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ServerError {
            code,
            message: message.into(),
        })
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rng::DeterministicRng;
    use crate::game::events::GameEventData;

    #[test]
    fn test_client_message_json_shape() {
        let msg = ClientMessage::from_json(r#"{"type":"select","tile":7}"#).unwrap();
        assert_eq!(msg, ClientMessage::Select { tile: 7 });

        let msg = ClientMessage::from_json(r#"{"type":"submit_score"}"#).unwrap();
        assert_eq!(msg, ClientMessage::SubmitScore);

        let json = ClientMessage::Auth { token: "abc".into() }.to_json().unwrap();
        assert!(json.contains(r#""type":"auth""#));
    }

    #[test]
    fn test_binary_frame_carries_json() {
        let msg = ClientMessage::from_bytes(br#"{"type":"ping","timestamp":42}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping { timestamp: 42 });
    }

    #[test]
    fn test_unknown_message_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"teleport"}"#).is_err());
        assert!(ClientMessage::from_json("not json").is_err());
    }

    #[test]
    fn test_event_message_roundtrip() {
        let msg = ServerMessage::Event(GameEvent::new(
            3000,
            GameEventData::TileFlipped { tile: 4, face: "/card-images/doge.png".into() },
        ));
        let json = msg.to_json().unwrap();
        assert!(json.contains(r#""type":"event""#));
        assert!(json.contains(r#""kind":"tile_flipped""#));

        match ServerMessage::from_json(&json).unwrap() {
            ServerMessage::Event(event) => assert_eq!(event.at_ms, 3000),
            other => panic!("Wrong message type: {:?}", other),
        }
    }

    #[test]
    fn test_error_codes() {
        let json = ServerMessage::error(ErrorCode::IdentityIncomplete, "link your account")
            .to_json()
            .unwrap();
        assert!(json.contains("identity_incomplete"));
    }

    #[test]
    fn test_upstream_leaderboard_shape() {
        let body = r#"{
            "data": [
                {"userId": 3, "rank": 1, "walletAddress": "0xabc", "username": "ada", "score": 420}
            ],
            "pagination": {"page": 1, "limit": 10, "total": 1, "totalPages": 1}
        }"#;
        let page: LeaderboardPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.data[0].username.as_deref(), Some("ada"));
        assert_eq!(page.pagination.total_pages, 1);

        let wrapped = serde_json::to_value(LeaderboardResponse { data: page }).unwrap();
        assert_eq!(wrapped["data"]["pagination"]["totalPages"], 1);
        assert_eq!(wrapped["data"]["data"][0]["walletAddress"], "0xabc");
    }

    #[test]
    fn test_submit_request_shape() {
        let request = SubmitScoreRequest {
            player: "0xabc".into(),
            score_amount: 160,
            transaction_amount: 1,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["scoreAmount"], 160);
        assert_eq!(json["transactionAmount"], 1);

        let missing: SubmitScoreRequest =
            serde_json::from_str(r#"{"scoreAmount":5,"transactionAmount":1}"#).unwrap();
        assert!(missing.player.is_empty());
    }

    #[test]
    fn test_check_wallet_username() {
        let registered: CheckWalletResponse = serde_json::from_str(
            r#"{"hasUsername":true,"user":{"id":1,"username":"ada","walletAddress":"0xabc"}}"#,
        )
        .unwrap();
        assert_eq!(registered.username(), Some("ada"));

        let unregistered: CheckWalletResponse =
            serde_json::from_str(r#"{"hasUsername":false}"#).unwrap();
        assert_eq!(unregistered.username(), None);
    }

    #[test]
    fn test_snapshot_hides_face_down_tiles() {
        let mut rng = DeterministicRng::new(99);
        let mut state = SessionState::default();
        state.start(&mut rng).unwrap();
        state.select(3);

        let snapshot = SessionSnapshot::from(&state);
        assert_eq!(snapshot.tiles.len(), 12);
        assert_eq!((snapshot.rows, snapshot.columns), (3, 4));
        assert_eq!(snapshot.time_left, "3:00");
        assert!(snapshot.tiles[3].face.is_some());
        assert_eq!(snapshot.tiles.iter().filter(|t| t.face.is_some()).count(), 1);
    }
}
