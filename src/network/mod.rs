//! Network Layer
//!
//! HTTP proxy endpoints, the WebSocket game channel and the Games ID client.
//! This layer is **non-deterministic** - all game rules run through `game/`.

pub mod identity;
pub mod leaderboard;
pub mod protocol;
pub mod server;
pub mod session;
pub mod submission;
pub mod upstream;

pub use identity::{
    format_address, lookup_username, resolve_wallet, validate_token, AuthConfig, AuthError,
    IdentityContext, IdentityError, TokenClaims, WalletIdentity,
};
pub use leaderboard::{LeaderboardClient, LeaderboardError, LeaderboardView};
pub use protocol::{
    ClientMessage, LeaderboardEntry, LeaderboardPage, ServerMessage, SessionSnapshot,
    SubmitScoreRequest,
};
pub use server::{router, AppState, GameServer, GameServerError, ServerConfig};
pub use session::{PlaySession, SessionError, SessionId, SessionManager};
pub use submission::{ScoreSubmissionResult, ScoreSubmitter, SubmissionState, SubmitError};
pub use upstream::{GamesIdApi, HttpGamesIdApi, UpstreamConfig, UpstreamError};
