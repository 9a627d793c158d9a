//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};

use memory_match::network::identity::{
    EmbeddedWallet, LinkedAccount, ProviderApp, TokenClaims, GAMES_ID_PROVIDER_APP_ID,
};
use memory_match::network::protocol::{
    CheckWalletResponse, CheckWalletUser, LeaderboardEntry, LeaderboardPage, Pagination,
    SubmitScoreRequest, SubmitScoreResponse,
};
use memory_match::network::{AppState, AuthConfig, GamesIdApi, ServerConfig, UpstreamError};

pub const SECRET: &str = "integration-secret";
pub const WALLET: &str = "0xabcdef0123456789abcdef0123456789abcdef01";

/// Games ID stand-in with scripted answers.
#[derive(Default)]
pub struct StubGamesId {
    pub total_pages: u32,
    pub leaderboard_failure: Mutex<Option<UpstreamError>>,
    pub leaderboard_empty: Mutex<bool>,
    pub submit_failure: Mutex<Option<UpstreamError>>,
    pub usernames: Mutex<Vec<(String, String)>>,
    pub leaderboard_calls: Mutex<Vec<u32>>,
    pub submissions: Mutex<Vec<SubmitScoreRequest>>,
}

impl StubGamesId {
    pub fn new() -> Self {
        Self {
            total_pages: 3,
            ..Default::default()
        }
    }

    pub fn with_username(self, wallet: &str, name: &str) -> Self {
        self.usernames.lock().unwrap().push((wallet.into(), name.into()));
        self
    }
}

impl GamesIdApi for StubGamesId {
    async fn leaderboard_page(&self, page: u32) -> Result<Option<LeaderboardPage>, UpstreamError> {
        self.leaderboard_calls.lock().unwrap().push(page);
        if let Some(err) = self.leaderboard_failure.lock().unwrap().clone() {
            return Err(err);
        }
        if *self.leaderboard_empty.lock().unwrap() {
            return Ok(None);
        }
        Ok(Some(LeaderboardPage {
            data: vec![LeaderboardEntry {
                user_id: Some(7),
                rank: page * 10 - 9,
                wallet_address: WALLET.into(),
                username: Some("grace".into()),
                score: 1110,
            }],
            pagination: Pagination {
                page,
                limit: 10,
                total: u64::from(self.total_pages) * 10,
                total_pages: self.total_pages,
            },
        }))
    }

    async fn check_wallet(&self, wallet: &str) -> Result<CheckWalletResponse, UpstreamError> {
        let found = self
            .usernames
            .lock()
            .unwrap()
            .iter()
            .find(|(w, _)| w == wallet)
            .cloned();
        Ok(match found {
            Some((wallet, name)) => CheckWalletResponse {
                has_username: true,
                user: Some(CheckWalletUser {
                    id: Some(7),
                    username: Some(name),
                    wallet_address: Some(wallet),
                }),
            },
            None => CheckWalletResponse::default(),
        })
    }

    async fn submit_score(&self, request: &SubmitScoreRequest) -> Result<SubmitScoreResponse, UpstreamError> {
        self.submissions.lock().unwrap().push(request.clone());
        if let Some(err) = self.submit_failure.lock().unwrap().clone() {
            return Err(err);
        }
        Ok(SubmitScoreResponse {
            transaction_hash: Some("0xbeef".into()),
        })
    }
}

pub fn auth_config() -> AuthConfig {
    AuthConfig {
        secret: Some(SECRET.into()),
        ..Default::default()
    }
}

pub fn app_state(api: Arc<StubGamesId>) -> Arc<AppState<StubGamesId>> {
    AppState::new(ServerConfig::default(), auth_config(), api)
}

/// Claims carrying a Games ID cross-app account with `wallet`.
pub fn claims_for(wallet: &str) -> TokenClaims {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    TokenClaims {
        sub: "did:privy:player-1".into(),
        exp: now + 3600,
        iat: now,
        iss: None,
        aud: None,
        linked_accounts: vec![LinkedAccount {
            kind: "cross_app".into(),
            provider_app: Some(ProviderApp {
                id: GAMES_ID_PROVIDER_APP_ID.into(),
            }),
            provider_app_id: None,
            embedded_wallets: vec![EmbeddedWallet {
                address: wallet.into(),
            }],
        }],
    }
}

pub fn token_for(claims: &TokenClaims) -> String {
    encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}
