//! Wallet Identity
//!
//! Validates identity tokens issued by the wallet provider and resolves the
//! player's wallet from the linked Games ID cross-app account. The server
//! does NOT issue tokens, only validates them.

use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, warn};

use crate::network::upstream::GamesIdApi;

/// Provider app id of the Games ID cross-app account.
pub const GAMES_ID_PROVIDER_APP_ID: &str = "cmd8euall0037le0my79qpz42";

/// Authentication configuration.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
    /// Expected audience claim ("aud"). If None, any audience accepted.
    pub audience: Option<String>,
    /// Provider verification key in PEM format.
    pub public_key_pem: Option<String>,
    /// Algorithm of `public_key_pem` (ES256 or RS256).
    pub key_algorithm: Algorithm,
    /// HS256 secret (fallback for simple setups).
    pub secret: Option<String>,
    /// Whether to skip expiry validation (for testing only).
    pub skip_expiry: bool,
    /// Provider app id whose cross-app account carries the wallet.
    pub provider_app_id: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            public_key_pem: None,
            key_algorithm: Algorithm::ES256,
            secret: None,
            skip_expiry: false,
            provider_app_id: GAMES_ID_PROVIDER_APP_ID.to_string(),
        }
    }
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let key_algorithm = match std::env::var("AUTH_KEY_ALGORITHM") {
            Ok(raw) => raw.parse().unwrap_or_else(|_| {
                warn!("Unknown AUTH_KEY_ALGORITHM {:?}, using ES256", raw);
                Algorithm::ES256
            }),
            Err(_) => Algorithm::ES256,
        };

        Self {
            issuer: std::env::var("AUTH_ISSUER").ok(),
            audience: std::env::var("AUTH_AUDIENCE").ok(),
            public_key_pem: std::env::var("AUTH_PUBLIC_KEY_PEM").ok(),
            key_algorithm,
            secret: std::env::var("AUTH_SECRET").ok(),
            skip_expiry: std::env::var("AUTH_SKIP_EXPIRY")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
            provider_app_id: std::env::var("CROSS_APP_PROVIDER_ID")
                .unwrap_or_else(|_| GAMES_ID_PROVIDER_APP_ID.to_string()),
        }
    }

    /// Check if authentication is configured.
    pub fn is_configured(&self) -> bool {
        self.public_key_pem.is_some() || self.secret.is_some()
    }
}

// =============================================================================
// CLAIMS
// =============================================================================

/// Claims we read from identity tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject, the provider's user id.
    pub sub: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
    /// Audience.
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Accounts linked to the user. Providers send this either as an array
    /// or as a JSON-encoded string.
    #[serde(default, deserialize_with = "linked_accounts_claim")]
    pub linked_accounts: Vec<LinkedAccount>,
}

/// An account linked to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAccount {
    /// Account type, e.g. `cross_app` or `wallet`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Provider app, nested form.
    #[serde(default, alias = "providerApp")]
    pub provider_app: Option<ProviderApp>,
    /// Provider app id, flat form.
    #[serde(default, alias = "providerAppId")]
    pub provider_app_id: Option<String>,
    /// Wallets embedded in the account, oldest first.
    #[serde(default, alias = "embeddedWallets")]
    pub embedded_wallets: Vec<EmbeddedWallet>,
}

impl LinkedAccount {
    /// Provider app id, from whichever form the token used.
    pub fn provider_id(&self) -> Option<&str> {
        self.provider_app
            .as_ref()
            .map(|app| app.id.as_str())
            .or(self.provider_app_id.as_deref())
    }

    /// Whether this is the cross-app account of `provider_app_id`.
    pub fn is_cross_app_for(&self, provider_app_id: &str) -> bool {
        self.kind == "cross_app" && self.provider_id() == Some(provider_app_id)
    }
}

/// Provider app reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderApp {
    /// App id.
    pub id: String,
}

/// Wallet embedded in a cross-app account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmbeddedWallet {
    /// Wallet address.
    pub address: String,
}

fn linked_accounts_claim<'de, D>(deserializer: D) -> Result<Vec<LinkedAccount>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<LinkedAccount>),
        Encoded(String),
    }

    match Option::<Raw>::deserialize(deserializer)? {
        None => Ok(Vec::new()),
        Some(Raw::List(accounts)) => Ok(accounts),
        Some(Raw::Encoded(json)) => serde_json::from_str(&json).map_err(serde::de::Error::custom),
    }
}

// =============================================================================
// TOKEN VALIDATION
// =============================================================================

/// Authentication errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No authentication configured on server.
    #[error("authentication not configured")]
    NotConfigured,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Audience claim doesn't match expected value.
    #[error("invalid audience")]
    InvalidAudience,
    /// Required claim is missing.
    #[error("missing required claim: {0}")]
    MissingClaim(String),
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Validate an identity token and extract claims.
pub fn validate_token(token: &str, config: &AuthConfig) -> Result<TokenClaims, AuthError> {
    if !config.is_configured() {
        return Err(AuthError::NotConfigured);
    }

    let algorithm = if config.public_key_pem.is_some() {
        config.key_algorithm
    } else {
        Algorithm::HS256
    };

    let mut validation = Validation::new(algorithm);
    validation.required_spec_claims = std::collections::HashSet::new();

    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    if let Some(ref audience) = config.audience {
        validation.set_audience(&[audience]);
    } else {
        validation.validate_aud = false;
    }

    if config.skip_expiry {
        validation.validate_exp = false;
    }

    let key = if let Some(ref pem) = config.public_key_pem {
        let key = match algorithm {
            Algorithm::RS256 | Algorithm::RS384 | Algorithm::RS512 => DecodingKey::from_rsa_pem(pem.as_bytes()),
            _ => DecodingKey::from_ec_pem(pem.as_bytes()),
        };
        key.map_err(|e| AuthError::DecodeError(format!("invalid public key: {}", e)))?
    } else if let Some(ref secret) = config.secret {
        DecodingKey::from_secret(secret.as_bytes())
    } else {
        return Err(AuthError::NotConfigured);
    };

    let token_data: TokenData<TokenClaims> = decode(token, &key, &validation).map_err(map_jwt_error)?;
    let claims = token_data.claims;

    if claims.sub.is_empty() {
        return Err(AuthError::MissingClaim("sub".into()));
    }

    // Manual expiry check (in case validation was skipped)
    if !config.skip_expiry && claims.exp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    Ok(claims)
}

/// Map JWT library errors to our error type.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// WALLET RESOLUTION
// =============================================================================

/// Why no wallet could be resolved. Messages are shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdentityError {
    /// Not signed in at all.
    #[error("Please connect your wallet to continue.")]
    NotSignedIn,
    /// Signed in without any linked account.
    #[error("You need to link your Monad Games ID account to continue.")]
    NoLinkedAccounts,
    /// No cross-app account for the Games ID provider.
    #[error("Monad Games ID account not found in linked accounts.")]
    AccountNotFound,
    /// The cross-app account has no embedded wallet.
    #[error("No embedded wallets found in your Monad Games ID account.")]
    NoEmbeddedWallet,
}

/// Find the player's wallet: the first embedded wallet of the cross-app
/// account for `provider_app_id`.
pub fn resolve_wallet(claims: &TokenClaims, provider_app_id: &str) -> Result<String, IdentityError> {
    if claims.linked_accounts.is_empty() {
        return Err(IdentityError::NoLinkedAccounts);
    }

    let account = claims
        .linked_accounts
        .iter()
        .find(|account| account.is_cross_app_for(provider_app_id))
        .ok_or(IdentityError::AccountNotFound)?;

    account
        .embedded_wallets
        .first()
        .map(|wallet| wallet.address.clone())
        .ok_or(IdentityError::NoEmbeddedWallet)
}

/// A resolved player identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletIdentity {
    /// Provider subject.
    pub subject: String,
    /// Wallet address.
    pub wallet_address: String,
    /// Registered username, if any.
    pub username: Option<String>,
}

impl WalletIdentity {
    /// Shortened address for display.
    pub fn display_address(&self) -> String {
        format_address(&self.wallet_address)
    }
}

/// Identity lifecycle of one connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum IdentityContext {
    /// No token presented, or logged out.
    #[default]
    SignedOut,
    /// Token valid but no wallet could be resolved.
    Incomplete {
        /// Provider subject.
        subject: String,
        /// What is missing.
        reason: IdentityError,
    },
    /// Wallet resolved.
    SignedIn(WalletIdentity),
}

impl IdentityContext {
    /// Apply validated claims. The context records the outcome either way.
    pub fn sign_in(&mut self, claims: &TokenClaims, provider_app_id: &str) -> Result<&WalletIdentity, IdentityError> {
        match resolve_wallet(claims, provider_app_id) {
            Ok(wallet_address) => {
                debug!("Resolved wallet {} for {}", format_address(&wallet_address), claims.sub);
                *self = IdentityContext::SignedIn(WalletIdentity {
                    subject: claims.sub.clone(),
                    wallet_address,
                    username: None,
                });
                match self {
                    IdentityContext::SignedIn(identity) => Ok(identity),
                    _ => Err(IdentityError::NotSignedIn),
                }
            }
            Err(reason) => {
                *self = IdentityContext::Incomplete {
                    subject: claims.sub.clone(),
                    reason,
                };
                Err(reason)
            }
        }
    }

    /// Record the username for a signed-in wallet.
    pub fn set_username(&mut self, username: Option<String>) {
        if let IdentityContext::SignedIn(identity) = self {
            identity.username = username;
        }
    }

    /// Forget the identity.
    pub fn logout(&mut self) {
        *self = IdentityContext::SignedOut;
    }

    /// The resolved identity, if any.
    pub fn identity(&self) -> Option<&WalletIdentity> {
        match self {
            IdentityContext::SignedIn(identity) => Some(identity),
            _ => None,
        }
    }

    /// The resolved wallet, or the reason there is none.
    pub fn require_wallet(&self) -> Result<&str, IdentityError> {
        match self {
            IdentityContext::SignedIn(identity) => Ok(&identity.wallet_address),
            IdentityContext::Incomplete { reason, .. } => Err(*reason),
            IdentityContext::SignedOut => Err(IdentityError::NotSignedIn),
        }
    }

    /// Whether a token has been accepted, even without a wallet.
    pub fn is_authenticated(&self) -> bool {
        !matches!(self, IdentityContext::SignedOut)
    }
}

/// Shorten an address to `0x1234...abcd`.
pub fn format_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 10 {
        return address.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Look up the username registered for `wallet`. Failures read as "no
/// username".
pub async fn lookup_username<A: GamesIdApi>(api: &A, wallet: &str) -> Option<String> {
    match api.check_wallet(wallet).await {
        Ok(response) => response.username().map(str::to_string),
        Err(e) => {
            warn!("Username lookup for {} failed: {}", format_address(wallet), e);
            None
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
