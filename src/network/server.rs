//! HTTP + WebSocket Game Server
//!
//! Serves the leaderboard, score and identity proxy endpoints and the `/ws`
//! live game channel. Each WebSocket connection owns one play session; its
//! task is the only writer of that session.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, instrument, warn};

use crate::game::events::GameEvent;
use crate::game::tick::GameRules;
use crate::network::identity::{
    format_address, lookup_username, validate_token, AuthConfig, IdentityError,
};
use crate::network::leaderboard::{parse_page_param, LeaderboardClient, LeaderboardError};
use crate::network::protocol::{
    AuthResult, CheckWalletQuery, ClientMessage, ErrorBody, ErrorCode, LeaderboardQuery,
    LeaderboardResponse, ServerMessage, SessionSnapshot, SubmitScoreRequest,
};
use crate::network::session::{PlaySession, SessionError, SessionId, SessionManager};
use crate::network::submission::{
    ScoreSubmissionResult, ScoreSubmitter, SubmissionTicket, SubmitError, DEFAULT_REJECTION,
};
use crate::network::upstream::{env_parse, GamesIdApi, UpstreamError};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address.
    pub bind_addr: SocketAddr,
    /// Maximum concurrent WebSocket connections.
    pub max_connections: usize,
    /// Close sessions with no client activity for this long.
    pub idle_timeout: Duration,
    /// How often live sessions are driven forward.
    pub tick_interval: Duration,
    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            max_connections: 1000,
            idle_timeout: Duration::from_secs(600),
            tick_interval: Duration::from_millis(100),
            version: crate::VERSION.to_string(),
        }
    }
}

impl ServerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bind_addr: env_parse("BIND_ADDR").unwrap_or(defaults.bind_addr),
            max_connections: env_parse("MAX_CONNECTIONS").unwrap_or(defaults.max_connections),
            idle_timeout: env_parse("IDLE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idle_timeout),
            ..defaults
        }
    }
}

/// Game server errors.
#[derive(Debug, thiserror::Error)]
pub enum GameServerError {
    /// Failed to bind or serve.
    #[error("Failed to bind: {0}")]
    BindFailed(#[from] std::io::Error),

    /// Upstream client could not be built.
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),
}

/// Shared server state.
pub struct AppState<A> {
    /// Server configuration.
    pub config: ServerConfig,
    /// Identity token validation.
    pub auth: AuthConfig,
    /// Rules for new games.
    pub rules: GameRules,
    /// Games ID service.
    pub api: Arc<A>,
    /// Leaderboard reads.
    pub leaderboard: LeaderboardClient<A>,
    /// Live play sessions.
    pub sessions: Arc<SessionManager>,
    connections: AtomicUsize,
    shutdown_tx: broadcast::Sender<()>,
}

impl<A: GamesIdApi> AppState<A> {
    /// Create server state.
    pub fn new(config: ServerConfig, auth: AuthConfig, api: Arc<A>) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);
        Arc::new(Self {
            config,
            auth,
            rules: GameRules::default(),
            leaderboard: LeaderboardClient::new(api.clone()),
            api,
            sessions: Arc::new(SessionManager::new()),
            connections: AtomicUsize::new(0),
            shutdown_tx,
        })
    }

    /// Signal every connection and the listener to stop.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Acquire)
    }
}

/// Counts a live connection for as long as it is held.
struct ConnectionGuard<'a>(&'a AtomicUsize);

impl<'a> ConnectionGuard<'a> {
    fn new(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Build the HTTP router.
pub fn router<A: GamesIdApi>(state: Arc<AppState<A>>) -> Router {
    Router::new()
        .route("/api/leaderboard", get(get_leaderboard::<A>))
        .route("/api/submit-score", post(submit_score::<A>))
        .route("/api/check-wallet", get(check_wallet::<A>))
        .route("/ws", get(ws_upgrade::<A>))
        .with_state(state)
}

/// The game server.
pub struct GameServer<A> {
    state: Arc<AppState<A>>,
}

impl<A: GamesIdApi> GameServer<A> {
    /// Create a new game server.
    pub fn new(config: ServerConfig, auth: AuthConfig, api: Arc<A>) -> Self {
        if !auth.is_configured() {
            warn!("No identity key configured; every auth attempt will be rejected");
        }
        Self {
            state: AppState::new(config, auth, api),
        }
    }

    /// Shared state.
    pub fn state(&self) -> Arc<AppState<A>> {
        self.state.clone()
    }

    /// Bind the configured address and serve until shutdown.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), GameServerError> {
        let listener = TcpListener::bind(self.state.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Serve on an already-bound listener until shutdown.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GameServerError> {
        info!("Game server listening on {}", listener.local_addr()?);

        let cleanup_handle = tokio::spawn(run_cleanup_loop(self.state.clone()));
        let mut shutdown_rx = self.state.shutdown_tx.subscribe();

        let result = axum::serve(listener, router(self.state.clone()))
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("Shutdown signal received");
            })
            .await;

        cleanup_handle.abort();
        result.map_err(GameServerError::from)
    }

    /// Shutdown the server.
    pub fn shutdown(&self) {
        self.state.shutdown();
    }

    /// Get active connection count.
    pub fn connection_count(&self) -> usize {
        self.state.connection_count()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.state.sessions.session_count().await
    }
}

/// Drop sessions whose connection went quiet.
async fn run_cleanup_loop<A: GamesIdApi>(state: Arc<AppState<A>>) {
    let mut ticker = interval(Duration::from_secs(60));

    loop {
        ticker.tick().await;
        let removed = state.sessions.cleanup_idle(state.config.idle_timeout).await;
        for id in removed {
            info!("Removed idle session {}", id);
        }
    }
}

// =============================================================================
// HTTP HANDLERS
// =============================================================================

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(ErrorBody::new(message))).into_response()
}

impl IntoResponse for LeaderboardError {
    fn into_response(self) -> Response {
        match self {
            LeaderboardError::InvalidPage => {
                error_response(StatusCode::BAD_REQUEST, LeaderboardError::InvalidPage.to_string())
            }
            LeaderboardError::NotFound => error_response(StatusCode::NOT_FOUND, "Not Found"),
            LeaderboardError::Upstream(e) => {
                error!("Leaderboard fetch failed: {}", e);
                error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

/// Map an upstream failure onto a proxy response.
fn upstream_response(err: UpstreamError, fallback: &str) -> Response {
    match err {
        UpstreamError::Status { status, message } => error_response(
            StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
            message.unwrap_or_else(|| fallback.to_string()),
        ),
        other => {
            error!("Upstream call failed: {}", other);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

/// `GET /api/leaderboard?page=N`
async fn get_leaderboard<A: GamesIdApi>(
    State(state): State<Arc<AppState<A>>>,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardResponse>, LeaderboardError> {
    let page = parse_page_param(query.page.as_deref())?;
    let data = state.leaderboard.fetch_page(page).await?;
    Ok(Json(LeaderboardResponse { data }))
}

/// `POST /api/submit-score`
async fn submit_score<A: GamesIdApi>(
    State(state): State<Arc<AppState<A>>>,
    payload: Result<Json<SubmitScoreRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return error_response(StatusCode::BAD_REQUEST, rejection.body_text()),
    };
    if request.player.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Missing player wallet address");
    }

    debug!(
        "Proxying score {} for {}",
        request.score_amount,
        format_address(&request.player)
    );
    match state.api.submit_score(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => upstream_response(e, DEFAULT_REJECTION),
    }
}

/// `GET /api/check-wallet?wallet=ADDR`
async fn check_wallet<A: GamesIdApi>(
    State(state): State<Arc<AppState<A>>>,
    Query(query): Query<CheckWalletQuery>,
) -> Response {
    let Some(wallet) = query.wallet.filter(|w| !w.trim().is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Missing wallet address");
    };

    match state.api.check_wallet(wallet.trim()).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => upstream_response(e, "Failed to check wallet"),
    }
}

// =============================================================================
// WEBSOCKET SESSIONS
// =============================================================================

type SubmissionOutcome = (SubmissionTicket, Result<ScoreSubmissionResult, SubmitError>);

/// Per-connection handles shared by the message handlers.
struct Connection<A> {
    session: Arc<RwLock<PlaySession>>,
    sender: mpsc::Sender<ServerMessage>,
    submitter: Arc<ScoreSubmitter<A>>,
    submissions: mpsc::Sender<SubmissionOutcome>,
}

impl<A: GamesIdApi> Connection<A> {
    async fn send(&self, message: ServerMessage) {
        let _ = self.sender.send(message).await;
    }

    async fn send_error(&self, code: ErrorCode, message: impl Into<String>) {
        self.send(ServerMessage::error(code, message)).await;
    }

    /// Send events followed by a fresh snapshot.
    async fn send_update(&self, events: Vec<GameEvent>, snapshot: SessionSnapshot) {
        for event in events {
            self.send(ServerMessage::Event(event)).await;
        }
        self.send(ServerMessage::Snapshot(snapshot)).await;
    }
}

/// `GET /ws`
async fn ws_upgrade<A: GamesIdApi>(
    State(state): State<Arc<AppState<A>>>,
    ws: WebSocketUpgrade,
) -> Response {
    if state.connection_count() >= state.config.max_connections {
        warn!("Connection limit reached, rejecting upgrade");
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "Connection limit reached");
    }
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

/// Drive one WebSocket connection until it closes.
async fn handle_socket<A: GamesIdApi>(state: Arc<AppState<A>>, socket: WebSocket) {
    let _connection_guard = ConnectionGuard::new(&state.connections);
    let (session_id, session) = state.sessions.create_session(state.rules.clone()).await;
    info!("Session {} connected", session_id);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (msg_tx, mut msg_rx) = mpsc::channel::<ServerMessage>(64);
    let (submit_tx, mut submit_rx) = mpsc::channel::<SubmissionOutcome>(4);

    // Spawn message sender task
    let sender_task = tokio::spawn(async move {
        while let Some(msg) = msg_rx.recv().await {
            let text = match msg.to_json() {
                Ok(t) => t,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    let conn = Connection {
        session: session.clone(),
        sender: msg_tx,
        submitter: Arc::new(ScoreSubmitter::new(state.api.clone())),
        submissions: submit_tx,
    };

    let snapshot = session.read().await.snapshot();
    conn.send(ServerMessage::Snapshot(snapshot)).await;

    let mut ticker = interval(state.config.tick_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut shutdown_rx = state.shutdown_tx.subscribe();

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                let parsed = match msg {
                    Some(Ok(Message::Text(text))) => ClientMessage::from_json(&text),
                    Some(Ok(Message::Binary(data))) => ClientMessage::from_bytes(&data),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("Session {} disconnected", session_id);
                        break;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        debug!("WebSocket error for session {}: {}", session_id, e);
                        break;
                    }
                };

                match parsed {
                    Ok(client_msg) => handle_client_message(&state, &conn, session_id, client_msg).await,
                    Err(e) => {
                        debug!("Invalid message from session {}: {}", session_id, e);
                        conn.send_error(ErrorCode::InvalidMessage, "Invalid message format").await;
                    }
                }
            }
            _ = ticker.tick() => {
                let (result, snapshot, idle) = {
                    let mut s = session.write().await;
                    let result = s.advance();
                    (result, s.snapshot(), s.idle_for())
                };
                match result {
                    Ok(tick) if !tick.events.is_empty() => conn.send_update(tick.events, snapshot).await,
                    Ok(_) => {}
                    Err(e) => {
                        error!("Session {} failed to advance: {}", session_id, e);
                        conn.send_error(ErrorCode::InternalError, e.to_string()).await;
                    }
                }
                if idle > state.config.idle_timeout {
                    info!("Session {} idle, closing", session_id);
                    conn.send(ServerMessage::Shutdown { reason: "Idle timeout".to_string() }).await;
                    break;
                }
            }
            Some((ticket, outcome)) = submit_rx.recv() => {
                let landed = session.write().await.complete_submission(ticket, &outcome);
                if landed {
                    let result = match outcome {
                        Ok(result) => result,
                        Err(e) => ScoreSubmissionResult::failed(&e),
                    };
                    conn.send(ServerMessage::Submission(result)).await;
                }
            }
            _ = shutdown_rx.recv() => {
                conn.send(ServerMessage::Shutdown { reason: "Server shutting down".to_string() }).await;
                break;
            }
        }
    }

    // Let queued messages drain before the socket goes away
    drop(conn);
    if tokio::time::timeout(Duration::from_secs(1), sender_task).await.is_err() {
        debug!("Session {} sender did not drain in time", session_id);
    }

    state.sessions.remove_session(&session_id).await;
    info!("Session {} cleaned up", session_id);
}

/// Handle a client message.
async fn handle_client_message<A: GamesIdApi>(
    state: &Arc<AppState<A>>,
    conn: &Connection<A>,
    session_id: SessionId,
    msg: ClientMessage,
) {
    match msg {
        ClientMessage::Auth { token } => handle_auth(state, conn, session_id, &token).await,
        ClientMessage::Start => {
            let (result, snapshot) = {
                let mut s = conn.session.write().await;
                let result = s.start();
                (result, s.snapshot())
            };
            match result {
                Ok(started) => conn.send_update(started.events, snapshot).await,
                Err(SessionError::Identity(IdentityError::NotSignedIn)) => {
                    conn.send_error(ErrorCode::NotAuthenticated, IdentityError::NotSignedIn.to_string()).await;
                }
                Err(SessionError::Identity(e)) => {
                    conn.send_error(ErrorCode::IdentityIncomplete, e.to_string()).await;
                }
                Err(e) => {
                    error!("Session {} failed to start: {}", session_id, e);
                    conn.send_error(ErrorCode::InternalError, e.to_string()).await;
                }
            }
        }
        ClientMessage::Select { tile } => {
            let (result, snapshot) = {
                let mut s = conn.session.write().await;
                let result = s.select(tile);
                (result, s.snapshot())
            };
            match result {
                Ok((outcome, events)) => {
                    if !outcome.is_accepted() {
                        debug!("Session {} selection {:?}", session_id, outcome);
                    }
                    conn.send_update(events, snapshot).await;
                }
                Err(e) => {
                    error!("Session {} failed to select: {}", session_id, e);
                    conn.send_error(ErrorCode::InternalError, e.to_string()).await;
                }
            }
        }
        ClientMessage::Reset => {
            let (reset, snapshot) = {
                let mut s = conn.session.write().await;
                let reset = s.reset();
                (reset, s.snapshot())
            };
            conn.send_update(reset.events, snapshot).await;
        }
        ClientMessage::SubmitScore => handle_submit(conn, session_id).await,
        ClientMessage::Ping { timestamp } => {
            let server_time = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as u64)
                .unwrap_or_default();
            conn.send(ServerMessage::Pong { timestamp, server_time }).await;
        }
        ClientMessage::Logout => {
            let (reset, snapshot) = {
                let mut s = conn.session.write().await;
                let reset = s.logout();
                (reset, s.snapshot())
            };
            conn.send_update(reset.events, snapshot).await;
        }
    }
}

/// Handle authentication.
async fn handle_auth<A: GamesIdApi>(
    state: &Arc<AppState<A>>,
    conn: &Connection<A>,
    session_id: SessionId,
    token: &str,
) {
    let failure = |error: String| {
        ServerMessage::AuthResult(AuthResult {
            success: false,
            session_id: session_id.to_string(),
            wallet_address: None,
            display_address: None,
            username: None,
            error: Some(error),
            server_version: state.config.version.clone(),
        })
    };

    let claims = match validate_token(token, &state.auth) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("Session {} token rejected: {}", session_id, e);
            conn.send(failure(e.to_string())).await;
            return;
        }
    };

    let resolved = conn
        .session
        .write()
        .await
        .authenticate(&claims, &state.auth.provider_app_id);
    let identity = match resolved {
        Ok(identity) => identity,
        Err(e) => {
            debug!("Session {} has no wallet: {}", session_id, e);
            conn.send(failure(e.to_string())).await;
            return;
        }
    };

    let username = lookup_username(state.api.as_ref(), &identity.wallet_address).await;
    conn.session.write().await.set_username(username.clone());

    info!("Session {} signed in as {}", session_id, identity.display_address());
    conn.send(ServerMessage::AuthResult(AuthResult {
        success: true,
        session_id: session_id.to_string(),
        display_address: Some(identity.display_address()),
        wallet_address: Some(identity.wallet_address),
        username,
        error: None,
        server_version: state.config.version.clone(),
    }))
    .await;
}

/// Start a score submission in the background.
async fn handle_submit<A: GamesIdApi>(conn: &Connection<A>, session_id: SessionId) {
    let pending = conn.session.write().await.begin_submission();
    match pending {
        Ok(pending) => {
            let submitter = conn.submitter.clone();
            let outcomes = conn.submissions.clone();
            tokio::spawn(async move {
                let outcome = submitter.submit(Some(&pending.wallet), pending.score).await;
                let _ = outcomes.send((pending.ticket, outcome)).await;
            });
        }
        Err(SessionError::NotEnded) => {
            conn.send_error(ErrorCode::InvalidState, SessionError::NotEnded.to_string()).await;
        }
        Err(e) => {
            debug!("Session {} cannot submit: {}", session_id, e);
            conn.send_error(ErrorCode::SubmissionFailed, e.to_string()).await;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::upstream::fake::FakeGamesIdApi;

    #[test]
    fn test_server_config_default() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.tick_interval, Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = GameServer::new(
            ServerConfig::default(),
            AuthConfig::default(),
            Arc::new(FakeGamesIdApi::default()),
        );

        assert_eq!(server.connection_count(), 0);
        assert_eq!(server.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_server_shutdown() {
        let server = GameServer::new(
            ServerConfig::default(),
            AuthConfig::default(),
            Arc::new(FakeGamesIdApi::default()),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();

        let state = server.state();
        let handle = tokio::spawn(async move { server.serve(listener).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        state.shutdown();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await;
        assert!(matches!(result, Ok(Ok(Ok(())))));
    }

    #[test]
    fn test_connection_guard_counts() {
        let counter = AtomicUsize::new(0);
        {
            let _a = ConnectionGuard::new(&counter);
            let _b = ConnectionGuard::new(&counter);
            assert_eq!(counter.load(Ordering::Acquire), 2);
        }
        assert_eq!(counter.load(Ordering::Acquire), 0);
    }

    #[test]
    fn test_leaderboard_error_status() {
        assert_eq!(LeaderboardError::InvalidPage.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(LeaderboardError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            LeaderboardError::Upstream(UpstreamError::Timeout).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
