//! WebSocket game channel tests against a live server.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::{auth_config, claims_for, token_for, StubGamesId, WALLET};
use memory_match::network::{AppState, GameServer, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server(api: Arc<StubGamesId>) -> (SocketAddr, Arc<AppState<StubGamesId>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = GameServer::new(ServerConfig::default(), auth_config(), api);
    let state = server.state();
    tokio::spawn(async move { server.serve(listener).await });
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

async fn send(ws: &mut Client, msg: Value) {
    ws.send(Message::Text(msg.to_string())).await.unwrap();
}

/// Read messages until one satisfies `pred`.
async fn wait_for(ws: &mut Client, pred: impl Fn(&Value) -> bool) -> Value {
    let read = async {
        while let Some(msg) = ws.next().await {
            if let Message::Text(text) = msg.unwrap() {
                let value: Value = serde_json::from_str(&text).unwrap();
                if pred(&value) {
                    return value;
                }
            }
        }
        panic!("connection closed");
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("timed out waiting for message")
}

fn of_type(kind: &'static str) -> impl Fn(&Value) -> bool {
    move |v| v["type"] == kind
}

async fn sign_in(ws: &mut Client) -> Value {
    let token = token_for(&claims_for(WALLET));
    send(ws, json!({ "type": "auth", "token": token })).await;
    wait_for(ws, of_type("auth_result")).await
}

#[tokio::test]
async fn connect_receives_menu_snapshot() {
    let (addr, _state) = spawn_server(Arc::new(StubGamesId::new())).await;
    let mut ws = connect(addr).await;

    let snapshot = wait_for(&mut ws, of_type("snapshot")).await;
    assert_eq!(snapshot["phase"], "menu");
    assert_eq!(snapshot["score"], 0);
    assert_eq!(snapshot["tiles"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn start_requires_sign_in() {
    let (addr, _state) = spawn_server(Arc::new(StubGamesId::new())).await;
    let mut ws = connect(addr).await;

    send(&mut ws, json!({ "type": "start" })).await;
    let error = wait_for(&mut ws, of_type("error")).await;
    assert_eq!(error["code"], "not_authenticated");
    assert_eq!(error["message"], "Please connect your wallet to continue.");
}

#[tokio::test]
async fn sign_in_resolves_wallet_and_username() {
    let api = Arc::new(StubGamesId::new().with_username(WALLET, "grace"));
    let (addr, _state) = spawn_server(api).await;
    let mut ws = connect(addr).await;

    let result = sign_in(&mut ws).await;
    assert_eq!(result["success"], true);
    assert_eq!(result["wallet_address"], WALLET);
    assert_eq!(result["display_address"], "0xabcd...ef01");
    assert_eq!(result["username"], "grace");
}

#[tokio::test]
async fn sign_in_without_games_id_account() {
    let (addr, _state) = spawn_server(Arc::new(StubGamesId::new())).await;
    let mut ws = connect(addr).await;

    let mut claims = claims_for(WALLET);
    claims.linked_accounts.clear();
    send(&mut ws, json!({ "type": "auth", "token": token_for(&claims) })).await;

    let result = wait_for(&mut ws, of_type("auth_result")).await;
    assert_eq!(result["success"], false);
    assert_eq!(
        result["error"],
        "You need to link your Monad Games ID account to continue."
    );
}

#[tokio::test]
async fn bad_token_is_rejected() {
    let (addr, _state) = spawn_server(Arc::new(StubGamesId::new())).await;
    let mut ws = connect(addr).await;

    send(&mut ws, json!({ "type": "auth", "token": "not-a-jwt" })).await;
    let result = wait_for(&mut ws, of_type("auth_result")).await;
    assert_eq!(result["success"], false);
    assert!(result["wallet_address"].is_null());
}

#[tokio::test]
async fn start_deals_hidden_board_and_flips() {
    let (addr, _state) = spawn_server(Arc::new(StubGamesId::new())).await;
    let mut ws = connect(addr).await;
    sign_in(&mut ws).await;

    send(&mut ws, json!({ "type": "start" })).await;
    let snapshot = wait_for(&mut ws, |v| v["type"] == "snapshot" && v["phase"] == "playing").await;
    assert_eq!(snapshot["level"], 1);
    assert_eq!(snapshot["time_left_secs"], 180);
    let tiles = snapshot["tiles"].as_array().unwrap();
    assert_eq!(tiles.len(), 12);
    assert!(tiles.iter().all(|t| t["face"].is_null()));

    send(&mut ws, json!({ "type": "select", "tile": 0 })).await;
    let flipped = wait_for(&mut ws, |v| v["type"] == "event" && v["data"]["kind"] == "tile_flipped").await;
    assert_eq!(flipped["data"]["tile"], 0);
    assert!(flipped["data"]["face"].as_str().unwrap().starts_with("/cards/"));
}

#[tokio::test]
async fn submit_before_game_over_is_rejected() {
    let api = Arc::new(StubGamesId::new());
    let (addr, _state) = spawn_server(api.clone()).await;
    let mut ws = connect(addr).await;
    sign_in(&mut ws).await;

    send(&mut ws, json!({ "type": "start" })).await;
    wait_for(&mut ws, |v| v["type"] == "snapshot" && v["phase"] == "playing").await;

    send(&mut ws, json!({ "type": "submit_score" })).await;
    let error = wait_for(&mut ws, of_type("error")).await;
    assert_eq!(error["code"], "invalid_state");
    assert!(api.submissions.lock().unwrap().is_empty());
}

#[tokio::test]
async fn malformed_message_gets_error() {
    let (addr, _state) = spawn_server(Arc::new(StubGamesId::new())).await;
    let mut ws = connect(addr).await;

    ws.send(Message::Text("{ not json".into())).await.unwrap();
    let error = wait_for(&mut ws, of_type("error")).await;
    assert_eq!(error["code"], "invalid_message");
}

#[tokio::test]
async fn ping_is_answered() {
    let (addr, _state) = spawn_server(Arc::new(StubGamesId::new())).await;
    let mut ws = connect(addr).await;

    send(&mut ws, json!({ "type": "ping", "timestamp": 42 })).await;
    let pong = wait_for(&mut ws, of_type("pong")).await;
    assert_eq!(pong["timestamp"], 42);
    assert!(pong["server_time"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn shutdown_notifies_clients() {
    let (addr, state) = spawn_server(Arc::new(StubGamesId::new())).await;
    let mut ws = connect(addr).await;
    wait_for(&mut ws, of_type("snapshot")).await;

    state.shutdown();
    let shutdown = wait_for(&mut ws, of_type("shutdown")).await;
    assert_eq!(shutdown["reason"], "Server shutting down");
}
