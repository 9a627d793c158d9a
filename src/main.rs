//! Memory Match Game Server
//!
//! Serves the game over HTTP and WebSocket, or runs one of the offline
//! tools:
//!
//! - `serve` (default): run the server
//! - `demo [seed]`: play a perfect session and verify it replays
//! - `leaderboard [page]`: print one leaderboard page

use std::env;
use std::sync::Arc;

use anyhow::{bail, Context};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use memory_match::{
    VERSION,
    core::clock::Millis,
    game::{
        board::TileId,
        events::{GameEvent, GameEventData},
        tick::{replay_session, GameRules, GameSession},
        timer::format_clock,
    },
    network::{
        format_address, AuthConfig, GameServer, HttpGamesIdApi, LeaderboardClient, ServerConfig,
        UpstreamConfig,
    },
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Memory Match Server v{}", VERSION);

    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("serve") => serve().await,
        Some("demo") => {
            let seed = match args.get(1) {
                Some(raw) => raw.parse().context("seed must be an unsigned integer")?,
                None => 12345,
            };
            demo_session(seed)
        }
        Some("leaderboard") => {
            let page = match args.get(1) {
                Some(raw) => raw.parse().context("page must be a positive integer")?,
                None => 1,
            };
            show_leaderboard(page).await
        }
        Some(other) => bail!("unknown command '{}' (expected serve, demo or leaderboard)", other),
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();
    let upstream = UpstreamConfig::from_env();
    info!("Games ID service: {} (game {})", upstream.base_url, upstream.game_id);

    let api = Arc::new(HttpGamesIdApi::new(upstream)?);
    let server = GameServer::new(config, AuthConfig::from_env(), api);

    let state = server.state();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => state.shutdown(),
            Err(e) => warn!("Failed to listen for ctrl-c: {}", e),
        }
    });

    server.run().await?;
    info!("Server stopped");
    Ok(())
}

async fn show_leaderboard(page: i64) -> anyhow::Result<()> {
    let api = Arc::new(HttpGamesIdApi::new(UpstreamConfig::from_env())?);
    let client = LeaderboardClient::new(api);

    let result = client.fetch_page(page).await?;
    info!(
        "Leaderboard page {}/{} ({} players)",
        result.pagination.page, result.pagination.total_pages, result.pagination.total
    );
    for entry in &result.data {
        let name = entry
            .username
            .clone()
            .unwrap_or_else(|| format_address(&entry.wallet_address));
        info!("#{:<4} {:<24} {}", entry.rank, name, entry.score);
    }
    Ok(())
}

/// First unmatched pair on the board, if any.
fn find_pair(session: &GameSession) -> Option<(TileId, TileId)> {
    let tiles = session.state().tiles();
    tiles.iter().filter(|t| !t.matched).find_map(|a| {
        tiles
            .iter()
            .find(|b| b.id != a.id && !b.matched && b.face == a.face)
            .map(|b| (a.id, b.id))
    })
}

/// Play a flawless session, then replay its inputs and compare.
fn demo_session(seed: u64) -> anyhow::Result<()> {
    info!("=== Starting Demo Session ===");
    info!("Seed: {} (0x{})", seed, hex::encode(seed.to_be_bytes()));

    let rules = GameRules::default();
    let mut session = GameSession::new(seed, rules.clone());
    let mut events = session.start()?.events;
    let mut inputs: Vec<(Millis, TileId)> = Vec::new();

    while !session.state().is_ended() {
        let now = session.now();
        match find_pair(&session) {
            Some((first, second)) => {
                for tile in [first, second] {
                    inputs.push((now, tile));
                    session.select(tile);
                }
                events.extend(session.take_events());
                events.extend(session.advance(now + rules.reveal_delay_ms)?.events);
            }
            // Board cleared, wait for the next deal
            None => events.extend(session.advance(now + rules.advance_delay_ms)?.events),
        }
    }

    for event in &events {
        match &event.data {
            GameEventData::LevelCompleted { level } => {
                info!(
                    "Level {} cleared at {}ms with {} left",
                    level,
                    event.at_ms,
                    format_clock(remaining_at(&events, event.at_ms))
                );
            }
            GameEventData::LevelAdvanced { level, score, .. } => {
                info!("Level {} dealt, score {}", level, score);
            }
            GameEventData::SessionEnded { reason, score, .. } => {
                info!("Session ended ({:?}) with score {}", reason, score);
            }
            _ => {}
        }
    }

    info!("=== Session Results ===");
    info!("Selections: {}", inputs.len());
    info!("Events: {}", events.len());
    info!("Final score: {}", session.state().score);

    info!("=== Verifying Replay ===");
    let (replayed, replay_events) = replay_session(seed, rules, &inputs, session.now())?;
    info!("Replay score: {}", replayed.state().score);

    if replay_events == events && replayed.state().score == session.state().score {
        info!("REPLAY VERIFIED: event streams match");
    } else {
        warn!("REPLAY MISMATCH: event streams differ");
    }
    Ok(())
}

/// Countdown value last reported at or before `at_ms`.
fn remaining_at(events: &[GameEvent], at_ms: Millis) -> u32 {
    events
        .iter()
        .take_while(|e| e.at_ms <= at_ms)
        .filter_map(|e| match e.data {
            GameEventData::CountdownTick { remaining_secs } => Some(remaining_secs),
            GameEventData::SessionStarted { time_limit_secs, .. }
            | GameEventData::LevelAdvanced { time_limit_secs, .. } => Some(time_limit_secs),
            _ => None,
        })
        .last()
        .unwrap_or_default()
}
