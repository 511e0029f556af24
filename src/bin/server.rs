use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use clap::Parser;
use futures_util::{SinkExt, StreamExt};
use log::{debug, info};
use serde_json::json;
use sky_race_server::constants::{DEFAULT_PORT, SWEEP_INTERVAL_MS, TIMER_TICK_MS};
use sky_race_server::gateway::{OutboundMessage, RelayState};
use sky_race_server::server_protocol::{parse_client_message, ParsedClientMessage};
use sky_race_server::server_utils::{make_id, now_ms};
use sky_race_server::types::PlayerPosition;
use tokio::sync::{mpsc, Mutex};
use tower_http::services::{ServeDir, ServeFile};

type SharedState = Arc<Mutex<RelayState>>;

#[derive(Debug, Parser)]
#[command(about = "Sky-race relay server.")]
struct Args {
    /// Port for both the WebSocket relay and the HTTP status API.
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
    /// Directory holding the built frontend, served as a fallback.
    #[arg(long, env = "STATIC_DIR")]
    static_dir: Option<PathBuf>,
    /// Public base URL (e.g. https://race.example.com) advertised by
    /// /api/host-url; defaults to the local bind address.
    #[arg(long, env = "PUBLIC_URL")]
    public_url: Option<String>,
}

#[derive(Clone)]
struct AppState {
    relay: SharedState,
    public_url: Option<String>,
    port: u16,
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let args = Args::parse();

    let relay = Arc::new(Mutex::new(RelayState::new()));
    start_timer_loop(relay.clone());
    start_sweep_loop(relay.clone());

    let app_state = AppState {
        relay,
        public_url: args.public_url.clone(),
        port: args.port,
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/host-url", get(host_url_handler))
        .route("/api/races/current", get(current_race_handler))
        .route("/api/races/{race_id}/leaderboard", get(leaderboard_handler))
        .route("/api/admin/race/start", post(admin_start_handler))
        .route("/ws", get(ws_handler))
        .with_state(app_state);

    let app = if let Some(static_dir) = resolve_static_dir(args.static_dir) {
        let index_file = static_dir.join("index.html");
        info!("static file root: {}", static_dir.to_string_lossy());
        app.fallback_service(
            ServeDir::new(static_dir).not_found_service(ServeFile::new(index_file)),
        )
    } else {
        info!("no static file root found, serving API only");
        app
    };

    let bind_addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("failed to bind server socket");

    info!("sky-race server listening on :{}", args.port);
    axum::serve(listener, app)
        .await
        .expect("server runtime failed");
}

fn resolve_static_dir(configured: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = configured {
        if path.join("index.html").is_file() {
            return Some(path);
        }
    }

    let candidates = [PathBuf::from("dist"), PathBuf::from("../dist")];
    candidates
        .into_iter()
        .find(|path| path.join("index.html").is_file())
}

fn start_timer_loop(relay: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(TIMER_TICK_MS));
        loop {
            interval.tick().await;
            let mut guard = relay.lock().await;
            guard.tick(now_ms());
        }
    });
}

fn start_sweep_loop(relay: SharedState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_millis(SWEEP_INTERVAL_MS));
        loop {
            interval.tick().await;
            let mut guard = relay.lock().await;
            guard.sweep(now_ms());
        }
    });
}

async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().timestamp_millis(),
    }))
}

async fn host_url_handler(State(state): State<AppState>) -> impl IntoResponse {
    let (app_url, ws_url) = host_urls(state.public_url.as_deref(), state.port);
    Json(json!({
        "appUrl": app_url,
        "wsUrl": ws_url,
    }))
}

async fn current_race_handler(State(state): State<AppState>) -> Response {
    let guard = state.relay.lock().await;
    match guard.current_race_summary() {
        Some(summary) => Json(summary).into_response(),
        None => Json(json!({ "message": "No active race" })).into_response(),
    }
}

async fn leaderboard_handler(
    State(state): State<AppState>,
    Path(race_id): Path<String>,
) -> Response {
    let response = match race_id.parse::<u64>() {
        Ok(race_id) => {
            let guard = state.relay.lock().await;
            guard.leaderboard_response(race_id)
        }
        Err(_) => None,
    };
    match response {
        Some(body) => Json(body).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "Race not found" })),
        )
            .into_response(),
    }
}

async fn admin_start_handler(State(state): State<AppState>) -> impl IntoResponse {
    let mut guard = state.relay.lock().await;
    let race_id = guard.force_start(now_ms());
    Json(json!({
        "raceId": race_id,
        "message": "New race started",
    }))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state.relay, socket))
}

async fn handle_socket(relay: SharedState, socket: WebSocket) {
    let connection_id = make_id("conn");
    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(256);

    {
        let mut guard = relay.lock().await;
        guard.register_client(&connection_id, tx.clone());
    }
    debug!("connection {connection_id} opened");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let writer = tokio::spawn(async move {
        while let Some(outbound) = rx.recv().await {
            let should_close = matches!(outbound, OutboundMessage::Close { .. });
            let result = match outbound {
                OutboundMessage::Text(payload) => {
                    ws_sender.send(Message::Text(payload.into())).await
                }
                OutboundMessage::Close { code, reason } => {
                    let frame = CloseFrame {
                        code,
                        reason: reason.into(),
                    };
                    ws_sender.send(Message::Close(Some(frame))).await
                }
            };
            if result.is_err() || should_close {
                break;
            }
        }
    });

    while let Some(received) = ws_receiver.next().await {
        let Ok(message) = received else {
            break;
        };

        match message {
            Message::Text(raw) => {
                handle_client_message(&relay, &connection_id, raw.as_str()).await;
            }
            Message::Binary(raw) => {
                if let Ok(text) = String::from_utf8(raw.to_vec()) {
                    handle_client_message(&relay, &connection_id, &text).await;
                } else {
                    debug!("connection {connection_id}: non-utf8 binary frame dropped");
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    {
        let mut guard = relay.lock().await;
        guard.on_disconnect(&connection_id);
    }
    debug!("connection {connection_id} closed");
    drop(tx);
    let _ = writer.await;
}

async fn handle_client_message(relay: &SharedState, connection_id: &str, raw: &str) {
    let Some(message) = parse_client_message(raw) else {
        debug!("connection {connection_id}: malformed frame dropped");
        return;
    };

    let mut guard = relay.lock().await;
    match message {
        ParsedClientMessage::JoinRace { player_id, address } => {
            guard.on_join(connection_id, &player_id, &address, now_ms());
        }
        ParsedClientMessage::UpdateHeight {
            race_id,
            player_id,
            height,
        } => {
            guard.on_height_update(connection_id, race_id, &player_id, height, now_ms());
        }
        ParsedClientMessage::ApplyPowerUp {
            race_id,
            player_id,
            power_up_type,
            target_player_id,
        } => {
            guard.on_power_up(
                connection_id,
                race_id,
                &player_id,
                &power_up_type,
                target_player_id.as_deref(),
            );
        }
        ParsedClientMessage::PlayerPosition {
            race_id,
            player_id,
            x,
            y,
            score,
            velocity_y,
            alive,
        } => {
            guard.on_player_position(
                connection_id,
                race_id,
                PlayerPosition {
                    player_id,
                    x,
                    y,
                    score,
                    velocity_y,
                    alive,
                },
            );
        }
        ParsedClientMessage::PlayerDied {
            race_id,
            player_id,
            final_score,
        } => {
            guard.on_player_died(connection_id, race_id, &player_id, final_score, now_ms());
        }
    }
}

fn host_urls(public_url: Option<&str>, port: u16) -> (String, String) {
    match public_url {
        Some(base) => {
            let base = base.trim_end_matches('/');
            let ws = if let Some(rest) = base.strip_prefix("https://") {
                format!("wss://{rest}")
            } else if let Some(rest) = base.strip_prefix("http://") {
                format!("ws://{rest}")
            } else {
                format!("ws://{base}")
            };
            (base.to_string(), ws)
        }
        None => (
            format!("http://localhost:{port}"),
            format!("ws://localhost:{port}"),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_urls_fall_back_to_localhost() {
        let (app, ws) = host_urls(None, 3001);
        assert_eq!(app, "http://localhost:3001");
        assert_eq!(ws, "ws://localhost:3001");
    }

    #[test]
    fn host_urls_derive_ws_scheme_from_public_url() {
        let (app, ws) = host_urls(Some("https://race.example.com/"), 3001);
        assert_eq!(app, "https://race.example.com");
        assert_eq!(ws, "wss://race.example.com");

        let (app, ws) = host_urls(Some("http://10.0.0.5:3001"), 3001);
        assert_eq!(app, "http://10.0.0.5:3001");
        assert_eq!(ws, "ws://10.0.0.5:3001");
    }
}
