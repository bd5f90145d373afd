use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, RwLock};
use tokio::time::{sleep, Duration};

use crate::tracker::TrackerSnapshot;

/// Control operations the dashboard can request. The main loop applies
/// them serially, through the same path as sensor readings, so the
/// tracker never needs locking.
#[derive(Clone, Debug)]
pub enum Command {
    StartRecording(usize),
    ClearZone(usize),
    SetWifi(f64),
}

#[derive(Clone)]
pub struct DashboardState {
    pub snapshot: Arc<RwLock<TrackerSnapshot>>,
    pub commands: mpsc::Sender<Command>,
}

#[derive(Deserialize)]
struct WifiPayload {
    wifi: f64,
}

pub async fn start_dashboard(state: DashboardState, port: u16) {
    let app = Router::new()
        .route("/", get(index_handler))
        .route("/status", get(status_handler))
        .route("/ws", get(ws_handler))
        .route("/record/:zone_id", post(record_handler))
        .route("/clear/:zone_id", post(clear_handler))
        .route("/wifi", post(wifi_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", port);
    eprintln!("[DASHBOARD] Starting embedded server at http://{}", addr);

    let listener = TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

async fn index_handler() -> Html<&'static str> {
    Html(include_str!("dashboard_static.html"))
}

async fn status_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await.clone();
    Json(snapshot)
}

async fn record_handler(
    Path(zone_id): Path<usize>,
    State(state): State<DashboardState>,
) -> StatusCode {
    // Checked against the snapshot so a bad id answers 404 and a
    // duplicate start answers 409 instead of vanishing into the
    // command channel.
    {
        let snap = state.snapshot.read().await;
        if zone_id >= snap.zones.len() {
            return StatusCode::NOT_FOUND;
        }
        if snap.recording.is_some() {
            return StatusCode::CONFLICT;
        }
    }
    match state.commands.send(Command::StartRecording(zone_id)).await {
        Ok(_) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn clear_handler(
    Path(zone_id): Path<usize>,
    State(state): State<DashboardState>,
) -> StatusCode {
    {
        let snap = state.snapshot.read().await;
        if zone_id >= snap.zones.len() {
            return StatusCode::NOT_FOUND;
        }
    }
    match state.commands.send(Command::ClearZone(zone_id)).await {
        Ok(_) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn wifi_handler(
    State(state): State<DashboardState>,
    Json(payload): Json<WifiPayload>,
) -> StatusCode {
    // Manual signal strength, clamped to the plausible dBm range
    let clamped = payload.wifi.clamp(-90.0, -30.0);
    match state.commands.send(Command::SetWifi(clamped)).await {
        Ok(_) => StatusCode::ACCEPTED,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<DashboardState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: DashboardState) {
    // Push loop: snapshot out at 5Hz until the client goes away
    loop {
        let snapshot = state.snapshot.read().await.clone();
        let json = serde_json::to_string(&snapshot).unwrap();
        if socket.send(Message::Text(json)).await.is_err() {
            // Client disconnected
            break;
        }

        // 5Hz updates (200ms)
        sleep(Duration::from_millis(200)).await;
    }
}
