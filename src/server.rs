//! HTTP and WebSocket surface
//!
//! The network side runs entirely on the tokio event loop. Handlers only
//! read shared state or enqueue bus commands; all socket pushes flow
//! through the broadcaster pump, so the client registry is never touched
//! from more than one place.

use std::sync::{Arc, Mutex};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::biometrics::{preset_sample, MockBiometrics};
use crate::broadcast::{BiometricUpdate, ClientHandle, Event, EventBus};
use crate::classifier::StateClassifier;
use crate::config::EngineConfig;
use crate::engine::InterventionEngine;
use crate::orchestrator::{lock, SharedState};
use crate::types::FeedbackAction;
use crate::vision::ContextTracker;

/// Shared handles behind every route
#[derive(Clone)]
pub struct AppState {
    pub config: EngineConfig,
    pub shared: Arc<SharedState>,
    pub classifier: Arc<Mutex<StateClassifier>>,
    pub engine: Arc<Mutex<InterventionEngine>>,
    pub tracker: Arc<Mutex<ContextTracker>>,
    /// Present only in mock mode
    pub mock: Option<Arc<Mutex<MockBiometrics>>>,
    pub bus: EventBus,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/status", get(status))
        .route("/api/biometric/mock", post(set_mock_state))
        .route("/api/feedback", post(feedback))
        .route("/api/history", get(history))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "alive", "ghost": "watching" }))
}

async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let counters = lock(&state.engine).counters();
    let session_stats = lock(&state.tracker).session_stats();
    Json(json!({
        "biometric_state": state.shared.current_state().as_str(),
        "biometric_data": state.shared.latest_sample(),
        "last_analysis": state.shared.last_analysis(),
        "interventions_total": counters.interventions_total,
        "interventions_accepted": counters.accepted,
        "interventions_ignored": counters.ignored,
        "session_stats": session_stats,
        "mock_mode": state.config.use_mock_biometrics,
    }))
}

async fn set_mock_state(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let preset = body
        .get("state")
        .and_then(|value| value.as_u64())
        .and_then(|value| u8::try_from(value).ok());
    let Some((preset, data)) = preset.and_then(|p| preset_sample(p).map(|s| (p, s))) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "state must be 1-5" })),
        )
            .into_response();
    };

    let Some(mock) = &state.mock else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "mock mode disabled" })),
        )
            .into_response();
    };

    lock(mock).set_preset(preset);

    // live readings glide toward the preset; classify and report the
    // settled target values so the response is deterministic
    let new_state = lock(&state.classifier).classify(&data);
    state.shared.set_current_state(new_state);

    Json(json!({
        "ok": true,
        "preset": preset,
        "state": new_state.as_str(),
        "data": data,
    }))
    .into_response()
}

async fn feedback(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let action = body.get("action").and_then(|value| value.as_str()).unwrap_or("");
    match action.parse::<FeedbackAction>() {
        Ok(action) => {
            let mut engine = lock(&state.engine);
            engine.apply_feedback(action);
            let counters = engine.counters();
            Json(json!({
                "ok": true,
                "accepted": counters.accepted,
                "ignored": counters.ignored,
            }))
            .into_response()
        }
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": e.to_string() })),
        )
            .into_response(),
    }
}

async fn history(State(state): State<AppState>) -> Json<serde_json::Value> {
    let interventions = lock(&state.engine).history_tail(20);
    Json(json!({ "interventions": interventions }))
}

async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// One connection: snapshot, register, pump outbound, accept feedback.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();

    // late joiners get the current picture before anything else
    let snapshot = snapshot_event(&state);
    let Ok(payload) = serde_json::to_string(&snapshot) else {
        return;
    };
    if sink.send(Message::Text(payload)).await.is_err() {
        return;
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let id = Uuid::new_v4();
    if state.bus.register(ClientHandle { id, sender: tx }).is_err() {
        return;
    }

    let forward = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload)).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => handle_client_message(&state, &text),
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {}
        }
    }

    let _ = state.bus.unregister(id);
    forward.abort();
}

fn snapshot_event(state: &AppState) -> Event {
    let update = match state.shared.latest_sample() {
        Some(sample) => BiometricUpdate::from_sample(&sample),
        None => BiometricUpdate {
            heart_rate: 0,
            recovery: 0,
            strain: 0.0,
            sleep_performance: 0.0,
            state: None,
        },
    };
    Event::BiometricUpdate(update.with_state(state.shared.current_state()))
}

fn handle_client_message(state: &AppState, text: &str) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(text) else {
        return;
    };
    if value.get("type").and_then(|v| v.as_str()) != Some("feedback") {
        return;
    }
    let action = value.get("action").and_then(|v| v.as_str()).unwrap_or("");
    match action.parse::<FeedbackAction>() {
        Ok(action) => {
            lock(&state.engine).apply_feedback(action);
        }
        Err(e) => debug!("ignoring ws feedback: {e}"),
    }
}
