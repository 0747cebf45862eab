//! HTTP and WebSocket surface.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::arena::MatchOrchestrator;
use crate::escrow::EscrowLedger;
use crate::games::grid::{GameMode, GameSnapshot, Player};
use crate::search::{Difficulty, recommend_move};
use crate::transport::{ClientIntent, Gateway, ServerEvent};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Shared handler state.
#[derive(Debug, Clone)]
pub struct AppState {
    gateway: Gateway,
}

impl AppState {
    /// Wraps a gateway for the router.
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    /// Escrow used by the payment endpoint.
    pub fn escrow(&self) -> &Arc<EscrowLedger> {
        self.gateway.escrow()
    }
}

/// Body of `POST /api/payments/verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentRequest {
    /// Ledger signature of the stake transfer.
    pub signature: String,
    /// Paying account.
    pub public_key: String,
    /// Mode the stake is for.
    pub mode: String,
}

/// Reply of `POST /api/payments/verify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyPaymentResponse {
    /// Whether the stake checks out.
    pub verified: bool,
    /// Lamports credited to the treasury.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    /// Why verification failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Body of `POST /api/ai/move`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiMoveRequest {
    /// Position to answer.
    pub state: GameSnapshot,
    /// Symbol the bot plays.
    pub player: Player,
    /// Bot strength.
    #[serde(default)]
    pub difficulty: Difficulty,
}

/// Reply of `POST /api/ai/move`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiMoveResponse {
    /// Chosen row.
    pub row: usize,
    /// Chosen column.
    pub col: usize,
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws_handler))
        .route("/api/payments/verify", post(verify_payment))
        .route("/api/ai/move", post(ai_move))
        .with_state(state)
}

/// Sweeps stale escrow records every `interval`, at most once a second.
pub fn spawn_escrow_sweep(escrow: Arc<EscrowLedger>, interval: Duration) -> JoinHandle<()> {
    let interval = interval.max(MIN_SWEEP_INTERVAL);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = escrow.cleanup();
            debug!(removed, remaining = escrow.len(), "Escrow sweep");
        }
    })
}

/// Drops rooms that finished more than `retention` ago, checking every
/// `interval` (at most once a second).
pub fn spawn_room_sweep(
    orchestrator: Arc<MatchOrchestrator>,
    interval: Duration,
    retention: Duration,
) -> JoinHandle<()> {
    let interval = interval.max(MIN_SWEEP_INTERVAL);
    let retention = chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = orchestrator.sweep_finished_rooms(retention);
            debug!(removed, remaining = orchestrator.room_count(), "Room sweep");
        }
    })
}

async fn health() -> &'static str {
    "ok"
}

#[instrument(skip_all)]
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.gateway))
}

#[instrument(skip(socket, gateway))]
async fn handle_socket(socket: WebSocket, gateway: Gateway) {
    let connection = Uuid::new_v4();
    info!(%connection, "Client connected");
    let mut outbound = gateway.hub().register(connection);
    let (mut sink, mut stream) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    error!(error = %e, "Failed to encode event");
                    continue;
                }
            };
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientIntent>(text.as_str()) {
                Ok(intent) => gateway.handle_intent(connection, intent).await,
                Err(e) => {
                    warn!(error = %e, "Malformed intent");
                    gateway
                        .hub()
                        .send(connection, ServerEvent::room_error(format!("Malformed message: {}", e)));
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Socket error");
                break;
            }
        }
    }

    gateway.handle_disconnect(connection).await;
    writer.abort();
    info!(%connection, "Client disconnected");
}

#[instrument(skip_all)]
async fn verify_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Json<VerifyPaymentResponse> {
    let mode = GameMode::resolve(&request.mode);
    debug!(%mode, "Verifying payment");
    let response = match state
        .escrow()
        .verify(&request.signature, &request.public_key, mode)
        .await
    {
        Ok(amount) => VerifyPaymentResponse {
            verified: true,
            amount: Some(amount),
            error: None,
        },
        Err(e) => VerifyPaymentResponse {
            verified: false,
            amount: None,
            error: Some(e.to_string()),
        },
    };
    Json(response)
}

#[instrument(skip_all)]
async fn ai_move(Json(request): Json<AiMoveRequest>) -> Response {
    debug!(player = %request.player, difficulty = %request.difficulty, "AI move requested");
    if !request.state.is_consistent() {
        warn!("Rejecting inconsistent game state");
        return unprocessable("Inconsistent game state");
    }
    match pick_move(&request) {
        Some((row, col)) => Json(AiMoveResponse { row, col }).into_response(),
        None => unprocessable("No legal move"),
    }
}

fn unprocessable(message: &str) -> Response {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(serde_json::json!({ "error": message })),
    )
        .into_response()
}

fn pick_move(request: &AiMoveRequest) -> Option<(usize, usize)> {
    let mut rng = rand::rng();
    recommend_move(&request.state, request.player, request.difficulty, &mut rng).map(|c| (c.row, c.col))
}
