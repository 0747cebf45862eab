//! Tests for the HTTP endpoints.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tempfile::NamedTempFile;
use tower::ServiceExt;

use grid_arena::{
    AppState, BoardEngine, EscrowConfig, EscrowLedger, FeeSchedule, GameMode, GameRepository, GameStore, Gateway,
    Hub, Ledger, LedgerError, LedgerTransaction, MatchOrchestrator, Player, router, spawn_escrow_sweep,
    spawn_room_sweep,
};

const TREASURY: &str = "treasury";

/// Ledger that knows one stake payment.
#[derive(Debug, Default)]
struct StaticLedger {
    transactions: HashMap<String, LedgerTransaction>,
}

#[async_trait]
impl Ledger for StaticLedger {
    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTransaction>, LedgerError> {
        Ok(self.transactions.get(signature).cloned())
    }

    async fn get_balance(&self, _account: &str) -> Result<u64, LedgerError> {
        Ok(0)
    }

    async fn submit_transfer(&self, _from: &str, _to: &str, _lamports: u64) -> Result<String, LedgerError> {
        Err(LedgerError::new("transfers disabled"))
    }

    fn has_signer(&self, _account: &str) -> bool {
        false
    }
}

fn app() -> (NamedTempFile, axum::Router) {
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let db_path = db_file.path().to_str().expect("Invalid path").to_string();
    let repo = GameRepository::new(db_path).expect("Failed to create repository");
    repo.run_migrations().expect("Migrations failed");
    let store: Arc<dyn GameStore> = Arc::new(repo);

    let mut ledger = StaticLedger::default();
    ledger.transactions.insert(
        "good-sig".to_string(),
        LedgerTransaction {
            err: None,
            account_keys: vec!["alice".to_string(), TREASURY.to_string()],
            pre_balances: vec![100_000, 0],
            post_balances: vec![91_995, 8_000],
        },
    );
    let ledger: Arc<dyn Ledger> = Arc::new(ledger);

    let fees = FeeSchedule::flat(10_000);
    let escrow = Arc::new(EscrowLedger::new(
        ledger,
        TREASURY.to_string(),
        fees,
        EscrowConfig::new(100, 3_600, 300),
    ));
    let orchestrator = Arc::new(MatchOrchestrator::new(store, fees));
    let gateway = Gateway::new(orchestrator, escrow, Arc::new(Hub::new()));
    (db_file, router(AppState::new(gateway)))
}

async fn post_json(app: axum::Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request");
    let response = app.oneshot(request).await.expect("Request failed");
    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("Failed to read body")
        .to_bytes();
    let value = serde_json::from_slice(&bytes).expect("Body is not JSON");
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let (_db, app) = app();
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .expect("Failed to build request");
    let response = app.oneshot(request).await.expect("Request failed");
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.expect("Body").to_bytes();
    assert_eq!(&bytes[..], b"ok");
}

#[tokio::test]
async fn test_verify_payment_success() {
    let (_db, app) = app();
    let (status, body) = post_json(
        app,
        "/api/payments/verify",
        json!({ "signature": "good-sig", "publicKey": "alice", "mode": "ranked-low" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], json!(true));
    assert_eq!(body["amount"], json!(8_000));
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn test_verify_payment_unknown_signature() {
    let (_db, app) = app();
    let (status, body) = post_json(
        app,
        "/api/payments/verify",
        json!({ "signature": "missing", "publicKey": "alice", "mode": "ranked-mid" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["verified"], json!(false));
    assert!(body["error"].as_str().is_some_and(|e| e.contains("not found")));
}

#[tokio::test]
async fn test_verify_payment_free_mode() {
    let (_db, app) = app();
    let (_, body) = post_json(
        app,
        "/api/payments/verify",
        json!({ "signature": "good-sig", "publicKey": "alice", "mode": "training" }),
    )
    .await;
    assert_eq!(body["verified"], json!(false));
}

#[tokio::test]
async fn test_ai_move_returns_legal_cell() {
    let (_db, app) = app();
    let mut engine = BoardEngine::new(GameMode::Training.config());
    engine.apply_move(1, 1, Player::X).expect("Move failed");
    let snapshot = engine.snapshot();

    let (status, body) = post_json(
        app,
        "/api/ai/move",
        json!({ "state": snapshot, "player": "O", "difficulty": "hard" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let row = body["row"].as_u64().expect("row") as usize;
    let col = body["col"].as_u64().expect("col") as usize;
    assert!(snapshot.board.is_empty(row, col));
}

#[tokio::test]
async fn test_ai_move_on_finished_game_is_unprocessable() {
    let (_db, app) = app();
    let mut engine = BoardEngine::new(GameMode::RankedMid.config());
    for (row, col) in [(0, 0), (5, 0), (0, 1), (5, 1), (0, 2), (5, 2), (0, 3)] {
        let turn = engine.current_player();
        engine.apply_move(row, col, turn).expect("Move failed");
    }

    let (status, body) = post_json(
        app,
        "/api/ai/move",
        json!({ "state": engine.snapshot(), "player": "O" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], json!("No legal move"));
}

#[tokio::test]
async fn test_ai_move_rejects_inconsistent_board() {
    let (_db, app) = app();
    let mut state = serde_json::to_value(BoardEngine::new(GameMode::Training.config()).snapshot())
        .expect("Snapshot is not JSON");
    state["board"]["cells"] = json!(["Empty"]);

    let (status, body) = post_json(
        app,
        "/api/ai/move",
        json!({ "state": state, "player": "X", "difficulty": "hard" }),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], json!("Inconsistent game state"));
}

#[tokio::test]
async fn test_ai_move_rejects_board_of_wrong_size() {
    let (_db, app) = app();
    let mut state = serde_json::to_value(BoardEngine::new(GameMode::Training.config()).snapshot())
        .expect("Snapshot is not JSON");
    state["board"] = serde_json::to_value(BoardEngine::new(GameMode::RankedHigh.config()).snapshot().board)
        .expect("Board is not JSON");

    let (status, _) = post_json(app, "/api/ai/move", json!({ "state": state, "player": "X" })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_sweeps_survive_zero_interval() {
    let ledger: Arc<dyn Ledger> = Arc::new(StaticLedger::default());
    let escrow = Arc::new(EscrowLedger::new(
        ledger,
        TREASURY.to_string(),
        FeeSchedule::flat(10),
        EscrowConfig::new(0, 3_600, 0),
    ));
    let db_file = NamedTempFile::new().expect("Failed to create temp file");
    let repo = GameRepository::new(db_file.path().to_str().expect("Invalid path").to_string())
        .expect("Failed to create repository");
    repo.run_migrations().expect("Migrations failed");
    let store: Arc<dyn GameStore> = Arc::new(repo);
    let orchestrator = Arc::new(MatchOrchestrator::new(store, FeeSchedule::flat(10)));

    let escrow_sweep = spawn_escrow_sweep(escrow, Duration::ZERO);
    let room_sweep = spawn_room_sweep(orchestrator, Duration::ZERO, Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!escrow_sweep.is_finished(), "Escrow sweep stopped");
    assert!(!room_sweep.is_finished(), "Room sweep stopped");
    escrow_sweep.abort();
    room_sweep.abort();
}
