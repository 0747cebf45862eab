//! Tests for the escrow state machine against an in-memory ledger.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};

use grid_arena::{
    EscrowConfig, EscrowError, EscrowLedger, EscrowStatus, FeeSchedule, GameMode, Ledger, LedgerError,
    LedgerTransaction,
};

const TREASURY: &str = "treasury";
const FEE: u64 = 1_000;

/// Ledger double: canned transactions, a treasury balance, and a transfer log.
#[derive(Debug)]
struct MockLedger {
    transactions: Mutex<HashMap<String, LedgerTransaction>>,
    balance: Mutex<u64>,
    transfers: Mutex<Vec<(String, u64)>>,
    can_sign: bool,
}

impl MockLedger {
    fn new(balance: u64, can_sign: bool) -> Self {
        Self {
            transactions: Mutex::new(HashMap::new()),
            balance: Mutex::new(balance),
            transfers: Mutex::new(Vec::new()),
            can_sign,
        }
    }

    /// Registers a payment crediting the treasury with `credited` lamports.
    fn add_payment(&self, signature: &str, payer: &str, credited: u64) {
        let tx = LedgerTransaction {
            err: None,
            account_keys: vec![payer.to_string(), TREASURY.to_string()],
            pre_balances: vec![10_000, 0],
            post_balances: vec![10_000 - credited - 5, credited],
        };
        self.transactions
            .lock()
            .expect("Lock poisoned")
            .insert(signature.to_string(), tx);
    }

    fn add_transaction(&self, signature: &str, tx: LedgerTransaction) {
        self.transactions
            .lock()
            .expect("Lock poisoned")
            .insert(signature.to_string(), tx);
    }

    fn transfers(&self) -> Vec<(String, u64)> {
        self.transfers.lock().expect("Lock poisoned").clone()
    }
}

#[async_trait]
impl Ledger for MockLedger {
    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTransaction>, LedgerError> {
        Ok(self
            .transactions
            .lock()
            .expect("Lock poisoned")
            .get(signature)
            .cloned())
    }

    async fn get_balance(&self, _account: &str) -> Result<u64, LedgerError> {
        Ok(*self.balance.lock().expect("Lock poisoned"))
    }

    async fn submit_transfer(&self, _from: &str, to: &str, lamports: u64) -> Result<String, LedgerError> {
        let mut balance = self.balance.lock().expect("Lock poisoned");
        *balance = balance
            .checked_sub(lamports)
            .ok_or_else(|| LedgerError::new("insufficient funds"))?;
        let mut transfers = self.transfers.lock().expect("Lock poisoned");
        transfers.push((to.to_string(), lamports));
        Ok(format!("sig-{}", transfers.len()))
    }

    fn has_signer(&self, account: &str) -> bool {
        self.can_sign && account == TREASURY
    }
}

fn setup(balance: u64) -> (Arc<MockLedger>, EscrowLedger) {
    setup_with(MockLedger::new(balance, true))
}

fn setup_with(mock: MockLedger) -> (Arc<MockLedger>, EscrowLedger) {
    let mock = Arc::new(mock);
    let ledger: Arc<dyn Ledger> = mock.clone();
    let escrow = EscrowLedger::new(
        ledger,
        TREASURY.to_string(),
        FeeSchedule::flat(FEE),
        EscrowConfig::new(50, 3_600, 300),
    );
    (mock, escrow)
}

async fn activate(escrow: &EscrowLedger, room: &str) {
    escrow
        .create(room, "alice", "bob", GameMode::RankedLow)
        .expect("Create failed")
        .expect("Staked mode has a record");
    escrow
        .record_payment(room, "alice", &format!("{room}-pay-a"))
        .await
        .expect("Payment failed");
    escrow
        .record_payment(room, "bob", &format!("{room}-pay-b"))
        .await
        .expect("Payment failed");
}

#[test]
fn test_free_modes_have_no_escrow() {
    let (_mock, escrow) = setup(0);
    let record = escrow
        .create("room", "alice", "bob", GameMode::Training)
        .expect("Create failed");
    assert!(record.is_none());
    assert!(escrow.is_empty());
}

#[test]
fn test_duplicate_escrow_rejected() {
    let (_mock, escrow) = setup(0);
    escrow.create("room", "alice", "bob", GameMode::RankedLow).expect("Create failed");
    let again = escrow.create("room", "alice", "bob", GameMode::RankedLow);
    assert_eq!(again, Err(EscrowError::EscrowAlreadyExists("room".to_string())));
}

#[tokio::test]
async fn test_payments_activate_escrow() {
    let (_mock, escrow) = setup(0);
    escrow.create("room", "alice", "bob", GameMode::RankedMid).expect("Create failed");

    let first = escrow.record_payment("room", "alice", "pay-a").await.expect("Payment failed");
    assert_eq!(*first.status(), EscrowStatus::Pending);
    assert_eq!(
        escrow.record_payment("room", "alice", "pay-a2").await,
        Err(EscrowError::AlreadyPaid("alice".to_string()))
    );
    assert_eq!(
        escrow.record_payment("room", "mallory", "pay-m").await,
        Err(EscrowError::NotAParticipant("mallory".to_string()))
    );

    let second = escrow.record_payment("room", "bob", "pay-b").await.expect("Payment failed");
    assert_eq!(*second.status(), EscrowStatus::Active);
    assert_eq!(escrow.status("room").await, Some(EscrowStatus::Active));
}

#[tokio::test]
async fn test_payment_for_unknown_room() {
    let (_mock, escrow) = setup(0);
    let result = escrow.record_payment("ghost", "alice", "sig").await;
    assert_eq!(result, Err(EscrowError::EscrowNotFound("ghost".to_string())));
}

#[tokio::test]
async fn test_verify_accepts_treasury_share() {
    let (mock, escrow) = setup(0);
    mock.add_payment("pay-a", "alice", 800);
    let amount = escrow.verify("pay-a", "alice", GameMode::RankedLow).await.expect("Verify failed");
    assert_eq!(amount, 800);

    // Within tolerance.
    mock.add_payment("pay-b", "bob", 830);
    assert_eq!(escrow.verify("pay-b", "bob", GameMode::RankedLow).await, Ok(830));
}

#[tokio::test]
async fn test_verify_failures() {
    let (mock, escrow) = setup(0);

    assert_eq!(
        escrow.verify("nope", "alice", GameMode::RankedLow).await,
        Err(EscrowError::TransactionNotFound("nope".to_string()))
    );
    assert!(matches!(
        escrow.verify("nope", "alice", GameMode::Bot).await,
        Err(EscrowError::FreeMode(_))
    ));

    mock.add_payment("short", "alice", 500);
    assert_eq!(
        escrow.verify("short", "alice", GameMode::RankedLow).await,
        Err(EscrowError::PaymentAmountMismatch {
            expected: 800,
            actual: 500,
        })
    );

    mock.add_transaction(
        "elsewhere",
        LedgerTransaction {
            err: None,
            account_keys: vec!["alice".to_string(), "stranger".to_string()],
            pre_balances: vec![10_000, 0],
            post_balances: vec![9_200, 800],
        },
    );
    assert_eq!(
        escrow.verify("elsewhere", "alice", GameMode::RankedLow).await,
        Err(EscrowError::TreasuryNotInTransaction)
    );

    mock.add_transaction(
        "failed",
        LedgerTransaction {
            err: Some("InstructionError".to_string()),
            ..LedgerTransaction::default()
        },
    );
    assert!(matches!(
        escrow.verify("failed", "alice", GameMode::RankedLow).await,
        Err(EscrowError::TransactionFailed(_))
    ));
}

#[tokio::test]
async fn test_verify_rejects_someone_elses_payment() {
    let (mock, escrow) = setup(0);
    mock.add_payment("pay-a", "alice", 800);
    assert_eq!(
        escrow.verify("pay-a", "bob", GameMode::RankedLow).await,
        Err(EscrowError::PayerNotInTransaction("bob".to_string()))
    );
    assert_eq!(escrow.verify("pay-a", "alice", GameMode::RankedLow).await, Ok(800));
}

#[tokio::test]
async fn test_signature_pays_for_one_seat_only() {
    let (_mock, escrow) = setup(0);
    escrow.create("room", "alice", "bob", GameMode::RankedLow).expect("Create failed");
    escrow.create("room2", "alice", "carol", GameMode::RankedLow).expect("Create failed");
    escrow.record_payment("room", "alice", "pay-a").await.expect("Payment failed");

    let same_room = escrow.record_payment("room", "bob", "pay-a").await;
    assert_eq!(same_room, Err(EscrowError::SignatureAlreadyUsed("pay-a".to_string())));
    let other_room = escrow.record_payment("room2", "alice", "pay-a").await;
    assert_eq!(other_room, Err(EscrowError::SignatureAlreadyUsed("pay-a".to_string())));
    assert_eq!(escrow.status("room").await, Some(EscrowStatus::Pending));
    assert_eq!(escrow.status("room2").await, Some(EscrowStatus::Pending));

    // A rejected payment does not burn its signature.
    assert!(matches!(
        escrow.record_payment("room", "mallory", "pay-b").await,
        Err(EscrowError::NotAParticipant(_))
    ));
    let record = escrow.record_payment("room", "bob", "pay-b").await.expect("Payment failed");
    assert_eq!(*record.status(), EscrowStatus::Active);
}

#[tokio::test]
async fn test_spent_signature_outlives_swept_record() {
    let (_mock, escrow) = setup(0);
    let old = Utc::now() - Duration::hours(2);
    escrow
        .create_at("stale", "alice", "bob", GameMode::RankedLow, old)
        .expect("Create failed");
    escrow.record_payment("stale", "alice", "pay-a").await.expect("Payment failed");
    assert_eq!(escrow.cleanup_at(Utc::now()), 1);

    escrow.create("fresh", "alice", "bob", GameMode::RankedLow).expect("Create failed");
    assert_eq!(
        escrow.record_payment("fresh", "alice", "pay-a").await,
        Err(EscrowError::SignatureAlreadyUsed("pay-a".to_string()))
    );
}

#[tokio::test]
async fn test_payout_sends_pot_minus_platform_fee() {
    let (mock, escrow) = setup(10_000);
    activate(&escrow, "room").await;

    let receipt = escrow.payout("room", Some("bob")).await.expect("Payout failed");
    assert_eq!(*receipt.amount(), 1_800);
    assert_eq!(receipt.winner().as_deref(), Some("bob"));
    assert_eq!(receipt.signature().as_deref(), Some("sig-1"));
    assert_eq!(mock.transfers(), vec![("bob".to_string(), 1_800)]);
    assert_eq!(escrow.status("room").await, Some(EscrowStatus::Completed));

    let again = escrow.payout("room", Some("bob")).await;
    assert!(matches!(again, Err(EscrowError::EscrowAlreadyProcessed { .. })));
}

#[tokio::test]
async fn test_draw_refunds_each_payer() {
    let (mock, escrow) = setup(10_000);
    activate(&escrow, "room").await;

    let receipt = escrow.payout("room", None).await.expect("Payout failed");
    assert!(receipt.winner().is_none());
    assert_eq!(receipt.refunds().len(), 2);
    assert_eq!(
        mock.transfers(),
        vec![("alice".to_string(), FEE), ("bob".to_string(), FEE)]
    );
    let record = escrow.record("room").await.expect("Record gone");
    assert_eq!(record.disbursements().len(), 2);
}

#[tokio::test]
async fn test_payout_requires_active_escrow() {
    let (_mock, escrow) = setup(10_000);
    escrow.create("room", "alice", "bob", GameMode::RankedLow).expect("Create failed");
    escrow.record_payment("room", "alice", "pay-a").await.expect("Payment failed");
    assert_eq!(
        escrow.payout("room", Some("alice")).await,
        Err(EscrowError::EscrowNotActive("room".to_string()))
    );
}

#[tokio::test]
async fn test_payout_to_stranger_rejected() {
    let (mock, escrow) = setup(10_000);
    activate(&escrow, "room").await;
    assert_eq!(
        escrow.payout("room", Some("mallory")).await,
        Err(EscrowError::NotAParticipant("mallory".to_string()))
    );
    assert!(mock.transfers().is_empty());
    assert_eq!(escrow.status("room").await, Some(EscrowStatus::Active));
}

#[tokio::test]
async fn test_underfunded_treasury_still_completes() {
    let (mock, escrow) = setup(100);
    activate(&escrow, "room").await;
    let receipt = escrow.payout("room", Some("alice")).await.expect("Payout failed");
    assert!(receipt.signature().is_none());
    assert!(mock.transfers().is_empty());
    assert_eq!(escrow.status("room").await, Some(EscrowStatus::Completed));
}

#[tokio::test]
async fn test_refund_on_disconnect_pays_remaining_player() {
    let (mock, escrow) = setup(10_000);
    escrow.create("room", "alice", "bob", GameMode::RankedLow).expect("Create failed");
    escrow.record_payment("room", "bob", "pay-b").await.expect("Payment failed");

    let signature = escrow
        .refund_on_disconnect("room", "alice")
        .await
        .expect("Refund failed");
    assert_eq!(signature.as_deref(), Some("sig-1"));
    assert_eq!(mock.transfers(), vec![("bob".to_string(), FEE)]);
    assert_eq!(escrow.status("room").await, Some(EscrowStatus::Refunded));

    let again = escrow.refund_on_disconnect("room", "alice").await;
    assert_eq!(
        again,
        Err(EscrowError::EscrowAlreadyProcessed {
            room_id: "room".to_string(),
            status: "refunded".to_string(),
        })
    );
}

#[tokio::test]
async fn test_refund_with_nobody_paid() {
    let (mock, escrow) = setup(10_000);
    escrow.create("room", "alice", "bob", GameMode::RankedLow).expect("Create failed");
    let signature = escrow.refund_on_disconnect("room", "bob").await.expect("Refund failed");
    assert!(signature.is_none());
    assert!(mock.transfers().is_empty());
    assert_eq!(escrow.status("room").await, Some(EscrowStatus::Refunded));
}

#[tokio::test]
async fn test_refund_without_signer_marks_refunded() {
    let (mock, escrow) = setup_with(MockLedger::new(10_000, false));
    activate(&escrow, "room").await;
    let signature = escrow.refund_on_disconnect("room", "alice").await.expect("Refund failed");
    assert!(signature.is_none());
    assert!(mock.transfers().is_empty());
    assert_eq!(escrow.status("room").await, Some(EscrowStatus::Refunded));
}

#[tokio::test]
async fn test_cleanup_keeps_active_and_fresh_records() {
    let (_mock, escrow) = setup(10_000);
    let old = Utc::now() - Duration::hours(2);
    escrow
        .create_at("stale-pending", "a", "b", GameMode::RankedLow, old)
        .expect("Create failed");
    escrow
        .create_at("stale-active", "alice", "bob", GameMode::RankedLow, old)
        .expect("Create failed");
    escrow.record_payment("stale-active", "alice", "p1").await.expect("Payment failed");
    escrow.record_payment("stale-active", "bob", "p2").await.expect("Payment failed");
    escrow.create("fresh", "c", "d", GameMode::RankedLow).expect("Create failed");

    let removed = escrow.cleanup_at(Utc::now());
    assert_eq!(removed, 1);
    assert_eq!(escrow.len(), 2);
    assert!(escrow.status("stale-pending").await.is_none());
    assert_eq!(escrow.status("stale-active").await, Some(EscrowStatus::Active));
}

#[tokio::test]
async fn test_concurrent_rooms_settle_independently() {
    let (mock, escrow) = setup(100_000);
    let escrow = Arc::new(escrow);
    for i in 0..8 {
        activate(&escrow, &format!("room-{i}")).await;
    }

    let mut handles = Vec::new();
    for i in 0..8 {
        let escrow = Arc::clone(&escrow);
        handles.push(tokio::spawn(async move {
            escrow.payout(&format!("room-{i}"), Some("alice")).await
        }));
    }
    for handle in handles {
        handle.await.expect("Task panicked").expect("Payout failed");
    }
    assert_eq!(mock.transfers().len(), 8);
}
