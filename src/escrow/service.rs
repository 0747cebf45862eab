//! Escrow state machine over all staked rooms.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use derive_getters::Getters;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::error::EscrowError;
use super::ledger::Ledger;
use super::record::{EscrowRecord, EscrowStatus, PayoutSplit};
use crate::config::{EscrowConfig, FeeSchedule};
use crate::games::grid::GameMode;

/// Treasury share of a stake, in tenths. The rest goes to a secondary recipient.
const TREASURY_SHARE_TENTHS: u64 = 8;

/// Result of a payout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct PayoutReceipt {
    /// Identity paid, `None` for a draw.
    winner: Option<String>,
    /// Lamports sent to the winner, or refunded per player on a draw.
    amount: u64,
    /// Signature of the winner's transfer, absent if it failed.
    signature: Option<String>,
    /// Signatures of draw refunds that went through.
    refunds: Vec<String>,
}

/// Per-room escrow records and the treasury that backs them.
///
/// Each record sits behind its own async mutex. Mutating operations hold
/// that lock across every ledger call they make, so two events for the
/// same room never interleave, while other rooms proceed freely.
///
/// A stake signature pays for exactly one seat. Spent signatures are kept
/// for the life of the process, outliving the records they paid for.
#[derive(Debug)]
pub struct EscrowLedger {
    records: DashMap<String, Arc<Mutex<EscrowRecord>>>,
    spent: DashMap<String, String>,
    ledger: Arc<dyn Ledger>,
    treasury: String,
    fees: FeeSchedule,
    config: EscrowConfig,
}

impl EscrowLedger {
    /// Creates an empty escrow backed by `ledger`, paying out of `treasury`.
    #[instrument(skip(ledger))]
    pub fn new(ledger: Arc<dyn Ledger>, treasury: String, fees: FeeSchedule, config: EscrowConfig) -> Self {
        info!("Creating escrow ledger");
        Self {
            records: DashMap::new(),
            spent: DashMap::new(),
            ledger,
            treasury,
            fees,
            config,
        }
    }

    /// Entry fee per player for a mode. Zero for free modes.
    pub fn fee_for(&self, mode: GameMode) -> u64 {
        self.fees.fee_for(mode)
    }

    /// Treasury account.
    pub fn treasury(&self) -> &str {
        &self.treasury
    }

    /// Opens a pending record for a staked room.
    ///
    /// Returns `Ok(None)` for free modes, which never get a record.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::EscrowAlreadyExists`] if the room has one.
    #[instrument(skip(self))]
    pub fn create(
        &self,
        room_id: &str,
        player_x: &str,
        player_o: &str,
        mode: GameMode,
    ) -> Result<Option<EscrowRecord>, EscrowError> {
        self.create_at(room_id, player_x, player_o, mode, Utc::now())
    }

    /// Like [`create`](Self::create) with an explicit creation time.
    ///
    /// # Errors
    ///
    /// Returns [`EscrowError::EscrowAlreadyExists`] if the room has one.
    #[instrument(skip(self))]
    pub fn create_at(
        &self,
        room_id: &str,
        player_x: &str,
        player_o: &str,
        mode: GameMode,
        created_at: DateTime<Utc>,
    ) -> Result<Option<EscrowRecord>, EscrowError> {
        let fee = self.fee_for(mode);
        if fee == 0 {
            debug!("Free mode, no escrow");
            return Ok(None);
        }
        let record = EscrowRecord::new_at(
            room_id.to_string(),
            player_x.to_string(),
            player_o.to_string(),
            mode,
            fee,
            created_at,
        );
        match self.records.entry(room_id.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(EscrowError::EscrowAlreadyExists(room_id.to_string())),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(Mutex::new(record.clone())));
                info!(fee, "Escrow created");
                Ok(Some(record))
            }
        }
    }

    /// Checks that `payer_id` paid the treasury its share of the mode's fee
    /// in `signature`.
    ///
    /// Returns the lamports credited to the treasury.
    ///
    /// # Errors
    ///
    /// Fails if the mode is free, the transaction is unknown or errored, the
    /// payer did not fund it, the treasury is absent from it, or the credit
    /// is outside tolerance.
    #[instrument(skip(self))]
    pub async fn verify(&self, signature: &str, payer_id: &str, mode: GameMode) -> Result<u64, EscrowError> {
        let fee = self.fee_for(mode);
        if fee == 0 {
            return Err(EscrowError::FreeMode(mode.to_string()));
        }
        let expected = fee * TREASURY_SHARE_TENTHS / 10;

        let tx = self
            .ledger
            .get_transaction(signature)
            .await?
            .ok_or_else(|| EscrowError::TransactionNotFound(signature.to_string()))?;
        if let Some(err) = tx.err {
            warn!(error = %err, "Payment transaction failed on chain");
            return Err(EscrowError::TransactionFailed(err));
        }
        if !tx.funded_by(payer_id) {
            warn!("Payer did not fund the transaction");
            return Err(EscrowError::PayerNotInTransaction(payer_id.to_string()));
        }
        let credited = tx
            .credited_to(&self.treasury)
            .ok_or(EscrowError::TreasuryNotInTransaction)?;

        if (credited - i128::from(expected)).unsigned_abs() > u128::from(*self.config.amount_tolerance()) {
            warn!(expected, credited = %credited, "Payment amount mismatch");
            return Err(EscrowError::PaymentAmountMismatch {
                expected,
                actual: credited,
            });
        }
        let amount = u64::try_from(credited).unwrap_or(0);
        info!(amount, "Payment verified");
        Ok(amount)
    }

    /// Records a verified stake. Returns the updated record.
    ///
    /// # Errors
    ///
    /// Fails if no record exists, the signature already paid for a seat, the
    /// record is not pending, the player is not a participant, or their slot
    /// is already paid.
    #[instrument(skip(self))]
    pub async fn record_payment(
        &self,
        room_id: &str,
        player_id: &str,
        signature: &str,
    ) -> Result<EscrowRecord, EscrowError> {
        let handle = self.handle(room_id)?;
        let mut record = handle.lock().await;
        let slot = match self.spent.entry(signature.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(used) => {
                warn!(used_for = %used.get(), "Stake signature reused");
                return Err(EscrowError::SignatureAlreadyUsed(signature.to_string()));
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => slot,
        };
        let active = record.record_payment(player_id, signature.to_string())?;
        slot.insert(room_id.to_string());
        if active {
            info!("Both stakes received, escrow active");
        } else {
            info!("Stake recorded");
        }
        Ok(record.clone())
    }

    /// Returns the stake owed to the player who stayed.
    ///
    /// Returns the refund signature, or `None` when nobody had paid or the
    /// transfer could not be made. The record is `refunded` afterwards in
    /// every case.
    ///
    /// # Errors
    ///
    /// Fails if no record exists or the record is already terminal.
    #[instrument(skip(self))]
    pub async fn refund_on_disconnect(
        &self,
        room_id: &str,
        disconnected_player_id: &str,
    ) -> Result<Option<String>, EscrowError> {
        let handle = self.handle(room_id)?;
        let mut record = handle.lock().await;
        record.ensure_open()?;

        let owed = record
            .refund_owed(disconnected_player_id)
            .map(|slot| slot.player_id().clone());
        let Some(recipient) = owed else {
            record.set_status(EscrowStatus::Refunded);
            info!("Nobody to refund, escrow refunded");
            return Ok(None);
        };

        let fee = *record.fee();
        let signature = match self.transfer_from_treasury(&recipient, fee).await {
            Ok(sig) => {
                record.push_disbursement(sig.clone());
                Some(sig)
            }
            Err(e) => {
                error!(recipient = %recipient, fee, error = %e, "Refund failed, needs manual reconciliation");
                None
            }
        };
        record.set_status(EscrowStatus::Refunded);
        info!(recipient = %recipient, refunded = signature.is_some(), "Escrow refunded");
        Ok(signature)
    }

    /// Pays the pot to the winner, or refunds both stakes on a draw.
    ///
    /// Transfers are independent and best-effort; the record is `completed`
    /// afterwards even if some failed.
    ///
    /// # Errors
    ///
    /// Fails if no record exists, the record is terminal, or it is not active.
    #[instrument(skip(self))]
    pub async fn payout(&self, room_id: &str, winner: Option<&str>) -> Result<PayoutReceipt, EscrowError> {
        let handle = self.handle(room_id)?;
        let mut record = handle.lock().await;
        record.ensure_open()?;
        if *record.status() != EscrowStatus::Active {
            return Err(EscrowError::EscrowNotActive(room_id.to_string()));
        }
        let fee = *record.fee();

        let receipt = match winner {
            Some(winner) => {
                if !record.is_participant(winner) {
                    return Err(EscrowError::NotAParticipant(winner.to_string()));
                }
                let split = PayoutSplit::for_fee(fee);
                let signature = match self.transfer_from_treasury(winner, split.winner_amount).await {
                    Ok(sig) => {
                        record.push_disbursement(sig.clone());
                        Some(sig)
                    }
                    Err(e) => {
                        error!(winner, amount = split.winner_amount, error = %e, "Payout failed, needs manual reconciliation");
                        None
                    }
                };
                info!(winner, amount = split.winner_amount, platform_fee = split.platform_fee, "Pot paid out");
                PayoutReceipt {
                    winner: Some(winner.to_string()),
                    amount: split.winner_amount,
                    signature,
                    refunds: Vec::new(),
                }
            }
            None => {
                let payers: Vec<String> = record.paid_slots().map(|s| s.player_id().clone()).collect();
                let mut refunds = Vec::new();
                for payer in payers {
                    match self.transfer_from_treasury(&payer, fee).await {
                        Ok(sig) => {
                            record.push_disbursement(sig.clone());
                            refunds.push(sig);
                        }
                        Err(e) => {
                            error!(payer = %payer, fee, error = %e, "Draw refund failed, needs manual reconciliation");
                        }
                    }
                }
                info!(refunds = refunds.len(), "Draw, stakes returned");
                PayoutReceipt {
                    winner: None,
                    amount: fee,
                    signature: None,
                    refunds,
                }
            }
        };

        record.set_status(EscrowStatus::Completed);
        Ok(receipt)
    }

    /// Current status of a room's record.
    pub async fn status(&self, room_id: &str) -> Option<EscrowStatus> {
        let handle = self.records.get(room_id).map(|r| Arc::clone(r.value()))?;
        let record = handle.lock().await;
        Some(*record.status())
    }

    /// Copy of a room's record.
    pub async fn record(&self, room_id: &str) -> Option<EscrowRecord> {
        let handle = self.records.get(room_id).map(|r| Arc::clone(r.value()))?;
        let record = handle.lock().await;
        Some(record.clone())
    }

    /// Number of records held.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true when no records are held.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drops stale records that are not active. Returns how many went.
    #[instrument(skip(self))]
    pub fn cleanup(&self) -> usize {
        self.cleanup_at(Utc::now())
    }

    /// Like [`cleanup`](Self::cleanup) with an explicit clock.
    ///
    /// Records locked by an in-flight operation are kept until the next sweep.
    #[instrument(skip(self))]
    pub fn cleanup_at(&self, now: DateTime<Utc>) -> usize {
        let max_age = i64::try_from(*self.config.record_max_age_secs())
            .ok()
            .and_then(Duration::try_seconds)
            .unwrap_or(Duration::MAX);
        let mut removed = 0;
        self.records.retain(|_, handle| match handle.try_lock() {
            Ok(record) => {
                let stale = now - *record.created_at() > max_age;
                let keep = !stale || *record.status() == EscrowStatus::Active;
                if !keep {
                    removed += 1;
                }
                keep
            }
            Err(_) => true,
        });
        if removed > 0 {
            info!(removed, "Stale escrows swept");
        }
        removed
    }

    fn handle(&self, room_id: &str) -> Result<Arc<Mutex<EscrowRecord>>, EscrowError> {
        self.records
            .get(room_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| EscrowError::EscrowNotFound(room_id.to_string()))
    }

    async fn transfer_from_treasury(&self, to: &str, lamports: u64) -> Result<String, EscrowError> {
        if !self.ledger.has_signer(&self.treasury) {
            return Err(EscrowError::TreasurySignerUnavailable);
        }
        let available = self.ledger.get_balance(&self.treasury).await?;
        if available < lamports {
            return Err(EscrowError::InsufficientTreasuryFunds {
                available,
                required: lamports,
            });
        }
        let signature = self.ledger.submit_transfer(&self.treasury, to, lamports).await?;
        info!(to, lamports, %signature, "Transfer submitted");
        Ok(signature)
    }
}
