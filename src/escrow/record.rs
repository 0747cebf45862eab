//! Per-room escrow record and its state machine.

use chrono::{DateTime, Utc};
use derive_getters::Getters;
use serde::{Deserialize, Serialize};

use super::error::EscrowError;
use crate::games::grid::GameMode;

/// Share of the pot kept by the platform, in percent.
pub const PLATFORM_FEE_PERCENT: u64 = 10;

/// Escrow lifecycle. `Completed` and `Refunded` are absorbing.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum EscrowStatus {
    /// Waiting for both stakes.
    Pending,
    /// Both stakes received.
    Active,
    /// Pot paid out.
    Completed,
    /// Stakes returned.
    Refunded,
}

impl EscrowStatus {
    /// Returns true for absorbing states.
    pub fn is_terminal(self) -> bool {
        matches!(self, EscrowStatus::Completed | EscrowStatus::Refunded)
    }
}

/// One player's stake slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSlot {
    player_id: String,
    paid: bool,
    signature: Option<String>,
}

impl PaymentSlot {
    fn new(player_id: String) -> Self {
        Self {
            player_id,
            paid: false,
            signature: None,
        }
    }
}

/// Split of a pot between winner and platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutSplit {
    /// Both stakes together.
    pub pot: u64,
    /// Platform's share, floored.
    pub platform_fee: u64,
    /// Winner's share.
    pub winner_amount: u64,
}

impl PayoutSplit {
    /// Splits the pot for a per-player fee.
    pub fn for_fee(fee: u64) -> Self {
        let pot = fee.saturating_mul(2);
        let platform_fee = pot.saturating_mul(PLATFORM_FEE_PERCENT) / 100;
        Self {
            pot,
            platform_fee,
            winner_amount: pot - platform_fee,
        }
    }
}

/// Payment lifecycle of one staked room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Getters)]
#[serde(rename_all = "camelCase")]
pub struct EscrowRecord {
    room_id: String,
    mode: GameMode,
    /// Entry fee per player in lamports.
    fee: u64,
    /// Slot 0 belongs to X, slot 1 to O.
    slots: [PaymentSlot; 2],
    status: EscrowStatus,
    created_at: DateTime<Utc>,
    /// Signatures of transfers made out of the escrow.
    disbursements: Vec<String>,
}

impl EscrowRecord {
    /// Creates a pending record with both slots unpaid.
    pub fn new(room_id: String, player_x: String, player_o: String, mode: GameMode, fee: u64) -> Self {
        Self::new_at(room_id, player_x, player_o, mode, fee, Utc::now())
    }

    /// Creates a pending record with an explicit creation time.
    pub fn new_at(
        room_id: String,
        player_x: String,
        player_o: String,
        mode: GameMode,
        fee: u64,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            room_id,
            mode,
            fee,
            slots: [PaymentSlot::new(player_x), PaymentSlot::new(player_o)],
            status: EscrowStatus::Pending,
            created_at,
            disbursements: Vec::new(),
        }
    }

    /// Fails with [`EscrowError::EscrowAlreadyProcessed`] once terminal.
    pub fn ensure_open(&self) -> Result<(), EscrowError> {
        if self.status.is_terminal() {
            return Err(EscrowError::EscrowAlreadyProcessed {
                room_id: self.room_id.clone(),
                status: self.status.to_string(),
            });
        }
        Ok(())
    }

    /// Marks a player's stake paid. Returns true if this made the record active.
    ///
    /// # Errors
    ///
    /// Fails if the record is terminal or already active, if the player
    /// is not a participant, or if their slot is already paid.
    pub fn record_payment(&mut self, player_id: &str, signature: String) -> Result<bool, EscrowError> {
        self.ensure_open()?;
        if self.status != EscrowStatus::Pending {
            return Err(EscrowError::AlreadyPaid(player_id.to_string()));
        }
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.player_id == player_id)
            .ok_or_else(|| EscrowError::NotAParticipant(player_id.to_string()))?;
        if slot.paid {
            return Err(EscrowError::AlreadyPaid(player_id.to_string()));
        }
        slot.paid = true;
        slot.signature = Some(signature);

        if self.slots.iter().all(|s| s.paid) {
            self.status = EscrowStatus::Active;
            return Ok(true);
        }
        Ok(false)
    }

    /// Returns true if `player_id` holds a slot.
    pub fn is_participant(&self, player_id: &str) -> bool {
        self.slots.iter().any(|s| s.player_id == player_id)
    }

    /// Slots whose stake has been received.
    pub fn paid_slots(&self) -> impl Iterator<Item = &PaymentSlot> {
        self.slots.iter().filter(|s| s.paid)
    }

    /// Paid slot owed a refund when `disconnected` leaves.
    pub fn refund_owed(&self, disconnected: &str) -> Option<&PaymentSlot> {
        self.slots
            .iter()
            .find(|s| s.paid && s.player_id != disconnected)
    }

    pub(crate) fn set_status(&mut self, status: EscrowStatus) {
        self.status = status;
    }

    pub(crate) fn push_disbursement(&mut self, signature: String) {
        self.disbursements.push(signature);
    }
}
