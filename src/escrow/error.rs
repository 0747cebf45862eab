//! Escrow error types.

use super::ledger::LedgerError;

/// Failure of an escrow operation.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum EscrowError {
    /// No record exists for the room.
    #[display("No escrow for room {}", _0)]
    EscrowNotFound(String),

    /// The room already has a record.
    #[display("Escrow for room {} already exists", _0)]
    EscrowAlreadyExists(String),

    /// The record reached a terminal state.
    #[display("Escrow for room {} was already {}", room_id, status)]
    EscrowAlreadyProcessed {
        /// Room of the record.
        room_id: String,
        /// Terminal status reached.
        status: String,
    },

    /// The operation needs an active record.
    #[display("Escrow for room {} is not active", _0)]
    EscrowNotActive(String),

    /// The player is not one of the record's two players.
    #[display("{} is not a participant", _0)]
    NotAParticipant(String),

    /// The player's slot is already paid.
    #[display("{} has already paid", _0)]
    AlreadyPaid(String),

    /// The mode carries no stake.
    #[display("Mode {} is free", _0)]
    FreeMode(String),

    /// The treasury credit differs from the expected share.
    #[display("Expected {} lamports to treasury, got {}", expected, actual)]
    PaymentAmountMismatch {
        /// Expected treasury credit.
        expected: u64,
        /// Observed treasury credit.
        actual: i128,
    },

    /// The claimed payer did not fund the transaction.
    #[display("{} did not fund the transaction", _0)]
    PayerNotInTransaction(String),

    /// The signature already paid for a seat.
    #[display("Signature {} was already used", _0)]
    SignatureAlreadyUsed(String),

    /// The treasury account is not in the transaction.
    #[display("Treasury is not part of the transaction")]
    TreasuryNotInTransaction,

    /// The chain does not know the signature.
    #[display("Transaction {} not found", _0)]
    TransactionNotFound(String),

    /// The transaction executed with an error.
    #[display("Transaction failed: {}", _0)]
    TransactionFailed(String),

    /// The treasury cannot cover a transfer.
    #[display("Treasury holds {} lamports, needs {}", available, required)]
    InsufficientTreasuryFunds {
        /// Treasury balance.
        available: u64,
        /// Amount needed.
        required: u64,
    },

    /// No key is loaded for the treasury.
    #[display("Treasury signer unavailable")]
    TreasurySignerUnavailable,

    /// The ledger call itself failed.
    #[display("{}", _0)]
    Ledger(String),
}

impl std::error::Error for EscrowError {}

impl From<LedgerError> for EscrowError {
    fn from(err: LedgerError) -> Self {
        EscrowError::Ledger(err.to_string())
    }
}
