//! Stake collection, verification, refunds and payouts.

mod error;
mod ledger;
mod record;
mod rpc;
mod service;
mod transaction;

pub use error::EscrowError;
pub use ledger::{Ledger, LedgerError, LedgerTransaction};
pub use record::{EscrowRecord, EscrowStatus, PLATFORM_FEE_PERCENT, PaymentSlot, PayoutSplit};
pub use rpc::{RpcLedger, parse_transaction};
pub use service::{EscrowLedger, PayoutReceipt};
pub use transaction::{Pubkey, SignedTransfer, build_transfer, decode_pubkey, encode_compact_u16, transfer_message};
