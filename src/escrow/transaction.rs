//! Legacy system-program transfer transactions.
//!
//! Wire layout: `compact_u16(sig_count) || signatures || message`, where the
//! message is `header[3] || compact_u16(n) || keys || blockhash || instructions`.

use ed25519_dalek::{Signer, SigningKey};
use tracing::{debug, instrument};

use super::ledger::LedgerError;

/// System program id: 32 zero bytes.
const SYSTEM_PROGRAM_ID: [u8; 32] = [0; 32];

/// Index of `Transfer` in the system program's instruction enum.
const SYSTEM_TRANSFER: u32 = 2;

/// A 32-byte ledger address.
pub type Pubkey = [u8; 32];

/// Decodes a base58 address.
pub fn decode_pubkey(address: &str) -> Result<Pubkey, LedgerError> {
    let bytes = bs58::decode(address)
        .into_vec()
        .map_err(|e| LedgerError::new(format!("Invalid base58 address '{}': {}", address, e)))?;
    Pubkey::try_from(bytes.as_slice())
        .map_err(|_| LedgerError::new(format!("Address '{}' is {} bytes, expected 32", address, bytes.len())))
}

/// Appends a compact-u16 length prefix.
pub fn encode_compact_u16(out: &mut Vec<u8>, mut value: u16) {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

/// Serializes the message of a single transfer from `from` to `to`.
pub fn transfer_message(from: &Pubkey, to: &Pubkey, lamports: u64, recent_blockhash: &[u8; 32]) -> Vec<u8> {
    let mut msg = Vec::with_capacity(150);
    // 1 signer, 0 read-only signers, 1 read-only unsigned (system program).
    msg.extend_from_slice(&[1, 0, 1]);

    encode_compact_u16(&mut msg, 3);
    msg.extend_from_slice(from);
    msg.extend_from_slice(to);
    msg.extend_from_slice(&SYSTEM_PROGRAM_ID);

    msg.extend_from_slice(recent_blockhash);

    encode_compact_u16(&mut msg, 1);
    msg.push(2);
    encode_compact_u16(&mut msg, 2);
    msg.extend_from_slice(&[0, 1]);
    let mut data = Vec::with_capacity(12);
    data.extend_from_slice(&SYSTEM_TRANSFER.to_le_bytes());
    data.extend_from_slice(&lamports.to_le_bytes());
    encode_compact_u16(&mut msg, data.len() as u16);
    msg.extend_from_slice(&data);
    msg
}

/// A signed transaction ready to broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransfer {
    /// Base58 signature, which is also the transaction id.
    pub signature: String,
    /// Full serialized transaction.
    pub wire: Vec<u8>,
}

/// Builds and signs a transfer from the signer's account.
///
/// # Errors
///
/// Returns [`LedgerError`] if `to` is not a valid address or is the signer itself.
#[instrument(skip(signer, recent_blockhash))]
pub fn build_transfer(
    signer: &SigningKey,
    to: &str,
    lamports: u64,
    recent_blockhash: &[u8; 32],
) -> Result<SignedTransfer, LedgerError> {
    let from = signer.verifying_key().to_bytes();
    let to = decode_pubkey(to)?;
    if from == to {
        return Err(LedgerError::new("Transfer source and destination are the same account"));
    }

    let message = transfer_message(&from, &to, lamports, recent_blockhash);
    let signature = signer.sign(&message).to_bytes();

    let mut wire = Vec::with_capacity(1 + signature.len() + message.len());
    encode_compact_u16(&mut wire, 1);
    wire.extend_from_slice(&signature);
    wire.extend_from_slice(&message);

    let signature = bs58::encode(signature).into_string();
    debug!(%signature, bytes = wire.len(), "Transfer signed");
    Ok(SignedTransfer { signature, wire })
}
