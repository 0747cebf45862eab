//! Boundary to the external chain.

use async_trait::async_trait;
use derive_more::{Display, Error};

/// Read view of a confirmed ledger transaction.
///
/// `account_keys`, `pre_balances` and `post_balances` are parallel: entry
/// `i` of each describes the same account.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerTransaction {
    /// Execution error reported by the chain, if the transaction failed.
    pub err: Option<String>,
    /// Base58 accounts touched by the transaction.
    pub account_keys: Vec<String>,
    /// Lamport balances before execution.
    pub pre_balances: Vec<u64>,
    /// Lamport balances after execution.
    pub post_balances: Vec<u64>,
}

impl LedgerTransaction {
    /// Net lamports credited to `account`, or `None` if it is not a participant.
    pub fn credited_to(&self, account: &str) -> Option<i128> {
        let index = self.account_keys.iter().position(|k| k == account)?;
        let pre = *self.pre_balances.get(index)?;
        let post = *self.post_balances.get(index)?;
        Some(i128::from(post) - i128::from(pre))
    }

    /// Whether `account` paid into the transaction: it is the fee payer
    /// (first account key, always a signer) or its balance went down.
    pub fn funded_by(&self, account: &str) -> bool {
        self.account_keys.first().is_some_and(|k| k == account)
            || self.credited_to(account).is_some_and(|delta| delta < 0)
    }
}

/// Failure talking to the chain.
#[derive(Debug, Clone, Display, Error)]
#[display("Ledger error: {} at {}:{}", message, file, line)]
pub struct LedgerError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl LedgerError {
    /// Creates a new ledger error with caller location tracking.
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let loc = std::panic::Location::caller();
        Self {
            message: message.into(),
            line: loc.line(),
            file: loc.file(),
        }
    }
}

/// Narrow ledger interface the escrow needs.
///
/// Every call is a suspension point with chain-bound latency.
#[async_trait]
pub trait Ledger: Send + Sync + std::fmt::Debug {
    /// Fetches a confirmed transaction. `Ok(None)` when the chain does not know it.
    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTransaction>, LedgerError>;

    /// Current lamport balance of an account.
    async fn get_balance(&self, account: &str) -> Result<u64, LedgerError>;

    /// Submits a transfer and returns its signature.
    async fn submit_transfer(&self, from: &str, to: &str, lamports: u64) -> Result<String, LedgerError>;

    /// Whether this ledger can sign for `account`.
    fn has_signer(&self, account: &str) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credited_to() {
        let tx = LedgerTransaction {
            err: None,
            account_keys: vec!["payer".into(), "treasury".into()],
            pre_balances: vec![5_000, 100],
            post_balances: vec![4_000, 900],
        };
        assert_eq!(tx.credited_to("treasury"), Some(800));
        assert_eq!(tx.credited_to("payer"), Some(-1_000));
        assert_eq!(tx.credited_to("stranger"), None);
    }

    #[test]
    fn test_funded_by() {
        let tx = LedgerTransaction {
            err: None,
            account_keys: vec!["payer".into(), "treasury".into(), "bystander".into()],
            pre_balances: vec![5_000, 100, 50],
            post_balances: vec![4_000, 900, 50],
        };
        assert!(tx.funded_by("payer"));
        assert!(!tx.funded_by("treasury"));
        assert!(!tx.funded_by("bystander"));
        assert!(!tx.funded_by("stranger"));
    }
}
