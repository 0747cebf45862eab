//! Solana JSON-RPC ledger client.

use std::path::Path;

use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use serde_json::{Value, json};
use tracing::{debug, error, info, instrument, warn};

use super::ledger::{Ledger, LedgerError, LedgerTransaction};
use super::transaction::build_transfer;

/// Ledger backed by a JSON-RPC endpoint.
///
/// Holds at most one signing key, normally the treasury's.
pub struct RpcLedger {
    client: reqwest::Client,
    rpc_url: String,
    signer: Option<SigningKey>,
}

impl std::fmt::Debug for RpcLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcLedger")
            .field("rpc_url", &self.rpc_url)
            .field("signer", &self.signer_address())
            .finish()
    }
}

impl RpcLedger {
    /// Creates a read-only client for `rpc_url`.
    #[instrument]
    pub fn new(rpc_url: String) -> Self {
        info!("Creating RPC ledger");
        Self {
            client: reqwest::Client::new(),
            rpc_url,
            signer: None,
        }
    }

    /// Attaches a signing key.
    pub fn with_signer(mut self, signer: SigningKey) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Loads a Solana CLI keypair file: a JSON array of 64 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the file is unreadable or not a valid keypair.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load_keypair(path: impl AsRef<Path>) -> Result<SigningKey, LedgerError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| LedgerError::new(format!("Failed to read keypair: {}", e)))?;
        let bytes: Vec<u8> = serde_json::from_str(&content)
            .map_err(|e| LedgerError::new(format!("Keypair is not a byte array: {}", e)))?;
        let bytes: [u8; 64] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| LedgerError::new(format!("Keypair has {} bytes, expected 64", bytes.len())))?;
        let key = SigningKey::from_keypair_bytes(&bytes)
            .map_err(|e| LedgerError::new(format!("Invalid keypair: {}", e)))?;
        info!("Keypair loaded");
        Ok(key)
    }

    /// Base58 address of the loaded signer.
    pub fn signer_address(&self) -> Option<String> {
        self.signer
            .as_ref()
            .map(|k| bs58::encode(k.verifying_key().to_bytes()).into_string())
    }

    #[instrument(skip(self, params))]
    async fn call(&self, method: &str, params: Value) -> Result<Value, LedgerError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params
        });

        debug!("Sending RPC request");
        let response = self
            .client
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!(error = ?e, "RPC request failed");
                LedgerError::new(format!("RPC request failed: {}", e))
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            error!(error = ?e, "Failed to read RPC response");
            LedgerError::new(format!("Failed to read response: {}", e))
        })?;
        if !status.is_success() {
            error!(status = %status, response = %text, "RPC HTTP error");
            return Err(LedgerError::new(format!("RPC HTTP error {}: {}", status, text)));
        }

        let mut value: Value = serde_json::from_str(&text).map_err(|e| {
            error!(error = ?e, "Failed to parse RPC response");
            LedgerError::new(format!("Failed to parse response: {}", e))
        })?;
        if let Some(err) = value.get("error") {
            warn!(error = %err, "RPC returned error");
            return Err(LedgerError::new(format!("RPC error: {}", err)));
        }
        Ok(value.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }

    async fn latest_blockhash(&self) -> Result<[u8; 32], LedgerError> {
        let result = self
            .call("getLatestBlockhash", json!([{ "commitment": "finalized" }]))
            .await?;
        let hash = result["value"]["blockhash"]
            .as_str()
            .ok_or_else(|| LedgerError::new("Missing blockhash in response"))?;
        let bytes = bs58::decode(hash)
            .into_vec()
            .map_err(|e| LedgerError::new(format!("Invalid blockhash: {}", e)))?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| LedgerError::new("Blockhash is not 32 bytes"))
    }
}

/// Extracts the balance view from a `getTransaction` result.
///
/// Loaded addresses from lookup tables follow the static keys, matching
/// the order of the balance arrays.
pub fn parse_transaction(result: &Value) -> Result<LedgerTransaction, LedgerError> {
    let meta = &result["meta"];
    let err = match &meta["err"] {
        Value::Null => None,
        other => Some(other.to_string()),
    };

    let mut account_keys = strings(&result["transaction"]["message"]["accountKeys"]);
    account_keys.extend(strings(&meta["loadedAddresses"]["writable"]));
    account_keys.extend(strings(&meta["loadedAddresses"]["readonly"]));

    let pre_balances = balances(&meta["preBalances"])?;
    let post_balances = balances(&meta["postBalances"])?;
    if pre_balances.len() != post_balances.len() {
        return Err(LedgerError::new("Balance arrays differ in length"));
    }

    Ok(LedgerTransaction {
        err,
        account_keys,
        pre_balances,
        post_balances,
    })
}

fn strings(value: &Value) -> Vec<String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn balances(value: &Value) -> Result<Vec<u64>, LedgerError> {
    let items = value
        .as_array()
        .ok_or_else(|| LedgerError::new("Missing balance array"))?;
    items
        .iter()
        .map(|v| v.as_u64().ok_or_else(|| LedgerError::new("Balance is not an integer")))
        .collect()
}

#[async_trait]
impl Ledger for RpcLedger {
    #[instrument(skip(self))]
    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTransaction>, LedgerError> {
        let result = self
            .call(
                "getTransaction",
                json!([signature, {
                    "encoding": "json",
                    "commitment": "confirmed",
                    "maxSupportedTransactionVersion": 0
                }]),
            )
            .await?;
        if result.is_null() {
            debug!("Transaction not found");
            return Ok(None);
        }
        parse_transaction(&result).map(Some)
    }

    #[instrument(skip(self))]
    async fn get_balance(&self, account: &str) -> Result<u64, LedgerError> {
        let result = self.call("getBalance", json!([account])).await?;
        result["value"]
            .as_u64()
            .ok_or_else(|| LedgerError::new("Missing balance in response"))
    }

    #[instrument(skip(self))]
    async fn submit_transfer(&self, from: &str, to: &str, lamports: u64) -> Result<String, LedgerError> {
        if !self.has_signer(from) {
            return Err(LedgerError::new(format!("No signer loaded for {}", from)));
        }
        let signer = self
            .signer
            .as_ref()
            .ok_or_else(|| LedgerError::new("No signer loaded"))?;

        let blockhash = self.latest_blockhash().await?;
        let tx = build_transfer(signer, to, lamports, &blockhash)?;
        let encoded = bs58::encode(&tx.wire).into_string();

        let result = self
            .call("sendTransaction", json!([encoded, { "encoding": "base58" }]))
            .await?;
        let signature = result.as_str().map(str::to_string).unwrap_or(tx.signature);
        info!(%signature, "Transfer submitted");
        Ok(signature)
    }

    fn has_signer(&self, account: &str) -> bool {
        self.signer_address().is_some_and(|addr| addr == account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_transaction_with_lookup_tables() {
        let result = json!({
            "meta": {
                "err": null,
                "preBalances": [5000, 0, 1, 10],
                "postBalances": [4000, 800, 1, 210],
                "loadedAddresses": { "writable": ["platform"], "readonly": [] }
            },
            "transaction": { "message": { "accountKeys": ["payer", "treasury", "system"] } }
        });
        let tx = parse_transaction(&result).unwrap();
        assert!(tx.err.is_none());
        assert_eq!(tx.account_keys, vec!["payer", "treasury", "system", "platform"]);
        assert_eq!(tx.credited_to("treasury"), Some(800));
        assert_eq!(tx.credited_to("platform"), Some(200));
    }

    #[test]
    fn test_parse_transaction_error() {
        let result = json!({
            "meta": {
                "err": { "InstructionError": [0, "Custom"] },
                "preBalances": [1],
                "postBalances": [1]
            },
            "transaction": { "message": { "accountKeys": ["payer"] } }
        });
        let tx = parse_transaction(&result).unwrap();
        assert!(tx.err.is_some());
    }

    #[test]
    fn test_parse_transaction_missing_balances() {
        let result = json!({ "meta": {}, "transaction": {} });
        assert!(parse_transaction(&result).is_err());
    }

    #[test]
    fn test_signer_address() {
        let ledger = RpcLedger::new("http://localhost:8899".into());
        assert!(ledger.signer_address().is_none());
        let key = SigningKey::from_bytes(&[5u8; 32]);
        let address = bs58::encode(key.verifying_key().to_bytes()).into_string();
        let ledger = ledger.with_signer(key);
        assert!(ledger.has_signer(&address));
        assert!(!ledger.has_signer("someone-else"));
    }

    #[test]
    fn test_load_keypair() {
        let key = SigningKey::from_bytes(&[6u8; 32]);
        let bytes = key.to_keypair_bytes().to_vec();
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(file.path(), serde_json::to_string(&bytes).unwrap()).unwrap();
        let loaded = RpcLedger::load_keypair(file.path()).unwrap();
        assert_eq!(loaded.verifying_key(), key.verifying_key());

        std::fs::write(file.path(), "[1, 2, 3]").unwrap();
        assert!(RpcLedger::load_keypair(file.path()).is_err());
    }
}
