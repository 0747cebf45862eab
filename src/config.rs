//! Server configuration loaded from TOML.

use derive_getters::Getters;
use derive_more::{Display, Error};
use derive_setters::Setters;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::games::grid::GameMode;

/// Top-level server configuration.
///
/// Command-line overrides go through the `with_*` setters.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Setters, Serialize, Deserialize)]
#[setters(prefix = "with_")]
pub struct ServerConfig {
    /// Address to bind.
    #[serde(default = "default_host")]
    host: String,

    /// Port to bind.
    #[serde(default = "default_port")]
    port: u16,

    /// SQLite database file.
    #[serde(default = "default_database_path")]
    database_path: String,

    /// External ledger settings.
    #[serde(default)]
    ledger: LedgerConfig,

    /// Escrow tuning.
    #[serde(default)]
    escrow: EscrowConfig,

    /// Entry fee per staked mode.
    #[serde(default)]
    fees: FeeSchedule,

    /// How long a finished room stays in memory before it is swept.
    #[serde(default = "default_room_retention_secs")]
    room_retention_secs: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_database_path() -> String {
    "grid_arena.db".to_string()
}

fn default_room_retention_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database_path: default_database_path(),
            ledger: LedgerConfig::default(),
            escrow: EscrowConfig::default(),
            fees: FeeSchedule::default(),
            room_retention_secs: default_room_retention_secs(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        debug!("Loading config from file");
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::new(format!("Failed to read config file: {}", e)))?;
        Self::from_toml(&content)
    }

    /// Parses configuration from TOML text.
    #[instrument(skip(content))]
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::new(format!("Failed to parse config: {}", e)))?;
        if config.escrow.cleanup_interval_secs == 0 {
            return Err(ConfigError::new("escrow.cleanup_interval_secs must be at least 1"));
        }
        info!(host = %config.host, port = config.port, "Config loaded");
        Ok(config)
    }

    /// Loads the file if it exists, otherwise returns defaults.
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            warn!("Config file missing, using defaults");
            Ok(Self::default())
        }
    }

    /// `host:port` string for binding.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Where the chain is and who the treasury is.
#[derive(Debug, Clone, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// JSON-RPC endpoint.
    #[serde(default = "default_rpc_url")]
    rpc_url: String,

    /// Base58 treasury account that receives stakes.
    #[serde(default)]
    treasury_pubkey: String,

    /// Solana CLI keypair file (64-byte JSON array) able to sign for the treasury.
    #[serde(default)]
    treasury_keypair_path: Option<String>,
}

fn default_rpc_url() -> String {
    "https://api.devnet.solana.com".to_string()
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            treasury_pubkey: String::new(),
            treasury_keypair_path: None,
        }
    }
}

/// Escrow tolerances and sweep timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Allowed deviation, in lamports, of a verified treasury credit.
    #[serde(default = "default_amount_tolerance")]
    amount_tolerance: u64,

    /// Age after which non-active records are swept.
    #[serde(default = "default_record_max_age_secs")]
    record_max_age_secs: u64,

    /// Seconds between sweeps.
    #[serde(default = "default_cleanup_interval_secs")]
    cleanup_interval_secs: u64,
}

fn default_amount_tolerance() -> u64 {
    10_000
}

fn default_record_max_age_secs() -> u64 {
    3_600
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

impl Default for EscrowConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: default_amount_tolerance(),
            record_max_age_secs: default_record_max_age_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
        }
    }
}

impl EscrowConfig {
    /// Builds an escrow config with explicit values.
    pub fn new(amount_tolerance: u64, record_max_age_secs: u64, cleanup_interval_secs: u64) -> Self {
        Self {
            amount_tolerance,
            record_max_age_secs,
            cleanup_interval_secs,
        }
    }
}

/// Entry fee per player, in lamports, for each staked mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Getters, Serialize, Deserialize)]
pub struct FeeSchedule {
    /// Fee for ranked-low.
    #[serde(default = "default_ranked_low")]
    ranked_low: u64,
    /// Fee for ranked-mid.
    #[serde(default = "default_ranked_mid")]
    ranked_mid: u64,
    /// Fee for ranked-high.
    #[serde(default = "default_ranked_high")]
    ranked_high: u64,
}

fn default_ranked_low() -> u64 {
    10_000_000
}

fn default_ranked_mid() -> u64 {
    50_000_000
}

fn default_ranked_high() -> u64 {
    100_000_000
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            ranked_low: default_ranked_low(),
            ranked_mid: default_ranked_mid(),
            ranked_high: default_ranked_high(),
        }
    }
}

impl FeeSchedule {
    /// Builds a schedule with explicit fees.
    pub fn new(ranked_low: u64, ranked_mid: u64, ranked_high: u64) -> Self {
        Self {
            ranked_low,
            ranked_mid,
            ranked_high,
        }
    }

    /// Same fee for every staked mode.
    pub fn flat(fee: u64) -> Self {
        Self::new(fee, fee, fee)
    }

    /// Entry fee for a mode. Free modes cost nothing.
    pub fn fee_for(&self, mode: GameMode) -> u64 {
        match mode {
            GameMode::Training | GameMode::Bot => 0,
            GameMode::RankedLow => self.ranked_low,
            GameMode::RankedMid => self.ranked_mid,
            GameMode::RankedHigh => self.ranked_high,
        }
    }
}

/// Configuration error.
#[derive(Debug, Clone, Display, Error)]
#[display("Config error: {} at {}:{}", message, file, line)]
pub struct ConfigError {
    /// Error message.
    pub message: String,
    /// Line number where error occurred.
    pub line: u32,
    /// Source file where error occurred.
    pub file: &'static str,
}

impl ConfigError {
    /// Creates a new configuration error.
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_uses_defaults() {
        let config = ServerConfig::from_toml("").unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.escrow().amount_tolerance(), &10_000);
        assert_eq!(config.fees().fee_for(GameMode::RankedMid), 50_000_000);
        assert_eq!(config.room_retention_secs(), &300);
    }

    #[test]
    fn test_partial_sections() {
        let config = ServerConfig::from_toml(
            r#"
            port = 8080

            [ledger]
            treasury_pubkey = "11111111111111111111111111111111"

            [fees]
            ranked_low = 1000
            "#,
        )
        .unwrap();
        assert_eq!(config.bind_address(), "127.0.0.1:8080");
        assert_eq!(config.ledger().rpc_url(), "https://api.devnet.solana.com");
        assert!(config.ledger().treasury_keypair_path().is_none());
        assert_eq!(config.fees().fee_for(GameMode::RankedLow), 1000);
        assert_eq!(config.fees().fee_for(GameMode::RankedHigh), 100_000_000);
    }

    #[test]
    fn test_free_modes_cost_nothing() {
        let fees = FeeSchedule::flat(5);
        assert_eq!(fees.fee_for(GameMode::Training), 0);
        assert_eq!(fees.fee_for(GameMode::Bot), 0);
    }

    #[test]
    fn test_bad_toml_is_error() {
        assert!(ServerConfig::from_toml("port = \"nope\"").is_err());
    }

    #[test]
    fn test_zero_cleanup_interval_rejected() {
        let result = ServerConfig::from_toml("[escrow]\ncleanup_interval_secs = 0\n");
        assert!(result.is_err_and(|e| e.message.contains("cleanup_interval_secs")));
    }

    #[test]
    fn test_missing_file_falls_back() {
        let config = ServerConfig::load_or_default("/definitely/not/here.toml").unwrap();
        assert_eq!(config.port(), &3000);
    }
}
