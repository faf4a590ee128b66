//! Monitor configuration and its load-time validation.
//!
//! Every numeric limit is parsed once here; downstream components only see
//! typed values. In particular the token id ceiling is a `U256`, never a
//! string compared at call sites.

use alloy::primitives::{address, Address, U256};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default burn sentinel (`0x…dEaD`).
pub const DEFAULT_BURN_ADDRESS: Address = address!("000000000000000000000000000000000000dEaD");

/// Configuration errors. Fatal at startup only.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("missing required setting: {0}")]
    Missing(&'static str),

    #[error("unknown token standard '{0}'; use 'erc721' or 'erc1155'")]
    UnknownStandard(String),
}

/// Token standard family whose mint logs the classifier recognizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TokenStandard {
    /// ERC-721 `Transfer`.
    Erc721,
    /// ERC-1155 `TransferSingle` and `TransferBatch`.
    Erc1155,
}

impl FromStr for TokenStandard {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "").as_str() {
            "erc721" => Ok(TokenStandard::Erc721),
            "erc1155" => Ok(TokenStandard::Erc1155),
            other => Err(ConfigError::UnknownStandard(other.to_string())),
        }
    }
}

impl fmt::Display for TokenStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenStandard::Erc721 => write!(f, "erc721"),
            TokenStandard::Erc1155 => write!(f, "erc1155"),
        }
    }
}

/// Parse the token id ceiling from decimal or `0x`-prefixed hex.
///
/// # Errors
/// Returns [`ConfigError::Invalid`] if the text is not an unsigned integer.
pub fn parse_token_id_ceiling(value: &str) -> Result<U256, ConfigError> {
    let trimmed = value.trim();
    let (digits, radix) = match trimmed.strip_prefix("0x") {
        Some(hex) => (hex, 16),
        None => (trimmed, 10),
    };
    if digits.is_empty() {
        return Err(ConfigError::Invalid {
            field: "max_token_id",
            reason: format!("'{}' has no digits", value),
        });
    }
    U256::from_str_radix(digits, radix).map_err(|err| ConfigError::Invalid {
        field: "max_token_id",
        reason: format!("'{}' is not an unsigned integer ({})", value, err),
    })
}

/// All tunables of the scan → filter → trend pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Timer tick between cycles.
    pub poll_interval: Duration,
    /// Length of a trending window.
    pub process_interval: Duration,
    /// Ranked entries kept per flush, before history deduplication.
    pub max_trending_results: usize,
    /// Transactions with more matching transfers than this are ignored.
    pub max_transfers_per_transaction: usize,
    /// Exclusive upper bound for qualifying token ids.
    pub max_token_id: U256,
    /// External ABI fetches allowed per cycle.
    pub abi_fetch_limit: u32,
    /// Blocks behind head to scan (0 scans head itself).
    pub confirmations: u64,
    /// Enabled standards.
    pub standards: Vec<TokenStandard>,
    /// A called function must contain one of these.
    pub function_whitelist: Vec<String>,
    /// A called function containing any of these is rejected.
    pub function_blacklist: Vec<String>,
    /// A parameter name containing any of these is rejected.
    pub parameter_blacklist: Vec<String>,
    /// Recipient that never counts as a minter.
    pub burn_address: Address,
    /// Prefix joined with the contract address for notification links.
    pub explorer_url: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(12_000),
            process_interval: Duration::from_millis(300_000),
            max_trending_results: 10,
            max_transfers_per_transaction: 5,
            max_token_id: U256::from(10_000u64),
            abi_fetch_limit: 5,
            confirmations: 1,
            standards: vec![TokenStandard::Erc721, TokenStandard::Erc1155],
            function_whitelist: terms(&["mint", "public"]),
            function_blacklist: terms(&["private", "whitelist"]),
            parameter_blacklist: terms(&["sign", "root", "proof", "whitelist"]),
            burn_address: DEFAULT_BURN_ADDRESS,
            explorer_url: "https://etherscan.io/address/".to_string(),
        }
    }
}

fn terms(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

impl MonitorConfig {
    /// Check cross-field constraints and normalize term lists to lowercase.
    ///
    /// # Errors
    /// Returns the first violated constraint.
    pub fn validate(mut self) -> Result<Self, ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "poll_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.process_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "process_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.max_trending_results == 0 {
            return Err(ConfigError::Invalid {
                field: "max_trending_results",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_transfers_per_transaction == 0 {
            return Err(ConfigError::Invalid {
                field: "max_transfers_per_transaction",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.standards.is_empty() {
            return Err(ConfigError::Missing("standards"));
        }

        self.function_whitelist = normalize_terms(self.function_whitelist);
        self.function_blacklist = normalize_terms(self.function_blacklist);
        self.parameter_blacklist = normalize_terms(self.parameter_blacklist);

        if self.function_whitelist.is_empty() {
            return Err(ConfigError::Missing("function_whitelist"));
        }

        self.standards.sort();
        self.standards.dedup();

        Ok(self)
    }

    /// Whether logs of `standard` are classified.
    pub fn supports(&self, standard: TokenStandard) -> bool {
        self.standards.contains(&standard)
    }
}

fn normalize_terms(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .collect()
}
