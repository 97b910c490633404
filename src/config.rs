//! Ledger configuration
//!
//! [`LedgerConfig`] carries the tunables of a chain instance. Defaults match
//! the protocol constants; a JSON file may override any subset of fields.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{CUT_OFF_AGE, DEFAULT_BLOCK_REWARD};
use crate::validation::Amount;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for a chain instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Maximum depth below the best height at which a block may attach
    pub cut_off_age: u64,
    /// Evict nodes that fell behind the horizon after each accepted block
    pub prune: bool,
    /// Coinbase value paid by the miner before fees
    pub block_reward: Amount,
    /// Log level filter string (e.g. "info", "forkchain=debug")
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            cut_off_age: CUT_OFF_AGE,
            prune: true,
            block_reward: DEFAULT_BLOCK_REWARD,
            log_level: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Check field ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cut_off_age == 0 {
            return Err(ConfigError::Invalid("cut_off_age must be positive".into()));
        }
        if self.block_reward < 0 {
            return Err(ConfigError::Invalid("block_reward must not be negative".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_matches_constants() {
        let cfg = LedgerConfig::default();
        assert_eq!(cfg.cut_off_age, CUT_OFF_AGE);
        assert_eq!(cfg.block_reward, DEFAULT_BLOCK_REWARD);
        assert!(cfg.prune);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = LedgerConfig::from_json_str(r#"{ "cut_off_age": 3 }"#).unwrap();
        assert_eq!(cfg.cut_off_age, 3);
        assert!(cfg.prune);
    }

    #[test]
    fn test_zero_cut_off_age_rejected() {
        let err = LedgerConfig::from_json_str(r#"{ "cut_off_age": 0 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_negative_reward_rejected() {
        let err = LedgerConfig::from_json_str(r#"{ "block_reward": -1 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_json_rejected() {
        let err = LedgerConfig::from_json_str("{ cut_off_age").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "prune": false, "log_level": "debug" }}"#).unwrap();

        let cfg = LedgerConfig::load(file.path()).unwrap();
        assert!(!cfg.prune);
        assert_eq!(cfg.log_level, "debug");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = LedgerConfig::load("/nonexistent/forkchain.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
