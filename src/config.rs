//! Ledger configuration
//!
//! Chain parameters and mining limits, loadable from a JSON file. Every
//! field has a default, so a partial file only overrides what it names.

use crate::core::ChainParams;
use crate::mining::{MiningBudget, DEFAULT_MAX_RESTARTS};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Limits applied to every mining round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MiningConfig {
    /// Nonce attempts per round, unlimited when absent
    pub max_attempts: Option<u64>,
    /// Wall-clock limit per round in milliseconds
    pub timeout_ms: Option<u64>,
    /// Stale-candidate rebuilds before a round gives up
    pub max_restarts: u32,
}

impl Default for MiningConfig {
    fn default() -> Self {
        Self {
            max_attempts: None,
            timeout_ms: None,
            max_restarts: DEFAULT_MAX_RESTARTS,
        }
    }
}

impl MiningConfig {
    /// Budget for one round starting now
    pub fn budget(&self, cancel: Arc<AtomicBool>) -> MiningBudget {
        let mut budget = MiningBudget::unbounded().with_cancel(cancel);
        if let Some(max) = self.max_attempts {
            budget = budget.with_max_attempts(max);
        }
        if let Some(ms) = self.timeout_ms {
            budget = budget.with_timeout(Duration::from_millis(ms));
        }
        budget
    }
}

/// Complete ledger configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub chain: ChainParams,
    pub mining: MiningConfig,
}

impl LedgerConfig {
    /// Read and parse a JSON config file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Write the config as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|source| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PowTarget, BLOCK_REWARD};
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.chain.pow, PowTarget::new(4, 1));
        assert_eq!(config.chain.block_reward, BLOCK_REWARD);
        assert!(config.chain.genesis.is_none());
        assert_eq!(config.mining.max_restarts, DEFAULT_MAX_RESTARTS);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "chain": {{ "pow": {{ "zero_count": 2, "offset": 0 }} }}, "mining": {{ "max_attempts": 500 }} }}"#
        )
        .unwrap();

        let config = LedgerConfig::load(file.path()).unwrap();
        assert_eq!(config.chain.pow, PowTarget::new(2, 0));
        assert_eq!(config.chain.block_reward, BLOCK_REWARD);
        assert_eq!(config.mining.max_attempts, Some(500));
        assert_eq!(config.mining.max_restarts, DEFAULT_MAX_RESTARTS);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let mut config = LedgerConfig::default();
        config.chain.block_reward = 25;
        config.mining.timeout_ms = Some(1_000);

        config.save(&path).unwrap();
        assert_eq!(LedgerConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            LedgerConfig::load("/nonexistent/ledger.json"),
            Err(ConfigError::Io { .. })
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            LedgerConfig::load(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_budget_from_config() {
        let config = MiningConfig {
            max_attempts: Some(10),
            timeout_ms: Some(5_000),
            max_restarts: 1,
        };
        let budget = config.budget(Arc::new(AtomicBool::new(false)));
        assert_eq!(budget.max_attempts, Some(10));
        assert!(budget.deadline.is_some());
        assert!(budget.cancel.is_some());
    }
}
