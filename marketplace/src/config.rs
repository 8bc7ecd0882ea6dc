//! Configuration for the marketplace engine

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Marketplace configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Data directory handed to the embedded ledger
    pub ledger_data_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "marketplace".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            ledger_data_dir: PathBuf::from("./data/marketplace"),
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("MARKETPLACE_DATA_DIR") {
            config.ledger_data_dir = PathBuf::from(data_dir);
        }

        Ok(config)
    }

    /// Ledger configuration derived from this marketplace configuration
    pub fn ledger_config(&self) -> credit_ledger::Config {
        let mut ledger_config = credit_ledger::Config::default();
        ledger_config.data_dir = self.ledger_data_dir.clone();
        ledger_config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "marketplace");
        assert_eq!(
            config.ledger_config().data_dir,
            PathBuf::from("./data/marketplace")
        );
    }
}
