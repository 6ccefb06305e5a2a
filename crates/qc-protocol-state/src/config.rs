//! # Protocol State Configuration
//!
//! All limits have defaults and can be overridden from the environment with
//! `ProtocolStateConfig::from_env`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Protocol state configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStateConfig {
    /// Expected chain id. `None` adopts the root block's chain id.
    pub chain_id: Option<String>,
    /// Heights after which a collection guarantee expires
    pub guarantee_expiry: u64,
    /// Epoch statuses kept in the read cache
    pub status_cache_capacity: usize,
    /// Upper bound on seals in one payload
    pub max_seals_per_payload: usize,
}

impl Default for ProtocolStateConfig {
    fn default() -> Self {
        Self {
            chain_id: None,
            guarantee_expiry: 600,
            status_cache_capacity: 1000,
            max_seals_per_payload: 1000,
        }
    }
}

impl ProtocolStateConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset or unparsable variables keep their default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("PROTOCOL_STATE_CHAIN_ID") {
            if !val.is_empty() {
                config.chain_id = Some(val);
            }
        }
        if let Some(expiry) = env_parse("PROTOCOL_STATE_GUARANTEE_EXPIRY") {
            config.guarantee_expiry = expiry;
        }
        if let Some(capacity) = env_parse("PROTOCOL_STATE_STATUS_CACHE") {
            config.status_cache_capacity = capacity;
        }
        if let Some(max) = env_parse("PROTOCOL_STATE_MAX_SEALS") {
            config.max_seals_per_payload = max;
        }

        config
    }

    /// Reject configurations the state cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.guarantee_expiry == 0 {
            return Err(ConfigError::ZeroValue("guarantee_expiry"));
        }
        if self.status_cache_capacity == 0 {
            return Err(ConfigError::ZeroValue("status_cache_capacity"));
        }
        if self.max_seals_per_payload == 0 {
            return Err(ConfigError::ZeroValue("max_seals_per_payload"));
        }
        if matches!(&self.chain_id, Some(id) if id.is_empty()) {
            return Err(ConfigError::EmptyChainId);
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|val| val.parse().ok())
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    #[error("chain id must not be empty")]
    EmptyChainId,
}
