//! # config
//!
//! why: keep every timing knob of a replica in one place
//! relations: read by quorum-node's background loops
//! what: RaftConfig with defaults, validation, json loading

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RaftError;

/// Timing configuration, all values in milliseconds.
///
/// The election ticker sleeps a random duration in
/// `[election_timeout_min, election_timeout_max)` between checks and starts
/// an election once `election_timeout_min` has passed without a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaftConfig {
    pub election_timeout_min: u64,
    pub election_timeout_max: u64,
    pub heartbeat_interval: u64,
    /// period of the replicate / commit / apply cycle
    pub replication_interval: u64,
}

impl Default for RaftConfig {
    fn default() -> Self {
        Self {
            election_timeout_min: 400,
            election_timeout_max: 800,
            heartbeat_interval: 133,
            replication_interval: 133,
        }
    }
}

impl RaftConfig {
    pub fn from_json(json: &str) -> Result<Self, RaftError> {
        let config: RaftConfig =
            serde_json::from_str(json).map_err(|e| RaftError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), RaftError> {
        if self.election_timeout_min == 0 || self.heartbeat_interval == 0 || self.replication_interval == 0 {
            return Err(RaftError::InvalidConfig("intervals must be non-zero".into()));
        }
        if self.election_timeout_min >= self.election_timeout_max {
            return Err(RaftError::InvalidConfig(format!(
                "election_timeout_min ({}) must be below election_timeout_max ({})",
                self.election_timeout_min, self.election_timeout_max
            )));
        }
        if self.heartbeat_interval >= self.election_timeout_min {
            return Err(RaftError::InvalidConfig(format!(
                "heartbeat_interval ({}) must be shorter than election_timeout_min ({})",
                self.heartbeat_interval, self.election_timeout_min
            )));
        }
        Ok(())
    }

    pub fn election_timeout(&self) -> Duration {
        Duration::from_millis(self.election_timeout_min)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval)
    }

    pub fn replication(&self) -> Duration {
        Duration::from_millis(self.replication_interval)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(RaftConfig::default().validate().is_ok());
    }

    #[test]
    fn inverted_timeouts_are_rejected() {
        let config = RaftConfig {
            election_timeout_min: 500,
            election_timeout_max: 300,
            ..RaftConfig::default()
        };
        assert!(matches!(config.validate(), Err(RaftError::InvalidConfig(_))));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = RaftConfig::from_json(r#"{ "heartbeat_interval": 50 }"#).unwrap();
        assert_eq!(config.heartbeat_interval, 50);
        assert_eq!(config.election_timeout_min, 400);
    }
}
