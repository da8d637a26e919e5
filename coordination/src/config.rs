//! Engine configuration.
//!
//! Every tunable lives in [`EngineConfig`]. Values come from defaults, a TOML
//! file, or `CONSENSUS_*` environment variables:
//!
//! | Variable                          | Field                               |
//! |-----------------------------------|-------------------------------------|
//! | `CONSENSUS_DEBATE_ROUNDS`         | `debate.rounds`                     |
//! | `CONSENSUS_PRODUCER_TIMEOUT_MS`   | `debate.producer_timeout_ms`        |
//! | `CONSENSUS_RECENCY_HORIZON_DAYS`  | `knowledge.recency_horizon_days`    |
//! | `CONSENSUS_RISK_THRESHOLD`        | `gate.risk_threshold`               |
//! | `CONSENSUS_HISTORY_LIMIT`         | `gate.history_limit`                |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::debate::DebateConfig;
use crate::gate::GateConfig;
use crate::knowledge::ConfidenceModel;
use crate::resolver::ConflictTables;

/// Error type for configuration loading
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Result type for configuration loading
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration of the whole engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub debate: DebateConfig,
    pub knowledge: ConfidenceModel,
    pub gate: GateConfig,
    pub conflicts: ConflictTables,
}

impl EngineConfig {
    /// Defaults overridden by `CONSENSUS_*` environment variables.
    ///
    /// Unparseable or out-of-range values fall back to the default.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(rounds) = std::env::var("CONSENSUS_DEBATE_ROUNDS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
        {
            config.debate.rounds = rounds;
        }

        if let Some(timeout_ms) = std::env::var("CONSENSUS_PRODUCER_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|v| *v > 0)
        {
            config.debate.producer_timeout_ms = timeout_ms;
        }

        if let Some(days) = std::env::var("CONSENSUS_RECENCY_HORIZON_DAYS")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
        {
            config.knowledge.recency_horizon_days = days;
        }

        if let Some(threshold) = std::env::var("CONSENSUS_RISK_THRESHOLD")
            .ok()
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite())
        {
            config.gate.risk_threshold = threshold.clamp(0.0, 1.0);
        }

        if let Some(limit) = std::env::var("CONSENSUS_HISTORY_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|v| *v > 0)
        {
            config.gate.history_limit = limit;
        }

        config
    }

    /// Parse a TOML document. Missing tables and keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> ConfigResult<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load a TOML file.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn producer_timeout(&self) -> Duration {
        self.debate.producer_timeout()
    }
}
