//! Engine configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! overrides:
//!
//! ```json
//! { "lockTtlMs": 3000, "maxPlayers": 4 }
//! ```

use crate::costs::BuildCostTable;
use crate::economy::EconomyRates;
use crate::resources::{ResourceBundle, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_LOCK_TTL_MS: u64 = 5_000;
pub const DEFAULT_REFUND_RATE: f64 = 0.5;
pub const DEFAULT_MAX_PLAYERS: usize = 8;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    Io { path: String, message: String },

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Tunables shared by every room a session manager creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Economy tick period in milliseconds (default: 1000)
    pub tick_interval_ms: u64,

    /// Coordinate lock lifetime in milliseconds (default: 5000)
    pub lock_ttl_ms: u64,

    /// Fraction of the build cost returned when a player building is removed (default: 0.5)
    pub refund_rate: f64,

    /// Players allowed in one room (default: 8)
    pub max_players: usize,

    /// Stock every new pool opens with
    pub starting_resources: ResourceBundle,

    /// Per-class capacity of every pool
    pub max_resources: ResourceBundle,

    /// Price of one ClaimTerritory
    pub claim_price: ResourceBundle,

    pub build_costs: BuildCostTable,

    pub economy: EconomyRates,
}

impl Default for EngineConfig {
    fn default() -> Self {
        use ResourceKind::*;

        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            lock_ttl_ms: DEFAULT_LOCK_TTL_MS,
            refund_rate: DEFAULT_REFUND_RATE,
            max_players: DEFAULT_MAX_PLAYERS,
            starting_resources: ResourceBundle::new().with(Wood, 60).with(Ore, 40).with(Power, 20),
            max_resources: ResourceBundle::new()
                .with(Wood, 500)
                .with(Ore, 500)
                .with(ProcessedMaterials, 300)
                .with(CommercialGoods, 300)
                .with(Power, 200),
            claim_price: ResourceBundle::new().with(Wood, 15).with(Ore, 5),
            build_costs: BuildCostTable::default(),
            economy: EconomyRates::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            serde_json::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tickIntervalMs must be positive".to_string()));
        }
        if self.lock_ttl_ms == 0 {
            return Err(ConfigError::Invalid("lockTtlMs must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.refund_rate) {
            return Err(ConfigError::Invalid(format!(
                "refundRate must be within [0, 1], got {}",
                self.refund_rate
            )));
        }
        if self.max_players == 0 {
            return Err(ConfigError::Invalid("maxPlayers must be positive".to_string()));
        }
        if !self.max_resources.covers(&self.starting_resources) {
            return Err(ConfigError::Invalid(
                "startingResources exceed maxResources".to_string(),
            ));
        }
        Ok(())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }
}
