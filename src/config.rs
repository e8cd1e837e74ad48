// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Engine configuration.
//!
//! Supports a YAML file and environment variable overrides.

use serde::Deserialize;
use std::path::Path;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "RENT_LEDGER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "rent-ledger.yaml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub rewards: RewardConfig,
    pub gateway: GatewayConfig,
    pub signing: SigningConfig,
}

/// Point accrual policy.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RewardConfig {
    /// Percentage of an on-time bill converted to points.
    pub on_time_percent: u32,
    /// Consecutive under-budget days needed for the streak bonus.
    pub streak_target_days: u32,
    /// Points granted once per budget when the streak target is reached.
    pub streak_bonus_points: u64,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            on_time_percent: 10,
            streak_target_days: 30,
            streak_bonus_points: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GatewayConfig {
    pub checkout_base_url: String,
    pub currency: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            checkout_base_url: "https://checkout.localhost/pay".to_string(),
            currency: "usd".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SigningConfig {
    pub enabled: bool,
    pub signing_base_url: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            signing_base_url: "https://sign.localhost/s".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file and environment.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables
    /// 2. Config file
    /// 3. Defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut config = if Path::new(&config_path).exists() {
            Self::from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::FileRead(path.to_string(), e.to_string()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Some(p) = env_parse("RENT_LEDGER_ON_TIME_PERCENT") {
            self.rewards.on_time_percent = p;
        }
        if let Some(days) = env_parse("RENT_LEDGER_STREAK_DAYS") {
            self.rewards.streak_target_days = days;
        }
        if let Some(points) = env_parse("RENT_LEDGER_STREAK_BONUS") {
            self.rewards.streak_bonus_points = points;
        }
        if let Ok(url) = std::env::var("RENT_LEDGER_CHECKOUT_URL") {
            self.gateway.checkout_base_url = url;
        }
        if let Some(enabled) = env_parse("RENT_LEDGER_SIGNING_ENABLED") {
            self.signing.enabled = enabled;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rewards.on_time_percent > 100 {
            return Err(ConfigError::Invalid(
                "rewards.on_time_percent must be at most 100".to_string(),
            ));
        }
        if self.rewards.streak_target_days == 0 {
            return Err(ConfigError::Invalid(
                "rewards.streak_target_days must be positive".to_string(),
            ));
        }
        if self.gateway.checkout_base_url.is_empty() {
            return Err(ConfigError::Invalid(
                "gateway.checkout_base_url is required".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{0}': {1}")]
    FileRead(String, String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid config: {0}")]
    Invalid(String),
}
