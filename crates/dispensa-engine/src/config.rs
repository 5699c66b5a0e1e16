//! # Engine Configuration
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                            │
//! │     DISPENSA_DATABASE_PATH=/var/lib/dispensa/dispensa.db                │
//! │     DISPENSA_MAX_CONNECTIONS=10                                         │
//! │     DISPENSA_CURRENCY=NPR                                               │
//! │                                                                         │
//! │  2. TOML Config File                                                    │
//! │     ~/.config/dispensa/engine.toml (Linux)                              │
//! │     ~/Library/Application Support/com.dispensa.engine/engine.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [database]
//! path = "dispensa.db"
//! max_connections = 5
//! busy_timeout_ms = 5000
//!
//! [orders]
//! default_currency = "NPR"
//! max_items_per_order = 100
//! max_item_quantity = 999
//!
//! [loyalty]
//! referral_code_attempts = 20
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use dispensa_core::validation::validate_currency;
use dispensa_core::{DEFAULT_CURRENCY, MAX_ITEM_QUANTITY, MAX_ORDER_ITEMS, REFERRAL_CODE_ATTEMPTS};
use dispensa_db::DbConfig;

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file path, or ":memory:".
    #[serde(default = "default_database_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// How long a writer waits on a locked file, in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("dispensa.db")
}

fn default_max_connections() -> u32 {
    5
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_database_path(),
            max_connections: default_max_connections(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSettings {
    /// Currency stamped on new orders.
    #[serde(default = "default_currency")]
    pub default_currency: String,

    #[serde(default = "default_max_items")]
    pub max_items_per_order: usize,

    #[serde(default = "default_max_item_quantity")]
    pub max_item_quantity: i64,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_max_items() -> usize {
    MAX_ORDER_ITEMS
}

fn default_max_item_quantity() -> i64 {
    MAX_ITEM_QUANTITY
}

impl Default for OrderSettings {
    fn default() -> Self {
        OrderSettings {
            default_currency: default_currency(),
            max_items_per_order: default_max_items(),
            max_item_quantity: default_max_item_quantity(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoyaltySettings {
    /// Referral code generation attempts before giving up on collisions.
    #[serde(default = "default_referral_attempts")]
    pub referral_code_attempts: u32,
}

fn default_referral_attempts() -> u32 {
    REFERRAL_CODE_ATTEMPTS
}

impl Default for LoyaltySettings {
    fn default() -> Self {
        LoyaltySettings {
            referral_code_attempts: default_referral_attempts(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub orders: OrderSettings,

    #[serde(default)]
    pub loyalty: LoyaltySettings,
}

impl EngineConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (engine.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load engine config: {}. Using defaults.", e);
            Self::default()
        })
    }

    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    pub fn validate(&self) -> ConfigResult<()> {
        validate_currency(&self.orders.default_currency)
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "max_connections must be greater than 0".into(),
            ));
        }
        if self.orders.max_items_per_order == 0 {
            return Err(ConfigError::Invalid(
                "max_items_per_order must be greater than 0".into(),
            ));
        }
        if self.orders.max_item_quantity <= 0 {
            return Err(ConfigError::Invalid(
                "max_item_quantity must be greater than 0".into(),
            ));
        }
        if self.loyalty.referral_code_attempts == 0 {
            return Err(ConfigError::Invalid(
                "referral_code_attempts must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies `DISPENSA_*` overrides read through `lookup`.
    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("DISPENSA_DATABASE_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(max) = lookup("DISPENSA_MAX_CONNECTIONS") {
            match max.parse::<u32>() {
                Ok(n) => self.database.max_connections = n,
                Err(_) => warn!(value = %max, "Ignoring invalid DISPENSA_MAX_CONNECTIONS"),
            }
        }

        if let Some(currency) = lookup("DISPENSA_CURRENCY") {
            debug!(currency = %currency, "Overriding currency from environment");
            self.orders.default_currency = currency.trim().to_ascii_uppercase();
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "dispensa", "engine")
            .map(|dirs| dirs.config_dir().join("engine.toml"))
    }

    /// Connection settings for [`dispensa_db::Database::new`].
    pub fn db_config(&self) -> DbConfig {
        if self.database.path == Path::new(":memory:") {
            DbConfig::in_memory()
        } else {
            DbConfig::new(&self.database.path)
                .max_connections(self.database.max_connections)
                .busy_timeout(Duration::from_millis(self.database.busy_timeout_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.orders.default_currency, "NPR");
        assert_eq!(config.orders.max_items_per_order, 100);
        assert_eq!(config.loyalty.referral_code_attempts, 20);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: EngineConfig = toml::from_str(
            r#"
            [orders]
            default_currency = "USD"
            "#,
        )
        .unwrap();

        assert_eq!(config.orders.default_currency, "USD");
        assert_eq!(config.orders.max_item_quantity, 999);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.orders.default_currency = "RUPEES".into();
        assert!(config.validate().is_err());

        config.orders.default_currency = "NPR".into();
        config.loyalty.referral_code_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("DISPENSA_DATABASE_PATH", "/tmp/other.db"),
            ("DISPENSA_MAX_CONNECTIONS", "not-a-number"),
            ("DISPENSA_CURRENCY", " usd "),
        ]
        .into_iter()
        .collect();

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.orders.default_currency, "USD");
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir()
            .join(format!("dispensa-{}", uuid::Uuid::new_v4()))
            .join("engine.toml");

        let mut config = EngineConfig::default();
        config.orders.max_items_per_order = 25;
        config.save(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_in_memory_db_config() {
        let mut config = EngineConfig::default();
        config.database.path = PathBuf::from(":memory:");
        assert!(config.db_config().is_in_memory());
    }
}
