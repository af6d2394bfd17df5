//! # Engine Configuration
//!
//! Configuration management for the orchestrator and its ledger.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TIERGATE_LEDGER=sqlite                                             │
//! │     TIERGATE_DB_PATH=/var/lib/tiergate/ledger.db                       │
//! │     TIERGATE_MAX_BATCH_SIZE=50                                         │
//! │     TIERGATE_MAX_COMBINED_BPS=4000                                     │
//! │     TIERGATE_OWNER=550e8400-e29b-41d4-a716-446655440000                │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tiergate/tiergate.toml (Linux)                           │
//! │     ~/Library/Application Support/dev.tiergate.tiergate/... (macOS)    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     memory ledger, standard tiers, 50% cap, batches of 100             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [ledger]
//! backend = "sqlite"
//! path = "/var/lib/tiergate/ledger.db"
//! max_connections = 5
//!
//! [discount]
//! max_combined_rate = 5000
//! tiers = [
//!     { threshold = 5, rate = 500 },
//!     { threshold = 10, rate = 1000 },
//!     { threshold = 20, rate = 1500 },
//! ]
//!
//! [[discount.modifiers]]
//! kind = "loyalty"
//! rate = 200
//!
//! [limits]
//! max_batch_size = 100
//!
//! [access]
//! owner = "550e8400-e29b-41d4-a716-446655440000"
//! admins = []
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, warn};

use tiergate_core::{AccountId, CoreError, DiscountPolicy, DiscountRate, MAX_BATCH_SIZE};
use tiergate_db::DbConfig;

// =============================================================================
// Config Error
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("Failed to save configuration: {0}")]
    SaveFailed(String),

    /// The discount section does not form a valid policy.
    #[error("Invalid discount policy: {0}")]
    Policy(#[from] CoreError),
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::LoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for ConfigError {
    fn from(err: toml::ser::Error) -> Self {
        ConfigError::SaveFailed(err.to_string())
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;

// =============================================================================
// Ledger Settings
// =============================================================================

/// Where purchase counts and transfer records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerBackend {
    /// Process memory. Lost on exit.
    #[default]
    Memory,

    /// SQLite database file.
    Sqlite,
}

impl std::fmt::Display for LedgerBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LedgerBackend::Memory => write!(f, "memory"),
            LedgerBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl std::str::FromStr for LedgerBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" | "mem" => Ok(LedgerBackend::Memory),
            "sqlite" | "db" => Ok(LedgerBackend::Sqlite),
            other => Err(ConfigError::Invalid(format!(
                "Unknown ledger backend: '{}'. Valid options: memory, sqlite",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSettings {
    #[serde(default)]
    pub backend: LedgerBackend,

    /// SQLite file. Defaults to `ledger.db` in the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

fn default_min_connections() -> u32 {
    1
}

impl Default for LedgerSettings {
    fn default() -> Self {
        LedgerSettings {
            backend: LedgerBackend::default(),
            path: None,
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
        }
    }
}

impl LedgerSettings {
    /// Database configuration for the SQLite backend.
    pub fn db_config(&self) -> ConfigResult<DbConfig> {
        let path = self
            .path
            .clone()
            .or_else(EngineConfig::default_db_path)
            .ok_or_else(|| ConfigError::Invalid("No database path available".into()))?;
        Ok(DbConfig::new(path)
            .max_connections(self.max_connections)
            .min_connections(self.min_connections))
    }
}

// =============================================================================
// Limits and Access
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    /// Element limit for every bulk operation. At most 100.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,
}

fn default_max_batch_size() -> usize {
    MAX_BATCH_SIZE
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_batch_size: default_max_batch_size(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccessSettings {
    /// Owner of the orchestrator. Required to construct one from config.
    #[serde(default)]
    pub owner: Option<AccountId>,

    #[serde(default)]
    pub admins: Vec<AccountId>,
}

// =============================================================================
// Main Engine Configuration
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub ledger: LedgerSettings,

    #[serde(default)]
    pub discount: DiscountPolicy,

    #[serde(default)]
    pub limits: Limits,

    #[serde(default)]
    pub access: AccessSettings,
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tiergate.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading engine config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Saves configuration to file, creating parent directories.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| ConfigError::SaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| ConfigError::SaveFailed(e.to_string()))?;

        info!(?path, "Engine config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        self.discount.validate()?;

        if self.limits.max_batch_size == 0 || self.limits.max_batch_size > MAX_BATCH_SIZE {
            return Err(ConfigError::Invalid(format!(
                "max_batch_size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.limits.max_batch_size
            )));
        }

        if self.ledger.max_connections == 0
            || self.ledger.min_connections > self.ledger.max_connections
        {
            return Err(ConfigError::Invalid(
                "ledger pool needs 0 < min_connections <= max_connections".into(),
            ));
        }

        if let Some(owner) = self.access.owner {
            if owner.is_zero() {
                return Err(ConfigError::Invalid("owner must not be the zero id".into()));
            }
        }
        if self.access.admins.iter().any(AccountId::is_zero) {
            return Err(ConfigError::Invalid("admin ids must not be zero".into()));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies `TIERGATE_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(backend) = lookup("TIERGATE_LEDGER") {
            match backend.parse() {
                Ok(parsed) => {
                    debug!(backend = %backend, "Overriding ledger backend from environment");
                    self.ledger.backend = parsed;
                }
                Err(_) => warn!(backend = %backend, "Unknown ledger backend in environment"),
            }
        }

        if let Some(path) = lookup("TIERGATE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.ledger.path = Some(PathBuf::from(path));
        }

        if let Some(size) = lookup("TIERGATE_MAX_BATCH_SIZE") {
            match size.parse::<usize>() {
                Ok(n) => self.limits.max_batch_size = n,
                Err(_) => warn!(value = %size, "Invalid TIERGATE_MAX_BATCH_SIZE"),
            }
        }

        if let Some(bps) = lookup("TIERGATE_MAX_COMBINED_BPS") {
            match bps.parse::<u32>() {
                Ok(n) => self.discount.max_combined_rate = DiscountRate::from_bps(n),
                Err(_) => warn!(value = %bps, "Invalid TIERGATE_MAX_COMBINED_BPS"),
            }
        }

        if let Some(owner) = lookup("TIERGATE_OWNER") {
            match owner.parse::<AccountId>() {
                Ok(id) => self.access.owner = Some(id),
                Err(e) => warn!(value = %owner, error = %e, "Invalid TIERGATE_OWNER"),
            }
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "tiergate", "tiergate")
            .map(|dirs| dirs.config_dir().join("tiergate.toml"))
    }

    /// Returns the default SQLite ledger path.
    pub fn default_db_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("dev", "tiergate", "tiergate")
            .map(|dirs| dirs.data_dir().join("ledger.db"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tiergate_core::{DiscountModifier, TierTable};

    #[test]
    fn test_backend_parsing() {
        assert_eq!("sqlite".parse::<LedgerBackend>().unwrap(), LedgerBackend::Sqlite);
        assert_eq!("MEMORY".parse::<LedgerBackend>().unwrap(), LedgerBackend::Memory);
        assert!("redis".parse::<LedgerBackend>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.ledger.backend, LedgerBackend::Memory);
        assert_eq!(config.limits.max_batch_size, 100);
        assert_eq!(config.discount.tiers, TierTable::standard());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_file_format() {
        let config: EngineConfig = toml::from_str(
            r#"
            [ledger]
            backend = "sqlite"
            path = "/tmp/ledger.db"

            [discount]
            max_combined_rate = 4000
            tiers = [
                { threshold = 3, rate = 300 },
                { threshold = 8, rate = 800 },
            ]

            [[discount.modifiers]]
            kind = "loyalty"
            rate = 200

            [limits]
            max_batch_size = 25
            "#,
        )
        .unwrap();

        assert_eq!(config.ledger.backend, LedgerBackend::Sqlite);
        assert_eq!(config.ledger.max_connections, 5);
        assert_eq!(config.discount.max_combined_rate.bps(), 4000);
        assert_eq!(config.discount.tiers.len(), 2);
        assert_eq!(
            config.discount.modifiers,
            vec![DiscountModifier::Loyalty {
                rate: DiscountRate::from_bps(200)
            }]
        );
        assert_eq!(config.limits.max_batch_size, 25);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_non_monotonic_tiers_rejected_at_parse() {
        let result: Result<EngineConfig, _> = toml::from_str(
            r#"
            [discount]
            tiers = [
                { threshold = 3, rate = 800 },
                { threshold = 8, rate = 300 },
            ]
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::default();
        config.limits.max_batch_size = 0;
        assert!(config.validate().is_err());

        config.limits.max_batch_size = 101;
        assert!(config.validate().is_err());

        config.limits.max_batch_size = 10;
        config.discount.max_combined_rate = DiscountRate::from_bps(10_001);
        assert!(matches!(config.validate(), Err(ConfigError::Policy(_))));

        config.discount.max_combined_rate = DiscountRate::from_bps(5_000);
        config.access.owner = Some(AccountId::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let owner = AccountId::from_u128(42);
        let env: HashMap<&str, String> = HashMap::from([
            ("TIERGATE_LEDGER", "sqlite".to_string()),
            ("TIERGATE_DB_PATH", "/data/ledger.db".to_string()),
            ("TIERGATE_MAX_BATCH_SIZE", "not-a-number".to_string()),
            ("TIERGATE_MAX_COMBINED_BPS", "3000".to_string()),
            ("TIERGATE_OWNER", owner.to_string()),
        ]);

        let mut config = EngineConfig::default();
        config.apply_overrides(|key| env.get(key).cloned());

        assert_eq!(config.ledger.backend, LedgerBackend::Sqlite);
        assert_eq!(config.ledger.path, Some(PathBuf::from("/data/ledger.db")));
        assert_eq!(config.limits.max_batch_size, 100);
        assert_eq!(config.discount.max_combined_rate.bps(), 3000);
        assert_eq!(config.access.owner, Some(owner));
    }

    #[test]
    fn test_db_config_uses_settings() {
        let settings = LedgerSettings {
            backend: LedgerBackend::Sqlite,
            path: Some(PathBuf::from("/tmp/x.db")),
            max_connections: 3,
            min_connections: 1,
        };
        let db = settings.db_config().unwrap();
        assert_eq!(db.database_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(db.max_connections, 3);
    }

    #[test]
    fn test_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tiergate.toml");
        let owner = AccountId::from_u128(7);

        let mut config = EngineConfig::default();
        config.ledger.backend = LedgerBackend::Sqlite;
        config.ledger.path = Some(dir.path().join("ledger.db"));
        config.limits.max_batch_size = 25;
        config.access.owner = Some(owner);
        config.access.admins = vec![AccountId::from_u128(8)];
        config.discount = config
            .discount
            .with_modifier(DiscountModifier::Loyalty {
                rate: DiscountRate::from_percent(2),
            })
            .with_max_combined_rate(DiscountRate::from_percent(40));
        config.save(Some(path.clone())).unwrap();

        let loaded = EngineConfig::load(Some(path)).unwrap();
        assert_eq!(loaded.ledger.backend, LedgerBackend::Sqlite);
        assert_eq!(loaded.ledger.path, config.ledger.path);
        assert_eq!(loaded.limits.max_batch_size, 25);
        assert_eq!(loaded.access.owner, Some(owner));
        assert_eq!(loaded.access.admins, config.access.admins);
        assert_eq!(loaded.discount, config.discount);
    }

    #[test]
    fn test_load_rejects_tier_above_cap() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiergate.toml");
        std::fs::write(
            &path,
            r#"
            [discount]
            max_combined_rate = 1000
            tiers = [{ threshold = 5, rate = 2000 }]
            "#,
        )
        .unwrap();

        assert!(matches!(
            EngineConfig::load(Some(path)),
            Err(ConfigError::Policy(_))
        ));
    }

    #[test]
    fn test_toml_serialization() {
        let config = EngineConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[ledger]"));
        assert!(toml_str.contains("[limits]"));
    }
}
