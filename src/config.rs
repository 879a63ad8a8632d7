//! Configuration management with validation and defaults
//!
//! Configuration is read from an optional TOML file, then `CRASHLINE_*`
//! environment variables are applied on top, then the result is validated.

use crate::errors::{ConfigurationError, CrashResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Complete service configuration
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CrashConfig {
    #[serde(default)]
    pub game: GameConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

/// Round timing and growth curve
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    /// Pause before a round starts and after it crashes
    pub wait_time_ms: u64,
    /// Exclusive upper bound of the RUNNING phase length
    pub max_round_duration_ms: u64,
    /// Exponential growth rate per elapsed millisecond
    pub growth_rate: f64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            wait_time_ms: 5_000,
            max_round_duration_ms: 10_000,
            growth_rate: 6e-5,
        }
    }
}

/// HTTP / WebSocket listener
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            allowed_origins: vec!["*".to_string()],
            request_timeout_secs: 30,
        }
    }
}

/// RocksDB location
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_directory: String,
    /// Whether to clear database on startup (testing only!)
    pub clear_on_start: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_directory: "./DB/crash_data".to_string(),
            clear_on_start: false,
        }
    }
}

/// Which ledger implementation backs balances
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LedgerBackend {
    /// Balances persisted next to round history
    Rocksdb,
    /// Process-local balances, lost on restart
    Memory,
}

/// Balance seeded at start-up
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SeedBalance {
    pub wallet: String,
    pub currency: String,
    pub amount: Decimal,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerConfig {
    pub backend: LedgerBackend,
    #[serde(default)]
    pub seed_balances: Vec<SeedBalance>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            backend: LedgerBackend::Rocksdb,
            seed_balances: Vec::new(),
        }
    }
}

impl GameConfig {
    pub fn wait_time(&self) -> Duration {
        Duration::from_millis(self.wait_time_ms)
    }

    pub fn max_round_duration(&self) -> Duration {
        Duration::from_millis(self.max_round_duration_ms)
    }
}

impl CrashConfig {
    /// Short timings for local play-testing
    pub fn development() -> Self {
        Self {
            game: GameConfig {
                wait_time_ms: 2_000,
                max_round_duration_ms: 8_000,
                ..Default::default()
            },
            storage: StorageConfig {
                data_directory: "./DB/crash_dev".to_string(),
                clear_on_start: true,
            },
            ledger: LedgerConfig {
                backend: LedgerBackend::Memory,
                seed_balances: Vec::new(),
            },
            ..Default::default()
        }
    }

    /// Validate configuration for logical consistency
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.game.wait_time_ms == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "game.wait_time_ms".to_string(),
                value: "0".to_string(),
                reason: "Wait time must be > 0".to_string(),
            });
        }

        if self.game.max_round_duration_ms == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "game.max_round_duration_ms".to_string(),
                value: "0".to_string(),
                reason: "Round duration bound must be > 0".to_string(),
            });
        }

        if !self.game.growth_rate.is_finite() || self.game.growth_rate <= 0.0 {
            return Err(ConfigurationError::InvalidValue {
                field: "game.growth_rate".to_string(),
                value: self.game.growth_rate.to_string(),
                reason: "Growth rate must be a positive finite number".to_string(),
            });
        }

        if self.server.port == 0 {
            return Err(ConfigurationError::InvalidValue {
                field: "server.port".to_string(),
                value: "0".to_string(),
                reason: "Port cannot be zero".to_string(),
            });
        }

        if self.storage.data_directory.is_empty() {
            return Err(ConfigurationError::MissingRequired(
                "storage.data_directory".to_string(),
            ));
        }

        for seed in &self.ledger.seed_balances {
            if seed.amount.is_sign_negative() {
                return Err(ConfigurationError::InvalidValue {
                    field: format!("ledger.seed_balances[{}]", seed.wallet),
                    value: seed.amount.to_string(),
                    reason: "Seed balance cannot be negative".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Configuration loader with environment variable support
#[derive(Default)]
pub struct ConfigLoader {
    config_path: Option<String>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self { config_path: None }
    }

    /// Set the configuration file path
    pub fn with_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_string_lossy().to_string());
        self
    }

    /// Load configuration from file and environment variables
    pub fn load(&self) -> CrashResult<CrashConfig> {
        let mut config = if let Some(ref path) = self.config_path {
            self.load_from_file(path)?
        } else {
            CrashConfig::default()
        };

        self.apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML file
    fn load_from_file(&self, path: &str) -> CrashResult<CrashConfig> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to read {}: {}", path, e)))?;

        toml::from_str(&content)
            .map_err(|e| ConfigurationError::LoadFailed(format!("Failed to parse TOML: {}", e)).into())
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&self, config: &mut CrashConfig) -> CrashResult<()> {
        if let Ok(host) = env::var("CRASHLINE_HOST") {
            config.server.host = host;
        }
        if let Some(port) = parse_env::<u16>("CRASHLINE_PORT")? {
            config.server.port = port;
        }
        if let Ok(data_dir) = env::var("CRASHLINE_DATA_DIR") {
            config.storage.data_directory = data_dir;
        }
        if let Some(wait) = parse_env::<u64>("CRASHLINE_WAIT_TIME_MS")? {
            config.game.wait_time_ms = wait;
        }
        if let Some(max) = parse_env::<u64>("CRASHLINE_MAX_ROUND_DURATION_MS")? {
            config.game.max_round_duration_ms = max;
        }
        if let Ok(backend) = env::var("CRASHLINE_LEDGER_BACKEND") {
            config.ledger.backend = match backend.to_ascii_lowercase().as_str() {
                "rocksdb" => LedgerBackend::Rocksdb,
                "memory" => LedgerBackend::Memory,
                _ => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "CRASHLINE_LEDGER_BACKEND".to_string(),
                        value: backend,
                        reason: "Expected 'rocksdb' or 'memory'".to_string(),
                    }
                    .into())
                }
            };
        }

        Ok(())
    }

    /// Save configuration to file
    pub fn save(&self, config: &CrashConfig, path: &str) -> CrashResult<()> {
        let toml_string = toml::to_string_pretty(config)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, toml_string)
            .map_err(|e| ConfigurationError::SaveFailed(format!("Failed to write to {}: {}", path, e)).into())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str) -> CrashResult<Option<T>> {
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map(Some).map_err(|_| {
            ConfigurationError::InvalidValue {
                field: key.to_string(),
                value: raw,
                reason: "Invalid numeric value".to_string(),
            }
            .into()
        }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = CrashConfig::default();
        assert_eq!(config.game.wait_time_ms, 5_000);
        assert_eq!(config.game.max_round_duration_ms, 10_000);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.ledger.backend, LedgerBackend::Rocksdb);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = CrashConfig::default();
        config.game.growth_rate = 0.0;
        assert!(config.validate().is_err());

        let mut config = CrashConfig::default();
        config.game.max_round_duration_ms = 0;
        assert!(config.validate().is_err());

        let mut config = CrashConfig::default();
        config.ledger.seed_balances.push(SeedBalance {
            wallet: "0xabc".to_string(),
            currency: "USDC".to_string(),
            amount: Decimal::new(-1, 0),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: CrashConfig = toml::from_str(
            r#"
            [game]
            wait_time_ms = 1000
            max_round_duration_ms = 3000
            growth_rate = 0.0001
            "#,
        )
        .unwrap();

        assert_eq!(config.game.wait_time_ms, 1000);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.game.wait_time(), Duration::from_secs(1));
    }

    #[test]
    fn test_save_and_load_config() -> CrashResult<()> {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path().to_str().unwrap();

        let mut original = CrashConfig::development();
        original.ledger.seed_balances.push(SeedBalance {
            wallet: "0xabc".to_string(),
            currency: "USDC".to_string(),
            amount: "250.50".parse().unwrap(),
        });

        let loader = ConfigLoader::new();
        loader.save(&original, path)?;

        let loaded = ConfigLoader::new().with_path(path).load()?;

        assert_eq!(loaded.game.wait_time_ms, original.game.wait_time_ms);
        assert_eq!(loaded.ledger.backend, LedgerBackend::Memory);
        assert_eq!(loaded.ledger.seed_balances[0].amount, original.ledger.seed_balances[0].amount);

        Ok(())
    }
}
