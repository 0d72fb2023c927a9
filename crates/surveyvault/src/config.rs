//! Configuration management for surveyvault.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::store::StoreBackend;
use crate::validate::ValidatorConfig;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "surveyvault";

/// Default record directory name (file backend).
const RECORDS_DIR_NAME: &str = "records";

/// Default database file name (sqlite backend).
const DATABASE_FILE_NAME: &str = "records.db";

/// Default ledger file name.
const LEDGER_FILE_NAME: &str = "identity_ledger.txt";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `SURVEYVAULT_`, nested with `__`)
/// 2. TOML config file at `~/.config/surveyvault/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration.
    pub server: ServerConfig,
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Submission validation configuration.
    pub submission: SubmissionConfig,
    /// Admission control configuration.
    pub admission: AdmissionConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Local development; plaintext HTTP is expected.
    #[default]
    Development,
    /// Production; TLS is expected to be terminated in front of the service.
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
        }
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Deployment environment.
    pub environment: Environment,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Record store backend.
    pub backend: StoreBackend,
    /// Base directory for all persisted state.
    /// Defaults to `~/.local/share/surveyvault`
    pub data_dir: Option<PathBuf>,
    /// Directory for per-submission record files (file backend).
    /// Defaults to `<data_dir>/records`
    pub records_dir: Option<PathBuf>,
    /// Path to the record database (sqlite backend).
    /// Defaults to `<data_dir>/records.db`
    pub database_path: Option<PathBuf>,
    /// Path to the identity ledger.
    /// Defaults to `<data_dir>/identity_ledger.txt`
    pub ledger_path: Option<PathBuf>,
}

/// Submission validation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubmissionConfig {
    /// Maximum free-text answer length in characters. Set to 0 for unlimited.
    pub max_text_length: usize,
}

/// Admission control (rate limiting) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Enable per-client rate limiting of submissions.
    pub enabled: bool,
    /// Submissions allowed per client per window.
    pub max_requests: u32,
    /// Window length in seconds.
    pub window_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            environment: Environment::Development,
        }
    }
}

impl Default for SubmissionConfig {
    fn default() -> Self {
        Self {
            max_text_length: ValidatorConfig::default().max_text_length,
        }
    }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_secs: 15 * 60,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed("SURVEYVAULT_").split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(Error::ConfigValidation {
                message: "server.port must be greater than 0".to_string(),
            });
        }

        if self.server.host.trim().is_empty() {
            return Err(Error::ConfigValidation {
                message: "server.host must not be empty".to_string(),
            });
        }

        if self.admission.enabled {
            if self.admission.max_requests == 0 {
                return Err(Error::ConfigValidation {
                    message: "admission.max_requests must be greater than 0".to_string(),
                });
            }
            if self.admission.window_secs == 0 {
                return Err(Error::ConfigValidation {
                    message: "admission.window_secs must be greater than 0".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Get the data directory, resolving defaults if not set.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.storage
            .data_dir
            .clone()
            .unwrap_or_else(Self::default_data_dir)
    }

    /// Get the record directory, resolving defaults if not set.
    #[must_use]
    pub fn records_dir(&self) -> PathBuf {
        self.storage
            .records_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join(RECORDS_DIR_NAME))
    }

    /// Get the record database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the ledger path, resolving defaults if not set.
    #[must_use]
    pub fn ledger_path(&self) -> PathBuf {
        self.storage
            .ledger_path
            .clone()
            .unwrap_or_else(|| self.data_dir().join(LEDGER_FILE_NAME))
    }

    /// The `host:port` string to bind the HTTP listener to.
    ///
    /// IP literals are rendered through [`SocketAddr`], so IPv6 hosts come out
    /// bracketed (`[::1]:3000`). Host names are passed through for resolution.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        let host = self.server.host.trim();
        let literal = host.trim_start_matches('[').trim_end_matches(']');
        match literal.parse::<IpAddr>() {
            Ok(ip) => SocketAddr::new(ip, self.server.port).to_string(),
            Err(_) => format!("{host}:{}", self.server.port),
        }
    }

    /// Validator settings derived from this configuration.
    #[must_use]
    pub fn validator_config(&self) -> ValidatorConfig {
        ValidatorConfig {
            max_text_length: self.submission.max_text_length,
        }
    }

    /// Get the admission window as a Duration.
    #[must_use]
    pub fn admission_window(&self) -> Duration {
        Duration::from_secs(self.admission.window_secs)
    }
}
