//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration file (config/default.toml, config/local.toml)
//! 3. Environment variables (override)

use serde::Deserialize;
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub instance: InstanceConfig,
    pub signature: SignatureConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// Local origin
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Public domain (e.g., "social.example.com")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl InstanceConfig {
    /// Get the base URL for the instance
    ///
    /// # Returns
    /// Full URL like "https://social.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Outgoing signature configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SignatureConfig {
    /// Key ID advertised on signed fetches (actor#main-key)
    pub key_id: Option<String>,
    /// PEM file holding the private key for `key_id`
    pub private_key_path: Option<PathBuf>,
    /// Replay window for incoming signatures (default: 300)
    pub replay_threshold_seconds: i64,
}

/// Cache backend selector
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    Memory,
    #[default]
    Moka,
}

/// Dereference cache configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub backend: CacheBackend,
    /// Entry TTL in seconds (default: 3600)
    pub ttl_seconds: u64,
    /// Maximum entries for the moka backend (default: 10000)
    pub max_capacity: u64,
}

/// Triple store configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub user_agent: String,
    /// Request timeout in seconds (default: 30)
    pub timeout_seconds: u64,
    /// Permit fetches to loopback and private networks (default: false)
    pub allow_private_hosts: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub fn default_directive(&self) -> String {
        format!("fedifetch={}", self.level.trim().to_ascii_lowercase())
    }

    pub fn is_json(&self) -> bool {
        self.format.eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (FEDIFETCH__*)
    ///
    /// # Errors
    /// Returns error if configuration is invalid
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Config::builder()
            // Start with default values
            .set_default("instance.domain", "localhost")?
            .set_default("instance.protocol", "http")?
            .set_default("signature.replay_threshold_seconds", 300)?
            .set_default("cache.backend", "moka")?
            .set_default("cache.ttl_seconds", 3600)?
            .set_default("cache.max_capacity", 10000)?
            .set_default("database.path", "data/fedifetch.db")?
            .set_default("http.user_agent", "fedifetch/0.1.0")?
            .set_default("http.timeout_seconds", 30)?
            .set_default("http.allow_private_hosts", false)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (FEDIFETCH__*)
            .add_source(
                Environment::with_prefix("FEDIFETCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config.validate()?;
        Ok(app_config)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        use crate::error::AppError;

        if !matches!(self.instance.protocol.as_str(), "http" | "https") {
            return Err(AppError::Config(
                "instance.protocol must be http or https".to_string(),
            ));
        }

        if self.instance.domain.trim().is_empty() {
            return Err(AppError::Config(
                "instance.domain must not be empty".to_string(),
            ));
        }

        if self.signature.replay_threshold_seconds <= 0 {
            return Err(AppError::Config(
                "signature.replay_threshold_seconds must be greater than 0".to_string(),
            ));
        }

        if self.signature.key_id.is_some() != self.signature.private_key_path.is_some() {
            return Err(AppError::Config(
                "signature.key_id and signature.private_key_path must be set together"
                    .to_string(),
            ));
        }

        if self.cache.ttl_seconds == 0 {
            return Err(AppError::Config(
                "cache.ttl_seconds must be greater than 0".to_string(),
            ));
        }

        if !matches!(
            self.logging.level.trim().to_ascii_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(AppError::Config(format!(
                "logging.level must be trace, debug, info, warn or error, got {:?}",
                self.logging.level
            )));
        }

        if !matches!(self.logging.format.to_ascii_lowercase().as_str(), "pretty" | "json") {
            return Err(AppError::Config(
                "logging.format must be pretty or json".to_string(),
            ));
        }

        Ok(())
    }
}
