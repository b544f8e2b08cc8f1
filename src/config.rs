//! Application configuration module
//!
//! Handles loading and validating configuration from environment variables.

use serde::Deserialize;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Ipv4Addr,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: Ipv4Addr::new(0, 0, 0, 0), // all interfaces for containers
            port: 3000,
        }
    }
}

/// Database the capture endpoint reads from
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub max_pool_size: usize,
    pub require_tls: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            database: "postgres".to_string(),
            max_pool_size: 4,
            require_tls: false,
        }
    }
}

/// CORS configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["http://localhost:3001".to_string()],
        }
    }
}

/// Filters applied when a capture request does not name its own
#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    pub schemas: Vec<String>,
    pub exclude_tables: Vec<String>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            schemas: vec!["public".to_string()],
            exclude_tables: Vec::new(),
        }
    }
}

/// Snapshot persistence and upload limits
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub snapshot_dir: Option<PathBuf>,
    pub max_upload_bytes: usize,
    pub max_source_file_bytes: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            snapshot_dir: None,
            max_upload_bytes: 20 * 1024 * 1024,
            max_source_file_bytes: 1024 * 1024,
        }
    }
}

/// Complete application settings
#[derive(Debug, Clone, Default)]
pub struct Settings {
    pub server: ServerConfig,
    /// Absent when DATABASE_URL is not set; capture is then unavailable
    pub database: Option<DatabaseConfig>,
    pub cors: CorsConfig,
    pub capture: CaptureConfig,
    pub storage: StorageConfig,
}

impl Settings {
    /// Load settings from environment variables
    pub fn load() -> Result<Self, ConfigError> {
        // .env is optional
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup
    pub fn from_lookup<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let server = ServerConfig {
            host: parse_or(&var, "HOST", ServerConfig::default().host)?,
            port: parse_or(&var, "PORT", ServerConfig::default().port)?,
        };

        let database = match var("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            Some(url) => {
                let max_pool_size =
                    parse_or(&var, "DB_MAX_CONNECTIONS", DatabaseConfig::default().max_pool_size)?;
                Some(Self::parse_database_url(&url, max_pool_size)?)
            }
            None => None,
        };

        let cors = CorsConfig {
            allowed_origins: var("ALLOWED_ORIGINS")
                .map(|s| split_list(&s))
                .unwrap_or_else(|| CorsConfig::default().allowed_origins),
        };

        let capture = CaptureConfig {
            schemas: var("CAPTURE_SCHEMAS")
                .map(|s| split_list(&s))
                .unwrap_or_else(|| CaptureConfig::default().schemas),
            exclude_tables: var("CAPTURE_EXCLUDE_TABLES")
                .map(|s| split_list(&s))
                .unwrap_or_default(),
        };

        let defaults = StorageConfig::default();
        let storage = StorageConfig {
            snapshot_dir: var("SNAPSHOT_DIR")
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
            max_upload_bytes: parse_or(&var, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
            max_source_file_bytes: parse_or(
                &var,
                "MAX_SOURCE_FILE_BYTES",
                defaults.max_source_file_bytes,
            )?,
        };

        Ok(Self {
            server,
            database,
            cors,
            capture,
            storage,
        })
    }

    /// Parse a DATABASE_URL connection string (postgresql://...)
    fn parse_database_url(url: &str, max_pool_size: usize) -> Result<DatabaseConfig, ConfigError> {
        let parsed = url::Url::parse(url).map_err(|_| {
            ConfigError::InvalidValue(
                "Invalid DATABASE_URL format (expected postgresql://...)".to_string(),
            )
        })?;

        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(ConfigError::InvalidValue(format!(
                "Unsupported DATABASE_URL scheme '{}'",
                parsed.scheme()
            )));
        }

        let host = parsed
            .host_str()
            .ok_or_else(|| ConfigError::InvalidValue("Missing host in DATABASE_URL".to_string()))?
            .to_string();

        let database = parsed.path().trim_start_matches('/').to_string();
        let require_tls = parsed
            .query_pairs()
            .any(|(k, v)| k == "sslmode" && matches!(v.as_ref(), "require" | "verify-ca" | "verify-full"));

        Ok(DatabaseConfig {
            host,
            port: parsed.port().unwrap_or(5432),
            user: parsed.username().to_string(),
            password: parsed.password().map(|p| p.to_string()).unwrap_or_default(),
            database: if database.is_empty() {
                DatabaseConfig::default().database
            } else {
                database
            },
            max_pool_size,
            require_tls,
        })
    }
}

fn parse_or<F, T>(var: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
