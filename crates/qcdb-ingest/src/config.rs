//! Configuration management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};

// ============================================================================
// Defaults
// ============================================================================

/// Default seconds between two reads of the monitored output files.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10;

/// Default maximum database connections in the pool.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 5;

/// Default minimum database connections in the pool.
pub const DEFAULT_DB_MIN_CONNECTIONS: u32 = 1;

/// Default database connection timeout in seconds.
pub const DEFAULT_DB_CONNECT_TIMEOUT_SECS: u64 = 30;

const DEFAULT_DB_HOST: &str = "localhost";
const DEFAULT_DB_PORT: u16 = 5432;

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

/// Monitor settings shared by every package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestConfig {
    pub poll_interval: Duration,
    /// `None` waits until a terminal marker appears
    pub timeout: Option<Duration>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            timeout: None,
        }
    }
}

impl IngestConfig {
    /// Load `.env`, read the environment and validate
    pub fn load() -> IngestResult<Self> {
        dotenvy::dotenv().ok();
        let config = Self::from_env();
        config.validate()?;
        Ok(config)
    }

    /// Read `QCDB_POLL_INTERVAL_SECS` and `QCDB_TIMEOUT_SECS`; unparsable values fall back to defaults
    pub fn from_env() -> Self {
        Self {
            poll_interval: Duration::from_secs(
                env_parse("QCDB_POLL_INTERVAL_SECS").unwrap_or(DEFAULT_POLL_INTERVAL_SECS),
            ),
            timeout: env_parse::<u64>("QCDB_TIMEOUT_SECS").map(Duration::from_secs),
        }
    }

    /// Apply command-line overrides
    pub fn with_overrides(mut self, poll_interval_secs: Option<u64>, timeout_secs: Option<u64>) -> Self {
        if let Some(secs) = poll_interval_secs {
            self.poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = timeout_secs {
            self.timeout = Some(Duration::from_secs(secs));
        }
        self
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.poll_interval.is_zero() {
            return Err(IngestError::config("Poll interval must be greater than 0"));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(IngestError::config(
                "Timeout must be greater than 0 (omit it to wait indefinitely)",
            ));
        }
        Ok(())
    }
}

/// Database connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
}

impl DbConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            min_connections: DEFAULT_DB_MIN_CONNECTIONS,
            connect_timeout_secs: DEFAULT_DB_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Read connection settings from the environment
    ///
    /// `DATABASE_URL` wins; otherwise the URL is assembled from `DB_USER`,
    /// `DB_PASSWORD`, `DB_HOST`, `DB_PORT` and `DB_NAME`.
    pub fn from_env() -> IngestResult<Self> {
        dotenvy::dotenv().ok();

        let url = match std::env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => Self::url_from_parts()?,
        };

        let config = Self {
            url,
            max_connections: env_parse("DB_MAX_CONNECTIONS").unwrap_or(DEFAULT_DB_MAX_CONNECTIONS),
            min_connections: env_parse("DB_MIN_CONNECTIONS").unwrap_or(DEFAULT_DB_MIN_CONNECTIONS),
            connect_timeout_secs: env_parse("DB_CONNECT_TIMEOUT")
                .unwrap_or(DEFAULT_DB_CONNECT_TIMEOUT_SECS),
        };
        config.validate()?;
        Ok(config)
    }

    fn url_from_parts() -> IngestResult<String> {
        let user = std::env::var("DB_USER")
            .map_err(|_| IngestError::config("DATABASE_URL or DB_USER must be set"))?;
        let name = std::env::var("DB_NAME")
            .map_err(|_| IngestError::config("DATABASE_URL or DB_NAME must be set"))?;
        let password = std::env::var("DB_PASSWORD").unwrap_or_default();
        let host = std::env::var("DB_HOST").unwrap_or_else(|_| DEFAULT_DB_HOST.to_string());
        let port: u16 = env_parse("DB_PORT").unwrap_or(DEFAULT_DB_PORT);

        let credentials = if password.is_empty() {
            user
        } else {
            format!("{user}:{password}")
        };
        Ok(format!("postgresql://{credentials}@{host}:{port}/{name}"))
    }

    pub fn validate(&self) -> IngestResult<()> {
        if self.url.is_empty() {
            return Err(IngestError::config("Database URL cannot be empty"));
        }
        if self.max_connections == 0 {
            return Err(IngestError::config("DB_MAX_CONNECTIONS must be greater than 0"));
        }
        if self.min_connections > self.max_connections {
            return Err(IngestError::config(
                "DB_MIN_CONNECTIONS cannot exceed DB_MAX_CONNECTIONS",
            ));
        }
        Ok(())
    }
}
