//! Configuration parsing and management.
//!
//! The ledger is configured from a TOML file:
//!
//! ```toml
//! identity = "x509::CN=weighbridge-01"
//!
//! [store]
//! backend = "sqlite"
//! path = "/var/lib/proofledger/ledger.db"
//!
//! [duplicates]
//! on_query_error = "fail_open"
//! ```
//!
//! Every section is optional.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::duplicate::QueryFailurePolicy;
use crate::store::{InMemoryLedgerStore, LedgerStore, SqliteLedgerStore, StoreError};

/// Top-level ledger configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Identity stamped into `createdBy`. Unset means unknown caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    /// Storage backend.
    #[serde(default)]
    pub store: StoreConfig,

    /// Duplicate detection settings.
    #[serde(default)]
    pub duplicates: DuplicateConfig,
}

impl LedgerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        debug!(path = %path.display(), "loaded configuration file");
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or fails validation.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] describing the first violation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.backend == StoreBackend::Sqlite
            && self
                .store
                .path
                .as_ref()
                .is_none_or(|p| p.as_os_str().is_empty())
        {
            return Err(ConfigError::Validation(
                "store.path is required for the sqlite backend".to_string(),
            ));
        }
        if self.identity.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(ConfigError::Validation(
                "identity must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Opens the configured store.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be opened.
    pub fn open_store(&self) -> Result<Box<dyn LedgerStore>, StoreError> {
        match (self.store.backend, self.store.path.as_deref()) {
            (StoreBackend::Memory, _) => Ok(Box::new(InMemoryLedgerStore::new())),
            (StoreBackend::Sqlite, Some(path)) => Ok(Box::new(SqliteLedgerStore::open(path)?)),
            (StoreBackend::Sqlite, None) => Err(StoreError::Unavailable {
                operation: "open",
                detail: "no path configured for the sqlite backend".to_string(),
            }),
        }
    }
}

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Which backend to use.
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database file for the sqlite backend.
    #[serde(default = "default_store_path", skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
        }
    }
}

#[allow(clippy::unnecessary_wraps)]
fn default_store_path() -> Option<PathBuf> {
    Some(PathBuf::from("proofledger.db"))
}

/// Available storage backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Process-local store, discarded on exit.
    Memory,
    /// `SQLite` database file.
    #[default]
    Sqlite,
}

/// Duplicate detection configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DuplicateConfig {
    /// Behaviour when a duplicate query fails.
    #[serde(default)]
    pub on_query_error: QueryFailurePolicy,
}

/// Configuration errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// I/O error reading configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Validation error.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
