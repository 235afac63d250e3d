//! Configuration types for the database connector

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    Sqlite,
    Memory,
}

impl Default for DatabaseType {
    fn default() -> Self {
        DatabaseType::Sqlite
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub database_type: DatabaseType,

    // SQLite specific
    pub sqlite_path: Option<PathBuf>,

    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_seconds: u64,

    /// Use write-ahead logging for file databases
    #[serde(default = "default_wal")]
    pub wal: bool,
}

fn default_busy_timeout() -> u64 {
    30
}

fn default_wal() -> bool {
    true
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_type: DatabaseType::default(),
            sqlite_path: Some(PathBuf::from("chain-index.sqlite")),
            busy_timeout_seconds: default_busy_timeout(),
            wal: default_wal(),
        }
    }
}

impl DatabaseConfig {
    /// Create a new SQLite configuration
    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            database_type: DatabaseType::Sqlite,
            sqlite_path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Create a configuration for a volatile in-memory store
    pub fn memory() -> Self {
        Self {
            database_type: DatabaseType::Memory,
            sqlite_path: None,
            ..Default::default()
        }
    }

    /// Get the SQLite path, failing if none is configured
    pub fn sqlite_path(&self) -> crate::Result<&PathBuf> {
        self.sqlite_path.as_ref()
            .ok_or_else(|| crate::DatabaseError::ConfigError(
                "SQLite path not specified".to_string()
            ))
    }

    fn is_in_memory_sqlite(&self) -> bool {
        self.sqlite_path.as_ref().map_or(false, |p| p.as_os_str() == ":memory:")
    }

    /// Whether journal mode should be switched to WAL
    pub(crate) fn use_wal(&self) -> bool {
        self.wal && !self.is_in_memory_sqlite()
    }
}
