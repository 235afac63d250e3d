//! Error types for the database connector

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),
    
    #[error("Configuration error: {0}")]
    ConfigError(String),
    
    #[error("Migration error: {0}")]
    MigrationError(String),
    
    #[error("Transaction error: {0}")]
    TransactionError(String),
    
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, DatabaseError>;
