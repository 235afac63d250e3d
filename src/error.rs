use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Indexer error: {0}")]
    Indexer(#[from] block_indexer::BlockIndexerError),

    #[error("Database error: {0}")]
    Database(#[from] database_connector::DatabaseError),
}

pub type Result<T> = std::result::Result<T, Error>;
