//! Error types for the block indexer

use crate::models::{BlockId, ChainId, TxId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BlockIndexerError {
    #[error("Database error: {0}")]
    Database(#[from] database_connector::DatabaseError),

    #[error("Malformed record: {0}")]
    MalformedRecord(#[from] block_parser::ParserError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Unknown chain: {0}")]
    UnknownChain(ChainId),

    #[error("Block not found: {0}")]
    BlockNotFound(BlockId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(TxId),

    #[error("Event system error: {0}")]
    EventSystem(String),
}

impl BlockIndexerError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        BlockIndexerError::InvariantViolation(msg.into())
    }

    /// Errors after which the index must not be written to again without operator action.
    ///
    /// A malformed record only stops its own stream; everything else points at
    /// the index or the storage underneath it.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BlockIndexerError::MalformedRecord(_))
    }
}

pub type Result<T> = std::result::Result<T, BlockIndexerError>;
