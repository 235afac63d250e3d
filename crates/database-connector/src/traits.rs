//! Traits for database operations

use crate::models::{Checkpoint, WriteBatch};

/// Persistence contract used by the indexer.
///
/// Writes only happen through [`KeyValueStore::write_batch`], which applies the
/// whole batch and its checkpoints or nothing.
pub trait KeyValueStore: Send {
    /// Read the value stored under `key`
    fn read(&self, key: &[u8]) -> crate::Result<Option<Vec<u8>>>;

    /// Apply every operation and checkpoint of `batch` in one commit
    fn write_batch(&mut self, batch: WriteBatch) -> crate::Result<()>;

    /// Last committed checkpoint for `source`
    fn checkpoint(&self, source: &str) -> crate::Result<Option<Checkpoint>>;

    /// Check if the connection is healthy
    fn health_check(&self) -> crate::Result<()>;

    /// Get the database type
    fn database_type(&self) -> crate::config::DatabaseType;
}
