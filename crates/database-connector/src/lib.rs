//! Database Connector Crate
//! 
//! This crate provides the key/value persistence layer for the chain indexer:
//! point reads, atomic write batches and per-source resumable offsets, backed
//! by SQLite or by memory.

pub mod config;
pub mod connection;
pub mod error;
pub mod models;
pub mod traits;

// Re-export main types
pub use config::{DatabaseConfig, DatabaseType};
pub use connection::DatabaseConnection;
pub use error::{DatabaseError, Result};
pub use models::{BatchOp, Checkpoint, WriteBatch};
pub use traits::KeyValueStore;
