//! Chain indexer service
//!
//! Reads raw block files for one or more proof-of-work chains and keeps the
//! block index in `block-indexer` current, following the files as they grow.

pub mod config;
pub mod driver;
pub mod error;

pub use config::{ChainConfig, IndexerConfig, SourceConfig};
pub use driver::{Driver, RoundSummary};
pub use error::{Error, Result};

/// Install the global tracing subscriber, filtered by `RUST_LOG`.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
}
