//! Block indexer crate for proof-of-work chains
//!
//! This crate imports parsed blocks into a persistent index, links
//! transaction inputs to the outputs they spend, maintains cumulative
//! per-block aggregates (chain work, supply, coin-age) and selects the
//! greatest-work tip of every configured chain.

pub mod ancestry;
pub mod cache;
pub mod error;
pub mod events;
pub mod indexer;
pub mod linker;
pub mod models;
pub mod propagator;
pub mod queries;
pub mod reorg;
pub mod store;
pub mod work;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export main types for convenience
pub use cache::DEFAULT_BLOCK_CACHE_SIZE;
pub use error::{BlockIndexerError, Result};
pub use events::{EventEmitter, EventSubscriber, IndexerEvent};
pub use indexer::BlockIndexer;
pub use models::{
    Ancestry, Block, BlockId, BlockTx, BlockTxIn, Chain, ChainCandidate, ChainId, ChainStats,
    ImportOutcome, ImportStatus, NewChain, ReorgPlan, Tip, Transaction, TxId, TxIn, TxInId, TxOut,
};
pub use work::{BlockWork, CompactTargetWork};
