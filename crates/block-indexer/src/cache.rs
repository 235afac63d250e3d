//! Bounded cache of recently touched blocks

use crate::models::{Block, BlockId};
use lru::LruCache;
use std::num::NonZeroUsize;

pub const DEFAULT_BLOCK_CACHE_SIZE: usize = 4096;

/// LRU cache in front of the block table.
///
/// Only ever holds blocks that are either committed or part of the batch
/// currently being built; the owner clears it when a batch is discarded.
pub struct BlockCache {
    inner: LruCache<BlockId, Block>,
    hits: u64,
    misses: u64,
}

impl BlockCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, id: BlockId) -> Option<Block> {
        match self.inner.get(&id) {
            Some(block) => {
                self.hits += 1;
                Some(block.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, block: Block) {
        self.inner.put(block.id, block);
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    /// `(hits, misses)` since creation
    pub fn stats(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }
}
