//! Typed access to the index on top of the key/value store
//!
//! All writes go into a pending overlay which is applied to the database as a
//! single batch by [`IndexStore::commit`]. Reads see the overlay first, so an
//! import observes its own uncommitted writes.

use crate::cache::BlockCache;
use crate::error::{BlockIndexerError, Result};
use crate::models::*;
use block_parser::{Hash256, RecognizedKey};
use database_connector::{Checkpoint, DatabaseConnection, KeyValueStore, WriteBatch};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Logical key of every persisted record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Key {
    Meta,
    ChainIds,
    Chain(ChainId),
    Block(BlockId),
    BlockByHash(Hash256),
    Children(BlockId),
    OrphansByPrevHash(Hash256),
    ChainCandidates(BlockId),
    CanonicalHeight(ChainId, u32),
    Transaction(TxId),
    TxByHash(Hash256),
    TxOut(TxOutId),
    TxIn(TxInId),
    UnlinkedInputs(Hash256, u32),
    BlockTxs(BlockId),
    TxBlocks(TxId),
    BlockTxIns(BlockId),
    Pubkey(PubkeyId),
    PubkeyByKey(RecognizedKey),
}

impl Key {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }
}

pub struct IndexStore {
    db: DatabaseConnection,
    pending: BTreeMap<Vec<u8>, Option<Vec<u8>>>,
    checkpoints: Vec<Checkpoint>,
    cache: BlockCache,
    counters: Counters,
}

impl IndexStore {
    pub fn open(db: DatabaseConnection, cache_size: usize) -> Result<Self> {
        let mut store = Self {
            db,
            pending: BTreeMap::new(),
            checkpoints: Vec::new(),
            cache: BlockCache::new(cache_size),
            counters: Counters::default(),
        };
        store.counters = store.get(&Key::Meta)?.unwrap_or_default();
        Ok(store)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &Key) -> Result<Option<T>> {
        let raw = key.encode()?;
        let bytes = match self.pending.get(&raw) {
            Some(value) => value.clone(),
            None => self.db.read(&raw)?,
        };
        bytes
            .map(|b| bincode::deserialize(&b).map_err(BlockIndexerError::from))
            .transpose()
    }

    pub fn put<T: Serialize>(&mut self, key: &Key, value: &T) -> Result<()> {
        self.pending.insert(key.encode()?, Some(bincode::serialize(value)?));
        Ok(())
    }

    pub fn delete(&mut self, key: &Key) -> Result<()> {
        self.pending.insert(key.encode()?, None);
        Ok(())
    }

    /// Read and delete in one step
    pub fn take<T: DeserializeOwned>(&mut self, key: &Key) -> Result<Option<T>> {
        let value = self.get(key)?;
        if value.is_some() {
            self.delete(key)?;
        }
        Ok(value)
    }

    /// Read a list-valued record, treating a missing key as empty
    pub fn get_list<T: DeserializeOwned>(&self, key: &Key) -> Result<Vec<T>> {
        Ok(self.get(key)?.unwrap_or_default())
    }

    /// Append to a list-valued record unless the item is already present
    pub fn push_unique<T>(&mut self, key: &Key, item: T) -> Result<()>
    where
        T: Serialize + DeserializeOwned + PartialEq,
    {
        let mut list: Vec<T> = self.get_list(key)?;
        if !list.contains(&item) {
            list.push(item);
            self.put(key, &list)?;
        }
        Ok(())
    }

    // Blocks

    pub fn block(&mut self, id: BlockId) -> Result<Option<Block>> {
        if let Some(block) = self.cache.get(id) {
            return Ok(Some(block));
        }
        let block: Option<Block> = self.get(&Key::Block(id))?;
        if let Some(block) = &block {
            self.cache.insert(block.clone());
        }
        Ok(block)
    }

    pub fn require_block(&mut self, id: BlockId) -> Result<Block> {
        self.block(id)?.ok_or(BlockIndexerError::BlockNotFound(id))
    }

    pub fn put_block(&mut self, block: &Block) -> Result<()> {
        self.put(&Key::Block(block.id), block)?;
        self.cache.insert(block.clone());
        Ok(())
    }

    pub fn block_id_by_hash(&self, hash: &Hash256) -> Result<Option<BlockId>> {
        self.get(&Key::BlockByHash(*hash))
    }

    pub fn parent(&mut self, block: &Block) -> Result<Option<Block>> {
        match block.prev_block_id {
            Some(id) => Ok(Some(self.require_block(id)?)),
            None => Ok(None),
        }
    }

    pub fn children(&self, id: BlockId) -> Result<Vec<BlockId>> {
        self.get_list(&Key::Children(id))
    }

    // Chains and candidacy

    pub fn chain(&self, id: ChainId) -> Result<Option<Chain>> {
        self.get(&Key::Chain(id))
    }

    pub fn require_chain(&self, id: ChainId) -> Result<Chain> {
        self.chain(id)?.ok_or(BlockIndexerError::UnknownChain(id))
    }

    pub fn chain_ids(&self) -> Result<Vec<ChainId>> {
        self.get_list(&Key::ChainIds)
    }

    pub fn candidates(&self, block_id: BlockId) -> Result<Vec<ChainCandidate>> {
        self.get_list(&Key::ChainCandidates(block_id))
    }

    pub fn put_candidates(
        &mut self,
        block_id: BlockId,
        candidates: &[ChainCandidate],
    ) -> Result<()> {
        self.put(&Key::ChainCandidates(block_id), &candidates)
    }

    /// Add a non-canonical candidacy for `chain_id` if the block has none yet.
    ///
    /// Returns true when a row was added.
    pub fn ensure_candidate(&mut self, block: &Block, chain_id: ChainId) -> Result<bool> {
        let mut candidates = self.candidates(block.id)?;
        if candidates.iter().any(|c| c.chain_id == chain_id) {
            return Ok(false);
        }
        candidates.push(ChainCandidate {
            chain_id,
            block_id: block.id,
            in_longest: false,
            height: block.height,
        });
        self.put_candidates(block.id, &candidates)?;
        Ok(true)
    }

    /// Chains for which the block is on the canonical path
    pub fn in_longest_chains(&self, block_id: BlockId) -> Result<Vec<ChainId>> {
        Ok(self
            .candidates(block_id)?
            .into_iter()
            .filter(|c| c.in_longest)
            .map(|c| c.chain_id)
            .collect())
    }

    // Transactions

    pub fn transaction(&self, id: TxId) -> Result<Option<Transaction>> {
        self.get(&Key::Transaction(id))
    }

    pub fn require_transaction(&self, id: TxId) -> Result<Transaction> {
        self.transaction(id)?.ok_or(BlockIndexerError::TransactionNotFound(id))
    }

    pub fn tx_id_by_hash(&self, hash: &Hash256) -> Result<Option<TxId>> {
        self.get(&Key::TxByHash(*hash))
    }

    pub fn txout(&self, id: TxOutId) -> Result<Option<TxOut>> {
        self.get(&Key::TxOut(id))
    }

    pub fn txin(&self, id: TxInId) -> Result<Option<TxIn>> {
        self.get(&Key::TxIn(id))
    }

    pub fn block_txs(&self, block_id: BlockId) -> Result<Vec<BlockTx>> {
        self.get_list(&Key::BlockTxs(block_id))
    }

    pub fn tx_blocks(&self, tx_id: TxId) -> Result<Vec<BlockId>> {
        self.get_list(&Key::TxBlocks(tx_id))
    }

    // Id allocation

    pub fn next_block_id(&mut self) -> Result<BlockId> {
        let id = BlockId(self.counters.next_block_id);
        self.counters.next_block_id += 1;
        self.put(&Key::Meta, &self.counters.clone())?;
        Ok(id)
    }

    pub fn next_tx_id(&mut self) -> Result<TxId> {
        let id = TxId(self.counters.next_tx_id);
        self.counters.next_tx_id += 1;
        self.put(&Key::Meta, &self.counters.clone())?;
        Ok(id)
    }

    pub fn next_pubkey_id(&mut self) -> Result<PubkeyId> {
        let id = PubkeyId(self.counters.next_pubkey_id);
        self.counters.next_pubkey_id += 1;
        self.put(&Key::Meta, &self.counters.clone())?;
        Ok(id)
    }

    // Batches

    /// Advance `checkpoint.source` to the given position in the next commit
    pub fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.checkpoints.retain(|c| c.source != checkpoint.source);
        self.checkpoints.push(checkpoint);
    }

    pub fn checkpoint(&self, source: &str) -> Result<Option<Checkpoint>> {
        Ok(self.db.checkpoint(source)?)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty() || !self.checkpoints.is_empty()
    }

    /// Apply every pending write and checkpoint atomically
    pub fn commit(&mut self) -> Result<()> {
        let mut batch = WriteBatch::new();
        for (key, value) in std::mem::take(&mut self.pending) {
            match value {
                Some(value) => batch.put(key, value),
                None => batch.delete(key),
            };
        }
        for checkpoint in std::mem::take(&mut self.checkpoints) {
            batch.set_checkpoint(checkpoint);
        }

        let ops = batch.len();
        if let Err(e) = self.db.write_batch(batch) {
            self.discard_overlay()?;
            return Err(e.into());
        }
        tracing::trace!("Committed batch of {} operations", ops);
        Ok(())
    }

    /// Drop every uncommitted write
    pub fn rollback(&mut self) -> Result<()> {
        if self.has_pending() {
            tracing::debug!("Discarding {} uncommitted operations", self.pending.len());
        }
        self.discard_overlay()
    }

    fn discard_overlay(&mut self) -> Result<()> {
        self.pending.clear();
        self.checkpoints.clear();
        self.cache.clear();
        self.counters = self.get(&Key::Meta)?.unwrap_or_default();
        Ok(())
    }

    pub fn health_check(&self) -> Result<()> {
        Ok(self.db.health_check()?)
    }
}
