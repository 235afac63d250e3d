//! Main block indexer implementation

use crate::error::{BlockIndexerError, Result};
use crate::events::{plan_events, EventEmitter, EventSubscriber, IndexerEvent};
use crate::linker::import_tx;
use crate::models::*;
use crate::propagator::{adopt_orphans, Propagation};
use crate::reorg::offer_block_to_chain;
use crate::store::{IndexStore, Key};
use crate::work::{BlockWork, CompactTargetWork};
use block_parser::{BlockRecord, ScriptRecognizer, StandardScripts, StreamPosition};
use database_connector::{Checkpoint, DatabaseConnection};
use std::collections::HashMap;

/// Block indexer for proof-of-work chains
///
/// Single writer: every call that changes the index runs to completion and
/// commits one batch, or rolls back and leaves the index untouched.
pub struct BlockIndexer<W = CompactTargetWork, R = StandardScripts> {
    pub(crate) store: IndexStore,
    work: W,
    recognizer: R,
    event_emitter: EventEmitter,
    pending_events: Vec<IndexerEvent>,
}

impl BlockIndexer {
    /// Create an indexer using Bitcoin compact-target work and standard script recognition
    pub fn new(db: DatabaseConnection, cache_size: usize) -> Result<Self> {
        Self::with_components(db, cache_size, CompactTargetWork, StandardScripts)
    }
}

impl<W: BlockWork, R: ScriptRecognizer> BlockIndexer<W, R> {
    pub fn with_components(
        db: DatabaseConnection,
        cache_size: usize,
        work: W,
        recognizer: R,
    ) -> Result<Self> {
        let store = IndexStore::open(db, cache_size)?;
        store.health_check()?;

        Ok(Self {
            store,
            work,
            recognizer,
            event_emitter: EventEmitter::default(),
            pending_events: Vec::new(),
        })
    }

    /// Get a reference to the event emitter
    pub fn event_emitter(&self) -> &EventEmitter {
        &self.event_emitter
    }

    /// Subscribe to events
    pub fn subscribe_events(&self) -> EventSubscriber {
        EventSubscriber::new(&self.event_emitter)
    }

    /// Register a chain, or return the stored one if the id is already known.
    ///
    /// Descriptive fields are refreshed from `new`; the tip is never touched.
    pub fn register_chain(&mut self, new: NewChain) -> Result<Chain> {
        self.apply(None, move |this| {
            let chain = match this.store.chain(new.id)? {
                Some(existing) => Chain {
                    last_block_id: existing.last_block_id,
                    ..chain_from(new)
                },
                None => {
                    let chain = chain_from(new);
                    this.store.push_unique(&Key::ChainIds, chain.id)?;
                    tracing::info!(
                        "Registered chain {} ({}) magic {}",
                        chain.name,
                        chain.code3,
                        chain.magic.map(hex::encode).unwrap_or_else(|| "-".to_string())
                    );
                    chain
                }
            };
            this.store.put(&Key::Chain(chain.id), &chain)?;
            Ok(chain)
        })
    }

    /// Import one block and offer it to `chains`
    pub fn import_block(
        &mut self,
        record: &BlockRecord,
        chains: &[ChainId],
    ) -> Result<ImportOutcome> {
        self.apply(None, |this| this.import_inner(record, chains))
    }

    /// Import one block read from `source`, advancing the source's position to
    /// `next` in the same commit
    pub fn import_block_at(
        &mut self,
        source: &str,
        next: StreamPosition,
        record: &BlockRecord,
        chains: &[ChainId],
    ) -> Result<ImportOutcome> {
        let checkpoint = Checkpoint {
            source: source.to_string(),
            file_number: next.file_number,
            offset: next.offset,
        };
        self.apply(Some(checkpoint), |this| this.import_inner(record, chains))
    }

    /// Position to resume `source` from, if it has ever been advanced
    pub fn resume_position(&self, source: &str) -> Result<Option<StreamPosition>> {
        Ok(self
            .store
            .checkpoint(source)?
            .map(|cp| StreamPosition::new(cp.file_number, cp.offset)))
    }

    /// Run `f` against the overlay, then commit it together with `checkpoint`.
    ///
    /// Events queued by `f` are published only after the commit succeeds.
    fn apply<T>(
        &mut self,
        checkpoint: Option<Checkpoint>,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let result = match f(self) {
            Ok(value) => {
                if let Some(checkpoint) = checkpoint {
                    self.store.set_checkpoint(checkpoint);
                }
                self.store.commit().map(|_| value)
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(value) => {
                for event in std::mem::take(&mut self.pending_events) {
                    self.event_emitter.emit(event);
                }
                Ok(value)
            }
            Err(e) => {
                self.pending_events.clear();
                if let Err(rollback) = self.store.rollback() {
                    tracing::error!("Rollback after failed import also failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    fn import_inner(&mut self, record: &BlockRecord, chains: &[ChainId]) -> Result<ImportOutcome> {
        for chain_id in chains {
            self.store.require_chain(*chain_id)?;
        }

        if let Some(existing) = self.store.block_id_by_hash(&record.hash)? {
            return self.import_duplicate(existing, record, chains);
        }

        let block_id = self.store.next_block_id()?;

        // Transactions
        let mut block_txs = Vec::with_capacity(record.transactions.len());
        let mut resolved = Vec::new();
        let mut value_out = 0i64;
        for (position, tx) in record.transactions.iter().enumerate() {
            let linked = import_tx(&mut self.store, &self.recognizer, tx)?;
            value_out = value_out.checked_add(linked.value_out).ok_or_else(|| {
                BlockIndexerError::invariant(format!(
                    "output sum of block {} overflowed",
                    record.hash
                ))
            })?;
            block_txs.push(BlockTx {
                tx_id: linked.tx_id,
                position: position as u32,
                ss_destroyed: None,
            });
            self.store.push_unique(&Key::TxBlocks(linked.tx_id), block_id)?;
            for tx_id in linked.resolved {
                if !resolved.contains(&tx_id) {
                    resolved.push(tx_id);
                }
            }
        }
        self.store.put(&Key::BlockTxs(block_id), &block_txs)?;

        // Block
        let prev_block_id = if record.is_genesis() {
            None
        } else {
            self.store.block_id_by_hash(&record.prev_hash)?
        };
        let block = Block {
            id: block_id,
            hash: record.hash,
            prev_hash: record.prev_hash,
            version: record.version,
            merkle_root: record.merkle_root,
            time: record.time,
            bits: record.bits,
            nonce: record.nonce,
            prev_block_id,
            height: None,
            chain_work: None,
            num_tx: record.transactions.len() as u32,
            value_in: None,
            value_out,
            total_satoshis: None,
            total_seconds: None,
            satoshi_seconds: None,
            total_ss: None,
            ss_destroyed: None,
        };
        self.store.put_block(&block)?;
        self.store.put(&Key::BlockByHash(record.hash), &block_id)?;

        let status = match prev_block_id {
            Some(parent) => {
                self.store.push_unique(&Key::Children(parent), block_id)?;
                ImportStatus::Linked
            }
            None if record.is_genesis() => ImportStatus::Linked,
            None => {
                self.store
                    .push_unique(&Key::OrphansByPrevHash(record.prev_hash), block_id)?;
                tracing::debug!("Block {} waits for parent {}", record.hash, record.prev_hash);
                ImportStatus::Orphan
            }
        };

        // Promote orphans that were waiting for this block
        let waiting: Vec<BlockId> = self
            .store
            .take(&Key::OrphansByPrevHash(record.hash))?
            .unwrap_or_default();
        for orphan_id in waiting {
            let mut orphan = self.store.require_block(orphan_id)?;
            orphan.prev_block_id = Some(block_id);
            self.store.put_block(&orphan)?;
            self.store.push_unique(&Key::Children(block_id), orphan_id)?;
            tracing::debug!("Adopted orphan {} under {}", orphan.hash, record.hash);
        }

        for chain_id in chains {
            self.store.ensure_candidate(&block, *chain_id)?;
        }

        self.pending_events.push(IndexerEvent::BlockImported {
            block_id,
            hash: record.hash,
            orphan: status == ImportStatus::Orphan,
        });

        let mut tip_changes = Vec::new();
        let propagation = adopt_orphans(&mut self.store, &self.work, block_id)?;
        self.offer_tips(&propagation, &mut tip_changes)?;

        // Blocks whose spends were completed by this block's outputs
        for tx_id in resolved {
            for spending_block in self.store.tx_blocks(tx_id)? {
                if spending_block == block_id {
                    continue;
                }
                let propagation = adopt_orphans(&mut self.store, &self.work, spending_block)?;
                self.offer_tips(&propagation, &mut tip_changes)?;
            }
        }

        tracing::debug!(
            "Imported block {} as {} ({:?}, {} txs)",
            record.hash,
            block_id,
            status,
            block.num_tx
        );

        Ok(ImportOutcome {
            block_id,
            status,
            tip_changes,
        })
    }

    /// A block already in the index only matters if it is now offered to new chains.
    fn import_duplicate(
        &mut self,
        block_id: BlockId,
        record: &BlockRecord,
        chains: &[ChainId],
    ) -> Result<ImportOutcome> {
        let block = self.store.require_block(block_id)?;
        if !block.same_header(record) {
            return Err(BlockIndexerError::invariant(format!(
                "block hash {} collides with a different header",
                record.hash
            )));
        }

        let mut added = false;
        for chain_id in chains {
            added |= self.store.ensure_candidate(&block, *chain_id)?;
        }

        let mut tip_changes = Vec::new();
        if added {
            let propagation = adopt_orphans(&mut self.store, &self.work, block_id)?;
            self.offer_tips(&propagation, &mut tip_changes)?;
        } else {
            tracing::trace!("Skipping duplicate block {}", record.hash);
        }

        Ok(ImportOutcome {
            block_id,
            status: ImportStatus::Duplicate,
            tip_changes,
        })
    }

    fn offer_tips(
        &mut self,
        propagation: &Propagation,
        tip_changes: &mut Vec<ReorgPlan>,
    ) -> Result<()> {
        for (chain_id, tip) in &propagation.tips {
            let Some(plan) = offer_block_to_chain(&mut self.store, tip.block_id, *chain_id)? else {
                continue;
            };

            let mut heights = HashMap::new();
            for id in plan.disconnect.iter().chain(&plan.connect) {
                let block = self.store.require_block(*id)?;
                if let Some(height) = block.height {
                    heights.insert(*id, height);
                }
            }
            self.pending_events
                .extend(plan_events(&plan, |id| heights.get(&id).copied()));
            tip_changes.push(plan);
        }
        Ok(())
    }
}

fn chain_from(new: NewChain) -> Chain {
    Chain {
        id: new.id,
        name: new.name,
        code3: new.code3,
        magic: new.magic,
        address_version: new.address_version,
        policy: new.policy,
        last_block_id: None,
    }
}
