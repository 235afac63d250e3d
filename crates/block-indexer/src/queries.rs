//! Read-side queries over the index

use crate::ancestry;
use crate::error::{BlockIndexerError, Result};
use crate::indexer::BlockIndexer;
use crate::models::*;
use crate::store::Key;
use block_parser::Hash256;

const SECONDS_PER_DAY: f64 = 86_400.0;
const SATOSHIS_PER_COIN: f64 = 100_000_000.0;

impl<W, R> BlockIndexer<W, R> {
    pub fn block(&mut self, id: BlockId) -> Result<Option<Block>> {
        self.store.block(id)
    }

    pub fn block_by_hash(&mut self, hash: &Hash256) -> Result<Option<Block>> {
        match self.store.block_id_by_hash(hash)? {
            Some(id) => self.store.block(id),
            None => Ok(None),
        }
    }

    /// Block at `height` on the canonical path of `chain_id`
    pub fn block_at_height(&mut self, chain_id: ChainId, height: u32) -> Result<Option<Block>> {
        match self.store.get(&Key::CanonicalHeight(chain_id, height))? {
            Some(id) => self.store.block(id),
            None => Ok(None),
        }
    }

    pub fn chain(&self, chain_id: ChainId) -> Result<Option<Chain>> {
        self.store.chain(chain_id)
    }

    pub fn chains(&self) -> Result<Vec<Chain>> {
        self.store
            .chain_ids()?
            .into_iter()
            .map(|id| self.store.require_chain(id))
            .collect()
    }

    pub fn chain_tip(&mut self, chain_id: ChainId) -> Result<Option<Block>> {
        match self.store.require_chain(chain_id)?.last_block_id {
            Some(id) => Ok(Some(self.store.require_block(id)?)),
            None => Ok(None),
        }
    }

    pub fn chain_candidates(&self, block_id: BlockId) -> Result<Vec<ChainCandidate>> {
        self.store.candidates(block_id)
    }

    pub fn transaction_by_hash(&self, hash: &Hash256) -> Result<Option<Transaction>> {
        match self.store.tx_id_by_hash(hash)? {
            Some(id) => self.store.transaction(id),
            None => Ok(None),
        }
    }

    /// Transactions of a block in block order
    pub fn block_transactions(&self, block_id: BlockId) -> Result<Vec<(BlockTx, Transaction)>> {
        let mut block_txs = self.store.block_txs(block_id)?;
        block_txs.sort_by_key(|bt| bt.position);
        block_txs
            .into_iter()
            .map(|bt| {
                let tx = self.store.require_transaction(bt.tx_id)?;
                Ok((bt, tx))
            })
            .collect()
    }

    /// Inputs of a block attributed to the ancestor block that produced the
    /// output they spend; spends of outputs off the block's own history are absent.
    pub fn block_spends(&self, block_id: BlockId) -> Result<Vec<BlockTxIn>> {
        Ok(self.store.get(&Key::BlockTxIns(block_id))?.unwrap_or_default())
    }

    pub fn transaction_outputs(&self, tx_id: TxId) -> Result<Vec<TxOut>> {
        let tx = self.store.require_transaction(tx_id)?;
        (0..tx.output_count)
            .map(|pos| {
                self.store.txout(TxOutId { tx_id, pos })?.ok_or_else(|| {
                    BlockIndexerError::invariant(format!("output {}:{} missing", tx.hash, pos))
                })
            })
            .collect()
    }

    pub fn transaction_inputs(&self, tx_id: TxId) -> Result<Vec<TxIn>> {
        let tx = self.store.require_transaction(tx_id)?;
        (0..tx.input_count)
            .map(|pos| {
                self.store.txin(TxInId { tx_id, pos })?.ok_or_else(|| {
                    BlockIndexerError::invariant(format!("input {}:{} missing", tx.hash, pos))
                })
            })
            .collect()
    }

    pub fn pubkey(&self, id: PubkeyId) -> Result<Option<Pubkey>> {
        self.store.get(&Key::Pubkey(id))
    }

    pub fn is_descended_from(
        &mut self,
        block_id: BlockId,
        ancestor_id: BlockId,
    ) -> Result<Ancestry> {
        ancestry::is_descended_from(&mut self.store, block_id, ancestor_id)
    }

    /// Coin statistics at the tip of `chain_id`
    pub fn chain_stats(&mut self, chain_id: ChainId) -> Result<ChainStats> {
        let tip = self.chain_tip(chain_id)?;
        let Some(tip) = tip else {
            return Ok(ChainStats {
                chain_id,
                tip: None,
                tip_height: None,
                chain_work: None,
                total_satoshis: None,
                total_seconds: None,
                satoshi_seconds: None,
                total_ss: None,
                coin_days: None,
                coin_days_destroyed: None,
                average_age_days: None,
                percent_coin_days_destroyed: None,
            });
        };

        let ss = tip.satoshi_seconds.map(|v| v as f64);
        let total_ss = tip.total_ss.map(|v| v as f64);

        Ok(ChainStats {
            chain_id,
            tip: Some(tip.id),
            tip_height: tip.height,
            chain_work: tip.chain_work,
            total_satoshis: tip.total_satoshis,
            total_seconds: tip.total_seconds,
            satoshi_seconds: tip.satoshi_seconds,
            total_ss: tip.total_ss,
            coin_days: ss.map(|ss| ss / SECONDS_PER_DAY / SATOSHIS_PER_COIN),
            coin_days_destroyed: total_ss
                .zip(ss)
                .map(|(total, ss)| (total - ss) / SECONDS_PER_DAY / SATOSHIS_PER_COIN),
            average_age_days: ss
                .zip(tip.total_satoshis.filter(|s| *s > 0))
                .map(|(ss, supply)| ss / supply as f64 / SECONDS_PER_DAY),
            percent_coin_days_destroyed: total_ss
                .filter(|t| *t > 0.0)
                .zip(ss)
                .map(|(total, ss)| 100.0 * (1.0 - ss / total)),
        })
    }

    /// Check that the canonical path of `chain_id` is consistent with its tip.
    pub fn verify_chain(&mut self, chain_id: ChainId) -> Result<()> {
        let chain = self.store.require_chain(chain_id)?;
        let Some(tip_id) = chain.last_block_id else {
            return match self.store.get::<BlockId>(&Key::CanonicalHeight(chain_id, 0))? {
                Some(id) => Err(BlockIndexerError::invariant(format!(
                    "chain {} has no tip but block {} is canonical",
                    chain.name, id
                ))),
                None => Ok(()),
            };
        };

        let tip = self.store.require_block(tip_id)?;
        let tip_height = tip.height.ok_or_else(|| {
            BlockIndexerError::invariant(format!(
                "tip {} of {} has no height",
                tip.hash, chain.name
            ))
        })?;
        if let Some(id) = self
            .store
            .get::<BlockId>(&Key::CanonicalHeight(chain_id, tip_height + 1))?
        {
            return Err(BlockIndexerError::invariant(format!(
                "block {} is canonical above the tip of {}",
                id, chain.name
            )));
        }

        let mut current = Some(tip);
        while let Some(block) = current {
            let height = block.height.ok_or_else(|| {
                BlockIndexerError::invariant(format!(
                    "canonical block {} has no height",
                    block.hash
                ))
            })?;
            if !self.store.in_longest_chains(block.id)?.contains(&chain_id) {
                return Err(BlockIndexerError::invariant(format!(
                    "block {} on the path to the tip of {} is not marked canonical",
                    block.hash, chain.name
                )));
            }
            let indexed: Option<BlockId> = self.store.get(&Key::CanonicalHeight(chain_id, height))?;
            if indexed != Some(block.id) {
                return Err(BlockIndexerError::invariant(format!(
                    "height {} of {} indexes {:?} instead of {}",
                    height, chain.name, indexed, block.id
                )));
            }
            current = self.store.parent(&block)?;
            if current.is_none() && !block.is_genesis() {
                return Err(BlockIndexerError::invariant(format!(
                    "canonical path of {} stops at non-genesis block {}",
                    chain.name, block.hash
                )));
            }
        }
        Ok(())
    }
}
