//! Cumulative aggregate propagation
//!
//! Every derived field of a block is a function of its parent's fields and
//! its own transactions. When a block becomes linked, or one of its inputs is
//! resolved, the block and all of its descendants are recomputed parent
//! before child.

use crate::ancestry::is_descended_from;
use crate::error::{BlockIndexerError, Result};
use crate::models::*;
use crate::store::{IndexStore, Key};
use crate::work::{add_work, BlockWork};
use std::collections::BTreeMap;

/// Outcome of one propagation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Propagation {
    /// Greatest-work resolved block in the subtree
    pub best: Option<Tip>,
    /// Greatest-work resolved block per chain the subtree's blocks are candidates for
    pub tips: BTreeMap<ChainId, Tip>,
    pub visited: usize,
}

/// Recompute `root` and every descendant, returning the best tips reached.
///
/// Children inherit their parent's chain candidacies. Ties in chain work go
/// to the block visited first.
pub fn adopt_orphans<W: BlockWork>(
    store: &mut IndexStore,
    work: &W,
    root: BlockId,
) -> Result<Propagation> {
    let mut result = Propagation::default();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        let block = recompute_block(store, work, id)?;
        result.visited += 1;

        if let (Some(chain_work), Some(height)) = (block.chain_work, block.height) {
            let tip = Tip {
                block_id: block.id,
                height,
                chain_work,
            };
            if result.best.map_or(true, |best| chain_work > best.chain_work) {
                result.best = Some(tip);
            }
            for candidate in store.candidates(block.id)? {
                let entry = result.tips.entry(candidate.chain_id).or_insert(tip);
                if chain_work > entry.chain_work {
                    *entry = tip;
                }
            }
        }

        let children = store.children(id)?;
        stack.extend(children.into_iter().rev());
    }

    tracing::debug!(
        "Propagated from block {} over {} blocks",
        root,
        result.visited
    );
    Ok(result)
}

/// Recompute one block's derived fields from its parent and transactions.
pub fn recompute_block<W: BlockWork>(
    store: &mut IndexStore,
    work: &W,
    block_id: BlockId,
) -> Result<Block> {
    let mut block = store.require_block(block_id)?;
    let parent = store.parent(&block)?;

    block.value_in = block_value_in(store, block.id)?;

    if let Some(parent) = &parent {
        for candidate in store.candidates(parent.id)? {
            store.ensure_candidate(&block, candidate.chain_id)?;
        }
    }

    block.clear_aggregates();
    match &parent {
        None if block.is_genesis() => {
            block.height = Some(0);
            block.chain_work = Some(work.work(block.bits)?);
            block.total_seconds = Some(0);
            block.total_satoshis = match block.value_in {
                Some(value_in) => Some(supply_after(&block, 0, value_in)?),
                None => None,
            };
            block.total_ss = Some(0);
        }
        None => {}
        Some(parent) => {
            let dt = i64::from(block.time) - i64::from(parent.time);
            block.height = parent.height.map(|h| h + 1);
            block.chain_work = match parent.chain_work {
                Some(parent_work) => Some(add_work(parent_work, work.work(block.bits)?)?),
                None => None,
            };
            block.total_seconds = parent.total_seconds.map(|s| s + dt);
            block.total_satoshis = match (parent.total_satoshis, block.value_in) {
                (Some(supply), Some(value_in)) => Some(supply_after(&block, supply, value_in)?),
                _ => None,
            };
            let created = parent.total_satoshis.map(|s| i128::from(s) * i128::from(dt));
            block.total_ss = match (parent.total_ss, created) {
                (Some(total), Some(created)) => {
                    Some(checked_ss(&block, total.checked_add(created))?)
                }
                _ => None,
            };
        }
    }

    if block.height.is_some() {
        let destroyed = compute_ss_destroyed(store, &block)?;
        block.ss_destroyed = Some(destroyed);
        block.satoshi_seconds = match &parent {
            None => Some(-destroyed),
            Some(parent) => match (parent.satoshi_seconds, parent.total_satoshis) {
                (Some(ss), Some(supply)) => {
                    let dt = i64::from(block.time) - i64::from(parent.time);
                    let created = i128::from(supply) * i128::from(dt);
                    let ss = ss.checked_add(created).and_then(|ss| ss.checked_sub(destroyed));
                    Some(checked_ss(&block, ss)?)
                }
                _ => None,
            },
        };
    }

    store.put_block(&block)?;
    sync_candidate_heights(store, &block)?;
    Ok(block)
}

/// Supply after `block`: `supply + value_out - value_in`.
fn supply_after(block: &Block, supply: i64, value_in: i64) -> Result<i64> {
    supply
        .checked_add(block.value_out)
        .and_then(|total| total.checked_sub(value_in))
        .ok_or_else(|| {
            BlockIndexerError::invariant(format!("coin supply overflowed at block {}", block.hash))
        })
}

fn checked_ss(block: &Block, value: Option<i128>) -> Result<i128> {
    value.ok_or_else(|| {
        BlockIndexerError::invariant(format!("satoshi-seconds overflowed at block {}", block.hash))
    })
}

/// Sum of the block's transaction input values, unknown while any input is unlinked.
fn block_value_in(store: &IndexStore, block_id: BlockId) -> Result<Option<i64>> {
    let mut total = 0i64;
    for block_tx in store.block_txs(block_id)? {
        match store.require_transaction(block_tx.tx_id)?.value_in() {
            Some(value_in) => {
                total = total.checked_add(value_in).ok_or_else(|| {
                    BlockIndexerError::invariant(format!(
                        "input sum of block {} overflowed",
                        block_id
                    ))
                })?;
            }
            None => return Ok(None),
        }
    }
    Ok(Some(total))
}

/// Coin-age destroyed by the block's inputs.
///
/// An input counts only when the block that produced its output is a
/// confirmed ancestor of `block`; undecidable ancestry leaves the input out
/// until a later pass.
pub fn compute_ss_destroyed(store: &mut IndexStore, block: &Block) -> Result<i128> {
    let mut block_txs = store.block_txs(block.id)?;
    let mut attributions = Vec::new();
    let mut total = 0i128;

    for block_tx in block_txs.iter_mut() {
        let tx = store.require_transaction(block_tx.tx_id)?;
        let mut destroyed = 0i128;

        for pos in 0..tx.input_count {
            let txin_id = TxInId { tx_id: tx.id, pos };
            let txin = store.txin(txin_id)?.ok_or_else(|| {
                BlockIndexerError::invariant(format!("input {}:{} missing", tx.hash, pos))
            })?;
            let Some(txout_id) = txin.txout_id else {
                continue;
            };
            let txout = store.txout(txout_id)?.ok_or_else(|| {
                BlockIndexerError::invariant(format!("linked output {:?} missing", txout_id))
            })?;

            for out_block_id in store.tx_blocks(txout_id.tx_id)? {
                if is_descended_from(store, block.id, out_block_id)? == Ancestry::Descended {
                    let out_block = store.require_block(out_block_id)?;
                    let age = i64::from(block.time) - i64::from(out_block.time);
                    destroyed += i128::from(txout.value) * i128::from(age);
                    attributions.push(BlockTxIn {
                        txin_id,
                        out_block_id,
                    });
                    break;
                }
            }
        }

        block_tx.ss_destroyed = Some(destroyed);
        total += destroyed;
    }

    store.put(&Key::BlockTxs(block.id), &block_txs)?;
    if attributions.is_empty() {
        store.delete(&Key::BlockTxIns(block.id))?;
    } else {
        store.put(&Key::BlockTxIns(block.id), &attributions)?;
    }
    Ok(total)
}

fn sync_candidate_heights(store: &mut IndexStore, block: &Block) -> Result<()> {
    let mut candidates = store.candidates(block.id)?;
    if candidates.iter().all(|c| c.height == block.height) {
        return Ok(());
    }
    for candidate in candidates.iter_mut() {
        candidate.height = block.height;
    }
    store.put_candidates(block.id, &candidates)
}
