//! Longest-chain selection
//!
//! A block becomes a chain's tip when its cumulative work strictly exceeds
//! the current tip's. The switch is expressed as a [`ReorgPlan`]: blocks to
//! disconnect from the old tip down to the fork point, then blocks to
//! connect from the fork point up to the new tip.

use crate::error::{BlockIndexerError, Result};
use crate::models::*;
use crate::store::{IndexStore, Key};

/// Offer `block_id` as the tip of `chain_id`.
///
/// The block is always recorded as a candidate of the chain. Returns the
/// applied plan when the block became the new tip, `None` when it was not
/// better or its ancestry is not resolved back to a genesis block yet.
pub fn offer_block_to_chain(
    store: &mut IndexStore,
    block_id: BlockId,
    chain_id: ChainId,
) -> Result<Option<ReorgPlan>> {
    let mut chain = store.require_chain(chain_id)?;
    let block = store.require_block(block_id)?;
    store.ensure_candidate(&block, chain_id)?;

    let Some(block_work) = block.chain_work else {
        tracing::trace!(
            "Block {} not offered to chain {}: ancestry unresolved",
            block.hash,
            chain.name
        );
        return Ok(None);
    };

    if let Some(tip_id) = chain.last_block_id {
        if tip_id == block_id {
            return Ok(None);
        }
        let tip = store.require_block(tip_id)?;
        let tip_work = tip.chain_work.ok_or_else(|| {
            BlockIndexerError::invariant(format!(
                "tip {} of chain {} has no chain work",
                tip.hash, chain.name
            ))
        })?;
        if block_work <= tip_work {
            return Ok(None);
        }
    }

    let plan = find_fork(store, chain.id, chain.last_block_id, block_id)?;
    apply_plan(store, &plan)?;

    chain.last_block_id = Some(block_id);
    store.put(&Key::Chain(chain.id), &chain)?;

    if plan.disconnect.is_empty() {
        tracing::debug!(
            "Chain {} advanced to {} (+{})",
            chain.name,
            block.hash,
            plan.connect.len()
        );
    } else {
        tracing::info!(
            "Chain {} reorganized to {}: {} disconnected, {} connected",
            chain.name,
            block.hash,
            plan.disconnect.len(),
            plan.connect.len()
        );
    }
    Ok(Some(plan))
}

/// Build the disconnect/connect lists between `old_tip` and `new_tip`.
///
/// Heights are equalized first, then both sides step back together until
/// they meet. Without an old tip the whole path from genesis is connected.
pub fn find_fork(
    store: &mut IndexStore,
    chain_id: ChainId,
    old_tip: Option<BlockId>,
    new_tip: BlockId,
) -> Result<ReorgPlan> {
    let mut disconnect = Vec::new();
    let mut connect = Vec::new();
    let mut new = store.require_block(new_tip)?;

    let fork_point = match old_tip {
        None => {
            loop {
                connect.push(new.id);
                new = match step_back(store, &new)? {
                    Some(parent) => parent,
                    None => break,
                };
            }
            None
        }
        Some(old_tip) => {
            let mut old = store.require_block(old_tip)?;
            let mut old_height = resolved_height(&old)?;
            let mut new_height = resolved_height(&new)?;

            while old_height > new_height {
                disconnect.push(old.id);
                old = required_parent(store, &old)?;
                old_height -= 1;
            }
            while new_height > old_height {
                connect.push(new.id);
                new = required_parent(store, &new)?;
                new_height -= 1;
            }

            loop {
                if old.id == new.id {
                    break Some(old.id);
                }
                disconnect.push(old.id);
                connect.push(new.id);
                match (step_back(store, &old)?, step_back(store, &new)?) {
                    (Some(o), Some(n)) => {
                        old = o;
                        new = n;
                    }
                    (None, None) => break None,
                    _ => {
                        return Err(BlockIndexerError::invariant(format!(
                            "blocks {} and {} at equal height reach genesis at different depths",
                            old.hash, new.hash
                        )))
                    }
                }
            }
        }
    };

    connect.reverse();
    Ok(ReorgPlan {
        chain_id,
        old_tip,
        new_tip,
        fork_point,
        disconnect,
        connect,
    })
}

/// Flip canonical membership for every block in the plan.
pub fn apply_plan(store: &mut IndexStore, plan: &ReorgPlan) -> Result<()> {
    for id in &plan.disconnect {
        let block = store.require_block(*id)?;
        set_in_longest(store, &block, plan.chain_id, false)?;
        store.delete(&Key::CanonicalHeight(plan.chain_id, resolved_height(&block)?))?;
    }
    for id in &plan.connect {
        let block = store.require_block(*id)?;
        set_in_longest(store, &block, plan.chain_id, true)?;
        store.put(
            &Key::CanonicalHeight(plan.chain_id, resolved_height(&block)?),
            &block.id,
        )?;
    }
    Ok(())
}

fn set_in_longest(
    store: &mut IndexStore,
    block: &Block,
    chain_id: ChainId,
    value: bool,
) -> Result<()> {
    let mut candidates = store.candidates(block.id)?;
    match candidates.iter_mut().find(|c| c.chain_id == chain_id) {
        Some(candidate) => {
            candidate.in_longest = value;
            candidate.height = block.height;
        }
        None => candidates.push(ChainCandidate {
            chain_id,
            block_id: block.id,
            in_longest: value,
            height: block.height,
        }),
    }
    store.put_candidates(block.id, &candidates)
}

/// Parent of a resolved block; only a genesis block may have none.
fn step_back(store: &mut IndexStore, block: &Block) -> Result<Option<Block>> {
    match store.parent(block)? {
        Some(parent) => Ok(Some(parent)),
        None if block.is_genesis() => Ok(None),
        None => Err(BlockIndexerError::invariant(format!(
            "resolved block {} has no parent link",
            block.hash
        ))),
    }
}

fn required_parent(store: &mut IndexStore, block: &Block) -> Result<Block> {
    step_back(store, block)?.ok_or_else(|| {
        BlockIndexerError::invariant(format!("block {} ran out of ancestors", block.hash))
    })
}

fn resolved_height(block: &Block) -> Result<u32> {
    block.height.ok_or_else(|| {
        BlockIndexerError::invariant(format!("block {} has no height", block.hash))
    })
}
