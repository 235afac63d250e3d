//! Ancestor queries over the block graph

use crate::error::Result;
use crate::models::{Ancestry, Block, BlockId, ChainId};
use crate::store::IndexStore;

/// Decide whether `ancestor_id` lies on the path from `block_id` back to genesis.
///
/// The walk climbs `block_id`'s parents. It stops early when the current
/// block and the ancestor are canonical in a common chain, since heights then
/// settle the question, or once it has climbed to or below the ancestor's
/// height without meeting it. Reaching a block whose parent is not linked yet
/// yields [`Ancestry::Unknown`].
pub fn is_descended_from(
    store: &mut IndexStore,
    block_id: BlockId,
    ancestor_id: BlockId,
) -> Result<Ancestry> {
    if block_id == ancestor_id {
        return Ok(Ancestry::Descended);
    }

    let ancestor = store.require_block(ancestor_id)?;
    let mut current = store.require_block(block_id)?;
    if current.prev_block_id == Some(ancestor_id) {
        return Ok(Ancestry::Descended);
    }

    let ancestor_chains = store.in_longest_chains(ancestor_id)?;

    loop {
        if current.id == ancestor_id {
            return Ok(Ancestry::Descended);
        }

        if let (Some(height), Some(ancestor_height)) = (current.height, ancestor.height) {
            if !ancestor_chains.is_empty() && shares_chain(store, &current, &ancestor_chains)? {
                return Ok(if ancestor_height <= height {
                    Ancestry::Descended
                } else {
                    Ancestry::NotDescended
                });
            }
            if height <= ancestor_height {
                return Ok(Ancestry::NotDescended);
            }
        }

        current = match store.parent(&current)? {
            Some(parent) => parent,
            None if current.is_genesis() => return Ok(Ancestry::NotDescended),
            None => return Ok(Ancestry::Unknown),
        };
    }
}

fn shares_chain(store: &IndexStore, block: &Block, chains: &[ChainId]) -> Result<bool> {
    Ok(store
        .in_longest_chains(block.id)?
        .iter()
        .any(|c| chains.contains(c)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChainCandidate;
    use crate::store::Key;
    use crate::test_utils::stored_block;
    use database_connector::DatabaseConnection;

    /// g - a1 - a2
    ///       \
    ///        b2 - b3
    /// plus x2 whose parent x1 is missing
    fn graph() -> IndexStore {
        let mut store = IndexStore::open(DatabaseConnection::memory(), 8).unwrap();
        for block in [
            stored_block(0, None, Some(0)),
            stored_block(1, Some(0), Some(1)),
            stored_block(2, Some(1), Some(2)),
            stored_block(3, Some(1), Some(2)),
            stored_block(4, Some(3), Some(3)),
            stored_block(6, None, None),
        ] {
            store.put_block(&block).unwrap();
        }
        // x2 claims a non-zero parent that was never imported
        let mut orphan = store.require_block(BlockId(6)).unwrap();
        orphan.prev_hash = block_parser::Hash256([0xee; 32]);
        store.put_block(&orphan).unwrap();
        store
    }

    fn canonical(store: &mut IndexStore, ids: &[u64]) {
        for id in ids {
            let block = store.require_block(BlockId(*id)).unwrap();
            store
                .put(
                    &Key::ChainCandidates(block.id),
                    &vec![ChainCandidate {
                        chain_id: ChainId(1),
                        block_id: block.id,
                        in_longest: true,
                        height: block.height,
                    }],
                )
                .unwrap();
        }
    }

    #[test]
    fn test_walk_without_chain_membership() {
        let mut store = graph();
        let q = |s: &mut IndexStore, a: u64, b: u64| {
            is_descended_from(s, BlockId(a), BlockId(b)).unwrap()
        };

        assert_eq!(q(&mut store, 2, 2), Ancestry::Descended);
        assert_eq!(q(&mut store, 2, 1), Ancestry::Descended);
        assert_eq!(q(&mut store, 4, 0), Ancestry::Descended);
        assert_eq!(q(&mut store, 4, 2), Ancestry::NotDescended);
        assert_eq!(q(&mut store, 2, 4), Ancestry::NotDescended);
        assert_eq!(q(&mut store, 0, 1), Ancestry::NotDescended);
    }

    #[test]
    fn test_chain_membership_short_circuits() {
        let mut store = graph();
        canonical(&mut store, &[0, 1, 3, 4]);

        let q = |s: &mut IndexStore, a: u64, b: u64| {
            is_descended_from(s, BlockId(a), BlockId(b)).unwrap()
        };
        assert_eq!(q(&mut store, 4, 0), Ancestry::Descended);
        assert_eq!(q(&mut store, 2, 3), Ancestry::NotDescended);
        assert_eq!(q(&mut store, 2, 0), Ancestry::Descended);
    }

    #[test]
    fn test_unlinked_block_is_unknown() {
        let mut store = graph();
        assert_eq!(
            is_descended_from(&mut store, BlockId(6), BlockId(0)).unwrap(),
            Ancestry::Unknown
        );
    }
}
