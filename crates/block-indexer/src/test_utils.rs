//! Builders shared by the unit tests

use crate::models::*;
use crate::propagator::adopt_orphans;
use crate::store::{IndexStore, Key};
use block_parser::{BlockRecord, Hash256, TxInRecord, TxOutRecord, TxRecord, COINBASE_PREVOUT_POS};
use primitive_types::U256;

/// Work equal to the difficulty field, so tests can pick work directly.
pub fn bits_as_work(bits: u32) -> U256 {
    U256::from(bits)
}

pub fn hash_of(id: u64) -> Hash256 {
    Hash256::double_sha256(&id.to_le_bytes())
}

/// A bare block row; `parent` also sets the parent hash.
pub fn stored_block(id: u64, parent: Option<u64>, height: Option<u32>) -> Block {
    Block {
        id: BlockId(id),
        hash: hash_of(id),
        prev_hash: parent.map(hash_of).unwrap_or(Hash256::ZERO),
        version: 1,
        merkle_root: Hash256::ZERO,
        time: 0,
        bits: 1,
        nonce: 0,
        prev_block_id: parent.map(BlockId),
        height,
        chain_work: None,
        num_tx: 0,
        value_in: None,
        value_out: 0,
        total_satoshis: None,
        total_seconds: None,
        satoshi_seconds: None,
        total_ss: None,
        ss_destroyed: None,
    }
}

/// Store `(id, parent, work)` blocks, link them and propagate from every root.
pub fn resolved_chain(store: &mut IndexStore, blocks: &[(u64, Option<u64>, u32)]) {
    for (id, parent, work) in blocks {
        let mut block = stored_block(*id, *parent, None);
        block.bits = *work;
        block.time = (*id as u32) * 600;
        store.put_block(&block).unwrap();
        if let Some(parent) = parent {
            store
                .push_unique(&Key::Children(BlockId(*parent)), BlockId(*id))
                .unwrap();
        }
    }
    for (id, parent, _) in blocks {
        if parent.is_none() {
            adopt_orphans(store, &bits_as_work, BlockId(*id)).unwrap();
        }
    }
}

pub fn new_chain(id: u32) -> NewChain {
    NewChain {
        id: ChainId(id),
        name: format!("test{}", id),
        code3: "TST".to_string(),
        magic: Some([0xfa, 0xbf, 0xb5, id as u8]),
        address_version: vec![0x6f],
        policy: "Bitcoin".to_string(),
    }
}

pub fn register_test_chain(store: &mut IndexStore, id: u32) -> ChainId {
    let new = new_chain(id);
    let chain = Chain {
        id: new.id,
        name: new.name,
        code3: new.code3,
        magic: new.magic,
        address_version: new.address_version,
        policy: new.policy,
        last_block_id: None,
    };
    store.put(&Key::Chain(chain.id), &chain).unwrap();
    store.push_unique(&Key::ChainIds, chain.id).unwrap();
    chain.id
}

pub fn coinbase(tag: u64, value: i64) -> TxRecord {
    TxRecord {
        hash: Hash256::double_sha256(&[b"coinbase".as_slice(), &tag.to_le_bytes()].concat()),
        version: 1,
        lock_time: 0,
        size: 100,
        inputs: vec![TxInRecord {
            prevout_hash: Hash256::ZERO,
            prevout_pos: COINBASE_PREVOUT_POS,
            script_sig: tag.to_le_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOutRecord {
            value,
            script: vec![0x51],
        }],
    }
}

pub fn spend(prevouts: &[(Hash256, u32)], values: &[i64]) -> TxRecord {
    let mut preimage = Vec::new();
    for (hash, pos) in prevouts {
        preimage.extend_from_slice(hash.as_bytes());
        preimage.extend_from_slice(&pos.to_le_bytes());
    }
    for value in values {
        preimage.extend_from_slice(&value.to_le_bytes());
    }

    TxRecord {
        hash: Hash256::double_sha256(&preimage),
        version: 1,
        lock_time: 0,
        size: 200,
        inputs: prevouts
            .iter()
            .map(|(hash, pos)| TxInRecord {
                prevout_hash: *hash,
                prevout_pos: *pos,
                script_sig: Vec::new(),
                sequence: u32::MAX,
            })
            .collect(),
        outputs: values
            .iter()
            .map(|value| TxOutRecord {
                value: *value,
                script: vec![0x51],
            })
            .collect(),
    }
}

/// A block holding a single coinbase paying `value`.
pub fn coinbase_block(
    prev_hash: Hash256,
    time: u32,
    bits: u32,
    value: i64,
    tag: u64,
) -> BlockRecord {
    let coinbase = coinbase(tag, value);
    let mut preimage = prev_hash.as_bytes().to_vec();
    preimage.extend_from_slice(&time.to_le_bytes());
    preimage.extend_from_slice(&bits.to_le_bytes());
    preimage.extend_from_slice(coinbase.hash.as_bytes());

    BlockRecord {
        hash: Hash256::double_sha256(&preimage),
        prev_hash,
        version: 1,
        merkle_root: coinbase.hash,
        time,
        bits,
        nonce: 0,
        magic: None,
        transactions: vec![coinbase],
    }
}
