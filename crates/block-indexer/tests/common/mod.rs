//! Record builders and state snapshots for the integration tests

#![allow(dead_code)]

use block_indexer::{BlockIndexer, ChainId, NewChain};
use block_parser::{
    BlockRecord, Hash256, StandardScripts, TxInRecord, TxOutRecord, TxRecord, COINBASE_PREVOUT_POS,
};
use database_connector::DatabaseConnection;
use primitive_types::U256;

pub const CHAIN: ChainId = ChainId(1);

pub type TestIndexer = BlockIndexer<fn(u32) -> U256, StandardScripts>;

/// Work equal to the difficulty field
pub fn bits_as_work(bits: u32) -> U256 {
    U256::from(bits)
}

pub fn test_chain() -> NewChain {
    NewChain {
        id: CHAIN,
        name: "Testnet".to_string(),
        code3: "TST".to_string(),
        magic: Some([0x0b, 0x11, 0x09, 0x07]),
        address_version: vec![0x6f],
        policy: "Bitcoin".to_string(),
    }
}

pub fn indexer_on(db: DatabaseConnection) -> TestIndexer {
    let mut indexer =
        BlockIndexer::with_components(db, 32, bits_as_work as fn(u32) -> U256, StandardScripts)
            .unwrap();
    indexer.register_chain(test_chain()).unwrap();
    indexer
}

pub fn indexer() -> TestIndexer {
    indexer_on(DatabaseConnection::memory())
}

pub fn coinbase(tag: &str, value: i64) -> TxRecord {
    TxRecord {
        hash: Hash256::double_sha256(format!("coinbase/{}", tag).as_bytes()),
        version: 1,
        lock_time: 0,
        size: 120,
        inputs: vec![TxInRecord {
            prevout_hash: Hash256::ZERO,
            prevout_pos: COINBASE_PREVOUT_POS,
            script_sig: tag.as_bytes().to_vec(),
            sequence: u32::MAX,
        }],
        outputs: vec![TxOutRecord {
            value,
            script: p2pkh(tag),
        }],
    }
}

pub fn spend(tag: &str, prevouts: &[(Hash256, u32)], values: &[i64]) -> TxRecord {
    TxRecord {
        hash: Hash256::double_sha256(format!("spend/{}", tag).as_bytes()),
        version: 1,
        lock_time: 0,
        size: 250,
        inputs: prevouts
            .iter()
            .map(|(hash, pos)| TxInRecord {
                prevout_hash: *hash,
                prevout_pos: *pos,
                script_sig: vec![0x00],
                sequence: u32::MAX,
            })
            .collect(),
        outputs: values
            .iter()
            .map(|value| TxOutRecord {
                value: *value,
                script: p2pkh(tag),
            })
            .collect(),
    }
}

fn p2pkh(tag: &str) -> Vec<u8> {
    let hash = Hash256::double_sha256(tag.as_bytes());
    let mut script = vec![0x76, 0xa9, 20];
    script.extend_from_slice(&hash.as_bytes()[..20]);
    script.extend_from_slice(&[0x88, 0xac]);
    script
}

pub fn block(
    tag: &str,
    prev_hash: Hash256,
    time: u32,
    bits: u32,
    transactions: Vec<TxRecord>,
) -> BlockRecord {
    BlockRecord {
        hash: Hash256::double_sha256(format!("block/{}", tag).as_bytes()),
        prev_hash,
        version: 1,
        merkle_root: transactions.first().map(|tx| tx.hash).unwrap_or(Hash256::ZERO),
        time,
        bits,
        nonce: 0,
        magic: None,
        transactions,
    }
}

/// Order-independent view of a block's derived state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockState {
    pub height: Option<u32>,
    pub chain_work: Option<U256>,
    pub value_in: Option<i64>,
    pub total_satoshis: Option<i64>,
    pub total_seconds: Option<i64>,
    pub satoshi_seconds: Option<i128>,
    pub total_ss: Option<i128>,
    pub ss_destroyed: Option<i128>,
    pub in_longest: Vec<ChainId>,
}

pub fn snapshot(
    indexer: &mut TestIndexer,
    hashes: &[Hash256],
) -> (Option<Hash256>, Vec<BlockState>) {
    let tip = indexer.chain_tip(CHAIN).unwrap().map(|b| b.hash);
    let states = hashes
        .iter()
        .map(|hash| {
            let block = indexer.block_by_hash(hash).unwrap().unwrap();
            let in_longest = indexer
                .chain_candidates(block.id)
                .unwrap()
                .into_iter()
                .filter(|c| c.in_longest)
                .map(|c| c.chain_id)
                .collect();
            BlockState {
                height: block.height,
                chain_work: block.chain_work,
                value_in: block.value_in,
                total_satoshis: block.total_satoshis,
                total_seconds: block.total_seconds,
                satoshi_seconds: block.satoshi_seconds,
                total_ss: block.total_ss,
                ss_destroyed: block.ss_destroyed,
                in_longest,
            }
        })
        .collect();
    (tip, states)
}
