//! Data models for the block indexer

use block_parser::{Hash256, RecognizedKey};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident($inner:ty)) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Engine-assigned block id, never reused
    BlockId(u64)
);
id_type!(TxId(u64));
id_type!(ChainId(u32));
id_type!(PubkeyId(u64));

/// `(tx_id, pos)` identity of a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxOutId {
    pub tx_id: TxId,
    pub pos: u32,
}

/// `(tx_id, pos)` identity of a transaction input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxInId {
    pub tx_id: TxId,
    pub pos: u32,
}

/// A block header plus the aggregates derived from its ancestry.
///
/// Every aggregate is `None` until the block's ancestor path back to a
/// genesis block is fully linked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub id: BlockId,
    pub hash: Hash256,
    pub prev_hash: Hash256,
    pub version: i32,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,

    pub prev_block_id: Option<BlockId>,
    pub height: Option<u32>,
    #[serde(with = "opt_u256")]
    pub chain_work: Option<U256>,

    pub num_tx: u32,
    pub value_in: Option<i64>,
    pub value_out: i64,
    pub total_satoshis: Option<i64>,
    pub total_seconds: Option<i64>,
    pub satoshi_seconds: Option<i128>,
    pub total_ss: Option<i128>,
    pub ss_destroyed: Option<i128>,
}

impl Block {
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }

    /// Header fields only; used to detect a hash collision between distinct headers.
    pub fn same_header(&self, other: &block_parser::BlockRecord) -> bool {
        self.hash == other.hash
            && self.prev_hash == other.prev_hash
            && self.version == other.version
            && self.merkle_root == other.merkle_root
            && self.time == other.time
            && self.bits == other.bits
            && self.nonce == other.nonce
            && self.num_tx as usize == other.transactions.len()
    }

    pub(crate) fn clear_aggregates(&mut self) {
        self.height = None;
        self.chain_work = None;
        self.total_satoshis = None;
        self.total_seconds = None;
        self.satoshi_seconds = None;
        self.total_ss = None;
        self.ss_destroyed = None;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub hash: Hash256,
    pub version: i32,
    pub lock_time: u32,
    pub size: u32,
    pub is_coinbase: bool,
    pub input_count: u32,
    pub output_count: u32,
    pub value_out: i64,

    /// Sum over inputs whose spent output is linked
    pub linked_value_in: i64,
    pub unlinked_inputs: u32,
}

impl Transaction {
    /// Total input value, unknown while any input is unlinked.
    pub fn value_in(&self) -> Option<i64> {
        if self.unlinked_inputs == 0 {
            Some(self.linked_value_in)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOut {
    pub tx_id: TxId,
    pub pos: u32,
    pub value: i64,
    pub script: Vec<u8>,
    pub pubkey_id: Option<PubkeyId>,
}

impl TxOut {
    pub fn id(&self) -> TxOutId {
        TxOutId { tx_id: self.tx_id, pos: self.pos }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxIn {
    pub tx_id: TxId,
    pub pos: u32,
    pub prevout_hash: Hash256,
    pub prevout_pos: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,

    /// Output this input spends, once that output has been imported
    pub txout_id: Option<TxOutId>,
}

impl TxIn {
    pub fn id(&self) -> TxInId {
        TxInId { tx_id: self.tx_id, pos: self.pos }
    }
}

/// Membership of a transaction in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTx {
    pub tx_id: TxId,
    pub position: u32,

    /// Coin-age destroyed by this transaction's inputs, relative to the containing block
    pub ss_destroyed: Option<i128>,
}

/// Attribution of a spent output to the ancestor block that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockTxIn {
    pub txin_id: TxInId,
    pub out_block_id: BlockId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chain {
    pub id: ChainId,
    pub name: String,
    pub code3: String,
    pub magic: Option<[u8; 4]>,
    pub address_version: Vec<u8>,
    pub policy: String,

    /// Current canonical tip
    pub last_block_id: Option<BlockId>,
}

/// Chain definition supplied by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChain {
    pub id: ChainId,
    pub name: String,
    pub code3: String,
    pub magic: Option<[u8; 4]>,
    pub address_version: Vec<u8>,
    pub policy: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainCandidate {
    pub chain_id: ChainId,
    pub block_id: BlockId,
    pub in_longest: bool,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pubkey {
    pub id: PubkeyId,
    pub key: RecognizedKey,
}

/// Id allocation state, persisted with every batch that allocates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub next_block_id: u64,
    pub next_tx_id: u64,
    pub next_pubkey_id: u64,
}

/// Best-work block reachable in a subtree, per chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tip {
    pub block_id: BlockId,
    pub height: u32,
    pub chain_work: U256,
}

/// Answer of the ancestry oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ancestry {
    Descended,
    NotDescended,
    /// An unlinked block was reached before the question could be settled
    Unknown,
}

/// Ordered chain switch produced by the reorg engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorgPlan {
    pub chain_id: ChainId,
    pub old_tip: Option<BlockId>,
    pub new_tip: BlockId,
    pub fork_point: Option<BlockId>,
    /// Tip first, down to just above the fork point
    pub disconnect: Vec<BlockId>,
    /// Fork point's child first, up to the new tip
    pub connect: Vec<BlockId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    /// Already indexed; nothing written beyond new chain candidacy
    Duplicate,
    /// Parent not yet known
    Orphan,
    Linked,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportOutcome {
    pub block_id: BlockId,
    pub status: ImportStatus,
    pub tip_changes: Vec<ReorgPlan>,
}

/// Coin statistics at a chain's tip.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    pub chain_id: ChainId,
    pub tip: Option<BlockId>,
    pub tip_height: Option<u32>,
    pub chain_work: Option<U256>,
    pub total_satoshis: Option<i64>,
    pub total_seconds: Option<i64>,
    pub satoshi_seconds: Option<i128>,
    pub total_ss: Option<i128>,
    /// Coin-age held at the tip, in coin-days
    pub coin_days: Option<f64>,
    /// Coin-age created minus coin-age still held, in coin-days
    pub coin_days_destroyed: Option<f64>,
    pub average_age_days: Option<f64>,
    pub percent_coin_days_destroyed: Option<f64>,
}

mod opt_u256 {
    use primitive_types::U256;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<U256>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value
            .map(|v| {
                let mut bytes = [0u8; 32];
                v.to_big_endian(&mut bytes);
                bytes
            })
            .serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<U256>, D::Error> {
        Ok(Option::<[u8; 32]>::deserialize(deserializer)?.map(|b| U256::from_big_endian(&b)))
    }
}
