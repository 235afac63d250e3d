use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{ParserError, Result};

/// Prevout index carried by a coinbase input.
pub const COINBASE_PREVOUT_POS: u32 = 0xffff_ffff;

/// 256-bit hash in wire (little-endian) byte order.
///
/// `Display` and `FromStr` use the reversed, explorer-style hex form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// All-zero hash, used as the parent of a genesis block and by coinbase inputs.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|b| *b == 0)
    }

    /// Double SHA-256 of `data`.
    pub fn double_sha256(data: &[u8]) -> Self {
        let first = Sha256::digest(data);
        let second = Sha256::digest(first);
        let mut out = [0u8; 32];
        out.copy_from_slice(&second);
        Hash256(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut reversed = self.0;
        reversed.reverse();
        f.write_str(&hex::encode(reversed))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", self)
    }
}

impl FromStr for Hash256 {
    type Err = ParserError;

    fn from_str(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(ParserError::BufferTooShort {
                expected: 32,
                actual: bytes.len(),
            });
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(&bytes);
        out.reverse();
        Ok(Hash256(out))
    }
}

/// A parsed block as handed to the importer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    /// Block hash (double SHA-256 of the 80-byte header)
    pub hash: Hash256,

    /// Hash of the parent block, `Hash256::ZERO` for a genesis block
    pub prev_hash: Hash256,

    pub version: i32,
    pub merkle_root: Hash256,
    pub time: u32,

    /// Compact difficulty target
    pub bits: u32,
    pub nonce: u32,

    /// Network magic of the frame the block came from, if read from a block file
    pub magic: Option<[u8; 4]>,

    pub transactions: Vec<TxRecord>,
}

impl BlockRecord {
    pub fn is_genesis(&self) -> bool {
        self.prev_hash.is_zero()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxRecord {
    /// Transaction id (double SHA-256 of the non-witness serialization)
    pub hash: Hash256,
    pub version: i32,
    pub lock_time: u32,

    /// Full serialized size in bytes
    pub size: u32,
    pub inputs: Vec<TxInRecord>,
    pub outputs: Vec<TxOutRecord>,
}

impl TxRecord {
    /// A coinbase has exactly one input and that input has no prevout.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].is_coinbase()
    }

    /// Sum of output values, `None` if it does not fit in an `i64`.
    pub fn value_out(&self) -> Option<i64> {
        self.outputs
            .iter()
            .try_fold(0i64, |total, output| total.checked_add(output.value))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInRecord {
    pub prevout_hash: Hash256,
    pub prevout_pos: u32,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

impl TxInRecord {
    pub fn is_coinbase(&self) -> bool {
        self.prevout_hash.is_zero() && self.prevout_pos == COINBASE_PREVOUT_POS
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutRecord {
    /// Amount in atomic units
    pub value: i64,
    pub script: Vec<u8>,
}
