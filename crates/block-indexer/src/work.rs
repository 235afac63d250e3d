//! Proof-of-work accounting

use crate::error::{BlockIndexerError, Result};
use primitive_types::U256;

/// Work contributed by a single block, as a function of its difficulty field.
///
/// Implementations must be strictly positive for every `bits` they accept.
pub trait BlockWork {
    fn work(&self, bits: u32) -> Result<U256>;
}

/// Bitcoin-style compact target: `work = 2^256 / (target + 1)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CompactTargetWork;

impl BlockWork for CompactTargetWork {
    fn work(&self, bits: u32) -> Result<U256> {
        let target = compact_to_u256(bits)?;
        if target.is_zero() {
            return Err(BlockIndexerError::invariant(format!(
                "compact target {:#010x} decodes to zero",
                bits
            )));
        }
        let one = U256::one();
        Ok((!target / (target + one)) + one)
    }
}

impl<F> BlockWork for F
where
    F: Fn(u32) -> U256,
{
    fn work(&self, bits: u32) -> Result<U256> {
        Ok(self(bits))
    }
}

/// Decode the compact (`nBits`) representation of a target.
pub fn compact_to_u256(bits: u32) -> Result<U256> {
    let size = bits >> 24;
    let mut word = bits & 0x007f_ffff;

    if bits & 0x0080_0000 != 0 && word != 0 {
        return Err(BlockIndexerError::invariant(format!(
            "compact target {:#010x} is negative",
            bits
        )));
    }
    if word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32)) {
        return Err(BlockIndexerError::invariant(format!(
            "compact target {:#010x} overflows 256 bits",
            bits
        )));
    }

    if size <= 3 {
        word >>= 8 * (3 - size);
        Ok(U256::from(word))
    } else {
        Ok(U256::from(word) << (8 * (size - 3)))
    }
}

/// `parent + work`, treating overflow as a corrupted index.
pub fn add_work(parent: U256, work: U256) -> Result<U256> {
    parent
        .checked_add(work)
        .ok_or_else(|| BlockIndexerError::invariant("chain work overflowed 256 bits"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_difficulty_work() {
        // 0x1d00ffff is difficulty 1; its work is 0x100010001
        let work = CompactTargetWork.work(0x1d00ffff).unwrap();
        assert_eq!(work, U256::from(0x1_0001_0001u64));
    }

    #[test]
    fn test_harder_target_has_more_work() {
        let easy = CompactTargetWork.work(0x1d00ffff).unwrap();
        let hard = CompactTargetWork.work(0x1b0404cb).unwrap();
        assert!(hard > easy);
    }

    #[test]
    fn test_invalid_targets_rejected() {
        assert!(CompactTargetWork.work(0x0000_0000).is_err());
        assert!(CompactTargetWork.work(0x0480_0001).is_err());
        assert!(CompactTargetWork.work(0xff12_3456).is_err());
    }

    #[test]
    fn test_closure_work() {
        let work = |bits: u32| U256::from(bits);
        assert_eq!(work.work(20).unwrap(), U256::from(20));
    }

    #[test]
    fn test_add_work_overflow() {
        assert!(add_work(U256::MAX, U256::one()).is_err());
        assert_eq!(add_work(U256::from(1), U256::from(2)).unwrap(), U256::from(3));
    }
}
