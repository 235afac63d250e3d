use crate::{
    error::{ParserError, Result},
    types::{BlockRecord, Hash256, TxInRecord, TxOutRecord, TxRecord},
};
use tracing::debug;

/// Size of a serialized block header.
pub const HEADER_SIZE: usize = 80;

/// Decodes serialized blocks into [`BlockRecord`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockParser;

impl BlockParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse one serialized block. `magic` is the frame magic it was read under, if any.
    pub fn parse_block(&self, bytes: &[u8], magic: Option<[u8; 4]>) -> Result<BlockRecord> {
        let mut decoder = Decoder::new(bytes);

        let header = decoder.take(HEADER_SIZE)?;
        let hash = Hash256::double_sha256(header);

        let mut header_decoder = Decoder::new(header);
        let version = header_decoder.read_i32()?;
        let prev_hash = header_decoder.read_hash()?;
        let merkle_root = header_decoder.read_hash()?;
        let time = header_decoder.read_u32()?;
        let bits = header_decoder.read_u32()?;
        let nonce = header_decoder.read_u32()?;

        let tx_count = decoder.read_compact_size()?;
        // Every transaction needs at least 10 bytes; reject absurd counts before allocating.
        if tx_count > (decoder.remaining() / 10) as u64 + 1 {
            return Err(ParserError::InvalidBlockFormat(format!(
                "transaction count {} exceeds block size",
                tx_count
            )));
        }

        let mut transactions = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            transactions.push(self.parse_transaction(&mut decoder)?);
        }

        if decoder.remaining() != 0 {
            debug!(
                "Block {} has {} trailing bytes after its transactions",
                hash,
                decoder.remaining()
            );
        }

        Ok(BlockRecord {
            hash,
            prev_hash,
            version,
            merkle_root,
            time,
            bits,
            nonce,
            magic,
            transactions,
        })
    }

    /// Parse a single transaction at the decoder's position, legacy or segwit.
    pub fn parse_transaction(&self, decoder: &mut Decoder<'_>) -> Result<TxRecord> {
        let start = decoder.position();
        let version = decoder.read_i32()?;

        let segwit = decoder.peek(2) == Some(&[0x00, 0x01][..]);
        if segwit {
            decoder.take(2)?;
        }
        let body_start = decoder.position();

        let input_count = decoder.read_compact_size()?;
        let mut inputs = Vec::new();
        for _ in 0..input_count {
            let prevout_hash = decoder.read_hash()?;
            let prevout_pos = decoder.read_u32()?;
            let script_sig = decoder.read_var_bytes()?.to_vec();
            let sequence = decoder.read_u32()?;
            inputs.push(TxInRecord {
                prevout_hash,
                prevout_pos,
                script_sig,
                sequence,
            });
        }

        let output_count = decoder.read_compact_size()?;
        let mut outputs = Vec::new();
        for _ in 0..output_count {
            let value = decoder.read_i64()?;
            let script = decoder.read_var_bytes()?.to_vec();
            outputs.push(TxOutRecord { value, script });
        }
        let body_end = decoder.position();

        if segwit {
            for _ in 0..input_count {
                let items = decoder.read_compact_size()?;
                for _ in 0..items {
                    decoder.read_var_bytes()?;
                }
            }
        }

        let lock_time_start = decoder.position();
        let lock_time = decoder.read_u32()?;
        let end = decoder.position();

        let raw = decoder.slice(start, end);
        let hash = if segwit {
            let mut stripped = Vec::with_capacity(end - start);
            stripped.extend_from_slice(decoder.slice(start, start + 4));
            stripped.extend_from_slice(decoder.slice(body_start, body_end));
            stripped.extend_from_slice(decoder.slice(lock_time_start, end));
            Hash256::double_sha256(&stripped)
        } else {
            Hash256::double_sha256(raw)
        };

        Ok(TxRecord {
            hash,
            version,
            lock_time,
            size: raw.len() as u32,
            inputs,
            outputs,
        })
    }
}

/// Little-endian cursor over a byte slice.
pub struct Decoder<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn slice(&self, from: usize, to: usize) -> &'a [u8] {
        &self.buf[from..to]
    }

    fn peek(&self, len: usize) -> Option<&'a [u8]> {
        self.buf.get(self.pos..self.pos + len)
    }

    pub fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.buf.len());
        match end {
            Some(end) => {
                let out = &self.buf[self.pos..end];
                self.pos = end;
                Ok(out)
            }
            None => Err(ParserError::BufferTooShort {
                expected: self.pos.saturating_add(len),
                actual: self.buf.len(),
            }),
        }
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_hash(&mut self) -> Result<Hash256> {
        Ok(Hash256(self.read_array()?))
    }

    /// Bitcoin CompactSize unsigned integer.
    pub fn read_compact_size(&mut self) -> Result<u64> {
        match self.read_u8()? {
            0xfd => Ok(self.read_u16()? as u64),
            0xfe => Ok(self.read_u32()? as u64),
            0xff => self.read_u64(),
            n => Ok(n as u64),
        }
    }

    /// CompactSize length prefix followed by that many bytes.
    pub fn read_var_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_compact_size()?;
        if len > self.remaining() as u64 {
            return Err(ParserError::BufferTooShort {
                expected: self.pos.saturating_add(len as usize),
                actual: self.buf.len(),
            });
        }
        self.take(len as usize)
    }
}
