//! Sequential reader over a directory of `blkNNNNN.dat` files.
//!
//! Each file is a run of frames: 4-byte network magic, little-endian `u32`
//! length, then the serialized block.

use crate::error::{ParserError, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

/// Resumable offset within a block-file directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamPosition {
    pub file_number: u32,
    pub offset: u64,
}

impl StreamPosition {
    pub fn new(file_number: u32, offset: u64) -> Self {
        Self { file_number, offset }
    }
}

impl std::fmt::Display for StreamPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "blk{:05}.dat:{}", self.file_number, self.offset)
    }
}

/// One framed block read from disk.
#[derive(Debug, Clone)]
pub struct BlockFrame {
    /// Where the frame starts
    pub position: StreamPosition,

    /// Where the next frame starts
    pub next_position: StreamPosition,
    pub magic: [u8; 4],
    pub bytes: Vec<u8>,
}

pub fn block_file_path(dir: &Path, file_number: u32) -> PathBuf {
    dir.join(format!("blk{:05}.dat", file_number))
}

pub struct BlockFileReader {
    dir: PathBuf,
    position: StreamPosition,
    known_magics: Vec<[u8; 4]>,
}

impl BlockFileReader {
    pub fn new(dir: impl Into<PathBuf>, position: StreamPosition) -> Self {
        Self {
            dir: dir.into(),
            position,
            known_magics: Vec::new(),
        }
    }

    /// Restrict accepted frames to these magics; anything else is `UnknownMagic`.
    pub fn with_magics(mut self, magics: Vec<[u8; 4]>) -> Self {
        self.known_magics = magics;
        self
    }

    pub fn position(&self) -> StreamPosition {
        self.position
    }

    /// Read the frame at the current position without advancing past it.
    ///
    /// Returns `Ok(None)` when the stream is exhausted for now: end of the
    /// last file, zero padding, or a frame that is still being written.
    /// Crossing into the next file does move the cursor.
    pub fn peek_frame(&mut self) -> Result<Option<BlockFrame>> {
        loop {
            let path = block_file_path(&self.dir, self.position.file_number);
            let mut file = match File::open(&path) {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    trace!("No block file at {}", path.display());
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            };

            let len = file.metadata()?.len();
            if self.position.offset >= len {
                if !self.advance_file() {
                    return Ok(None);
                }
                continue;
            }

            file.seek(SeekFrom::Start(self.position.offset))?;
            let mut magic = [0u8; 4];
            if !read_full(&mut file, &mut magic)? || magic == [0u8; 4] {
                // Pre-allocated tail of a file that is still being filled.
                if !self.advance_file() {
                    return Ok(None);
                }
                continue;
            }

            if !self.known_magics.is_empty() && !self.known_magics.contains(&magic) {
                return Err(ParserError::UnknownMagic(format!(
                    "{} at {}",
                    hex::encode(magic),
                    self.position
                )));
            }

            let mut length = [0u8; 4];
            if !read_full(&mut file, &mut length)? {
                return Ok(None);
            }
            let length = u32::from_le_bytes(length) as u64;
            let body_start = self.position.offset + 8;
            if body_start + length > len {
                // Only the last file can still be growing.
                if block_file_path(&self.dir, self.position.file_number + 1).exists() {
                    return Err(ParserError::InvalidBlockFormat(format!(
                        "frame at {} runs past the end of its file",
                        self.position
                    )));
                }
                debug!("Partial frame at {}, waiting for more data", self.position);
                return Ok(None);
            }

            let mut bytes = vec![0u8; length as usize];
            file.read_exact(&mut bytes)?;

            return Ok(Some(BlockFrame {
                position: self.position,
                next_position: StreamPosition::new(self.position.file_number, body_start + length),
                magic,
                bytes,
            }));
        }
    }

    /// Read the frame at the current position and advance past it.
    pub fn next_frame(&mut self) -> Result<Option<BlockFrame>> {
        let frame = self.peek_frame()?;
        if let Some(frame) = &frame {
            self.position = frame.next_position;
        }
        Ok(frame)
    }

    /// Step to the start of the next file if it exists.
    fn advance_file(&mut self) -> bool {
        let next = self.position.file_number + 1;
        if block_file_path(&self.dir, next).exists() {
            debug!("Moving to block file {}", next);
            self.position = StreamPosition::new(next, 0);
            true
        } else {
            false
        }
    }
}

/// Fill `buf` completely; `false` if the file ended first.
fn read_full(file: &mut File, buf: &mut [u8]) -> Result<bool> {
    match file.read_exact(buf) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{frame, GENESIS_HEX, MAINNET_MAGIC};
    use std::fs;

    #[test]
    fn test_reads_frames_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let block = hex::decode(GENESIS_HEX).unwrap();

        let mut first = frame(MAINNET_MAGIC, &block);
        first.extend(frame(MAINNET_MAGIC, &block));
        first.extend([0u8; 16]);
        fs::write(block_file_path(dir.path(), 0), &first).unwrap();
        fs::write(block_file_path(dir.path(), 1), frame(MAINNET_MAGIC, &block)).unwrap();

        let mut reader = BlockFileReader::new(dir.path(), StreamPosition::default());
        let a = reader.next_frame().unwrap().unwrap();
        let b = reader.next_frame().unwrap().unwrap();
        let c = reader.next_frame().unwrap().unwrap();
        assert!(reader.next_frame().unwrap().is_none());

        assert_eq!(a.position, StreamPosition::new(0, 0));
        assert_eq!(b.position, StreamPosition::new(0, 8 + block.len() as u64));
        assert_eq!(c.position, StreamPosition::new(1, 0));
        assert_eq!(c.bytes, block);
        assert_eq!(reader.position(), StreamPosition::new(1, 8 + block.len() as u64));
    }

    #[test]
    fn test_resume_from_position() {
        let dir = tempfile::tempdir().unwrap();
        let block = hex::decode(GENESIS_HEX).unwrap();
        let mut data = frame(MAINNET_MAGIC, &block);
        data.extend(frame(MAINNET_MAGIC, &block));
        fs::write(block_file_path(dir.path(), 0), &data).unwrap();

        let resume = StreamPosition::new(0, 8 + block.len() as u64);
        let mut reader = BlockFileReader::new(dir.path(), resume);
        let frame = reader.next_frame().unwrap().unwrap();
        assert_eq!(frame.position, resume);
        assert!(reader.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_partial_frame_does_not_advance() {
        let dir = tempfile::tempdir().unwrap();
        let block = hex::decode(GENESIS_HEX).unwrap();
        let data = frame(MAINNET_MAGIC, &block);
        fs::write(block_file_path(dir.path(), 0), &data[..data.len() - 10]).unwrap();

        let mut reader = BlockFileReader::new(dir.path(), StreamPosition::default());
        assert!(reader.next_frame().unwrap().is_none());
        assert_eq!(reader.position(), StreamPosition::default());
    }

    #[test]
    fn test_overrun_frame_before_later_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let block = hex::decode(GENESIS_HEX).unwrap();
        let data = frame(MAINNET_MAGIC, &block);
        fs::write(block_file_path(dir.path(), 0), &data[..data.len() - 10]).unwrap();
        fs::write(block_file_path(dir.path(), 1), &data).unwrap();

        let mut reader = BlockFileReader::new(dir.path(), StreamPosition::default());
        let err = reader.next_frame().unwrap_err();
        assert!(matches!(err, ParserError::InvalidBlockFormat(_)));
        assert_eq!(reader.position(), StreamPosition::default());
    }

    #[test]
    fn test_unknown_magic_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let block = hex::decode(GENESIS_HEX).unwrap();
        fs::write(block_file_path(dir.path(), 0), frame([1, 2, 3, 4], &block)).unwrap();

        let mut reader = BlockFileReader::new(dir.path(), StreamPosition::default())
            .with_magics(vec![MAINNET_MAGIC]);
        let err = reader.next_frame().unwrap_err();
        assert!(matches!(err, ParserError::UnknownMagic(_)));
        assert_eq!(reader.position(), StreamPosition::default());
    }
}
