//! Raw block input for the chain indexer
//!
//! Reads framed blocks from `blkNNNNN.dat` files, decodes them into
//! [`BlockRecord`]s and recognizes standard output scripts.

pub mod error;
pub mod parser;
pub mod reader;
pub mod script;
pub mod types;

pub use error::{ParserError, Result};
pub use parser::{BlockParser, Decoder};
pub use reader::{block_file_path, BlockFileReader, BlockFrame, StreamPosition};
pub use script::{RecognizedKey, ScriptRecognizer, StandardScripts};
pub use types::{BlockRecord, Hash256, TxInRecord, TxOutRecord, TxRecord, COINBASE_PREVOUT_POS};

#[cfg(test)]
pub(crate) mod test_utils {
    pub(crate) const MAINNET_MAGIC: [u8; 4] = [0xf9, 0xbe, 0xb4, 0xd9];

    /// Bitcoin main-net genesis block.
    pub(crate) const GENESIS_HEX: &str = concat!(
        "01000000",
        "0000000000000000000000000000000000000000000000000000000000000000",
        "3ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a",
        "29ab5f49ffff001d1dac2b7c",
        "01",
        "01000000010000000000000000000000000000000000000000000000000000000000000000ffffffff",
        "4d04ffff001d0104455468652054696d65732030332f4a616e2f32303039204368616e63656c6c6f72",
        "206f6e206272696e6b206f66207365636f6e64206261696c6f757420666f722062616e6b73ffffffff",
        "0100f2052a01000000434104678afdb0fe5548271967f1a67130b7105cd6a828e03909a67962e0ea",
        "1f61deb649f6bc3f4cef38c4f35504e51ec112de5c384df7ba0b8d578a4c702b6bf11d5fac00000000",
    );

    /// Wrap a serialized block in a block-file frame.
    pub(crate) fn frame(magic: [u8; 4], block: &[u8]) -> Vec<u8> {
        let mut out = magic.to_vec();
        out.extend((block.len() as u32).to_le_bytes());
        out.extend_from_slice(block);
        out
    }
}
