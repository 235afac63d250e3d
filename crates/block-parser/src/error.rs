use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParserError {
    #[error("Invalid block format: {0}")]
    InvalidBlockFormat(String),

    #[error("Buffer too short: expected at least {expected} bytes, got {actual}")]
    BufferTooShort { expected: usize, actual: usize },

    #[error("Unknown network magic: {0}")]
    UnknownMagic(String),

    #[error("Hex decoding error: {0}")]
    HexDecodingError(#[from] hex::FromHexError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ParserError>;
