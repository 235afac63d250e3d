//! Write batches and checkpoints

use serde::{Deserialize, Serialize};

/// Resumable read offset for one input stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub source: String,
    pub file_number: u32,
    pub offset: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

/// A set of writes applied atomically, together with any checkpoints they advance.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub ops: Vec<BatchOp>,
    pub checkpoints: Vec<Checkpoint>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, key: Vec<u8>, value: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::Put { key, value });
        self
    }

    pub fn delete(&mut self, key: Vec<u8>) -> &mut Self {
        self.ops.push(BatchOp::Delete { key });
        self
    }

    pub fn set_checkpoint(&mut self, checkpoint: Checkpoint) -> &mut Self {
        self.checkpoints.retain(|c| c.source != checkpoint.source);
        self.checkpoints.push(checkpoint);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty() && self.checkpoints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }
}
