//! Event system for the block indexer

use crate::error::{BlockIndexerError, Result};
use crate::models::{BlockId, ChainId, ReorgPlan};
use block_parser::Hash256;
use tokio::sync::broadcast;

/// Event types that can be emitted by the indexer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerEvent {
    BlockImported {
        block_id: BlockId,
        hash: Hash256,
        /// Parent not known at import time
        orphan: bool,
    },
    BlockConnected {
        chain_id: ChainId,
        block_id: BlockId,
        height: u32,
    },
    BlockDisconnected {
        chain_id: ChainId,
        block_id: BlockId,
        height: u32,
    },
    TipChanged {
        chain_id: ChainId,
        old_tip: Option<BlockId>,
        new_tip: BlockId,
        reorg_depth: usize,
    },
}

/// Event emitter for broadcasting indexer events
#[derive(Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<IndexerEvent>,
}

impl EventEmitter {
    /// Create a new event emitter with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Emit an event to all subscribers
    pub fn emit(&self, event: IndexerEvent) {
        match self.sender.send(event) {
            Ok(count) => tracing::trace!("Event sent to {} subscribers", count),
            Err(_) => tracing::trace!("No active subscribers for event"),
        }
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<IndexerEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Events describing a committed chain switch, in the order they were applied.
///
/// `heights` gives the height of every block in the plan.
pub fn plan_events(
    plan: &ReorgPlan,
    heights: impl Fn(BlockId) -> Option<u32>,
) -> Vec<IndexerEvent> {
    let mut events = Vec::with_capacity(plan.disconnect.len() + plan.connect.len() + 1);
    for block_id in &plan.disconnect {
        if let Some(height) = heights(*block_id) {
            events.push(IndexerEvent::BlockDisconnected {
                chain_id: plan.chain_id,
                block_id: *block_id,
                height,
            });
        }
    }
    for block_id in &plan.connect {
        if let Some(height) = heights(*block_id) {
            events.push(IndexerEvent::BlockConnected {
                chain_id: plan.chain_id,
                block_id: *block_id,
                height,
            });
        }
    }
    events.push(IndexerEvent::TipChanged {
        chain_id: plan.chain_id,
        old_tip: plan.old_tip,
        new_tip: plan.new_tip,
        reorg_depth: plan.disconnect.len(),
    });
    events
}

/// Event subscriber for receiving indexer events
pub struct EventSubscriber {
    receiver: broadcast::Receiver<IndexerEvent>,
}

impl EventSubscriber {
    /// Create a new event subscriber from an emitter
    pub fn new(emitter: &EventEmitter) -> Self {
        Self {
            receiver: emitter.subscribe(),
        }
    }

    /// Receive the next event
    pub async fn recv(&mut self) -> Result<IndexerEvent> {
        self.receiver
            .recv()
            .await
            .map_err(|e| BlockIndexerError::EventSystem(e.to_string()))
    }

    /// Try to receive the next event without blocking
    pub fn try_recv(&mut self) -> Result<Option<IndexerEvent>> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(e) => Err(BlockIndexerError::EventSystem(e.to_string())),
        }
    }
}
