//! Off-chain order updates
//!
//! Messages describing order placements, fill updates and removals for an
//! external indexer. Messages are buffered in a bounded outbox and drained by
//! the caller; delivery is not handled here.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::warn;
use types::ids::OrderId;
use types::numeric::BaseQuantums;
use types::order::{Order, RemovalReason};

use crate::config::MemClobConfig;

/// Whether a removal may still be reverted by the block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalStatus {
    /// Removed locally; the next block may still include the order.
    BestEffortCanceled,
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OffchainMessage {
    Place {
        order: Order,
    },
    Update {
        order_id: OrderId,
        total_filled: BaseQuantums,
    },
    Remove {
        order_id: OrderId,
        reason: RemovalReason,
        status: RemovalStatus,
    },
}

impl OffchainMessage {
    pub fn order_id(&self) -> &OrderId {
        match self {
            OffchainMessage::Place { order } => &order.order_id,
            OffchainMessage::Update { order_id, .. } => order_id,
            OffchainMessage::Remove { order_id, .. } => order_id,
        }
    }
}

/// Bounded buffer of pending off-chain messages
#[derive(Debug, Clone)]
pub struct OffchainOutbox {
    enabled: bool,
    capacity: usize,
    buffer: VecDeque<OffchainMessage>,
    dropped: u64,
}

impl OffchainOutbox {
    pub fn new(config: &MemClobConfig) -> Self {
        Self {
            enabled: config.generate_offchain_updates,
            capacity: config.max_offchain_messages,
            buffer: VecDeque::new(),
            dropped: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn push(&mut self, message: OffchainMessage) {
        if !self.enabled {
            return;
        }
        if self.capacity == 0 {
            self.dropped += 1;
            return;
        }
        if self.buffer.len() >= self.capacity {
            if let Some(oldest) = self.buffer.pop_front() {
                self.dropped += 1;
                warn!(
                    capacity = self.capacity,
                    order_id = %oldest.order_id(),
                    dropped_total = self.dropped,
                    "Off-chain outbox full, dropping oldest message"
                );
            }
        }
        self.buffer.push_back(message);
    }

    pub fn place(&mut self, order: &Order) {
        self.push(OffchainMessage::Place {
            order: order.clone(),
        });
    }

    pub fn update(&mut self, order_id: &OrderId, total_filled: BaseQuantums) {
        self.push(OffchainMessage::Update {
            order_id: order_id.clone(),
            total_filled,
        });
    }

    pub fn remove(&mut self, order_id: &OrderId, reason: RemovalReason, status: RemovalStatus) {
        self.push(OffchainMessage::Remove {
            order_id: order_id.clone(),
            reason,
            status,
        });
    }

    /// Drain every buffered message in emission order.
    pub fn drain(&mut self) -> Vec<OffchainMessage> {
        self.buffer.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Messages lost to the capacity bound since construction.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}
