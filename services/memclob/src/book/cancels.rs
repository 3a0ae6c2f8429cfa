//! Short-term cancellation registry
//!
//! Maps an order id to the highest block its cancellation is good until.
//! Records only move forward and are dropped by block-boundary purges.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use types::errors::CancelError;
use types::ids::OrderId;

#[derive(Debug, Clone, Default)]
pub struct CancellationTable {
    til_block_by_order: HashMap<OrderId, u32>,
    /// Reverse index used by purges
    orders_by_til_block: BTreeMap<u32, BTreeSet<OrderId>>,
}

impl CancellationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record or upgrade a cancellation. Fails when the existing record is
    /// good until the same or a later block.
    pub fn record(&mut self, order_id: OrderId, til_block: u32) -> Result<(), CancelError> {
        if let Some(existing) = self.til_block_by_order.get(&order_id).copied() {
            if existing >= til_block {
                return Err(CancelError::AlreadyExists {
                    order_id,
                    existing_til_block: existing,
                    til_block,
                });
            }
            if let Some(ids) = self.orders_by_til_block.get_mut(&existing) {
                ids.remove(&order_id);
                if ids.is_empty() {
                    self.orders_by_til_block.remove(&existing);
                }
            }
        }

        self.orders_by_til_block
            .entry(til_block)
            .or_default()
            .insert(order_id.clone());
        self.til_block_by_order.insert(order_id, til_block);
        Ok(())
    }

    pub fn lookup(&self, order_id: &OrderId) -> Option<u32> {
        self.til_block_by_order.get(order_id).copied()
    }

    /// Drop every record good until `block` or earlier. Returns how many were
    /// dropped.
    pub fn purge_at_block(&mut self, block: u32) -> usize {
        let expired_blocks: Vec<u32> = self
            .orders_by_til_block
            .range(..=block)
            .map(|(til_block, _)| *til_block)
            .collect();

        let mut purged = 0;
        for til_block in expired_blocks {
            for id in self.orders_by_til_block.remove(&til_block).unwrap_or_default() {
                self.til_block_by_order.remove(&id);
                purged += 1;
            }
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.til_block_by_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.til_block_by_order.is_empty()
    }
}
