//! Block lifecycle
//!
//! Between blocks the local book is rewound (`remove_and_clear_operations_queue`),
//! the committed block is applied elsewhere, stale state is purged
//! (`purge_invalid_state`) and the previous local operations are replayed on
//! top (`replay_operations`).

use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};
use types::errors::ClobError;
use types::ids::OrderId;
use types::operations::InternalOperation;
use types::order::{Order, OrderHash, RemovalReason};

use super::MemClob;
use crate::config::ReplayPostOnlyPolicy;
use crate::keeper::ClobKeeper;
use crate::offchain::RemovalStatus;

/// Counters from one replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub placed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Ids already handled during one replay
#[derive(Debug, Default)]
struct ReplayState {
    placed_stateful: HashSet<OrderId>,
    placed_after_removal: HashSet<OrderId>,
    stats: ReplayStats,
}

fn passes_post_only_filter(filter: Option<bool>, order: &Order) -> bool {
    filter.map_or(true, |post_only| post_only == order.is_post_only())
}

impl<K: ClobKeeper> MemClob<K> {
    /// Re-place the orders of a previous operations queue.
    ///
    /// Matches and deleveraging entries are not replayed; their orders are
    /// re-placed and match again if they still cross. A failure on one entry
    /// is logged and skipped.
    pub fn replay_operations(
        &mut self,
        operations: &[InternalOperation],
        tx_bytes: &HashMap<OrderHash, Vec<u8>>,
    ) -> ReplayStats {
        info!(
            operations = operations.len(),
            policy = ?self.config.replay_post_only,
            "Replaying operations"
        );
        let mut state = ReplayState::default();
        match self.config.replay_post_only {
            ReplayPostOnlyPolicy::PostOnlyFirst => {
                self.replay_pass(operations, tx_bytes, Some(true), &mut state);
                self.replay_pass(operations, tx_bytes, Some(false), &mut state);
            }
            ReplayPostOnlyPolicy::InOrder => self.replay_pass(operations, tx_bytes, None, &mut state),
        }
        debug!(stats = ?state.stats, "Replay finished");
        state.stats
    }

    fn replay_pass(
        &mut self,
        operations: &[InternalOperation],
        tx_bytes: &HashMap<OrderHash, Vec<u8>>,
        post_only_filter: Option<bool>,
        state: &mut ReplayState,
    ) {
        for operation in operations {
            match operation {
                InternalOperation::ShortTermOrderPlacement(order) => {
                    if !passes_post_only_filter(post_only_filter, order) {
                        continue;
                    }
                    match tx_bytes.get(&order.hash()).filter(|bytes| !bytes.is_empty()) {
                        Some(bytes) => self.replay_place(order.clone(), bytes.clone(), state),
                        None => {
                            warn!(order_id = %order.order_id, "Missing tx bytes for short-term order, skipping replay");
                            state.stats.skipped += 1;
                        }
                    }
                }
                InternalOperation::PreexistingStatefulOrder(order_id) => {
                    self.replay_stateful(order_id, post_only_filter, state);
                }
                InternalOperation::StatefulOrderPlacement(order) => {
                    self.replay_stateful(&order.order_id, post_only_filter, state);
                }
                InternalOperation::OrderRemoval(removal) => {
                    if state.placed_stateful.contains(&removal.order_id)
                        || state.placed_after_removal.contains(&removal.order_id)
                    {
                        continue;
                    }
                    let Some(order) = self.stored_order(&removal.order_id) else {
                        continue;
                    };
                    if !passes_post_only_filter(post_only_filter, &order) {
                        continue;
                    }
                    state.placed_after_removal.insert(removal.order_id.clone());
                    self.replay_place(order, Vec::new(), state);
                }
                InternalOperation::Match(_) | InternalOperation::Deleveraging(_) => {}
            }
        }
    }

    /// Re-place the stored version of a long-lived order once per replay.
    fn replay_stateful(&mut self, order_id: &OrderId, post_only_filter: Option<bool>, state: &mut ReplayState) {
        let Some(order) = self.stored_order(order_id) else {
            return;
        };
        if !passes_post_only_filter(post_only_filter, &order) {
            return;
        }
        if state.placed_stateful.contains(order_id) || state.placed_after_removal.contains(order_id) {
            debug!(order_id = %order_id, "Stateful order already replayed");
            state.stats.skipped += 1;
            return;
        }
        state.placed_stateful.insert(order_id.clone());
        self.replay_place(order, Vec::new(), state);
    }

    fn stored_order(&self, order_id: &OrderId) -> Option<Order> {
        self.keeper
            .as_ref()
            .and_then(|keeper| keeper.long_term_order(order_id))
    }

    fn replay_place(&mut self, order: Order, tx_bytes: Vec<u8>, state: &mut ReplayState) {
        let order_id = order.order_id.clone();
        match self.place_order(order, tx_bytes) {
            Ok(placed) => {
                debug!(order_id = %order_id, status = ?placed.status, "Replayed order");
                state.stats.placed += 1;
            }
            Err(err) => {
                warn!(order_id = %order_id, error = %err, "Failed to replay order");
                state.stats.failed += 1;
            }
        }
    }

    /// Clear the operations queue and take the local placements out of the
    /// book, leaving it as the last committed block left it.
    pub fn remove_and_clear_operations_queue(&mut self, local_operations: &[InternalOperation]) -> Result<(), ClobError> {
        self.ledger.clear();
        for operation in local_operations {
            match operation {
                InternalOperation::ShortTermOrderPlacement(order) => {
                    let same_version = self
                        .market(order.clob_pair_id())?
                        .book
                        .get(&order.order_id)
                        .is_some_and(|resting| resting.hash() == order.hash());
                    if same_version {
                        self.remove_resting_order(&order.order_id)?;
                    } else {
                        self.ledger.remove_tx_bytes(order);
                    }
                }
                InternalOperation::PreexistingStatefulOrder(order_id) => {
                    self.remove_if_resting(order_id)?;
                }
                InternalOperation::StatefulOrderPlacement(order) => {
                    self.remove_if_resting(&order.order_id)?;
                }
                InternalOperation::Match(_)
                | InternalOperation::Deleveraging(_)
                | InternalOperation::OrderRemoval(_) => {}
            }
        }
        debug!(operations = local_operations.len(), "Cleared operations queue");
        Ok(())
    }

    /// Drop state the committed block made invalid.
    ///
    /// Every list may name orders that are no longer resting.
    pub fn purge_invalid_state(
        &mut self,
        filled_order_ids: &[OrderId],
        expired_stateful_order_ids: &[OrderId],
        canceled_stateful_order_ids: &[OrderId],
        removed_stateful_order_ids: &[OrderId],
        block_height: u32,
    ) -> Result<(), ClobError> {
        for order_id in filled_order_ids {
            self.remove_order_if_filled(order_id)?;
        }

        let mut seen = HashSet::new();
        for order_id in canceled_stateful_order_ids {
            if !seen.insert(order_id) {
                continue;
            }
            if !order_id.is_stateful() {
                warn!(order_id = %order_id, "Ignoring canceled id of a short-term order");
                continue;
            }
            self.remove_if_resting(order_id)?;
        }

        let mut seen = HashSet::new();
        for order_id in expired_stateful_order_ids {
            if !seen.insert(order_id) {
                continue;
            }
            if !order_id.is_stateful() {
                warn!(order_id = %order_id, "Ignoring expired id of a short-term order");
                continue;
            }
            if self.remove_if_resting(order_id)?.is_some() {
                self.outbox
                    .remove(order_id, RemovalReason::Expired, RemovalStatus::Canceled);
            }
        }

        let expired: Vec<OrderId> = self
            .markets
            .values()
            .flat_map(|market| market.book.expired_at_or_before(block_height))
            .collect();
        for order_id in &expired {
            self.remove_resting_order(order_id)?;
            self.outbox
                .remove(order_id, RemovalReason::Expired, RemovalStatus::Canceled);
        }

        for order_id in removed_stateful_order_ids {
            self.remove_if_resting(order_id)?;
        }

        let mut purged_cancels = 0;
        for market in self.markets.values_mut() {
            purged_cancels += market.cancels.purge_at_block(block_height);
        }

        info!(
            block_height,
            expired_short_term = expired.len(),
            purged_cancels,
            "Purged invalid state"
        );
        Ok(())
    }

    /// Remove a resting order whose fill amount reached its size. Returns
    /// whether it was removed.
    pub fn remove_order_if_filled(&mut self, order_id: &OrderId) -> Result<bool, ClobError> {
        let Some(resting) = self.get_order(order_id) else {
            return Ok(false);
        };
        let quantums = resting.quantums;
        match self.require_keeper()?.filled_amount(order_id) {
            Some(filled) if filled >= quantums => {
                self.remove_resting_order(order_id)?;
                Ok(true)
            }
            Some(_) => Ok(false),
            None => {
                if order_id.is_short_term() {
                    error!(order_id = %order_id, "Filled short-term order has no fill amount");
                }
                Ok(false)
            }
        }
    }
}
