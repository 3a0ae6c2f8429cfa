//! Operations ledger
//!
//! Ordered record of the placements, matches, deleveraging and removals the
//! local book produced since the last block. It is the source of the next
//! block proposal and of the replay that rebuilds the book afterwards.
//!
//! **Invariants:**
//! - At most one placement entry per order id
//! - At most one removal entry per order id, only for stateful orders
//! - A match is recorded after the placements it references
//! - Raw transaction bytes are kept for every short-term placement in the queue

use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;
use types::errors::InvariantViolation;
use types::ids::OrderId;
use types::operations::{ClobMatch, InternalOperation, MatchPerpetualDeleveraging, OrderRemoval, ProposedOperation};
use types::order::{Order, OrderHash, RemovalReason};

#[derive(Debug, Clone, Default)]
pub struct OperationsLedger {
    operations: Vec<InternalOperation>,
    /// Order id → hash of the version whose placement is queued
    placements: HashMap<OrderId, OrderHash>,
    preexisting: HashSet<OrderId>,
    removals: HashSet<OrderId>,
    short_term_tx_bytes: HashMap<OrderHash, Vec<u8>>,
    /// Latest version of every order that matched since the last clear
    matched_orders: HashMap<OrderId, Order>,
    add_to_book_checked: BTreeSet<OrderHash>,
}

impl OperationsLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn operations(&self) -> &[InternalOperation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn store_tx_bytes(&mut self, order: &Order, tx_bytes: Vec<u8>) {
        self.short_term_tx_bytes.insert(order.hash(), tx_bytes);
    }

    pub fn tx_bytes(&self, order_hash: &OrderHash) -> Option<&[u8]> {
        self.short_term_tx_bytes.get(order_hash).map(Vec::as_slice)
    }

    pub fn remove_tx_bytes(&mut self, order: &Order) {
        self.short_term_tx_bytes.remove(&order.hash());
    }

    /// Queue a placement for `order` unless one is already queued for its id.
    /// Returns whether a new entry was added.
    pub fn record_placement(&mut self, order: &Order) -> bool {
        if self.is_placement_recorded(&order.order_id) {
            return false;
        }
        self.placements.insert(order.order_id.clone(), order.hash());
        let operation = if order.is_short_term() {
            InternalOperation::ShortTermOrderPlacement(order.clone())
        } else {
            InternalOperation::StatefulOrderPlacement(order.clone())
        };
        self.operations.push(operation);
        true
    }

    /// Queue a reference to a stateful order placed in an earlier block.
    pub fn record_preexisting_stateful_order(&mut self, order_id: &OrderId) -> bool {
        if self.is_placement_recorded(order_id) {
            return false;
        }
        self.preexisting.insert(order_id.clone());
        self.operations
            .push(InternalOperation::PreexistingStatefulOrder(order_id.clone()));
        true
    }

    /// True if a placement or pre-existing reference is queued for `order_id`.
    pub fn is_placement_recorded(&self, order_id: &OrderId) -> bool {
        self.placements.contains_key(order_id) || self.preexisting.contains(order_id)
    }

    /// True if the exact version of `order` has a queued placement.
    pub fn is_order_placement_queued(&self, order: &Order) -> bool {
        self.placements.get(&order.order_id) == Some(&order.hash())
    }

    pub fn record_match(&mut self, clob_match: ClobMatch) {
        debug!(fills = clob_match.fills().len(), "Recording match");
        self.operations.push(InternalOperation::Match(clob_match));
    }

    /// Queue a removal for a stateful order. Short-term orders and repeated
    /// removals are ignored. Returns whether a new entry was added.
    pub fn record_removal(&mut self, order_id: &OrderId, reason: RemovalReason) -> bool {
        if order_id.is_short_term() || self.removals.contains(order_id) {
            return false;
        }
        self.removals.insert(order_id.clone());
        self.operations.push(InternalOperation::OrderRemoval(OrderRemoval {
            order_id: order_id.clone(),
            reason,
        }));
        true
    }

    pub fn is_removal_recorded(&self, order_id: &OrderId) -> bool {
        self.removals.contains(order_id)
    }

    pub fn record_deleveraging(&mut self, deleveraging: MatchPerpetualDeleveraging) {
        self.operations.push(InternalOperation::Deleveraging(deleveraging));
    }

    /// Remember the latest matched version of `order`. A version older than
    /// the recorded one is a defect.
    pub fn update_matched_order(&mut self, order: &Order) -> Result<(), InvariantViolation> {
        if let Some(existing) = self.matched_orders.get(&order.order_id) {
            if order.cmp_replacement(existing).is_lt() {
                return Err(InvariantViolation::MatchedOrderRegressed {
                    order_id: order.order_id.clone(),
                });
            }
        }
        self.matched_orders.insert(order.order_id.clone(), order.clone());
        Ok(())
    }

    pub fn matched_order(&self, order_id: &OrderId) -> Option<&Order> {
        self.matched_orders.get(order_id)
    }

    pub fn mark_add_to_book_checked(&mut self, order: &Order) {
        self.add_to_book_checked.insert(order.hash());
    }

    /// Orders that passed the add-to-book collateral check, sorted by hash.
    pub fn add_to_book_checked(&self) -> Vec<OrderHash> {
        self.add_to_book_checked.iter().copied().collect()
    }

    /// Operations for the next block proposal. Short-term placements are
    /// rendered as their raw transaction bytes; pre-existing stateful orders
    /// are omitted.
    pub fn operations_to_propose(&self) -> Result<Vec<ProposedOperation>, InvariantViolation> {
        let mut proposed = Vec::with_capacity(self.operations.len());
        for operation in &self.operations {
            match operation {
                InternalOperation::ShortTermOrderPlacement(order) => {
                    let order_hash = order.hash();
                    let tx_bytes = self
                        .short_term_tx_bytes
                        .get(&order_hash)
                        .ok_or(InvariantViolation::MissingTxBytes { order_hash })?;
                    proposed.push(ProposedOperation::ShortTermOrderPlacement(tx_bytes.clone()));
                }
                InternalOperation::StatefulOrderPlacement(order) => {
                    proposed.push(ProposedOperation::StatefulOrderPlacement(order.clone()));
                }
                InternalOperation::PreexistingStatefulOrder(_) => {}
                InternalOperation::Match(clob_match) => {
                    proposed.push(ProposedOperation::Match(clob_match.clone()));
                }
                InternalOperation::Deleveraging(deleveraging) => {
                    proposed.push(ProposedOperation::Deleveraging(deleveraging.clone()));
                }
                InternalOperation::OrderRemoval(removal) => {
                    proposed.push(ProposedOperation::OrderRemoval(removal.clone()));
                }
            }
        }
        Ok(proposed)
    }

    /// Queue contents plus the raw bytes of every queued short-term placement.
    pub fn operations_to_replay(&self) -> (Vec<InternalOperation>, HashMap<OrderHash, Vec<u8>>) {
        let tx_bytes = self
            .operations
            .iter()
            .filter_map(|operation| match operation {
                InternalOperation::ShortTermOrderPlacement(order) => {
                    let order_hash = order.hash();
                    self.short_term_tx_bytes
                        .get(&order_hash)
                        .map(|bytes| (order_hash, bytes.clone()))
                }
                _ => None,
            })
            .collect();
        (self.operations.clone(), tx_bytes)
    }

    /// Drop every queued entry together with the raw bytes of queued
    /// short-term placements.
    pub fn clear(&mut self) {
        for operation in self.operations.drain(..) {
            if let InternalOperation::ShortTermOrderPlacement(order) = operation {
                self.short_term_tx_bytes.remove(&order.hash());
            }
        }
        self.placements.clear();
        self.preexisting.clear();
        self.removals.clear();
        self.matched_orders.clear();
        self.add_to_book_checked.clear();
    }
}
