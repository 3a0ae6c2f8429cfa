//! Per-market order index
//!
//! Holds both sides of one market plus the secondary indices the order book
//! needs: id → level handle, subaccount → side → ids, subaccount → reduce-only
//! ids and expiry block → ids. Every mutation keeps all of them in sync.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use types::clob_pair::ClobPair;
use types::errors::{InvariantViolation, ValidationError};
use types::ids::{OrderId, SubaccountId};
use types::numeric::Subticks;
use types::order::{Order, Side};

use super::book_side::BookSide;

/// Stable position of a resting order: its level and arena slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LevelHandle {
    pub side: Side,
    pub subticks: Subticks,
    pub slot: usize,
}

/// Order book for a single market
#[derive(Debug, Clone)]
pub struct Orderbook {
    clob_pair: ClobPair,
    bids: BookSide,
    asks: BookSide,
    /// Reverse index of every resting order
    handles: HashMap<OrderId, LevelHandle>,
    subaccount_open_orders: BTreeMap<SubaccountId, BTreeMap<Side, BTreeSet<OrderId>>>,
    subaccount_reduce_only_orders: BTreeMap<SubaccountId, BTreeSet<OrderId>>,
    /// Short-term orders keyed by their good-til-block
    block_expirations: BTreeMap<u32, BTreeSet<OrderId>>,
}

impl Orderbook {
    pub fn new(clob_pair: ClobPair) -> Self {
        Self {
            clob_pair,
            bids: BookSide::new(Side::BUY),
            asks: BookSide::new(Side::SELL),
            handles: HashMap::new(),
            subaccount_open_orders: BTreeMap::new(),
            subaccount_reduce_only_orders: BTreeMap::new(),
            block_expirations: BTreeMap::new(),
        }
    }

    pub fn clob_pair(&self) -> &ClobPair {
        &self.clob_pair
    }

    pub fn side(&self, side: Side) -> Option<&BookSide> {
        match side {
            Side::BUY => Some(&self.bids),
            Side::SELL => Some(&self.asks),
            Side::UNSPECIFIED => None,
        }
    }

    fn side_mut(&mut self, side: Side) -> Option<&mut BookSide> {
        match side {
            Side::BUY => Some(&mut self.bids),
            Side::SELL => Some(&mut self.asks),
            Side::UNSPECIFIED => None,
        }
    }

    /// Add a resting order at the back (or front) of its level.
    ///
    /// The caller has already checked the order's remaining size against the
    /// fill ledger; an order whose full size is zero is rejected here.
    pub fn insert(&mut self, order: Order, at_front: bool) -> Result<LevelHandle, InvariantViolation> {
        let order_id = order.order_id.clone();
        if order.quantums.is_zero() {
            return Err(InvariantViolation::NoRemainingSize { order_id });
        }
        if self.handles.contains_key(&order_id) {
            return Err(InvariantViolation::OrderAlreadyExists { order_id });
        }

        let side = order.side;
        let subticks = order.subticks;
        let reduce_only = order.reduce_only;
        let good_til_block = order.good_til_block();

        let book_side = self
            .side_mut(side)
            .ok_or_else(|| InvariantViolation::InvalidSide {
                order_id: order_id.clone(),
            })?;
        let level = book_side.level_or_insert(subticks);
        let slot = if at_front {
            level.push_front(order)
        } else {
            level.push_back(order)
        };

        let handle = LevelHandle {
            side,
            subticks,
            slot,
        };
        self.handles.insert(order_id.clone(), handle);

        let subaccount_id = order_id.subaccount_id.clone();
        self.subaccount_open_orders
            .entry(subaccount_id.clone())
            .or_default()
            .entry(side)
            .or_default()
            .insert(order_id.clone());
        if reduce_only {
            self.subaccount_reduce_only_orders
                .entry(subaccount_id)
                .or_default()
                .insert(order_id.clone());
        }
        if let Some(block) = good_til_block {
            self.block_expirations.entry(block).or_default().insert(order_id);
        }

        Ok(handle)
    }

    /// Unlink a resting order and clean every index that references it.
    pub fn remove(&mut self, order_id: &OrderId) -> Result<Order, InvariantViolation> {
        let handle = self
            .handles
            .remove(order_id)
            .ok_or_else(|| InvariantViolation::OrderNotFound {
                order_id: order_id.clone(),
            })?;

        let not_found = || InvariantViolation::OrderNotFound {
            order_id: order_id.clone(),
        };
        let book_side = self.side_mut(handle.side).ok_or_else(not_found)?;
        let order = book_side
            .level_mut(handle.subticks)
            .and_then(|level| level.remove(handle.slot))
            .ok_or_else(not_found)?;
        book_side.remove_if_empty(handle.subticks);

        let subaccount_id = &order_id.subaccount_id;
        if let Some(by_side) = self.subaccount_open_orders.get_mut(subaccount_id) {
            if let Some(ids) = by_side.get_mut(&handle.side) {
                ids.remove(order_id);
                if ids.is_empty() {
                    by_side.remove(&handle.side);
                }
            }
            if by_side.is_empty() {
                self.subaccount_open_orders.remove(subaccount_id);
            }
        }
        if order.reduce_only {
            if let Some(ids) = self.subaccount_reduce_only_orders.get_mut(subaccount_id) {
                ids.remove(order_id);
                if ids.is_empty() {
                    self.subaccount_reduce_only_orders.remove(subaccount_id);
                }
            }
        }
        if let Some(block) = order.good_til_block() {
            if let Some(ids) = self.block_expirations.get_mut(&block) {
                ids.remove(order_id);
                if ids.is_empty() {
                    self.block_expirations.remove(&block);
                }
            }
        }

        Ok(order)
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.handles.contains_key(order_id)
    }

    pub fn handle(&self, order_id: &OrderId) -> Option<LevelHandle> {
        self.handles.get(order_id).copied()
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        let handle = self.handles.get(order_id)?;
        self.order_at(*handle)
    }

    pub fn order_at(&self, handle: LevelHandle) -> Option<&Order> {
        self.side(handle.side)?
            .level(handle.subticks)?
            .get(handle.slot)
    }

    /// Head of the best level on `side`.
    pub fn best_on_side(&self, side: Side) -> Option<LevelHandle> {
        let book_side = self.side(side)?;
        let subticks = book_side.best_price()?;
        let slot = book_side.level(subticks)?.head()?;
        Some(LevelHandle {
            side,
            subticks,
            slot,
        })
    }

    /// Next order in time-priority traversal: the next order in the same
    /// level, else the head of the next worse level.
    pub fn next_after(&self, handle: LevelHandle) -> Option<LevelHandle> {
        let book_side = self.side(handle.side)?;
        if let Some(slot) = book_side
            .level(handle.subticks)
            .and_then(|level| level.next_slot(handle.slot))
        {
            return Some(LevelHandle { slot, ..handle });
        }

        let subticks = book_side.next_price_after(handle.subticks)?;
        let slot = book_side.level(subticks)?.head()?;
        Some(LevelHandle {
            side: handle.side,
            subticks,
            slot,
        })
    }

    /// Best bid and best ask prices.
    pub fn best_prices(&self) -> (Option<Subticks>, Option<Subticks>) {
        (self.bids.best_price(), self.asks.best_price())
    }

    /// Open orders of a subaccount on one side, ordered by id.
    pub fn orders_for(&self, subaccount_id: &SubaccountId, side: Side) -> Result<Vec<Order>, ValidationError> {
        if !side.is_valid() {
            return Err(ValidationError::InvalidSide);
        }
        Ok(self
            .subaccount_open_orders
            .get(subaccount_id)
            .and_then(|by_side| by_side.get(&side))
            .map(|ids| ids.iter().filter_map(|id| self.get(id).cloned()).collect())
            .unwrap_or_default())
    }

    /// Resting reduce-only orders of a subaccount, sorted by id.
    pub fn reduce_only_orders_for(&self, subaccount_id: &SubaccountId) -> Vec<OrderId> {
        self.subaccount_reduce_only_orders
            .get(subaccount_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Short-term orders whose good-til-block is at or before `block`, sorted
    /// by block then id.
    pub fn expired_at_or_before(&self, block: u32) -> Vec<OrderId> {
        self.block_expirations
            .range(..=block)
            .flat_map(|(_, ids)| ids.iter().cloned())
            .collect()
    }

    pub fn total_open_orders(&self) -> usize {
        self.handles.len()
    }

    /// Number of resting orders of a subaccount across both sides.
    pub fn open_order_count(&self, subaccount_id: &SubaccountId) -> usize {
        self.subaccount_open_orders
            .get(subaccount_id)
            .map(|by_side| by_side.values().map(BTreeSet::len).sum())
            .unwrap_or(0)
    }

    pub fn depth_snapshot(&self, depth: usize) -> OrderbookSnapshot {
        OrderbookSnapshot {
            bids: self.bids.depth_snapshot(depth),
            asks: self.asks.depth_snapshot(depth),
        }
    }
}

/// Order book snapshot: price and order count per level, best first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderbookSnapshot {
    pub bids: Vec<(Subticks, usize)>,
    pub asks: Vec<(Subticks, usize)>,
}
