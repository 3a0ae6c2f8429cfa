//! One side of an order book
//!
//! Bids are walked from the highest price down, asks from the lowest price up.
//! Uses BTreeMap for deterministic iteration order.

use std::collections::BTreeMap;
use std::ops::Bound;
use types::numeric::Subticks;
use types::order::Side;

use super::price_level::PriceLevel;

/// Price levels of a single side
#[derive(Debug, Clone)]
pub struct BookSide {
    side: Side,
    /// Price levels keyed by price. Empty levels are never kept.
    levels: BTreeMap<Subticks, PriceLevel>,
}

impl BookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Best price: highest bid or lowest ask.
    pub fn best_price(&self) -> Option<Subticks> {
        if self.side.is_buy() {
            self.levels.keys().next_back().copied()
        } else {
            self.levels.keys().next().copied()
        }
    }

    /// Next worse price after `price` in walking order.
    pub fn next_price_after(&self, price: Subticks) -> Option<Subticks> {
        if self.side.is_buy() {
            self.levels.range(..price).next_back().map(|(p, _)| *p)
        } else {
            self.levels
                .range((Bound::Excluded(price), Bound::Unbounded))
                .next()
                .map(|(p, _)| *p)
        }
    }

    pub fn level(&self, price: Subticks) -> Option<&PriceLevel> {
        self.levels.get(&price)
    }

    pub(crate) fn level_mut(&mut self, price: Subticks) -> Option<&mut PriceLevel> {
        self.levels.get_mut(&price)
    }

    pub(crate) fn level_or_insert(&mut self, price: Subticks) -> &mut PriceLevel {
        self.levels.entry(price).or_default()
    }

    /// Drop the level at `price` if it holds no orders.
    pub(crate) fn remove_if_empty(&mut self, price: Subticks) {
        if self.levels.get(&price).is_some_and(PriceLevel::is_empty) {
            self.levels.remove(&price);
        }
    }

    /// Levels from best to worst.
    pub fn levels_in_priority(&self) -> Box<dyn Iterator<Item = (Subticks, &PriceLevel)> + '_> {
        if self.side.is_buy() {
            Box::new(self.levels.iter().rev().map(|(p, l)| (*p, l)))
        } else {
            Box::new(self.levels.iter().map(|(p, l)| (*p, l)))
        }
    }

    /// Get depth snapshot (top N price levels with their order counts)
    pub fn depth_snapshot(&self, depth: usize) -> Vec<(Subticks, usize)> {
        self.levels_in_priority()
            .take(depth)
            .map(|(price, level)| (price, level.order_count()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Get the total number of price levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
