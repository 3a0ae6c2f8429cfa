//! Liquidation orders and the taker abstraction
//!
//! A liquidation order closes (part of) an undercollateralized position. It
//! is always immediate-or-cancel, never rests and carries no price limit.

use crate::ids::{ClobPairId, OrderId, SubaccountId};
use crate::numeric::{BaseQuantums, Subticks};
use crate::order::{Order, OrderHash, Side};
use serde::{Deserialize, Serialize};

/// Forced close of a subaccount's perpetual position
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOrder {
    pub subaccount_id: SubaccountId,
    pub clob_pair_id: ClobPairId,
    pub perpetual_id: u32,
    pub side: Side,
    pub quantums: BaseQuantums,
}

impl LiquidationOrder {
    pub fn new(
        subaccount_id: SubaccountId,
        clob_pair_id: ClobPairId,
        perpetual_id: u32,
        side: Side,
        quantums: BaseQuantums,
    ) -> Self {
        Self {
            subaccount_id,
            clob_pair_id,
            perpetual_id,
            side,
            quantums,
        }
    }
}

/// Anything that can walk the book as a taker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchableOrder {
    Order(Order),
    Liquidation(LiquidationOrder),
}

impl MatchableOrder {
    pub fn subaccount_id(&self) -> &SubaccountId {
        match self {
            MatchableOrder::Order(order) => order.subaccount_id(),
            MatchableOrder::Liquidation(liquidation) => &liquidation.subaccount_id,
        }
    }

    pub fn clob_pair_id(&self) -> ClobPairId {
        match self {
            MatchableOrder::Order(order) => order.clob_pair_id(),
            MatchableOrder::Liquidation(liquidation) => liquidation.clob_pair_id,
        }
    }

    pub fn side(&self) -> Side {
        match self {
            MatchableOrder::Order(order) => order.side,
            MatchableOrder::Liquidation(liquidation) => liquidation.side,
        }
    }

    pub fn is_buy(&self) -> bool {
        self.side().is_buy()
    }

    pub fn quantums(&self) -> BaseQuantums {
        match self {
            MatchableOrder::Order(order) => order.quantums,
            MatchableOrder::Liquidation(liquidation) => liquidation.quantums,
        }
    }

    /// Price limit of the taker. Liquidations walk until filled or the book
    /// side is exhausted.
    pub fn limit_subticks(&self) -> Option<Subticks> {
        match self {
            MatchableOrder::Order(order) => Some(order.subticks),
            MatchableOrder::Liquidation(_) => None,
        }
    }

    pub fn is_liquidation(&self) -> bool {
        matches!(self, MatchableOrder::Liquidation(_))
    }

    pub fn is_reduce_only(&self) -> bool {
        match self {
            MatchableOrder::Order(order) => order.reduce_only,
            MatchableOrder::Liquidation(_) => false,
        }
    }

    pub fn is_post_only(&self) -> bool {
        match self {
            MatchableOrder::Order(order) => order.is_post_only(),
            MatchableOrder::Liquidation(_) => false,
        }
    }

    pub fn order(&self) -> Option<&Order> {
        match self {
            MatchableOrder::Order(order) => Some(order),
            MatchableOrder::Liquidation(_) => None,
        }
    }

    /// Id of a regular taker. Liquidations have no order id.
    pub fn order_id(&self) -> Option<&OrderId> {
        self.order().map(|order| &order.order_id)
    }

    pub fn order_hash(&self) -> Option<OrderHash> {
        self.order().map(Order::hash)
    }
}

impl From<Order> for MatchableOrder {
    fn from(order: Order) -> Self {
        MatchableOrder::Order(order)
    }
}

impl From<LiquidationOrder> for MatchableOrder {
    fn from(liquidation: LiquidationOrder) -> Self {
        MatchableOrder::Liquidation(liquidation)
    }
}
