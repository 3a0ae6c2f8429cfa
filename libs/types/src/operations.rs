//! Operations proposed for the next block and replayed for determinism
//!
//! The operations queue is the canonical, ordered record of everything the
//! local order book did since the last commit: placements that took part in a
//! match or must be re-placed, matches, deleveraging and removals of
//! long-lived orders.

use crate::ids::{ClobPairId, OrderId, SubaccountId};
use crate::numeric::BaseQuantums;
use crate::order::{Order, RemovalReason, Side};
use serde::{Deserialize, Serialize};

/// Fill against a single maker order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakerFill {
    pub maker_order_id: OrderId,
    pub fill_amount: BaseQuantums,
}

/// Regular taker matched against one or more makers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchOrders {
    pub taker_order_id: OrderId,
    pub fills: Vec<MakerFill>,
}

/// Liquidation taker matched against one or more makers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPerpetualLiquidation {
    pub liquidated: SubaccountId,
    pub clob_pair_id: ClobPairId,
    pub perpetual_id: u32,
    pub total_size: BaseQuantums,
    pub side: Side,
    pub fills: Vec<MakerFill>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "match")]
pub enum ClobMatch {
    Orders(MatchOrders),
    PerpetualLiquidation(MatchPerpetualLiquidation),
}

impl ClobMatch {
    pub fn fills(&self) -> &[MakerFill] {
        match self {
            ClobMatch::Orders(m) => &m.fills,
            ClobMatch::PerpetualLiquidation(m) => &m.fills,
        }
    }
}

/// Position offset against one counterparty during deleveraging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleveragingFill {
    pub offsetting_subaccount_id: SubaccountId,
    pub fill_amount: BaseQuantums,
}

/// Forced offset of a position. `fills` may be empty (zero-fill deleveraging).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPerpetualDeleveraging {
    pub liquidated: SubaccountId,
    pub perpetual_id: u32,
    pub fills: Vec<DeleveragingFill>,
    pub is_final_settlement: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRemoval {
    pub order_id: OrderId,
    pub reason: RemovalReason,
}

/// Entry of the local operations queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "operation")]
pub enum InternalOperation {
    ShortTermOrderPlacement(Order),
    /// Long-lived order placed in this block
    StatefulOrderPlacement(Order),
    /// Long-lived order placed in an earlier block that took part in a match
    PreexistingStatefulOrder(OrderId),
    Match(ClobMatch),
    Deleveraging(MatchPerpetualDeleveraging),
    OrderRemoval(OrderRemoval),
}

/// Entry of the block proposal. Short-term placements are carried as the
/// raw transaction bytes they arrived in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "operation")]
pub enum ProposedOperation {
    ShortTermOrderPlacement(Vec<u8>),
    StatefulOrderPlacement(Order),
    Match(ClobMatch),
    Deleveraging(MatchPerpetualDeleveraging),
    OrderRemoval(OrderRemoval),
}
