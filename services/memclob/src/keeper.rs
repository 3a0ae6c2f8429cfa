//! Capabilities the order book consumes but does not own
//!
//! Balances, positions, fill amounts and margin live outside the order book.
//! The book reaches them through the narrow traits below, bundled as
//! [`ClobKeeper`]. The keeper is installed after construction with
//! `MemClob::set_keeper`, so the keeper never has to hold the book.

use types::errors::ValidationError;
use types::ids::{ClobPairId, OrderId, SubaccountId};
use types::liquidation::MatchableOrder;
use types::numeric::BaseQuantums;
use types::operations::DeleveragingFill;
use types::order::{Order, OrderStatus};

/// Liquidation-specific limit that stops a walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLimit {
    /// The insurance fund cannot cover the loss; the position must be deleveraged.
    InsuranceFundInsufficient,
    MaxNotionalLiquidatedExceeded,
    MaxInsuranceLostExceeded,
}

impl RiskLimit {
    pub fn order_status(&self) -> OrderStatus {
        match self {
            RiskLimit::InsuranceFundInsufficient => OrderStatus::LiquidationRequiresDeleveraging,
            RiskLimit::MaxNotionalLiquidatedExceeded => {
                OrderStatus::LiquidationExceededSubaccountMaxNotionalLiquidated
            }
            RiskLimit::MaxInsuranceLostExceeded => {
                OrderStatus::LiquidationExceededSubaccountMaxInsuranceLost
            }
        }
    }
}

/// Result of the per-fill collateral check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollateralCheck {
    /// Fill applied to the (branched) external state.
    Success,
    MakerFailed,
    TakerFailed,
    MakerAndTakerFailed,
    RiskLimitBreach(RiskLimit),
}

/// Applies a single fill to balances and positions if both parties remain
/// collateralized.
pub trait CollateralGate {
    fn process_single_match(
        &mut self,
        taker: &MatchableOrder,
        maker: &Order,
        fill_amount: BaseQuantums,
    ) -> CollateralCheck;

    /// Check that the remainder of `order` may rest on the book. Returns
    /// `Success` or the failing status.
    fn check_add_to_book(&mut self, order: &Order, remaining: BaseQuantums) -> OrderStatus;
}

pub trait PositionQuery {
    /// Signed position size: positive long, negative short.
    fn position_size(&self, subaccount_id: &SubaccountId, clob_pair_id: ClobPairId) -> i128;
}

pub trait EquityTierGate {
    /// Reject orders that would exceed the subaccount's open-order allowance.
    fn validate_equity_tier(&self, order: &Order) -> Result<(), ValidationError>;
}

pub trait FillLedger {
    /// Total filled amount of an order, `None` if it never filled.
    fn filled_amount(&self, order_id: &OrderId) -> Option<BaseQuantums>;
}

pub trait DeleverageGate {
    fn can_deleverage(&self, subaccount_id: &SubaccountId, perpetual_id: u32) -> bool;

    /// Offset up to `delta` of the position against counterparties. Returns the
    /// fills and the part of `delta` that could not be offset.
    fn offset_position(
        &mut self,
        subaccount_id: &SubaccountId,
        perpetual_id: u32,
        delta: i128,
        is_final_settlement: bool,
    ) -> (Vec<DeleveragingFill>, i128);
}

pub trait StatefulOrderStore {
    /// Current placement of a long-lived order, if it still exists.
    fn long_term_order(&self, order_id: &OrderId) -> Option<Order>;
}

/// Speculative branch of the external execution state.
///
/// Branches nest: every `branch` is closed by exactly one `commit` or
/// `discard`.
pub trait StateBranch {
    fn branch(&mut self);
    fn commit(&mut self);
    fn discard(&mut self);
}

/// Every capability the order book needs.
pub trait ClobKeeper:
    CollateralGate
    + PositionQuery
    + EquityTierGate
    + FillLedger
    + DeleverageGate
    + StatefulOrderStore
    + StateBranch
{
}

impl<T> ClobKeeper for T where
    T: CollateralGate
        + PositionQuery
        + EquityTierGate
        + FillLedger
        + DeleverageGate
        + StatefulOrderStore
        + StateBranch
{
}

/// Remaining size of `order` according to the fill ledger, `None` once fully filled.
pub fn remaining_amount<K: FillLedger + ?Sized>(keeper: &K, order: &Order) -> Option<BaseQuantums> {
    let filled = keeper.filled_amount(&order.order_id).unwrap_or_default();
    if filled >= order.quantums {
        None
    } else {
        Some(order.quantums - filled)
    }
}
