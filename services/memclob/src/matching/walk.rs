//! Taker walk
//!
//! Walks the opposite side of one book in price-time priority, resizing and
//! evicting makers inline and consulting the collateral gate for every fill.
//! The walk never mutates the book: evictions and fills are returned for the
//! caller to apply once it has decided to keep the outcome.

use tracing::debug;
use types::errors::InvariantViolation;
use types::liquidation::MatchableOrder;
use types::numeric::BaseQuantums;
use types::operations::MakerFill;
use types::order::{Order, OrderStatus, RemovalReason};

use crate::book::Orderbook;
use crate::keeper::{remaining_amount, CollateralCheck, CollateralGate, FillLedger, PositionQuery};
use crate::matching::crossing::taker_crosses;
use crate::matching::reduce_only::resize_reduce_only_fill;

/// Maker the walk decided to drop from the book
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakerEviction {
    pub order: Order,
    pub reason: RemovalReason,
}

/// Everything a walk produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkOutcome {
    /// Fills in match order
    pub fills: Vec<MakerFill>,
    /// Makers that filled, in match order
    pub matched_makers: Vec<Order>,
    pub evictions: Vec<MakerEviction>,
    pub status: OrderStatus,
    /// Taker size left after the walk
    pub remaining: BaseQuantums,
    pub filled: BaseQuantums,
}

impl WalkOutcome {
    fn new(remaining: BaseQuantums) -> Self {
        Self {
            fills: Vec::new(),
            matched_makers: Vec::new(),
            evictions: Vec::new(),
            status: OrderStatus::Success,
            remaining,
            filled: BaseQuantums::zero(),
        }
    }

    fn evict(&mut self, maker: &Order, reason: RemovalReason) {
        debug!(order_id = %maker.order_id, ?reason, "Evicting maker order");
        self.evictions.push(MakerEviction {
            order: maker.clone(),
            reason,
        });
    }

    fn record_fill(&mut self, maker: &Order, fill_amount: BaseQuantums) {
        self.fills.push(MakerFill {
            maker_order_id: maker.order_id.clone(),
            fill_amount,
        });
        self.matched_makers.push(maker.clone());
        self.remaining -= fill_amount;
        self.filled += fill_amount;
    }

    pub fn has_fills(&self) -> bool {
        !self.fills.is_empty()
    }
}

/// Walks one order book for one taker
pub struct MatchingEngine<'a, K: ?Sized> {
    book: &'a Orderbook,
    keeper: &'a mut K,
}

impl<'a, K> MatchingEngine<'a, K>
where
    K: CollateralGate + PositionQuery + FillLedger + ?Sized,
{
    pub fn new(book: &'a Orderbook, keeper: &'a mut K) -> Self {
        Self { book, keeper }
    }

    /// Match `taker` against the book until it is filled, stops crossing,
    /// exhausts the book or is stopped by the collateral gate.
    ///
    /// `taker_remaining` is the taker's unfilled size before the walk.
    pub fn walk(&mut self, taker: &MatchableOrder, taker_remaining: BaseQuantums) -> Result<WalkOutcome, InvariantViolation> {
        let book = self.book;
        let clob_pair_id = book.clob_pair().id;
        let taker_side = taker.side();
        let limit = taker.limit_subticks();
        let mut outcome = WalkOutcome::new(taker_remaining);

        let mut cursor = book.best_on_side(taker_side.opposite());
        while let Some(handle) = cursor {
            if outcome.remaining.is_zero() {
                break;
            }
            cursor = book.next_after(handle);
            let Some(maker) = book.order_at(handle) else {
                break;
            };
            if !taker_crosses(taker_side, limit, maker.subticks) {
                break;
            }

            // The resting version of a replacement is removed by the caller
            if taker.order_id() == Some(&maker.order_id) {
                continue;
            }
            if maker.subaccount_id() == taker.subaccount_id() {
                outcome.evict(maker, RemovalReason::InvalidSelfTrade);
                continue;
            }

            let maker_remaining =
                remaining_amount(&*self.keeper, maker).ok_or_else(|| InvariantViolation::NoRemainingSize {
                    order_id: maker.order_id.clone(),
                })?;
            let mut fill_amount = outcome.remaining.min(maker_remaining);

            if maker.reduce_only {
                let position = self.keeper.position_size(maker.subaccount_id(), clob_pair_id);
                fill_amount = resize_reduce_only_fill(position, maker.is_buy(), fill_amount);
                if fill_amount.is_zero() {
                    outcome.evict(maker, RemovalReason::InvalidReduceOnly);
                    continue;
                }
            }
            if let Some(order) = taker.order().filter(|order| order.reduce_only) {
                let position = self.keeper.position_size(order.subaccount_id(), clob_pair_id);
                fill_amount = resize_reduce_only_fill(position, order.is_buy(), fill_amount);
                if fill_amount.is_zero() {
                    return Err(InvariantViolation::TakerReduceOnlyResizedToZero {
                        order_id: order.order_id.clone(),
                    });
                }
            }

            match self.keeper.process_single_match(taker, maker, fill_amount) {
                CollateralCheck::Success => {}
                CollateralCheck::MakerFailed => {
                    outcome.evict(maker, RemovalReason::Undercollateralized);
                    continue;
                }
                CollateralCheck::TakerFailed => {
                    if taker.is_liquidation() {
                        continue;
                    }
                    outcome.status = OrderStatus::Undercollateralized;
                    break;
                }
                CollateralCheck::MakerAndTakerFailed => {
                    outcome.evict(maker, RemovalReason::Undercollateralized);
                    if taker.is_liquidation() {
                        continue;
                    }
                    outcome.status = OrderStatus::Undercollateralized;
                    break;
                }
                CollateralCheck::RiskLimitBreach(risk_limit) => {
                    debug!(?risk_limit, "Walk stopped by risk limit");
                    outcome.status = risk_limit.order_status();
                    break;
                }
            }

            if taker.is_post_only() {
                outcome.status = OrderStatus::PostOnlyWouldCrossMakerOrder;
                break;
            }

            outcome.record_fill(maker, fill_amount);

            if let Some(order) = taker.order().filter(|order| order.reduce_only) {
                let position = self.keeper.position_size(order.subaccount_id(), clob_pair_id);
                if position == 0 && !outcome.remaining.is_zero() {
                    outcome.status = OrderStatus::ReduceOnlyResized;
                    break;
                }
            }
        }

        Ok(outcome)
    }
}
