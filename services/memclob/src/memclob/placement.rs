//! Order placement, cancellation, liquidation and deleveraging
//!
//! Every walk runs inside a keeper branch. Rejections decided after the walk
//! (fill-or-kill remainder, post-only cross) discard the branch and leave the
//! book untouched. A rejected fill-or-kill order never reaches the ledger.
//! Every other outcome is applied and committed.

use std::collections::BTreeMap;
use tracing::{debug, error, info};
use types::errors::{CancelError, ClobError, InvariantViolation, MatchingRejection};
use types::ids::{OrderId, SubaccountId};
use types::liquidation::{LiquidationOrder, MatchableOrder};
use types::numeric::BaseQuantums;
use types::operations::{
    ClobMatch, MakerFill, MatchOrders, MatchPerpetualDeleveraging, MatchPerpetualLiquidation,
};
use types::order::{Order, OrderStatus, RemovalReason, TimeInForce};

use super::MemClob;
use crate::keeper::{remaining_amount, ClobKeeper};
use crate::matching::{MatchingEngine, WalkOutcome};
use crate::offchain::RemovalStatus;

/// Result of placing an order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderOutcome {
    pub status: OrderStatus,
    /// Size filled by this placement
    pub filled: BaseQuantums,
    pub fills: Vec<MakerFill>,
    /// Whether the remainder now rests on the book
    pub resting: bool,
}

/// Result of placing a liquidation order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiquidationOutcome {
    pub status: OrderStatus,
    pub filled: BaseQuantums,
    pub fills: Vec<MakerFill>,
    /// Position size offset by deleveraging after the walk
    pub quantums_deleveraged: u128,
}

impl<K: ClobKeeper> MemClob<K> {
    /// Validate, match and possibly rest an order.
    ///
    /// `tx_bytes` are the raw bytes of the placement transaction. They are
    /// kept for short-term orders so the placement can be proposed later.
    pub fn place_order(&mut self, order: Order, tx_bytes: Vec<u8>) -> Result<PlaceOrderOutcome, ClobError> {
        let clob_pair_id = order.clob_pair_id();
        if let Err(err) = self.validate_order(&order) {
            debug!(order_id = %order.order_id, error = %err, "Order failed validation");
            return Err(err);
        }

        let placed = self.match_and_rest(order, tx_bytes);
        self.ensure_not_crossed(clob_pair_id)?;
        placed
    }

    fn match_and_rest(&mut self, order: Order, tx_bytes: Vec<u8>) -> Result<PlaceOrderOutcome, ClobError> {
        let order_id = order.order_id.clone();
        let replaces_resting = self.market(order.clob_pair_id())?.book.contains(&order_id);

        let remaining = remaining_amount(self.require_keeper()?, &order).ok_or_else(|| {
            InvariantViolation::NoRemainingSize {
                order_id: order_id.clone(),
            }
        })?;
        let taker = MatchableOrder::from(order.clone());
        let outcome = self.run_walk(&taker, remaining)?;

        if order.time_in_force == TimeInForce::FOK && !outcome.remaining.is_zero() {
            self.require_keeper_mut()?.discard();
            self.reject_unmatched(&order, replaces_resting, RemovalReason::FokUnfilled);
            debug!(order_id = %order_id, remaining = %outcome.remaining, "Fill-or-kill order not filled");
            return Err(MatchingRejection::FillOrKillNotFilled {
                order_id,
                remaining: outcome.remaining,
            }
            .into());
        }
        if outcome.status == OrderStatus::PostOnlyWouldCrossMakerOrder {
            self.require_keeper_mut()?.discard();
            if order.is_stateful() && !replaces_resting {
                self.ledger
                    .record_removal(&order_id, RemovalReason::PostOnlyWouldCrossMakerOrder);
            }
            self.reject_unmatched(&order, replaces_resting, RemovalReason::PostOnlyWouldCrossMakerOrder);
            debug!(order_id = %order_id, "Post-only order would cross");
            return Err(MatchingRejection::PostOnlyWouldCrossMakerOrder { order_id }.into());
        }

        if replaces_resting {
            self.outbox
                .remove(&order_id, RemovalReason::Replaced, RemovalStatus::BestEffortCanceled);
        }
        self.outbox.place(&order);

        match self.settle_order(&taker, &order, &outcome, &tx_bytes) {
            Ok(placed) => {
                self.require_keeper_mut()?.commit();
                debug!(
                    order_id = %order_id,
                    status = ?placed.status,
                    filled = %placed.filled,
                    resting = placed.resting,
                    "Placed order"
                );
                Ok(placed)
            }
            Err(err) => {
                self.require_keeper_mut()?.discard();
                error!(order_id = %order_id, error = %err, "Failed to apply placement");
                Err(err)
            }
        }
    }

    /// Branch the keeper and walk the book. The branch is discarded if the
    /// walk fails; otherwise the caller must close it.
    fn run_walk(&mut self, taker: &MatchableOrder, remaining: BaseQuantums) -> Result<WalkOutcome, ClobError> {
        let clob_pair_id = taker.clob_pair_id();
        let Self { markets, keeper, .. } = self;
        let keeper = keeper.as_mut().ok_or(ClobError::KeeperNotSet)?;
        let market = markets
            .get(&clob_pair_id)
            .ok_or(ClobError::MarketNotFound { clob_pair_id })?;

        keeper.branch();
        let walked = MatchingEngine::new(&market.book, &mut *keeper).walk(taker, remaining);
        match walked {
            Ok(outcome) => Ok(outcome),
            Err(violation) => {
                keeper.discard();
                error!(clob_pair_id = %clob_pair_id, error = %violation, "Matching walk failed");
                Err(violation.into())
            }
        }
    }

    /// Report an order rejected after a discarded walk. A rejected
    /// replacement leaves the resting version in place, so nothing is sent
    /// for its id.
    fn reject_unmatched(&mut self, order: &Order, replaces_resting: bool, reason: RemovalReason) {
        if replaces_resting {
            return;
        }
        self.outbox.place(order);
        self.outbox
            .remove(&order.order_id, reason, RemovalStatus::BestEffortCanceled);
    }

    fn reject_taker(&mut self, order: &Order, reason: RemovalReason) {
        if order.is_stateful() {
            self.ledger.record_removal(&order.order_id, reason);
        }
        self.outbox
            .remove(&order.order_id, reason, RemovalStatus::BestEffortCanceled);
    }

    /// Apply a kept walk for a regular order, then rest or drop the remainder.
    fn settle_order(
        &mut self,
        taker: &MatchableOrder,
        order: &Order,
        outcome: &WalkOutcome,
        tx_bytes: &[u8],
    ) -> Result<PlaceOrderOutcome, ClobError> {
        self.apply_walk(taker, outcome, tx_bytes)?;

        let order_id = &order.order_id;
        let mut status = outcome.status;
        let mut resting = false;

        if let Some(reason) = status.removal_reason() {
            self.reject_taker(order, reason);
        } else if outcome.remaining.is_zero() {
            self.outbox.update(order_id, order.quantums);
        } else if order.time_in_force == TimeInForce::IOC {
            status = OrderStatus::ImmediateOrCancelWouldRestOnBook;
            if order.is_stateful() {
                self.ledger
                    .record_removal(order_id, RemovalReason::ConditionalIocWouldRestOnBook);
            }
            self.outbox.remove(
                order_id,
                RemovalReason::ImmediateOrCancelWouldRestOnBook,
                RemovalStatus::BestEffortCanceled,
            );
        } else {
            let check = self.require_keeper_mut()?.check_add_to_book(order, outcome.remaining);
            match check.removal_reason() {
                None => {
                    self.ledger.mark_add_to_book_checked(order);
                    if order.is_short_term() && !self.ledger.is_order_placement_queued(order) {
                        self.ledger.store_tx_bytes(order, tx_bytes.to_vec());
                    }
                    self.market_mut(order.clob_pair_id())?
                        .book
                        .insert(order.clone(), false)?;
                    self.outbox.update(order_id, order.quantums - outcome.remaining);
                    resting = true;
                }
                Some(reason) => {
                    status = check;
                    self.reject_taker(order, reason);
                }
            }
        }

        Ok(PlaceOrderOutcome {
            status,
            filled: outcome.filled,
            fills: outcome.fills.clone(),
            resting,
        })
    }

    /// Apply evictions and fills of a kept walk to the books and the ledger.
    fn apply_walk(&mut self, taker: &MatchableOrder, outcome: &WalkOutcome, tx_bytes: &[u8]) -> Result<(), ClobError> {
        for eviction in &outcome.evictions {
            let order_id = &eviction.order.order_id;
            self.remove_resting_order(order_id)?;
            if eviction.order.is_stateful() {
                self.ledger.record_removal(order_id, eviction.reason);
            }
            self.outbox
                .remove(order_id, eviction.reason, RemovalStatus::BestEffortCanceled);
        }

        // The replaced version never rests next to its replacement
        if let Some(order_id) = taker.order_id() {
            self.remove_if_resting(order_id)?;
        }

        if outcome.has_fills() {
            self.record_matches(taker, outcome, tx_bytes)?;
            self.cancel_flipped_reduce_only_orders(taker, outcome)?;
        }
        Ok(())
    }

    fn record_matches(&mut self, taker: &MatchableOrder, outcome: &WalkOutcome, tx_bytes: &[u8]) -> Result<(), ClobError> {
        if let Some(order) = taker.order() {
            self.ledger.update_matched_order(order)?;
        }
        for maker in &outcome.matched_makers {
            self.ledger.update_matched_order(maker)?;
            if self.ledger.is_placement_recorded(&maker.order_id) {
                continue;
            }
            if maker.is_stateful() {
                self.ledger.record_preexisting_stateful_order(&maker.order_id);
            } else {
                self.ledger.record_placement(maker);
            }
        }

        let clob_match = match taker {
            MatchableOrder::Order(order) => {
                // Bytes of a version that is not queued are kept only if it rests
                if self.ledger.record_placement(order) && order.is_short_term() {
                    self.ledger.store_tx_bytes(order, tx_bytes.to_vec());
                }
                ClobMatch::Orders(MatchOrders {
                    taker_order_id: order.order_id.clone(),
                    fills: outcome.fills.clone(),
                })
            }
            MatchableOrder::Liquidation(liquidation) => ClobMatch::PerpetualLiquidation(MatchPerpetualLiquidation {
                liquidated: liquidation.subaccount_id.clone(),
                clob_pair_id: liquidation.clob_pair_id,
                perpetual_id: liquidation.perpetual_id,
                total_size: liquidation.quantums,
                side: liquidation.side,
                fills: outcome.fills.clone(),
            }),
        };
        self.ledger.record_match(clob_match);

        for maker in &outcome.matched_makers {
            let filled = self
                .require_keeper()?
                .filled_amount(&maker.order_id)
                .unwrap_or_default();
            if filled > maker.quantums {
                return Err(InvariantViolation::FillExceedsOrderSize {
                    order_id: maker.order_id.clone(),
                }
                .into());
            }
            if filled == maker.quantums {
                self.remove_resting_order(&maker.order_id)?;
            }
            self.outbox.update(&maker.order_id, filled);
        }
        Ok(())
    }

    /// Cancel resting reduce-only orders of every subaccount whose position
    /// changed sign during the walk.
    fn cancel_flipped_reduce_only_orders(&mut self, taker: &MatchableOrder, outcome: &WalkOutcome) -> Result<(), ClobError> {
        let clob_pair_id = taker.clob_pair_id();
        let mut deltas: BTreeMap<SubaccountId, i128> = BTreeMap::new();
        for (fill, maker) in outcome.fills.iter().zip(&outcome.matched_makers) {
            *deltas.entry(maker.subaccount_id().clone()).or_default() += fill.fill_amount.signed(maker.is_buy());
            *deltas.entry(taker.subaccount_id().clone()).or_default() += fill.fill_amount.signed(taker.is_buy());
        }

        for (subaccount_id, delta) in deltas {
            let after = self.require_keeper()?.position_size(&subaccount_id, clob_pair_id);
            let before = after - delta;
            if after.signum() == before.signum() {
                continue;
            }

            let order_ids = self.market(clob_pair_id)?.book.reduce_only_orders_for(&subaccount_id);
            if !order_ids.is_empty() {
                info!(
                    subaccount_id = %subaccount_id,
                    count = order_ids.len(),
                    "Position changed sign, canceling reduce-only orders"
                );
            }
            for order_id in order_ids {
                let order = self.remove_resting_order(&order_id)?;
                if order.is_stateful() {
                    self.ledger.record_removal(&order_id, RemovalReason::InvalidReduceOnly);
                }
                self.outbox.remove(
                    &order_id,
                    RemovalReason::InvalidReduceOnly,
                    RemovalStatus::BestEffortCanceled,
                );
            }
        }
        Ok(())
    }

    /// Cancel a short-term order through `til_block`.
    ///
    /// A resting order that expires at or before `til_block` is removed. The
    /// cancellation is recorded either way and rejects placements of the same
    /// id that expire at or before it.
    pub fn cancel_order(&mut self, order_id: &OrderId, til_block: u32) -> Result<(), ClobError> {
        if !order_id.is_short_term() {
            return Err(CancelError::NotShortTerm {
                order_id: order_id.clone(),
            }
            .into());
        }

        let market = self.market(order_id.clob_pair_id)?;
        if let Some(existing_til_block) = market.cancels.lookup(order_id) {
            if existing_til_block >= til_block {
                return Err(CancelError::AlreadyExists {
                    order_id: order_id.clone(),
                    existing_til_block,
                    til_block,
                }
                .into());
            }
        }

        let cancels_resting = market
            .book
            .get(order_id)
            .and_then(Order::good_til_block)
            .is_some_and(|good_til_block| good_til_block <= til_block);
        if cancels_resting {
            self.remove_resting_order(order_id)?;
        }

        self.market_mut(order_id.clob_pair_id)?
            .cancels
            .record(order_id.clone(), til_block)?;
        self.outbox
            .remove(order_id, RemovalReason::UserCanceled, RemovalStatus::BestEffortCanceled);
        debug!(order_id = %order_id, til_block, removed = cancels_resting, "Canceled order");
        Ok(())
    }

    /// Match a liquidation order against the book. If nothing filled, or the
    /// insurance fund cannot cover further fills, the remainder is offered to
    /// deleveraging.
    pub fn place_liquidation(&mut self, liquidation: LiquidationOrder) -> Result<LiquidationOutcome, ClobError> {
        let clob_pair_id = liquidation.clob_pair_id;
        self.market(clob_pair_id)?;

        let taker = MatchableOrder::from(liquidation.clone());
        let outcome = self.run_walk(&taker, liquidation.quantums)?;
        if let Err(err) = self.apply_walk(&taker, &outcome, &[]) {
            self.require_keeper_mut()?.discard();
            error!(subaccount_id = %liquidation.subaccount_id, error = %err, "Failed to apply liquidation");
            return Err(err);
        }
        self.require_keeper_mut()?.commit();
        info!(
            subaccount_id = %liquidation.subaccount_id,
            clob_pair_id = %clob_pair_id,
            filled = %outcome.filled,
            status = ?outcome.status,
            "Placed liquidation order"
        );

        let mut quantums_deleveraged = 0;
        let needs_deleveraging = outcome.filled.is_zero()
            || outcome.status == OrderStatus::LiquidationRequiresDeleveraging;
        if needs_deleveraging
            && !outcome.remaining.is_zero()
            && self
                .require_keeper()?
                .can_deleverage(&liquidation.subaccount_id, liquidation.perpetual_id)
        {
            let delta = outcome.remaining.signed(liquidation.side.is_buy());
            quantums_deleveraged =
                self.deleverage_subaccount(&liquidation.subaccount_id, liquidation.perpetual_id, delta, false)?;
            if quantums_deleveraged == 0 {
                self.insert_zero_fill_deleveraging(&liquidation.subaccount_id, liquidation.perpetual_id);
            }
        }

        self.ensure_not_crossed(clob_pair_id)?;
        Ok(LiquidationOutcome {
            status: outcome.status,
            filled: outcome.filled,
            fills: outcome.fills,
            quantums_deleveraged,
        })
    }

    /// Offset `delta` of a position against counterparties. Returns the size
    /// actually offset.
    pub fn deleverage_subaccount(
        &mut self,
        subaccount_id: &SubaccountId,
        perpetual_id: u32,
        delta: i128,
        is_final_settlement: bool,
    ) -> Result<u128, ClobError> {
        let (fills, remaining) = self.require_keeper_mut()?.offset_position(
            subaccount_id,
            perpetual_id,
            delta,
            is_final_settlement,
        );
        let deleveraged = delta.saturating_sub(remaining).unsigned_abs();
        if !fills.is_empty() {
            info!(
                subaccount_id = %subaccount_id,
                perpetual_id,
                deleveraged,
                is_final_settlement,
                "Deleveraged subaccount"
            );
            self.ledger.record_deleveraging(MatchPerpetualDeleveraging {
                liquidated: subaccount_id.clone(),
                perpetual_id,
                fills,
                is_final_settlement,
            });
        }
        Ok(deleveraged)
    }

    /// Record a deleveraging attempt that found no counterparty.
    pub fn insert_zero_fill_deleveraging(&mut self, subaccount_id: &SubaccountId, perpetual_id: u32) {
        self.ledger.record_deleveraging(MatchPerpetualDeleveraging {
            liquidated: subaccount_id.clone(),
            perpetual_id,
            fills: Vec::new(),
            is_final_settlement: false,
        });
    }
}
