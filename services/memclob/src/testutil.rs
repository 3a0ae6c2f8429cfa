//! In-memory keeper for tests and benches
//!
//! Tracks fill amounts and positions in plain maps and lets a test script
//! collateral failures, risk-limit breaches, deleveraging counterparties and
//! stored long-term orders. Perpetual ids are treated as equal to the market
//! id of the same number.

use std::collections::{HashMap, HashSet};
use types::errors::ValidationError;
use types::ids::{ClobPairId, OrderId, SubaccountId};
use types::liquidation::MatchableOrder;
use types::numeric::BaseQuantums;
use types::operations::DeleveragingFill;
use types::order::{Order, OrderStatus};

use crate::keeper::{
    CollateralCheck, CollateralGate, DeleverageGate, EquityTierGate, FillLedger, PositionQuery, RiskLimit,
    StateBranch, StatefulOrderStore,
};

#[derive(Debug, Clone, Default)]
struct KeeperState {
    fills: HashMap<OrderId, BaseQuantums>,
    positions: HashMap<(SubaccountId, ClobPairId), i128>,
    taker_matches: HashMap<SubaccountId, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryKeeper {
    state: KeeperState,
    branches: Vec<KeeperState>,
    undercollateralized: HashSet<SubaccountId>,
    taker_fail_after: HashMap<SubaccountId, usize>,
    add_to_book_failures: HashSet<OrderId>,
    risk_limit: Option<RiskLimit>,
    deleverage_counterparties: HashMap<SubaccountId, SubaccountId>,
    long_term_orders: HashMap<OrderId, Order>,
    equity_tier_rejects: HashSet<SubaccountId>,
    commits: usize,
    discards: usize,
}

impl InMemoryKeeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_position(&mut self, subaccount_id: &SubaccountId, clob_pair_id: ClobPairId, size: i128) {
        self.state
            .positions
            .insert((subaccount_id.clone(), clob_pair_id), size);
    }

    pub fn set_filled(&mut self, order_id: &OrderId, filled: BaseQuantums) {
        self.state.fills.insert(order_id.clone(), filled);
    }

    /// Every match involving the subaccount fails its collateral check, and
    /// its orders fail the add-to-book check.
    pub fn mark_undercollateralized(&mut self, subaccount_id: SubaccountId) {
        self.undercollateralized.insert(subaccount_id);
    }

    /// The subaccount passes `matches` collateral checks as a taker, then fails.
    pub fn fail_taker_after_fills(&mut self, subaccount_id: SubaccountId, matches: usize) {
        self.taker_fail_after.insert(subaccount_id, matches);
    }

    pub fn fail_add_to_book(&mut self, order_id: OrderId) {
        self.add_to_book_failures.insert(order_id);
    }

    /// Liquidation takers hit `risk_limit` on every match.
    pub fn set_risk_limit(&mut self, risk_limit: Option<RiskLimit>) {
        self.risk_limit = risk_limit;
    }

    /// Allow `subaccount_id` to be deleveraged against `counterparty`.
    pub fn allow_deleveraging(&mut self, subaccount_id: SubaccountId, counterparty: SubaccountId) {
        self.deleverage_counterparties.insert(subaccount_id, counterparty);
    }

    pub fn store_long_term_order(&mut self, order: Order) {
        self.long_term_orders.insert(order.order_id.clone(), order);
    }

    pub fn remove_long_term_order(&mut self, order_id: &OrderId) {
        self.long_term_orders.remove(order_id);
    }

    pub fn reject_equity_tier(&mut self, subaccount_id: SubaccountId) {
        self.equity_tier_rejects.insert(subaccount_id);
    }

    /// Open branches.
    pub fn branch_depth(&self) -> usize {
        self.branches.len()
    }

    pub fn commits(&self) -> usize {
        self.commits
    }

    pub fn discards(&self) -> usize {
        self.discards
    }

    fn taker_fails(&self, subaccount_id: &SubaccountId) -> bool {
        if self.undercollateralized.contains(subaccount_id) {
            return true;
        }
        match self.taker_fail_after.get(subaccount_id) {
            Some(limit) => self.state.taker_matches.get(subaccount_id).copied().unwrap_or(0) >= *limit,
            None => false,
        }
    }

    fn apply_fill(&mut self, subaccount_id: &SubaccountId, clob_pair_id: ClobPairId, is_buy: bool, fill: BaseQuantums) {
        *self
            .state
            .positions
            .entry((subaccount_id.clone(), clob_pair_id))
            .or_default() += fill.signed(is_buy);
    }
}

impl CollateralGate for InMemoryKeeper {
    fn process_single_match(&mut self, taker: &MatchableOrder, maker: &Order, fill_amount: BaseQuantums) -> CollateralCheck {
        if taker.is_liquidation() {
            if let Some(risk_limit) = self.risk_limit {
                return CollateralCheck::RiskLimitBreach(risk_limit);
            }
        }

        let maker_fails = self.undercollateralized.contains(maker.subaccount_id());
        let taker_fails = self.taker_fails(taker.subaccount_id());
        match (maker_fails, taker_fails) {
            (true, true) => return CollateralCheck::MakerAndTakerFailed,
            (true, false) => return CollateralCheck::MakerFailed,
            (false, true) => return CollateralCheck::TakerFailed,
            (false, false) => {}
        }

        let clob_pair_id = taker.clob_pair_id();
        *self.state.fills.entry(maker.order_id.clone()).or_default() += fill_amount;
        if let Some(order_id) = taker.order_id() {
            *self.state.fills.entry(order_id.clone()).or_default() += fill_amount;
        }
        self.apply_fill(maker.subaccount_id(), clob_pair_id, maker.is_buy(), fill_amount);
        self.apply_fill(taker.subaccount_id(), clob_pair_id, taker.is_buy(), fill_amount);
        *self
            .state
            .taker_matches
            .entry(taker.subaccount_id().clone())
            .or_default() += 1;
        CollateralCheck::Success
    }

    fn check_add_to_book(&mut self, order: &Order, _remaining: BaseQuantums) -> OrderStatus {
        if self.add_to_book_failures.contains(&order.order_id)
            || self.undercollateralized.contains(order.subaccount_id())
        {
            OrderStatus::Undercollateralized
        } else {
            OrderStatus::Success
        }
    }
}

impl PositionQuery for InMemoryKeeper {
    fn position_size(&self, subaccount_id: &SubaccountId, clob_pair_id: ClobPairId) -> i128 {
        self.state
            .positions
            .get(&(subaccount_id.clone(), clob_pair_id))
            .copied()
            .unwrap_or(0)
    }
}

impl EquityTierGate for InMemoryKeeper {
    fn validate_equity_tier(&self, order: &Order) -> Result<(), ValidationError> {
        if self.equity_tier_rejects.contains(order.subaccount_id()) {
            return Err(ValidationError::EquityTierExceeded {
                reason: format!("subaccount {} has no open order allowance", order.subaccount_id()),
            });
        }
        Ok(())
    }
}

impl FillLedger for InMemoryKeeper {
    fn filled_amount(&self, order_id: &OrderId) -> Option<BaseQuantums> {
        self.state.fills.get(order_id).copied()
    }
}

impl DeleverageGate for InMemoryKeeper {
    fn can_deleverage(&self, subaccount_id: &SubaccountId, _perpetual_id: u32) -> bool {
        self.deleverage_counterparties.contains_key(subaccount_id)
    }

    fn offset_position(
        &mut self,
        subaccount_id: &SubaccountId,
        perpetual_id: u32,
        delta: i128,
        _is_final_settlement: bool,
    ) -> (Vec<DeleveragingFill>, i128) {
        let Some(counterparty) = self.deleverage_counterparties.get(subaccount_id).cloned() else {
            return (Vec::new(), delta);
        };
        let Ok(fill_amount) = u64::try_from(delta.unsigned_abs()) else {
            return (Vec::new(), delta);
        };
        if fill_amount == 0 {
            return (Vec::new(), delta);
        }

        let clob_pair_id = ClobPairId(perpetual_id);
        *self
            .state
            .positions
            .entry((subaccount_id.clone(), clob_pair_id))
            .or_default() += delta;
        *self
            .state
            .positions
            .entry((counterparty.clone(), clob_pair_id))
            .or_default() -= delta;
        (
            vec![DeleveragingFill {
                offsetting_subaccount_id: counterparty,
                fill_amount: BaseQuantums(fill_amount),
            }],
            0,
        )
    }
}

impl StatefulOrderStore for InMemoryKeeper {
    fn long_term_order(&self, order_id: &OrderId) -> Option<Order> {
        self.long_term_orders.get(order_id).cloned()
    }
}

impl StateBranch for InMemoryKeeper {
    fn branch(&mut self) {
        self.branches.push(self.state.clone());
    }

    fn commit(&mut self) {
        self.branches.pop();
        self.commits += 1;
    }

    fn discard(&mut self) {
        if let Some(snapshot) = self.branches.pop() {
            self.state = snapshot;
        }
        self.discards += 1;
    }
}
