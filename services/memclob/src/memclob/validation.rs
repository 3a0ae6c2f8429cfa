//! Stateful order validation
//!
//! Checks that depend on the book, the cancellation table, the ledger or the
//! keeper. Nothing here mutates state.

use std::cmp::Ordering;
use types::errors::{ClobError, ValidationError};
use types::order::Order;

use super::MemClob;
use crate::keeper::{remaining_amount, ClobKeeper};
use crate::matching::reduce_only::reduces_position;

impl<K: ClobKeeper> MemClob<K> {
    pub(super) fn validate_order(&self, order: &Order) -> Result<(), ClobError> {
        if !order.side.is_valid() {
            return Err(ValidationError::InvalidSide.into());
        }
        let market = self.market(order.clob_pair_id())?;
        let keeper = self.require_keeper()?;
        let order_id = &order.order_id;

        let clob_pair = market.book.clob_pair();
        if !order.subticks.is_multiple_of(clob_pair.subticks_per_tick) {
            return Err(ValidationError::OffGrid {
                order_id: order_id.clone(),
                reason: format!("price {} is not a multiple of {} subticks", order.subticks, clob_pair.subticks_per_tick),
            }
            .into());
        }
        if order.quantums.is_zero() || order.quantums.value() % clob_pair.step_base_quantums.value() != 0 {
            return Err(ValidationError::OffGrid {
                order_id: order_id.clone(),
                reason: format!("size {} is not a multiple of {}", order.quantums, clob_pair.step_base_quantums),
            }
            .into());
        }

        if let Some(good_til_block) = order.good_til_block() {
            if let Some(cancel_til_block) = market.cancels.lookup(order_id) {
                if cancel_til_block >= good_til_block {
                    return Err(ValidationError::OrderIsCanceled {
                        order_id: order_id.clone(),
                        cancel_til_block,
                    }
                    .into());
                }
            }
        }

        let resting = market.book.get(order_id);
        if let Some(existing) = resting {
            validate_replacement(existing, order)?;
        }
        if let Some(matched) = self.ledger.matched_order(order_id) {
            validate_replacement(matched, order)?;
        }

        // Replacements do not open a new order slot
        if resting.is_none() {
            keeper.validate_equity_tier(order)?;
        }

        let remaining = remaining_amount(keeper, order).unwrap_or_default();
        if remaining.is_zero() || remaining < clob_pair.min_order_base_quantums {
            return Err(ValidationError::OrderFullyFilled {
                order_id: order_id.clone(),
                remaining,
            }
            .into());
        }

        if order.reduce_only {
            let position = keeper.position_size(order.subaccount_id(), order.clob_pair_id());
            if !reduces_position(position, order.is_buy()) {
                return Err(ValidationError::ReduceOnlyWouldIncreasePosition.into());
            }
        }

        if order.requires_immediate_execution() && remaining < order.quantums {
            if resting.is_some() {
                return Err(ValidationError::InvalidReplacement {
                    reason: "an immediate execution order cannot replace a partially filled order".to_string(),
                }
                .into());
            }
            return Err(ValidationError::ImmediateExecutionOrderAlreadyFilled {
                order_id: order_id.clone(),
            }
            .into());
        }

        Ok(())
    }
}

/// A replacement must carry a strictly greater good-til value and keep the
/// side, time in force and reduce-only flag of the order it replaces.
pub(super) fn validate_replacement(existing: &Order, replacement: &Order) -> Result<(), ValidationError> {
    match replacement.cmp_replacement(existing) {
        Ordering::Greater => {}
        Ordering::Equal => {
            return Err(ValidationError::InvalidReplacement {
                reason: format!("order {} already exists with the same good-til value", existing.order_id),
            })
        }
        Ordering::Less => {
            return Err(ValidationError::InvalidReplacement {
                reason: format!("order {} already exists with a greater good-til value", existing.order_id),
            })
        }
    }
    if replacement.side != existing.side {
        return Err(ValidationError::InvalidReplacement {
            reason: "replacement cannot change the order side".to_string(),
        });
    }
    if replacement.time_in_force != existing.time_in_force {
        return Err(ValidationError::InvalidReplacement {
            reason: "replacement cannot change the time in force".to_string(),
        });
    }
    if replacement.reduce_only != existing.reduce_only {
        return Err(ValidationError::InvalidReplacement {
            reason: "replacement cannot change the reduce-only flag".to_string(),
        });
    }
    Ok(())
}
