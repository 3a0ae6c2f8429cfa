//! Mid price, impact price and premium
//!
//! The impact price is the average execution price of a hypothetical market
//! order of a given quote notional. Makers whose remainder could no longer be
//! added to the book are skipped.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::errors::{ClobError, ValidationError};
use types::ids::ClobPairId;
use types::numeric::Subticks;
use types::order::Side;

use super::MemClob;
use crate::keeper::{remaining_amount, ClobKeeper};

const ONE_MILLION: u32 = 1_000_000;

/// Inputs of a premium sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricePremiumParams {
    /// Index price expressed in subticks
    pub index_price_subticks: Decimal,
    /// Quote notional of the hypothetical market order
    pub impact_notional: u128,
    /// Bound on the absolute premium, in parts per million
    pub max_abs_premium_ppm: u32,
}

impl<K: ClobKeeper> MemClob<K> {
    pub fn get_mid_price(&self, clob_pair_id: ClobPairId) -> Result<Option<Subticks>, ClobError> {
        let (best_bid, best_ask) = self.market(clob_pair_id)?.book.best_prices();
        Ok(match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => Some(Subticks(bid.value() + ask.value().saturating_sub(bid.value()) / 2)),
            _ => None,
        })
    }

    /// Average price of consuming `impact_notional` of the `side` half of the
    /// book (`BUY` consumes bids). `None` if the book cannot absorb it.
    ///
    /// A zero notional yields the best price on that side.
    pub fn get_impact_price(
        &mut self,
        clob_pair_id: ClobPairId,
        side: Side,
        impact_notional: u128,
    ) -> Result<Option<Decimal>, ClobError> {
        if !side.is_valid() {
            return Err(ValidationError::InvalidSide.into());
        }
        let Self { markets, keeper, .. } = self;
        let keeper = keeper.as_mut().ok_or(ClobError::KeeperNotSet)?;
        let book = &markets
            .get(&clob_pair_id)
            .ok_or(ClobError::MarketNotFound { clob_pair_id })?
            .book;

        let mut cursor = book.best_on_side(side);
        if impact_notional == 0 {
            return Ok(cursor
                .and_then(|handle| book.order_at(handle))
                .map(|order| Decimal::from(order.subticks.value())));
        }

        let mut remaining_notional = impact_notional;
        let mut accumulated = Decimal::ZERO;
        while remaining_notional > 0 {
            let Some(handle) = cursor else {
                break;
            };
            cursor = book.next_after(handle);
            let Some(maker) = book.order_at(handle) else {
                break;
            };
            let Some(maker_remaining) = remaining_amount(&*keeper, maker) else {
                continue;
            };
            if !keeper.check_add_to_book(maker, maker_remaining).is_success() {
                continue;
            }

            let maker_notional = u128::from(maker.subticks.value()) * u128::from(maker_remaining.value());
            if maker_notional == 0 {
                continue;
            }
            let base = if remaining_notional >= maker_notional {
                remaining_notional -= maker_notional;
                Some(Decimal::from(maker_remaining.value()))
            } else {
                let partial = Decimal::from_u128(remaining_notional)
                    .and_then(|notional| notional.checked_div(Decimal::from(maker.subticks.value())));
                remaining_notional = 0;
                partial
            };
            let Some(total) = base.and_then(|base| accumulated.checked_add(base)) else {
                return Ok(None);
            };
            accumulated = total;
        }

        if remaining_notional > 0 {
            return Ok(None);
        }
        let base = accumulated.ceil();
        if base.is_zero() {
            return Ok(None);
        }
        Ok(Decimal::from_u128(impact_notional).and_then(|notional| notional.checked_div(base)))
    }

    /// Premium of the impact price over the index price, in parts per
    /// million, truncated toward zero and clamped to the configured bound.
    ///
    /// Zero unless the index lies outside the spread and the impact price on
    /// that side lies beyond the index.
    pub fn get_price_premium(&mut self, clob_pair_id: ClobPairId, params: PricePremiumParams) -> Result<i32, ClobError> {
        let index = params.index_price_subticks;
        if index <= Decimal::ZERO {
            return Err(ClobError::ZeroIndexPrice { clob_pair_id });
        }
        let (best_bid, best_ask) = self.market(clob_pair_id)?.book.best_prices();
        if best_bid.is_none() && best_ask.is_none() {
            return Ok(0);
        }
        self.ensure_not_crossed(clob_pair_id)?;

        let side = if best_bid.is_some_and(|bid| index < Decimal::from(bid.value())) {
            Side::BUY
        } else if best_ask.is_some_and(|ask| index > Decimal::from(ask.value())) {
            Side::SELL
        } else {
            return Ok(0);
        };

        let Some(impact) = self.get_impact_price(clob_pair_id, side, params.impact_notional)? else {
            return Ok(0);
        };
        let beyond_index = match side {
            Side::BUY => impact > index,
            _ => impact < index,
        };
        if !beyond_index {
            return Ok(0);
        }

        let million = Decimal::from(ONE_MILLION);
        let Some(premium) = impact
            .checked_mul(million)
            .and_then(|scaled| scaled.checked_div(index))
            .and_then(|ratio| ratio.checked_sub(million))
        else {
            return Ok(0);
        };
        let bound = Decimal::from(params.max_abs_premium_ppm);
        let clamped = premium.trunc().clamp(-bound, bound);
        Ok(clamped.to_i32().unwrap_or(if clamped.is_sign_negative() {
            i32::MIN
        } else {
            i32::MAX
        }))
    }
}
