//! Crossing detection logic
//!
//! Determines when a bid and ask can match based on price compatibility

use types::numeric::Subticks;
use types::order::Side;

/// Check if a bid and ask can match at given prices
pub fn can_match(bid_price: Subticks, ask_price: Subticks) -> bool {
    bid_price >= ask_price
}

/// Check if a taker with an optional limit crosses a resting maker price.
///
/// A taker without a limit (liquidation) crosses every maker.
pub fn taker_crosses(taker_side: Side, limit: Option<Subticks>, maker_price: Subticks) -> bool {
    let Some(limit) = limit else {
        return true;
    };
    match taker_side {
        Side::BUY => can_match(limit, maker_price),
        Side::SELL => can_match(maker_price, limit),
        Side::UNSPECIFIED => false,
    }
}

/// True if the best bid is at or above the best ask.
pub fn is_crossed(best_bid: Option<Subticks>, best_ask: Option<Subticks>) -> bool {
    matches!((best_bid, best_ask), (Some(bid), Some(ask)) if can_match(bid, ask))
}
