//! Reduce-only fill resizing
//!
//! A reduce-only order may only shrink the position of its subaccount toward
//! zero. Fills are capped so the position never crosses zero.

use types::numeric::BaseQuantums;

/// Largest fill a reduce-only order on `is_buy` may take given the current
/// signed position. Zero when the order would grow or open a position.
pub fn resize_reduce_only_fill(position_size: i128, is_buy: bool, fill_amount: BaseQuantums) -> BaseQuantums {
    let closable = match (is_buy, position_size) {
        (true, size) if size < 0 => size.unsigned_abs(),
        (false, size) if size > 0 => size.unsigned_abs(),
        _ => 0,
    };
    let capped = u128::from(fill_amount.value()).min(closable);
    // capped <= fill_amount, which fits in u64
    BaseQuantums(u64::try_from(capped).unwrap_or(fill_amount.value()))
}

/// True if a reduce-only order on `is_buy` is strictly opposite the position.
pub fn reduces_position(position_size: i128, is_buy: bool) -> bool {
    if is_buy {
        position_size < 0
    } else {
        position_size > 0
    }
}

/// Signed position after a fill of `fill_amount` on `is_buy`.
pub fn position_after_fill(position_size: i128, is_buy: bool, fill_amount: BaseQuantums) -> i128 {
    position_size + fill_amount.signed(is_buy)
}
