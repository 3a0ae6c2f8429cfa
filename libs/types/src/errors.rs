//! Error types for the order book
//!
//! Error taxonomy using thiserror. Validation and matching rejections happen
//! before any state becomes visible; invariant violations indicate a defect
//! and abort the enclosing call.

use crate::ids::{ClobPairId, OrderId};
use crate::numeric::{BaseQuantums, Subticks};
use crate::order::OrderHash;
use thiserror::Error;

/// Top-level order book error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClobError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Matching rejection: {0}")]
    Matching(#[from] MatchingRejection),

    #[error("Cancellation error: {0}")]
    Cancel(#[from] CancelError),

    #[error("Invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),

    #[error("Market not found: {clob_pair_id}")]
    MarketNotFound { clob_pair_id: ClobPairId },

    #[error("Market already exists: {clob_pair_id}")]
    MarketAlreadyExists { clob_pair_id: ClobPairId },

    #[error("Invalid market parameters: {reason}")]
    InvalidMarket { reason: String },

    #[error("Keeper capability has not been set")]
    KeeperNotSet,

    #[error("Index price is zero for market {clob_pair_id}")]
    ZeroIndexPrice { clob_pair_id: ClobPairId },
}

/// Rejections raised before any mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Order {order_id} is canceled until block {cancel_til_block}")]
    OrderIsCanceled {
        order_id: OrderId,
        cancel_til_block: u32,
    },

    #[error("Invalid replacement: {reason}")]
    InvalidReplacement { reason: String },

    #[error("Equity tier limit exceeded: {reason}")]
    EquityTierExceeded { reason: String },

    #[error("Reduce-only order would increase position size")]
    ReduceOnlyWouldIncreasePosition,

    #[error("Order {order_id} remaining amount {remaining} is below the minimum order size")]
    OrderFullyFilled {
        order_id: OrderId,
        remaining: BaseQuantums,
    },

    #[error("Immediate execution order {order_id} was already filled")]
    ImmediateExecutionOrderAlreadyFilled { order_id: OrderId },

    #[error("Invalid order side")]
    InvalidSide,

    #[error("Order {order_id} is off the market grid: {reason}")]
    OffGrid { order_id: OrderId, reason: String },
}

/// Rejections decided by the post-walk policy. Fills computed during the
/// walk are discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchingRejection {
    #[error("Fill-or-kill order {order_id} could not be fully filled: {remaining} remaining")]
    FillOrKillNotFilled {
        order_id: OrderId,
        remaining: BaseQuantums,
    },

    #[error("Post-only order {order_id} would cross a maker order")]
    PostOnlyWouldCrossMakerOrder { order_id: OrderId },
}

/// Short-term cancellation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CancelError {
    #[error("Cancellation for {order_id} already exists until block {existing_til_block} (requested {til_block})")]
    AlreadyExists {
        order_id: OrderId,
        existing_til_block: u32,
        til_block: u32,
    },

    #[error("Only short-term orders can be canceled by block: {order_id}")]
    NotShortTerm { order_id: OrderId },
}

/// Internal defects. Never expected in a correct build.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvariantViolation {
    #[error("Orderbook {clob_pair_id} is crossed: best bid {best_bid}, best ask {best_ask}")]
    CrossedBook {
        clob_pair_id: ClobPairId,
        best_bid: Subticks,
        best_ask: Subticks,
    },

    #[error("Order not found in index: {order_id}")]
    OrderNotFound { order_id: OrderId },

    #[error("Order already resting: {order_id}")]
    OrderAlreadyExists { order_id: OrderId },

    #[error("Order {order_id} has no remaining size")]
    NoRemainingSize { order_id: OrderId },

    #[error("Reduce-only taker {order_id} resized to zero")]
    TakerReduceOnlyResizedToZero { order_id: OrderId },

    #[error("Total filled amount of {order_id} exceeds its size")]
    FillExceedsOrderSize { order_id: OrderId },

    #[error("Short-term order tx bytes missing for hash {order_hash}")]
    MissingTxBytes { order_hash: OrderHash },

    #[error("Newly matched version of {order_id} is older than the recorded one")]
    MatchedOrderRegressed { order_id: OrderId },

    #[error("Invalid side on resting order {order_id}")]
    InvalidSide { order_id: OrderId },
}
