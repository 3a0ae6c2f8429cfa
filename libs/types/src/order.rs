//! Order types
//!
//! An `Order` is immutable once placed: replacement means removing the resting
//! order and placing a new one with the same id and a strictly greater
//! replacement key. Fill amounts are never stored on the order itself; they
//! live in the external fill ledger.

use crate::ids::{ClobPairId, OrderId, SubaccountId};
use crate::numeric::{BaseQuantums, Subticks};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::fmt;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
    /// Never valid on a placed order
    UNSPECIFIED,
}

impl Side {
    /// Get the opposite side. `UNSPECIFIED` has no opposite and maps to itself.
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
            Side::UNSPECIFIED => Side::UNSPECIFIED,
        }
    }

    pub fn is_buy(&self) -> bool {
        matches!(self, Side::BUY)
    }

    pub fn is_valid(&self) -> bool {
        !matches!(self, Side::UNSPECIFIED)
    }
}

/// Time-in-force policy for orders
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-Till-Cancel: rests until filled, canceled or expired
    GTC,
    /// Immediate-Or-Cancel: match immediately, drop the remainder
    IOC,
    /// Fill-Or-Kill: full match or reject entirely
    FOK,
    /// Never takes liquidity
    POST_ONLY,
}

/// Expiry of an order
///
/// Short-term orders expire at a block height, stateful orders at a block
/// time. The inner value doubles as the replacement key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum GoodTil {
    Block(u32),
    BlockTime(u32),
}

impl GoodTil {
    pub fn value(&self) -> u32 {
        match self {
            GoodTil::Block(height) => *height,
            GoodTil::BlockTime(time) => *time,
        }
    }
}

/// SHA-256 digest identifying one exact version of an order
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderHash(pub [u8; 32]);

impl fmt::Display for OrderHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for OrderHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OrderHash({})", self)
    }
}

/// A limit order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub side: Side,
    pub quantums: BaseQuantums,
    pub subticks: Subticks,
    pub good_til: GoodTil,
    pub time_in_force: TimeInForce,
    pub reduce_only: bool,
}

impl Order {
    pub fn new(
        order_id: OrderId,
        side: Side,
        quantums: BaseQuantums,
        subticks: Subticks,
        good_til: GoodTil,
        time_in_force: TimeInForce,
    ) -> Self {
        Self {
            order_id,
            side,
            quantums,
            subticks,
            good_til,
            time_in_force,
            reduce_only: false,
        }
    }

    /// Builder-style helper to mark the order reduce-only.
    pub fn with_reduce_only(mut self, reduce_only: bool) -> Self {
        self.reduce_only = reduce_only;
        self
    }

    pub fn subaccount_id(&self) -> &SubaccountId {
        &self.order_id.subaccount_id
    }

    pub fn clob_pair_id(&self) -> ClobPairId {
        self.order_id.clob_pair_id
    }

    pub fn is_buy(&self) -> bool {
        self.side.is_buy()
    }

    pub fn is_short_term(&self) -> bool {
        self.order_id.is_short_term()
    }

    pub fn is_stateful(&self) -> bool {
        self.order_id.is_stateful()
    }

    pub fn is_post_only(&self) -> bool {
        self.time_in_force == TimeInForce::POST_ONLY
    }

    /// IOC and FOK orders may only be matched at placement time.
    pub fn requires_immediate_execution(&self) -> bool {
        matches!(self.time_in_force, TimeInForce::IOC | TimeInForce::FOK)
    }

    /// Expiry block of a short-term order.
    pub fn good_til_block(&self) -> Option<u32> {
        match self.good_til {
            GoodTil::Block(height) => Some(height),
            GoodTil::BlockTime(_) => None,
        }
    }

    /// Monotonic key a replacement must strictly increase.
    pub fn replacement_key(&self) -> u32 {
        self.good_til.value()
    }

    /// Compares two versions of the same order by replacement key.
    pub fn cmp_replacement(&self, other: &Order) -> Ordering {
        self.replacement_key().cmp(&other.replacement_key())
    }

    /// Hash of this exact order version.
    ///
    /// Fields are fed in declaration order with fixed-width big-endian
    /// encodings, so the digest is identical across nodes.
    pub fn hash(&self) -> OrderHash {
        let mut hasher = Sha256::new();
        let id = &self.order_id;
        hasher.update((id.subaccount_id.owner.len() as u64).to_be_bytes());
        hasher.update(id.subaccount_id.owner.as_bytes());
        hasher.update(id.subaccount_id.number.to_be_bytes());
        hasher.update(id.client_id.to_be_bytes());
        hasher.update(id.order_flags.to_be_bytes());
        hasher.update(id.clob_pair_id.as_u32().to_be_bytes());
        hasher.update([side_tag(self.side)]);
        hasher.update(self.quantums.value().to_be_bytes());
        hasher.update(self.subticks.value().to_be_bytes());
        match self.good_til {
            GoodTil::Block(height) => {
                hasher.update([0u8]);
                hasher.update(height.to_be_bytes());
            }
            GoodTil::BlockTime(time) => {
                hasher.update([1u8]);
                hasher.update(time.to_be_bytes());
            }
        }
        hasher.update([tif_tag(self.time_in_force), u8::from(self.reduce_only)]);
        OrderHash(hasher.finalize().into())
    }
}

fn side_tag(side: Side) -> u8 {
    match side {
        Side::UNSPECIFIED => 0,
        Side::BUY => 1,
        Side::SELL => 2,
    }
}

fn tif_tag(tif: TimeInForce) -> u8 {
    match tif {
        TimeInForce::GTC => 0,
        TimeInForce::IOC => 1,
        TimeInForce::FOK => 2,
        TimeInForce::POST_ONLY => 3,
    }
}

/// Outcome of matching a taker order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Success,
    Undercollateralized,
    InternalError,
    ImmediateOrCancelWouldRestOnBook,
    ReduceOnlyResized,
    LiquidationRequiresDeleveraging,
    LiquidationExceededSubaccountMaxNotionalLiquidated,
    LiquidationExceededSubaccountMaxInsuranceLost,
    PostOnlyWouldCrossMakerOrder,
}

impl OrderStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, OrderStatus::Success)
    }

    /// Reason reported when a taker with this status leaves the book.
    pub fn removal_reason(&self) -> Option<RemovalReason> {
        match self {
            OrderStatus::Success => None,
            OrderStatus::Undercollateralized
            | OrderStatus::LiquidationRequiresDeleveraging
            | OrderStatus::LiquidationExceededSubaccountMaxNotionalLiquidated
            | OrderStatus::LiquidationExceededSubaccountMaxInsuranceLost => {
                Some(RemovalReason::Undercollateralized)
            }
            OrderStatus::InternalError => Some(RemovalReason::InternalError),
            OrderStatus::ImmediateOrCancelWouldRestOnBook => {
                Some(RemovalReason::ImmediateOrCancelWouldRestOnBook)
            }
            OrderStatus::ReduceOnlyResized => Some(RemovalReason::InvalidReduceOnly),
            OrderStatus::PostOnlyWouldCrossMakerOrder => Some(RemovalReason::PostOnlyWouldCrossMakerOrder),
        }
    }
}

/// Why an order left the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemovalReason {
    Undercollateralized,
    InvalidSelfTrade,
    InvalidReduceOnly,
    PostOnlyWouldCrossMakerOrder,
    FokUnfilled,
    ImmediateOrCancelWouldRestOnBook,
    ConditionalIocWouldRestOnBook,
    UserCanceled,
    Replaced,
    Expired,
    FullyFilled,
    InternalError,
}
